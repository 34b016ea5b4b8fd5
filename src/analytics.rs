use std::collections::BTreeMap;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use duckdb::{Connection, Params, Row, params};
use serde::Serialize;
use serde_json::Value;

use crate::db::format_ts;
use crate::prices::round2;

pub const DEFAULT_DAYS: i64 = 30;
const TOP: usize = 10;
const GEO_LIMIT: usize = 20;
const RECENT_LIMIT: usize = 20;

const DAY_NAMES: [&str; 7] = [
    "Niedziela",
    "Poniedziałek",
    "Wtorek",
    "Środa",
    "Czwartek",
    "Piątek",
    "Sobota",
];

const CONTACT_TYPES_SQL: &str = "('phone_click', 'email_click', 'website_click')";

#[derive(Debug, Clone, Serialize)]
pub struct TypeCount {
    pub event_type: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Overview {
    pub total_events: i64,
    pub recent_events_count: i64,
    pub events_by_type: Vec<TypeCount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FacilityConversion {
    pub facility_id: i64,
    pub name: Option<String>,
    pub locality: Option<String>,
    pub facility_type: Option<String>,
    pub views: i64,
    pub contacts: i64,
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversionFunnel {
    pub total_views: i64,
    pub total_contacts: i64,
    pub conversion_rate: f64,
    pub unique_facilities_viewed: i64,
    pub unique_facilities_contacted: i64,
    pub top_conversion_facilities: Vec<FacilityConversion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DemandLevel {
    High,
    Medium,
    Low,
}

impl DemandLevel {
    fn from_views_per_facility(ratio: f64) -> Self {
        if ratio > 10.0 {
            DemandLevel::High
        } else if ratio > 5.0 {
            DemandLevel::Medium
        } else {
            DemandLevel::Low
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CityStats {
    pub city: String,
    pub region: String,
    pub total_events: i64,
    pub views: i64,
    pub contacts: i64,
    pub facilities_count: i64,
    pub views_per_facility: f64,
    pub demand_level: DemandLevel,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeographicInsights {
    pub by_city: Vec<CityStats>,
    pub top_cities: Vec<CityStats>,
    pub high_demand_cities: Vec<CityStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HourStats {
    pub hour: i64,
    pub total_events: i64,
    pub views: i64,
    pub contacts: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayStats {
    pub day_of_week: i64,
    pub day_name: &'static str,
    pub total_events: i64,
    pub views: i64,
    pub contacts: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PeakHour {
    pub hour: i64,
    pub total_events: i64,
    pub label: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimePatterns {
    pub hourly: Vec<HourStats>,
    pub daily: Vec<DayStats>,
    pub peak_hours: Vec<PeakHour>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FacilityTally {
    pub facility_id: i64,
    pub name: Option<String>,
    pub locality: Option<String>,
    pub region: Option<String>,
    pub facility_type: Option<String>,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentEvent {
    pub id: i64,
    pub event_type: String,
    pub timestamp: String,
    pub facility_id: i64,
    pub facility_name: Option<String>,
    pub facility_locality: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyCount {
    pub date: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegionStats {
    pub region: String,
    pub views: i64,
    pub contacts: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LanguageStats {
    pub language: String,
    pub count: i64,
    pub percent: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComboCount {
    pub combo: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmptyResults {
    pub top_combos: Vec<ComboCount>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScrollBucket {
    pub depth: i64,
    pub count: usize,
    pub percent: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReturnVisitors {
    pub count: usize,
    pub avg_days_between: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrossDistrict {
    pub top_paths: Vec<ComboCount>,
    pub rate: i64,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PathBucket {
    pub views: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PathToContact {
    pub avg_views: f64,
    pub distribution: Vec<PathBucket>,
    pub total_contacts: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocalInsights {
    pub empty_results: EmptyResults,
    pub filter_combos: Vec<ComboCount>,
    pub scroll_depth: Vec<ScrollBucket>,
    pub return_visitors: ReturnVisitors,
    pub cross_district: CrossDistrict,
    pub path_to_contact: PathToContact,
}

#[derive(Debug, Clone, Serialize)]
pub struct DateRange {
    pub from: String,
    pub to: String,
    pub days: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsReport {
    pub overview: Overview,
    pub conversion_funnel: ConversionFunnel,
    pub geographic_insights: GeographicInsights,
    pub time_patterns: TimePatterns,
    pub top_viewed: Vec<FacilityTally>,
    pub top_contacted: Vec<FacilityTally>,
    pub recent_activity: Vec<RecentEvent>,
    pub daily_activity: Vec<DailyCount>,
    pub stats_by_region: Vec<RegionStats>,
    pub language_stats: Vec<LanguageStats>,
    pub local_insights: LocalInsights,
    pub date_range: DateRange,
}

fn query_all<T, P, F>(conn: &Connection, sql: &str, params: P, f: F) -> anyhow::Result<Vec<T>>
where
    P: Params,
    F: FnMut(&Row<'_>) -> duckdb::Result<T>,
{
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, f)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

/// Builds the admin dashboard over the last `days` days ending at `now`.
/// Overview totals, top lists and recent activity are all-time.
pub fn report(conn: &Connection, days: i64, now: DateTime<Utc>) -> anyhow::Result<AnalyticsReport> {
    let start = now - Duration::days(days);
    let since = format_ts(start);

    let report = AnalyticsReport {
        overview: overview(conn, &since).context("overview")?,
        conversion_funnel: conversion_funnel(conn, &since).context("conversion funnel")?,
        geographic_insights: geographic(conn, &since).context("geographic insights")?,
        time_patterns: time_patterns(conn, &since).context("time patterns")?,
        top_viewed: top_facilities(conn, "= 'view'").context("top viewed")?,
        top_contacted: top_facilities(conn, &format!("IN {CONTACT_TYPES_SQL}")).context("top contacted")?,
        recent_activity: recent_activity(conn).context("recent activity")?,
        daily_activity: daily_activity(conn, &since).context("daily activity")?,
        stats_by_region: stats_by_region(conn, &since).context("stats by region")?,
        language_stats: language_stats(conn, &since).context("language stats")?,
        local_insights: local_insights(conn, &since).context("local insights")?,
        date_range: DateRange {
            from: start.to_rfc3339(),
            to: now.to_rfc3339(),
            days,
        },
    };
    Ok(report)
}

fn overview(conn: &Connection, since: &str) -> anyhow::Result<Overview> {
    let total_events: i64 =
        conn.query_row("SELECT COUNT(*)::BIGINT FROM facility_events", [], |row| row.get(0))?;
    let recent_events_count: i64 = conn.query_row(
        "SELECT COUNT(*)::BIGINT FROM facility_events WHERE ts >= CAST(? AS TIMESTAMP)",
        params![since],
        |row| row.get(0),
    )?;
    let events_by_type = query_all(
        conn,
        r#"
        SELECT event_type, COUNT(*)::BIGINT AS n
        FROM facility_events
        GROUP BY event_type
        ORDER BY n DESC, event_type ASC
    "#,
        [],
        |row| {
            Ok(TypeCount {
                event_type: row.get(0)?,
                count: row.get(1)?,
            })
        },
    )?;
    Ok(Overview {
        total_events,
        recent_events_count,
        events_by_type,
    })
}

fn conversion_funnel(conn: &Connection, since: &str) -> anyhow::Result<ConversionFunnel> {
    let totals_sql = format!(
        r#"
        SELECT
          COUNT(CASE WHEN event_type = 'view' THEN 1 END)::BIGINT,
          COUNT(CASE WHEN event_type IN {CONTACT_TYPES_SQL} THEN 1 END)::BIGINT,
          COUNT(DISTINCT CASE WHEN event_type = 'view' THEN facility_id END)::BIGINT,
          COUNT(DISTINCT CASE WHEN event_type IN {CONTACT_TYPES_SQL} THEN facility_id END)::BIGINT
        FROM facility_events
        WHERE ts >= CAST(? AS TIMESTAMP)
    "#
    );
    let (total_views, total_contacts, unique_viewed, unique_contacted): (i64, i64, i64, i64) =
        conn.query_row(&totals_sql, params![since], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?;

    let per_facility_sql = format!(
        r#"
        WITH per_facility AS (
          SELECT
            facility_id,
            COUNT(CASE WHEN event_type = 'view' THEN 1 END)::BIGINT AS views,
            COUNT(CASE WHEN event_type IN {CONTACT_TYPES_SQL} THEN 1 END)::BIGINT AS contacts
          FROM facility_events
          WHERE ts >= CAST(? AS TIMESTAMP)
          GROUP BY facility_id
        )
        SELECT pf.facility_id, f.name, f.locality, f.facility_type, pf.views, pf.contacts,
               ROUND(pf.contacts::DOUBLE / pf.views::DOUBLE * 100, 2) AS rate
        FROM per_facility pf
        LEFT JOIN facilities f ON f.id = pf.facility_id
        WHERE pf.views >= 1
        ORDER BY rate DESC, pf.facility_id ASC
        LIMIT {TOP}
    "#
    );
    let top_conversion_facilities = query_all(conn, &per_facility_sql, params![since], |row| {
        Ok(FacilityConversion {
            facility_id: row.get(0)?,
            name: row.get(1)?,
            locality: row.get(2)?,
            facility_type: row.get(3)?,
            views: row.get(4)?,
            contacts: row.get(5)?,
            conversion_rate: row.get(6)?,
        })
    })?;

    let conversion_rate = if total_views > 0 {
        round2(total_contacts as f64 / total_views as f64 * 100.0)
    } else {
        0.0
    };
    Ok(ConversionFunnel {
        total_views,
        total_contacts,
        conversion_rate,
        unique_facilities_viewed: unique_viewed,
        unique_facilities_contacted: unique_contacted,
        top_conversion_facilities,
    })
}

fn geographic(conn: &Connection, since: &str) -> anyhow::Result<GeographicInsights> {
    let sql = format!(
        r#"
        SELECT
          f.locality,
          f.region,
          COUNT(e.id)::BIGINT AS total_events,
          COUNT(CASE WHEN e.event_type = 'view' THEN 1 END)::BIGINT AS views,
          COUNT(CASE WHEN e.event_type IN {CONTACT_TYPES_SQL} THEN 1 END)::BIGINT AS contacts,
          COUNT(DISTINCT f.id)::BIGINT AS facilities_count
        FROM facilities f
        LEFT JOIN facility_events e
          ON e.facility_id = f.id AND e.ts >= CAST(? AS TIMESTAMP)
        GROUP BY f.locality, f.region
        HAVING COUNT(e.id) > 0
        ORDER BY views DESC, f.locality ASC
        LIMIT {GEO_LIMIT}
    "#
    );
    let by_city = query_all(conn, &sql, params![since], |row| {
        let views: i64 = row.get(3)?;
        let facilities_count: i64 = row.get(5)?;
        let ratio = if facilities_count > 0 {
            views as f64 / facilities_count as f64
        } else {
            0.0
        };
        Ok(CityStats {
            city: row.get(0)?,
            region: row.get(1)?,
            total_events: row.get(2)?,
            views,
            contacts: row.get(4)?,
            facilities_count,
            views_per_facility: round2(ratio),
            demand_level: DemandLevel::from_views_per_facility(ratio),
        })
    })?;
    Ok(GeographicInsights {
        top_cities: by_city.iter().take(TOP).cloned().collect(),
        high_demand_cities: by_city
            .iter()
            .filter(|c| c.demand_level == DemandLevel::High)
            .cloned()
            .collect(),
        by_city,
    })
}

fn time_patterns(conn: &Connection, since: &str) -> anyhow::Result<TimePatterns> {
    let breakdown = |bucket: &str| {
        format!(
            r#"
            SELECT
              {bucket} AS b,
              COUNT(*)::BIGINT AS total_events,
              COUNT(CASE WHEN event_type = 'view' THEN 1 END)::BIGINT AS views,
              COUNT(CASE WHEN event_type IN {CONTACT_TYPES_SQL} THEN 1 END)::BIGINT AS contacts
            FROM facility_events
            WHERE ts >= CAST(? AS TIMESTAMP)
            GROUP BY b
            ORDER BY b
        "#
        )
    };

    let hourly = query_all(conn, &breakdown("CAST(hour(ts) AS BIGINT)"), params![since], |row| {
        Ok(HourStats {
            hour: row.get(0)?,
            total_events: row.get(1)?,
            views: row.get(2)?,
            contacts: row.get(3)?,
        })
    })?;
    // dayofweek: 0 = Sunday
    let daily = query_all(conn, &breakdown("CAST(dayofweek(ts) AS BIGINT)"), params![since], |row| {
        let day_of_week: i64 = row.get(0)?;
        Ok(DayStats {
            day_of_week,
            day_name: DAY_NAMES[day_of_week.rem_euclid(7) as usize],
            total_events: row.get(1)?,
            views: row.get(2)?,
            contacts: row.get(3)?,
        })
    })?;

    let mut busiest = hourly.clone();
    busiest.sort_by(|a, b| b.total_events.cmp(&a.total_events));
    let peak_hours = busiest
        .into_iter()
        .take(3)
        .map(|h| PeakHour {
            hour: h.hour,
            total_events: h.total_events,
            label: format!("{}:00 - {}:59", h.hour, h.hour),
        })
        .collect();

    Ok(TimePatterns {
        hourly,
        daily,
        peak_hours,
    })
}

/// All-time top facilities for events matching `type_predicate`.
fn top_facilities(conn: &Connection, type_predicate: &str) -> anyhow::Result<Vec<FacilityTally>> {
    let sql = format!(
        r#"
        SELECT e.facility_id, f.name, f.locality, f.region, f.facility_type, COUNT(*)::BIGINT AS n
        FROM facility_events e
        LEFT JOIN facilities f ON f.id = e.facility_id
        WHERE e.event_type {type_predicate}
        GROUP BY e.facility_id, f.name, f.locality, f.region, f.facility_type
        ORDER BY n DESC, e.facility_id ASC
        LIMIT {TOP}
    "#
    );
    query_all(conn, &sql, [], |row| {
        Ok(FacilityTally {
            facility_id: row.get(0)?,
            name: row.get(1)?,
            locality: row.get(2)?,
            region: row.get(3)?,
            facility_type: row.get(4)?,
            count: row.get(5)?,
        })
    })
}

fn recent_activity(conn: &Connection) -> anyhow::Result<Vec<RecentEvent>> {
    let sql = format!(
        r#"
        SELECT e.id, e.event_type, strftime(e.ts, '%Y-%m-%dT%H:%M:%SZ'), e.facility_id, f.name, f.locality
        FROM facility_events e
        LEFT JOIN facilities f ON f.id = e.facility_id
        ORDER BY e.ts DESC, e.id DESC
        LIMIT {RECENT_LIMIT}
    "#
    );
    query_all(conn, &sql, [], |row| {
        Ok(RecentEvent {
            id: row.get(0)?,
            event_type: row.get(1)?,
            timestamp: row.get(2)?,
            facility_id: row.get(3)?,
            facility_name: row.get(4)?,
            facility_locality: row.get(5)?,
        })
    })
}

fn daily_activity(conn: &Connection, since: &str) -> anyhow::Result<Vec<DailyCount>> {
    query_all(
        conn,
        r#"
        SELECT strftime(CAST(ts AS DATE), '%Y-%m-%d') AS d, COUNT(*)::BIGINT
        FROM facility_events
        WHERE ts >= CAST(? AS TIMESTAMP)
        GROUP BY d
        ORDER BY d ASC
    "#,
        params![since],
        |row| {
            Ok(DailyCount {
                date: row.get(0)?,
                count: row.get(1)?,
            })
        },
    )
}

fn stats_by_region(conn: &Connection, since: &str) -> anyhow::Result<Vec<RegionStats>> {
    let sql = format!(
        r#"
        SELECT
          f.region,
          COUNT(CASE WHEN e.event_type = 'view' THEN 1 END)::BIGINT AS views,
          COUNT(CASE WHEN e.event_type IN {CONTACT_TYPES_SQL} THEN 1 END)::BIGINT AS contacts
        FROM facility_events e
        JOIN facilities f ON f.id = e.facility_id
        WHERE e.ts >= CAST(? AS TIMESTAMP)
        GROUP BY f.region
        ORDER BY views DESC, f.region ASC
    "#
    );
    query_all(conn, &sql, params![since], |row| {
        Ok(RegionStats {
            region: row.get(0)?,
            views: row.get(1)?,
            contacts: row.get(2)?,
        })
    })
}

fn language_stats(conn: &Connection, since: &str) -> anyhow::Result<Vec<LanguageStats>> {
    let raw: Vec<(Option<String>, i64)> = query_all(
        conn,
        r#"
        SELECT language, COUNT(*)::BIGINT AS n
        FROM facility_events
        WHERE ts >= CAST(? AS TIMESTAMP)
        GROUP BY language
        ORDER BY n DESC, language ASC NULLS LAST
    "#,
        params![since],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let total: i64 = raw.iter().map(|(_, n)| n).sum();
    Ok(raw
        .into_iter()
        .map(|(language, count)| LanguageStats {
            language: language.unwrap_or_else(|| "unknown".to_string()),
            count,
            percent: percent_of(count as f64, total as f64),
        })
        .collect())
}

fn percent_of(part: f64, whole: f64) -> i64 {
    if whole > 0.0 {
        (part / whole * 100.0).round() as i64
    } else {
        0
    }
}

struct AppEvent {
    event_type: String,
    metadata: Value,
}

impl AppEvent {
    fn str_field(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
    }

    fn num_field(&self, key: &str) -> Option<f64> {
        self.metadata.get(key).and_then(Value::as_f64)
    }
}

fn parse_metadata(raw: Option<String>) -> Value {
    raw.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or(Value::Null)
}

fn local_insights(conn: &Connection, since: &str) -> anyhow::Result<LocalInsights> {
    let app_events = query_all(
        conn,
        r#"
        SELECT event_type, metadata
        FROM app_events
        WHERE ts >= CAST(? AS TIMESTAMP)
        ORDER BY ts DESC
    "#,
        params![since],
        |row| {
            Ok(AppEvent {
                event_type: row.get(0)?,
                metadata: parse_metadata(row.get(1)?),
            })
        },
    )?;
    let contact_metadata: Vec<Value> = query_all(
        conn,
        &format!(
            "SELECT metadata FROM facility_events \
             WHERE event_type IN {CONTACT_TYPES_SQL} AND ts >= CAST(? AS TIMESTAMP)"
        ),
        params![since],
        |row| Ok(parse_metadata(row.get(0)?)),
    )?;
    Ok(summarize_app_events(&app_events, &contact_metadata))
}

fn of_type<'a>(events: &'a [AppEvent], kind: &'a str) -> impl Iterator<Item = &'a AppEvent> {
    events.iter().filter(move |e| e.event_type == kind)
}

/// Highest counts first; equal counts keep key order.
fn top_combos(keys: impl Iterator<Item = String>) -> Vec<ComboCount> {
    let mut tally: BTreeMap<String, usize> = BTreeMap::new();
    for key in keys {
        *tally.entry(key).or_default() += 1;
    }
    let mut ranked: Vec<ComboCount> = tally
        .into_iter()
        .map(|(combo, count)| ComboCount { combo, count })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked.truncate(TOP);
    ranked
}

fn summarize_app_events(events: &[AppEvent], contact_metadata: &[Value]) -> LocalInsights {
    let empty: Vec<&AppEvent> = of_type(events, "empty_results").collect();
    let empty_results = EmptyResults {
        top_combos: top_combos(empty.iter().map(|e| {
            format!(
                "{} / {}",
                e.str_field("powiat").unwrap_or("?"),
                e.str_field("type").unwrap_or("all")
            )
        })),
        total: empty.len(),
    };

    let filters_applied = of_type(events, "filter_applied").count();
    let filter_combos = top_combos(
        of_type(events, "filter_applied").map(|e| e.str_field("combo").unwrap_or("unknown").to_string()),
    );

    let depth_counts: Vec<(i64, usize)> = [25, 50, 75, 100]
        .into_iter()
        .map(|depth| {
            let n = of_type(events, "scroll_depth")
                .filter(|e| e.num_field("depth") == Some(depth as f64))
                .count();
            (depth, n)
        })
        .collect();
    let sessions = depth_counts[0].1;
    let scroll_depth = depth_counts
        .into_iter()
        .map(|(depth, count)| ScrollBucket {
            depth,
            count,
            percent: percent_of(count as f64, sessions as f64),
        })
        .collect();

    let returns: Vec<&AppEvent> = of_type(events, "return_visit").collect();
    let avg_days_between = if returns.is_empty() {
        0
    } else {
        let days: f64 = returns.iter().map(|e| e.num_field("daysSince").unwrap_or(0.0)).sum();
        (days / returns.len() as f64).round() as i64
    };

    let cross: Vec<&AppEvent> = of_type(events, "cross_powiat_view").collect();
    let cross_district = CrossDistrict {
        top_paths: top_combos(cross.iter().map(|e| {
            format!(
                "{} → {}",
                e.str_field("searchedPowiat").unwrap_or("?"),
                e.str_field("facilityPowiat").unwrap_or("?")
            )
        })),
        rate: percent_of(cross.len() as f64, filters_applied as f64),
        total: cross.len(),
    };

    let views_before_contact: Vec<f64> = contact_metadata
        .iter()
        .filter_map(|m| m.get("viewsInSession").and_then(Value::as_f64))
        .collect();
    let avg_views = if views_before_contact.is_empty() {
        0.0
    } else {
        let mean = views_before_contact.iter().sum::<f64>() / views_before_contact.len() as f64;
        (mean * 10.0).round() / 10.0
    };
    let distribution = (1..=5)
        .map(|n| {
            let n = n as f64;
            let count = views_before_contact
                .iter()
                .filter(|v| if n == 5.0 { **v >= 5.0 } else { **v == n })
                .count();
            PathBucket {
                views: if n == 5.0 { "5+".to_string() } else { format!("{n}") },
                count,
            }
        })
        .collect();

    LocalInsights {
        empty_results,
        filter_combos,
        scroll_depth,
        return_visitors: ReturnVisitors {
            count: returns.len(),
            avg_days_between,
        },
        cross_district,
        path_to_contact: PathToContact {
            avg_views,
            distribution,
            total_contacts: views_before_contact.len(),
        },
    }
}
