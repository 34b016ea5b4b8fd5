use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{Facility, FacilityType, PriceEntry};
use crate::text::normalize_polish;

pub const DEFAULT_ADMIN_YEAR: i32 = 2025;
const TREND_THRESHOLD_PERCENT: f64 = 5.0;

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparedTo {
    pub year: i32,
    pub price: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PriceChange {
    #[serde(flatten)]
    pub entry: PriceEntry,
    pub change_amount: Option<f64>,
    pub change_percent: Option<f64>,
    pub compared_to: Option<ComparedTo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, Serialize)]
pub struct YearRange {
    pub earliest: i32,
    pub latest: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PriceStatistics {
    pub total_years: usize,
    pub year_range: YearRange,
    pub current_price: f64,
    pub average_price: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub price_range: f64,
    pub trend: Trend,
}

#[derive(Debug, Clone, Serialize)]
pub struct PriceHistory {
    pub prices: Vec<PriceChange>,
    pub statistics: Option<PriceStatistics>,
}

fn newest_first(entries: &[PriceEntry]) -> Vec<PriceEntry> {
    let mut sorted = entries.to_vec();
    sorted.sort_by(|a, b| b.year.cmp(&a.year).then(a.cost_kind.cmp(&b.cost_kind)));
    sorted
}

/// Newest year first; each entry is compared with the one before it in time.
pub fn history(entries: &[PriceEntry]) -> PriceHistory {
    let sorted = newest_first(entries);
    let prices = sorted
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let previous = sorted.get(i + 1);
            let change_amount = previous.map(|p| entry.amount - p.amount);
            let change_percent = previous
                .zip(change_amount)
                .filter(|(p, _)| p.amount != 0.0)
                .map(|(p, delta)| round2(delta / p.amount * 100.0));
            PriceChange {
                entry: entry.clone(),
                change_amount: change_amount.map(round2),
                change_percent,
                compared_to: previous.map(|p| ComparedTo {
                    year: p.year,
                    price: p.amount,
                }),
            }
        })
        .collect();
    PriceHistory {
        prices,
        statistics: statistics(&sorted),
    }
}

fn statistics(newest_first: &[PriceEntry]) -> Option<PriceStatistics> {
    let newest = newest_first.first()?;
    let oldest = newest_first.last()?;
    let amounts: Vec<f64> = newest_first.iter().map(|p| p.amount).collect();
    let min_price = amounts.iter().copied().fold(f64::INFINITY, f64::min);
    let max_price = amounts.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let average = amounts.iter().sum::<f64>() / amounts.len() as f64;

    let trend = if newest_first.len() < 2 || oldest.amount == 0.0 {
        Trend::Stable
    } else {
        let change = (newest.amount - oldest.amount) / oldest.amount * 100.0;
        if change > TREND_THRESHOLD_PERCENT {
            Trend::Increasing
        } else if change < -TREND_THRESHOLD_PERCENT {
            Trend::Decreasing
        } else {
            Trend::Stable
        }
    };

    Some(PriceStatistics {
        total_years: newest_first.len(),
        year_range: YearRange {
            earliest: oldest.year,
            latest: newest.year,
        },
        current_price: newest.amount,
        average_price: round2(average),
        min_price,
        max_price,
        price_range: round2(max_price - min_price),
        trend,
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminPriceQuery {
    pub year: Option<i32>,
    pub search: Option<String>,
    pub region: Option<String>,
    /// `DPS`, `ŚDS`; anything else (including `Wszystkie`) means every type.
    #[serde(alias = "type")]
    pub facility_type: Option<String>,
    #[serde(default)]
    pub missing_price: bool,
    #[serde(default)]
    pub unverified: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FacilityPrices {
    pub id: i64,
    pub name: String,
    pub facility_type: FacilityType,
    pub locality: String,
    pub district: String,
    pub region: String,
    pub monthly_cost: Option<f64>,
    pub prices: Vec<PriceEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct YearStats {
    pub year: i32,
    pub total: usize,
    pub with_price_year: usize,
    pub with_price_prev_year: usize,
    pub missing: usize,
    pub avg_change: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminPriceOverview {
    pub facilities: Vec<FacilityPrices>,
    pub stats: YearStats,
}

fn amount_for(prices: &[PriceEntry], year: i32) -> Option<&PriceEntry> {
    prices.iter().find(|p| p.year == year)
}

/// Price coverage of the selected year across the filtered facilities.
pub fn admin_overview(
    query: &AdminPriceQuery,
    facilities: &[Facility],
    prices: &[PriceEntry],
) -> AdminPriceOverview {
    let year = query.year.unwrap_or(DEFAULT_ADMIN_YEAR);
    let search = query
        .search
        .as_deref()
        .map(normalize_polish)
        .filter(|s| !s.is_empty());
    let wanted_type = query.facility_type.as_deref().and_then(FacilityType::parse);
    let region = query.region.as_deref().map(str::trim).filter(|r| !r.is_empty());

    let mut by_facility: HashMap<i64, Vec<PriceEntry>> = HashMap::new();
    for p in prices {
        by_facility.entry(p.facility_id).or_default().push(p.clone());
    }

    let mut rows: Vec<FacilityPrices> = facilities
        .iter()
        .filter(|f| {
            search.as_deref().is_none_or(|s| {
                normalize_polish(&f.name).contains(s) || normalize_polish(&f.locality).contains(s)
            })
        })
        .filter(|f| region.is_none_or(|r| f.region == r))
        .filter(|f| wanted_type.is_none_or(|t| t == f.facility_type))
        .map(|f| FacilityPrices {
            id: f.id,
            name: f.name.clone(),
            facility_type: f.facility_type,
            locality: f.locality.clone(),
            district: f.district.clone(),
            region: f.region.clone(),
            monthly_cost: f.monthly_cost,
            prices: newest_first(by_facility.get(&f.id).map(Vec::as_slice).unwrap_or_default()),
        })
        .filter(|f| !query.missing_price || amount_for(&f.prices, year).is_none())
        .filter(|f| !query.unverified || f.prices.iter().any(|p| p.year == year && !p.verified))
        .collect();
    rows.sort_by(|a, b| {
        a.region
            .cmp(&b.region)
            .then_with(|| a.locality.cmp(&b.locality))
            .then_with(|| a.name.cmp(&b.name))
    });

    let with_price_year = rows.iter().filter(|f| amount_for(&f.prices, year).is_some()).count();
    let with_price_prev_year = rows
        .iter()
        .filter(|f| amount_for(&f.prices, year - 1).is_some())
        .count();
    let changes: Vec<f64> = rows
        .iter()
        .filter_map(|f| {
            let current = amount_for(&f.prices, year)?;
            let previous = amount_for(&f.prices, year - 1).filter(|p| p.amount > 0.0)?;
            Some((current.amount - previous.amount) / previous.amount * 100.0)
        })
        .collect();
    let avg_change = if changes.is_empty() {
        0.0
    } else {
        round2(changes.iter().sum::<f64>() / changes.len() as f64)
    };

    AdminPriceOverview {
        stats: YearStats {
            year,
            total: rows.len(),
            with_price_year,
            with_price_prev_year,
            missing: rows.len() - with_price_year,
            avg_change,
        },
        facilities: rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::tests::facility;

    fn entry(facility_id: i64, year: i32, amount: f64) -> PriceEntry {
        PriceEntry {
            facility_id,
            year,
            amount,
            cost_kind: "podstawowy".to_string(),
            source: None,
            verified: true,
            notes: None,
            effective_from: None,
            fetched_at: "2025-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_history_year_over_year() {
        let out = history(&[entry(1, 2023, 4000.0), entry(1, 2025, 4620.0), entry(1, 2024, 4200.0)]);
        let years: Vec<i32> = out.prices.iter().map(|p| p.entry.year).collect();
        assert_eq!(years, vec![2025, 2024, 2023]);
        assert_eq!(out.prices[0].change_amount, Some(420.0));
        assert_eq!(out.prices[0].change_percent, Some(10.0));
        assert_eq!(out.prices[1].change_percent, Some(5.0));
        assert!(out.prices[2].compared_to.is_none());

        let stats = out.statistics.unwrap();
        assert_eq!(stats.total_years, 3);
        assert_eq!(stats.year_range.earliest, 2023);
        assert_eq!(stats.current_price, 4620.0);
        assert_eq!(stats.average_price, 4273.33);
        assert_eq!(stats.price_range, 620.0);
        assert_eq!(stats.trend, Trend::Increasing);
    }

    #[test]
    fn test_trend_thresholds() {
        let stable = history(&[entry(1, 2024, 1000.0), entry(1, 2025, 1050.0)]);
        assert_eq!(stable.statistics.unwrap().trend, Trend::Stable);
        let down = history(&[entry(1, 2024, 1000.0), entry(1, 2025, 940.0)]);
        assert_eq!(down.statistics.unwrap().trend, Trend::Decreasing);
        let single = history(&[entry(1, 2025, 940.0)]);
        assert_eq!(single.statistics.unwrap().trend, Trend::Stable);
        assert!(history(&[]).statistics.is_none());
    }

    #[test]
    fn test_admin_overview_stats() {
        let facilities = vec![
            facility(1, "DPS A", "Kraków", "Kraków"),
            facility(2, "DPS B", "Bochnia", "bocheński"),
            facility(3, "DPS C", "Alwernia", "chrzanowski"),
        ];
        let mut unverified = entry(2, 2025, 5500.0);
        unverified.verified = false;
        let prices = vec![
            entry(1, 2024, 4000.0),
            entry(1, 2025, 4400.0),
            entry(2, 2024, 5000.0),
            unverified,
        ];
        let out = admin_overview(&AdminPriceQuery::default(), &facilities, &prices);
        assert_eq!(out.stats.year, 2025);
        assert_eq!(out.stats.total, 3);
        assert_eq!(out.stats.with_price_year, 2);
        assert_eq!(out.stats.with_price_prev_year, 2);
        assert_eq!(out.stats.missing, 1);
        assert_eq!(out.stats.avg_change, 10.0);
        let names: Vec<&str> = out.facilities.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["DPS C", "DPS B", "DPS A"]);

        let missing = AdminPriceQuery {
            missing_price: true,
            ..Default::default()
        };
        let out = admin_overview(&missing, &facilities, &prices);
        assert_eq!(out.facilities.len(), 1);
        assert_eq!(out.facilities[0].id, 3);

        let unverified = AdminPriceQuery {
            unverified: true,
            search: Some("bochnia".to_string()),
            ..Default::default()
        };
        let out = admin_overview(&unverified, &facilities, &prices);
        assert_eq!(out.facilities.len(), 1);
        assert_eq!(out.facilities[0].id, 2);
    }
}
