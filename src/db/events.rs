use anyhow::Context;
use duckdb::{Connection, params};
use serde::Serialize;

#[derive(Debug, Clone, Default)]
pub struct NewFacilityEvent {
    pub facility_id: i64,
    pub event_type: String,
    pub language: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub ip_address: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default)]
pub struct NewAppEvent {
    pub event_type: String,
    pub language: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

pub fn record_facility_event(conn: &Connection, ev: &NewFacilityEvent, ts: &str) -> anyhow::Result<i64> {
    let metadata = ev.metadata.as_ref().map(|m| m.to_string());
    let id: i64 = conn
        .query_row(
            r#"
            INSERT INTO facility_events
              (facility_id, event_type, language, user_agent, referer, ip_address, metadata, ts)
            VALUES (?, ?, ?, ?, ?, ?, ?, CAST(? AS TIMESTAMP))
            RETURNING id
        "#,
            params![
                ev.facility_id,
                ev.event_type,
                ev.language,
                ev.user_agent,
                ev.referer,
                ev.ip_address,
                metadata,
                ts
            ],
            |row| row.get(0),
        )
        .context("insert facility event")?;
    Ok(id)
}

pub fn record_app_event(conn: &Connection, ev: &NewAppEvent, ts: &str) -> anyhow::Result<i64> {
    let metadata = ev.metadata.as_ref().map(|m| m.to_string());
    let id: i64 = conn
        .query_row(
            r#"
            INSERT INTO app_events (event_type, language, metadata, ts)
            VALUES (?, ?, ?, CAST(? AS TIMESTAMP))
            RETURNING id
        "#,
            params![ev.event_type, ev.language, metadata, ts],
            |row| row.get(0),
        )
        .context("insert app event")?;
    Ok(id)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventTypeCount {
    pub event_type: String,
    pub count: i64,
}

/// All-time event counts for one facility.
pub fn counts_for_facility(conn: &Connection, facility_id: i64) -> anyhow::Result<Vec<EventTypeCount>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT event_type, COUNT(*)::BIGINT AS n
        FROM facility_events
        WHERE facility_id = ?
        GROUP BY event_type
        ORDER BY n DESC, event_type ASC
    "#,
    )?;
    let rows = stmt.query_map(params![facility_id], |row| {
        Ok(EventTypeCount {
            event_type: row.get(0)?,
            count: row.get(1)?,
        })
    })?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    #[test]
    fn test_record_and_count() {
        let conn = open_in_memory().unwrap();
        for kind in ["view", "view", "phone_click"] {
            let ev = NewFacilityEvent {
                facility_id: 7,
                event_type: kind.to_string(),
                metadata: Some(serde_json::json!({ "viewsInSession": 2 })),
                ..Default::default()
            };
            record_facility_event(&conn, &ev, "2025-05-01 08:00:00").unwrap();
        }
        let counts = counts_for_facility(&conn, 7).unwrap();
        assert_eq!(
            counts,
            vec![
                EventTypeCount { event_type: "view".to_string(), count: 2 },
                EventTypeCount { event_type: "phone_click".to_string(), count: 1 },
            ]
        );
        assert!(counts_for_facility(&conn, 8).unwrap().is_empty());
    }

    #[test]
    fn test_record_app_event_returns_increasing_ids() {
        let conn = open_in_memory().unwrap();
        let ev = NewAppEvent {
            event_type: "scroll_depth".to_string(),
            language: Some("pl".to_string()),
            metadata: Some(serde_json::json!({ "depth": 50 })),
        };
        let a = record_app_event(&conn, &ev, "2025-05-01 08:00:00").unwrap();
        let b = record_app_event(&conn, &ev, "2025-05-01 08:00:01").unwrap();
        assert!(b > a);
    }
}
