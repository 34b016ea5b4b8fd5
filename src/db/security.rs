use anyhow::Context;
use duckdb::{Connection, params};
use serde::Serialize;

use crate::model::SecurityEvent;

#[derive(Debug, Clone, Serialize)]
pub struct SecurityLogEntry {
    pub id: i64,
    pub event_type: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub timestamp: String,
}

pub fn log(
    conn: &Connection,
    event: SecurityEvent,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
    metadata: Option<&serde_json::Value>,
    ts: &str,
) -> anyhow::Result<()> {
    conn.execute(
        r#"
        INSERT INTO security_log (event_type, ip_address, user_agent, metadata, ts)
        VALUES (?, ?, ?, ?, CAST(? AS TIMESTAMP))
    "#,
        params![
            event.as_str(),
            ip_address,
            user_agent,
            metadata.map(|m| m.to_string()),
            ts
        ],
    )
    .context("insert security log entry")?;
    Ok(())
}

/// Failed logins from `ip_address` at or after `since`.
pub fn failed_logins_since(conn: &Connection, ip_address: &str, since: &str) -> anyhow::Result<i64> {
    let n: i64 = conn.query_row(
        r#"
        SELECT COUNT(*)::BIGINT FROM security_log
        WHERE event_type = 'login_failed' AND ip_address = ? AND ts >= CAST(? AS TIMESTAMP)
    "#,
        params![ip_address, since],
        |row| row.get(0),
    )?;
    Ok(n)
}

pub fn recent(conn: &Connection, limit: usize) -> anyhow::Result<Vec<SecurityLogEntry>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, event_type, ip_address, user_agent, metadata,
               strftime(ts, '%Y-%m-%dT%H:%M:%SZ')
        FROM security_log
        ORDER BY ts DESC, id DESC
        LIMIT ?
    "#,
    )?;
    let rows = stmt.query_map(params![limit as i64], |row| {
        let metadata: Option<String> = row.get(4)?;
        Ok(SecurityLogEntry {
            id: row.get(0)?,
            event_type: row.get(1)?,
            ip_address: row.get(2)?,
            user_agent: row.get(3)?,
            metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
            timestamp: row.get(5)?,
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
    fn test_failed_logins_window() {
        let conn = open_in_memory().unwrap();
        let ip = Some("10.0.0.1");
        log(&conn, SecurityEvent::LoginFailed, ip, None, None, "2025-01-01 10:00:00").unwrap();
        log(&conn, SecurityEvent::LoginFailed, ip, None, None, "2025-01-01 10:20:00").unwrap();
        log(&conn, SecurityEvent::LoginSuccess, ip, None, None, "2025-01-01 10:21:00").unwrap();
        log(&conn, SecurityEvent::LoginFailed, Some("10.0.0.2"), None, None, "2025-01-01 10:22:00").unwrap();

        assert_eq!(failed_logins_since(&conn, "10.0.0.1", "2025-01-01 10:10:00").unwrap(), 1);
        assert_eq!(failed_logins_since(&conn, "10.0.0.1", "2025-01-01 09:00:00").unwrap(), 2);
    }

    #[test]
    fn test_recent_newest_first() {
        let conn = open_in_memory().unwrap();
        let meta = serde_json::json!({ "facility_id": 4 });
        log(&conn, SecurityEvent::Logout, None, None, None, "2025-01-01 10:00:00").unwrap();
        log(&conn, SecurityEvent::FacilityDeleted, None, None, Some(&meta), "2025-01-02 10:00:00").unwrap();

        let entries = recent(&conn, 10).unwrap();
        assert_eq!(entries[0].event_type, "facility_deleted");
        assert_eq!(entries[0].metadata, Some(meta));
        assert_eq!(entries[1].timestamp, "2025-01-01T10:00:00Z");
        assert_eq!(recent(&conn, 1).unwrap().len(), 1);
    }
}
