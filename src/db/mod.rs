pub mod events;
pub mod facilities;
pub mod gazetteer;
pub mod inquiries;
pub mod mops;
pub mod prices;
pub mod security;
pub mod shares;

use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use duckdb::{Connection, params};

/// Timestamp layout used for every `TIMESTAMP` parameter we bind.
pub const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const SCHEMA: &str = r#"
CREATE SEQUENCE IF NOT EXISTS facility_id_seq START 1;
CREATE SEQUENCE IF NOT EXISTS locality_id_seq START 1;
CREATE SEQUENCE IF NOT EXISTS price_id_seq START 1;
CREATE SEQUENCE IF NOT EXISTS facility_event_id_seq START 1;
CREATE SEQUENCE IF NOT EXISTS app_event_id_seq START 1;
CREATE SEQUENCE IF NOT EXISTS shared_list_id_seq START 1;
CREATE SEQUENCE IF NOT EXISTS security_log_id_seq START 1;
CREATE SEQUENCE IF NOT EXISTS mops_contact_id_seq START 1;
CREATE SEQUENCE IF NOT EXISTS partner_inquiry_id_seq START 1;

CREATE TABLE IF NOT EXISTS facilities (
  id BIGINT PRIMARY KEY DEFAULT nextval('facility_id_seq'),
  name TEXT NOT NULL,
  normalized_name TEXT NOT NULL,
  facility_type TEXT NOT NULL,
  operator TEXT,
  street TEXT,
  locality TEXT NOT NULL,
  postal_code TEXT,
  municipality TEXT,
  district TEXT NOT NULL,
  region TEXT NOT NULL,
  phone TEXT,
  email TEXT,
  website TEXT,
  latitude DOUBLE,
  longitude DOUBLE,
  capacity BIGINT,
  care_profile TEXT,
  monthly_cost DOUBLE,
  source_url TEXT,
  price_source TEXT,
  data_source_date TEXT,
  price_source_date TEXT,
  verified_at TEXT,
  notes TEXT,
  verified BOOLEAN NOT NULL DEFAULT false,
  created_at TIMESTAMP NOT NULL,
  updated_at TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS localities (
  id BIGINT PRIMARY KEY DEFAULT nextval('locality_id_seq'),
  name TEXT NOT NULL,
  normalized_name TEXT NOT NULL,
  kind TEXT NOT NULL,
  municipality TEXT,
  district TEXT NOT NULL,
  region TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS prices (
  id BIGINT PRIMARY KEY DEFAULT nextval('price_id_seq'),
  facility_id BIGINT NOT NULL,
  year INTEGER NOT NULL,
  amount DOUBLE NOT NULL,
  cost_kind TEXT NOT NULL,
  source TEXT,
  verified BOOLEAN NOT NULL DEFAULT false,
  notes TEXT,
  effective_from TEXT,
  fetched_at TIMESTAMP NOT NULL,
  UNIQUE (facility_id, year, cost_kind)
);

CREATE TABLE IF NOT EXISTS facility_events (
  id BIGINT PRIMARY KEY DEFAULT nextval('facility_event_id_seq'),
  facility_id BIGINT NOT NULL,
  event_type TEXT NOT NULL,
  language TEXT,
  user_agent TEXT,
  referer TEXT,
  ip_address TEXT,
  metadata TEXT,
  ts TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS app_events (
  id BIGINT PRIMARY KEY DEFAULT nextval('app_event_id_seq'),
  event_type TEXT NOT NULL,
  language TEXT,
  metadata TEXT,
  ts TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS shared_lists (
  id BIGINT PRIMARY KEY DEFAULT nextval('shared_list_id_seq'),
  token TEXT NOT NULL UNIQUE,
  facility_ids TEXT NOT NULL,
  views BIGINT NOT NULL DEFAULT 0,
  created_at TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS security_log (
  id BIGINT PRIMARY KEY DEFAULT nextval('security_log_id_seq'),
  event_type TEXT NOT NULL,
  ip_address TEXT,
  user_agent TEXT,
  metadata TEXT,
  ts TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS mops_contacts (
  id BIGINT PRIMARY KEY DEFAULT nextval('mops_contact_id_seq'),
  city TEXT NOT NULL UNIQUE,
  city_display TEXT NOT NULL,
  name TEXT NOT NULL,
  phone TEXT,
  email TEXT,
  address TEXT,
  website TEXT,
  region TEXT,
  verified BOOLEAN NOT NULL DEFAULT false,
  last_verified TEXT,
  notes TEXT,
  updated_at TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS partner_inquiries (
  id BIGINT PRIMARY KEY DEFAULT nextval('partner_inquiry_id_seq'),
  name TEXT NOT NULL,
  email TEXT NOT NULL,
  organization TEXT NOT NULL,
  partner_type TEXT NOT NULL,
  phone TEXT,
  message TEXT NOT NULL,
  gdpr_consent BOOLEAN NOT NULL,
  status TEXT NOT NULL DEFAULT 'new',
  created_at TIMESTAMP NOT NULL
);
"#;

pub fn open(path: &Path) -> anyhow::Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("open duckdb at {}", path.display()))?;
    init_schema(&conn).context("create schema")?;
    Ok(conn)
}

pub fn open_in_memory() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory().context("open in-memory duckdb")?;
    init_schema(&conn).context("create schema")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.format(TS_FORMAT).to_string()
}

pub fn now_ts() -> String {
    format_ts(Utc::now())
}

pub fn table_count(conn: &Connection, table: &str) -> anyhow::Result<i64> {
    // table names are compile-time constants in this crate
    let sql = format!("SELECT COUNT(*)::BIGINT FROM {table}");
    let v: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
    Ok(v)
}

pub fn clear_table(conn: &Connection, table: &str) -> anyhow::Result<()> {
    conn.execute(&format!("DELETE FROM {table}"), params![])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_is_idempotent() {
        let conn = open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(table_count(&conn, "facilities").unwrap(), 0);
        assert_eq!(table_count(&conn, "security_log").unwrap(), 0);
        assert_eq!(table_count(&conn, "mops_contacts").unwrap(), 0);
        assert_eq!(table_count(&conn, "partner_inquiries").unwrap(), 0);
    }

    #[test]
    fn test_format_ts() {
        let ts = DateTime::parse_from_rfc3339("2025-03-04T05:06:07Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_ts(ts), "2025-03-04 05:06:07");
    }
}
