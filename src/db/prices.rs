use anyhow::Context;
use duckdb::{Connection, Row, params};
use serde::Deserialize;

use crate::model::{DEFAULT_COST_KIND, PriceEntry};

#[derive(Debug, Clone, Deserialize)]
pub struct PriceUpsert {
    pub facility_id: i64,
    pub year: i32,
    pub amount: f64,
    pub cost_kind: Option<String>,
    pub source: Option<String>,
    #[serde(default)]
    pub verified: bool,
    pub notes: Option<String>,
    pub effective_from: Option<String>,
}

const UPSERT_SQL: &str = r#"
    INSERT INTO prices
      (facility_id, year, amount, cost_kind, source, verified, notes, effective_from, fetched_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, CAST(? AS TIMESTAMP))
    ON CONFLICT (facility_id, year, cost_kind) DO UPDATE SET
      amount = EXCLUDED.amount,
      source = EXCLUDED.source,
      verified = EXCLUDED.verified,
      notes = EXCLUDED.notes,
      effective_from = EXCLUDED.effective_from,
      fetched_at = EXCLUDED.fetched_at
"#;

fn map_row(row: &Row<'_>) -> duckdb::Result<PriceEntry> {
    Ok(PriceEntry {
        facility_id: row.get(0)?,
        year: row.get(1)?,
        amount: row.get(2)?,
        cost_kind: row.get(3)?,
        source: row.get(4)?,
        verified: row.get(5)?,
        notes: row.get(6)?,
        effective_from: row.get(7)?,
        fetched_at: row.get(8)?,
    })
}

const COLUMNS: &str = "facility_id, year, amount, cost_kind, source, verified, notes, effective_from, \
     strftime(fetched_at, '%Y-%m-%dT%H:%M:%SZ')";

pub fn upsert(conn: &Connection, p: &PriceUpsert, now: &str) -> anyhow::Result<()> {
    let kind = p.cost_kind.as_deref().unwrap_or(DEFAULT_COST_KIND);
    conn.execute(
        UPSERT_SQL,
        params![
            p.facility_id,
            p.year,
            p.amount,
            kind,
            p.source,
            p.verified,
            p.notes,
            p.effective_from,
            now
        ],
    )
    .with_context(|| format!("upsert price {}/{}", p.facility_id, p.year))?;
    Ok(())
}

/// All-or-nothing bulk upsert.
pub fn upsert_many(conn: &mut Connection, rows: &[PriceUpsert], now: &str) -> anyhow::Result<usize> {
    let tx = conn.transaction().context("begin tx")?;
    for p in rows {
        upsert(&tx, p, now)?;
    }
    tx.commit().context("commit prices")?;
    Ok(rows.len())
}

/// Price history of one facility, oldest year first.
pub fn for_facility(conn: &Connection, facility_id: i64) -> anyhow::Result<Vec<PriceEntry>> {
    let sql = format!(
        "SELECT {COLUMNS} FROM prices WHERE facility_id = ? ORDER BY year ASC, cost_kind ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![facility_id], map_row)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

pub fn all(conn: &Connection) -> anyhow::Result<Vec<PriceEntry>> {
    let sql = format!("SELECT {COLUMNS} FROM prices ORDER BY facility_id ASC, year ASC, cost_kind ASC");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], map_row)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

/// Removes every cost kind recorded for that facility and year.
pub fn delete(conn: &Connection, facility_id: i64, year: i32) -> anyhow::Result<usize> {
    let n = conn.execute(
        "DELETE FROM prices WHERE facility_id = ? AND year = ?",
        params![facility_id, year],
    )?;
    Ok(n)
}

#[cfg(test)]
pub(crate) fn price(facility_id: i64, year: i32, amount: f64) -> PriceUpsert {
    PriceUpsert {
        facility_id,
        year,
        amount,
        cost_kind: None,
        source: None,
        verified: false,
        notes: None,
        effective_from: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    #[test]
    fn test_upsert_overwrites_same_year() {
        let conn = open_in_memory().unwrap();
        upsert(&conn, &price(1, 2024, 4000.0), "2025-01-01 00:00:00").unwrap();
        let mut again = price(1, 2024, 4100.0);
        again.verified = true;
        upsert(&conn, &again, "2025-01-02 00:00:00").unwrap();
        upsert(&conn, &price(1, 2025, 4500.0), "2025-01-02 00:00:00").unwrap();

        let history = for_facility(&conn, 1).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].amount, 4100.0);
        assert!(history[0].verified);
        assert_eq!(history[0].cost_kind, "podstawowy");
        assert_eq!(history[0].fetched_at, "2025-01-02T00:00:00Z");
        assert_eq!(history[1].year, 2025);
    }

    #[test]
    fn test_upsert_many_and_delete() {
        let mut conn = open_in_memory().unwrap();
        let rows = vec![price(1, 2024, 1.0), price(2, 2024, 2.0), price(2, 2025, 3.0)];
        assert_eq!(upsert_many(&mut conn, &rows, "2025-01-01 00:00:00").unwrap(), 3);
        assert_eq!(all(&conn).unwrap().len(), 3);

        assert_eq!(delete(&conn, 2, 2024).unwrap(), 1);
        assert_eq!(delete(&conn, 2, 2024).unwrap(), 0);
        assert_eq!(for_facility(&conn, 2).unwrap().len(), 1);
    }
}
