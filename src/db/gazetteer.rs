use anyhow::Context;
use duckdb::{Connection, params};

use crate::model::{Locality, LocalityKind};
use crate::text::normalize_polish;

#[derive(Debug, Clone)]
pub struct NewLocality {
    pub name: String,
    pub kind: LocalityKind,
    pub municipality: Option<String>,
    pub district: String,
    pub region: String,
}

/// Replaces the whole gazetteer in one transaction.
pub fn replace_all(conn: &mut Connection, rows: &[NewLocality]) -> anyhow::Result<usize> {
    let tx = conn.transaction().context("begin tx")?;
    tx.execute("DELETE FROM localities", params![])?;
    {
        let mut ins = tx.prepare(
            r#"
            INSERT INTO localities (name, normalized_name, kind, municipality, district, region)
            VALUES (?, ?, ?, ?, ?, ?)
        "#,
        )?;
        for r in rows {
            ins.execute(params![
                r.name,
                normalize_polish(&r.name),
                r.kind.as_str(),
                r.municipality,
                r.district,
                r.region
            ])?;
        }
    }
    tx.commit().context("commit localities")?;
    Ok(rows.len())
}

/// Every locality whose normalized name contains `normalized_query`.
pub fn matching(conn: &Connection, normalized_query: &str) -> anyhow::Result<Vec<Locality>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, name, normalized_name, kind, municipality, district, region
        FROM localities
        WHERE contains(normalized_name, ?)
        ORDER BY name ASC, district ASC, id ASC
    "#,
    )?;
    let rows = stmt.query_map(params![normalized_query], |row| {
        let kind: String = row.get(3)?;
        Ok(Locality {
            id: row.get(0)?,
            name: row.get(1)?,
            normalized_name: row.get(2)?,
            kind: LocalityKind::parse(&kind),
            municipality: row.get(4)?,
            district: row.get(5)?,
            region: row.get(6)?,
        })
    })?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

/// Regions (normalized) that have at least one gazetteer row.
pub fn covered_regions(conn: &Connection) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT DISTINCT region FROM localities ORDER BY region")?;
    let rows = stmt.query_map([], |row| row.get::<usize, String>(0))?;
    let mut out = Vec::new();
    for r in rows {
        let region = normalize_polish(&r?);
        if !out.contains(&region) {
            out.push(region);
        }
    }
    Ok(out)
}


#[cfg(test)]
mod tests {
    use super::fixtures::loc;
    use super::*;
    use crate::db::open_in_memory;

    #[test]
    fn test_replace_and_match() {
        let mut conn = open_in_memory().unwrap();
        let rows = vec![
            loc("Kraków", LocalityKind::City, "Kraków"),
            loc("Krakówka", LocalityKind::Village, "myślenicki"),
            loc("Tarnów", LocalityKind::City, "Tarnów"),
        ];
        assert_eq!(replace_all(&mut conn, &rows).unwrap(), 3);

        let hits = matching(&conn, "krakow").unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].name, "Kraków");
        assert_eq!(hits[0].kind, LocalityKind::City);
        assert_eq!(hits[1].normalized_name, "krakowka");

        // Loading again replaces rather than appends.
        replace_all(&mut conn, &rows[..1]).unwrap();
        assert_eq!(matching(&conn, "krakow").unwrap().len(), 1);
        assert_eq!(covered_regions(&conn).unwrap(), vec!["malopolskie"]);
    }
}
