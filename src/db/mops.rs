use anyhow::Context;
use duckdb::{Connection, Row, params};
use serde::Serialize;

use crate::text::normalize_polish;

/// A municipal social-welfare office (MOPS) as loaded by `import --mops-csv`.
#[derive(Debug, Clone, Default)]
pub struct NewMopsContact {
    pub city_display: String,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub website: Option<String>,
    pub region: Option<String>,
    pub verified: bool,
    pub last_verified: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MopsContact {
    pub id: i64,
    /// Lookup key: lowercased display name, Polish letters kept.
    pub city: String,
    pub city_display: String,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub website: Option<String>,
    pub region: Option<String>,
    pub verified: bool,
    pub last_verified: Option<String>,
    pub notes: Option<String>,
}

pub fn city_key(city: &str) -> String {
    city.trim().to_lowercase()
}

const COLUMNS: &str = "id, city, city_display, name, phone, email, address, website, region, \
     verified, last_verified, notes";

fn map_row(row: &Row<'_>) -> duckdb::Result<MopsContact> {
    Ok(MopsContact {
        id: row.get(0)?,
        city: row.get(1)?,
        city_display: row.get(2)?,
        name: row.get(3)?,
        phone: row.get(4)?,
        email: row.get(5)?,
        address: row.get(6)?,
        website: row.get(7)?,
        region: row.get(8)?,
        verified: row.get(9)?,
        last_verified: row.get(10)?,
        notes: row.get(11)?,
    })
}

/// Inserts or refreshes contacts keyed by city, in one transaction.
pub fn upsert_many(conn: &mut Connection, rows: &[NewMopsContact], now: &str) -> anyhow::Result<usize> {
    let tx = conn.transaction().context("begin tx")?;
    for m in rows {
        tx.execute(
            r#"
            INSERT INTO mops_contacts
              (city, city_display, name, phone, email, address, website, region,
               verified, last_verified, notes, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CAST(? AS TIMESTAMP))
            ON CONFLICT (city) DO UPDATE SET
              city_display = EXCLUDED.city_display,
              name = EXCLUDED.name,
              phone = EXCLUDED.phone,
              email = EXCLUDED.email,
              address = EXCLUDED.address,
              website = EXCLUDED.website,
              region = EXCLUDED.region,
              verified = EXCLUDED.verified,
              last_verified = EXCLUDED.last_verified,
              notes = EXCLUDED.notes,
              updated_at = EXCLUDED.updated_at
        "#,
            params![
                city_key(&m.city_display),
                m.city_display.trim(),
                m.name,
                m.phone,
                m.email,
                m.address,
                m.website,
                m.region,
                m.verified,
                m.last_verified,
                m.notes,
                now
            ],
        )
        .with_context(|| format!("upsert MOPS contact for {}", m.city_display))?;
    }
    tx.commit().context("commit MOPS contacts")?;
    Ok(rows.len())
}

pub fn list_all(conn: &Connection) -> anyhow::Result<Vec<MopsContact>> {
    let sql = format!("SELECT {COLUMNS} FROM mops_contacts ORDER BY city_display ASC");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], map_row)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

/// Exact key first; "krakow" still finds "kraków".
pub fn find_by_city(conn: &Connection, city: &str) -> anyhow::Result<Option<MopsContact>> {
    let key = city_key(city);
    let folded = normalize_polish(&key);
    let all = list_all(conn)?;
    let exact = all.iter().position(|m| m.city == key);
    let found = exact.or_else(|| all.iter().position(|m| normalize_polish(&m.city) == folded));
    Ok(found.map(|i| all[i].clone()))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn contact(city: &str, name: &str) -> NewMopsContact {
        NewMopsContact {
            city_display: city.to_string(),
            name: name.to_string(),
            region: Some("małopolskie".to_string()),
            verified: true,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::contact;
    use super::*;
    use crate::db::open_in_memory;

    #[test]
    fn test_upsert_refreshes_by_city() {
        let mut conn = open_in_memory().unwrap();
        let rows = vec![
            contact("Wieliczka", "MOPS w Wieliczce"),
            contact("Kraków", "MOPS w Krakowie"),
        ];
        upsert_many(&mut conn, &rows, "2025-11-10 10:00:00").unwrap();

        let mut renamed = contact("KRAKÓW ", "Miejski Ośrodek Pomocy Społecznej w Krakowie");
        renamed.phone = Some("12 616 66 00".to_string());
        upsert_many(&mut conn, &[renamed], "2025-11-11 10:00:00").unwrap();

        let all = list_all(&conn).unwrap();
        let cities: Vec<&str> = all.iter().map(|m| m.city.as_str()).collect();
        assert_eq!(cities, vec!["kraków", "wieliczka"]);
        assert_eq!(all[0].name, "Miejski Ośrodek Pomocy Społecznej w Krakowie");
        assert_eq!(all[0].phone.as_deref(), Some("12 616 66 00"));
    }

    #[test]
    fn test_find_by_city() {
        let mut conn = open_in_memory().unwrap();
        upsert_many(&mut conn, &[contact("Kraków", "MOPS w Krakowie")], "2025-11-10 10:00:00").unwrap();

        assert_eq!(find_by_city(&conn, " Kraków").unwrap().map(|m| m.id), Some(1));
        assert!(find_by_city(&conn, "krakow").unwrap().is_some());
        assert!(find_by_city(&conn, "Tarnów").unwrap().is_none());
    }
}
