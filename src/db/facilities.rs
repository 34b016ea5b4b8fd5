use anyhow::Context;
use duckdb::{Connection, OptionalExt, Row, params};

use crate::model::{Facility, FacilityInput, FacilityType};
use crate::text::{format_phone, non_empty, normalize_facility_name, normalize_polish};

const COLUMNS: &str = r#"
  id, name, facility_type, operator, street, locality, postal_code, municipality,
  district, region, phone, email, website, latitude, longitude, capacity,
  care_profile, monthly_cost, source_url, price_source, data_source_date,
  price_source_date, verified_at, notes, verified,
  strftime(created_at, '%Y-%m-%dT%H:%M:%SZ'),
  strftime(updated_at, '%Y-%m-%dT%H:%M:%SZ')
"#;

fn map_row(row: &Row<'_>) -> duckdb::Result<Facility> {
    let kind: String = row.get(2)?;
    Ok(Facility {
        id: row.get(0)?,
        name: row.get(1)?,
        // Rows only ever get written through `FacilityInput::validate`.
        facility_type: FacilityType::parse(&kind).unwrap_or(FacilityType::Dps),
        operator: row.get(3)?,
        street: row.get(4)?,
        locality: row.get(5)?,
        postal_code: row.get(6)?,
        municipality: row.get(7)?,
        district: row.get(8)?,
        region: row.get(9)?,
        phone: row.get(10)?,
        email: row.get(11)?,
        website: row.get(12)?,
        latitude: row.get(13)?,
        longitude: row.get(14)?,
        capacity: row.get(15)?,
        care_profile: row.get(16)?,
        monthly_cost: row.get(17)?,
        source_url: row.get(18)?,
        price_source: row.get(19)?,
        data_source_date: row.get(20)?,
        price_source_date: row.get(21)?,
        verified_at: row.get(22)?,
        notes: row.get(23)?,
        verified: row.get(24)?,
        created_at: row.get(25)?,
        updated_at: row.get(26)?,
    })
}

pub fn list_all(conn: &Connection) -> anyhow::Result<Vec<Facility>> {
    let sql = format!("SELECT {COLUMNS} FROM facilities ORDER BY name ASC, id ASC");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], map_row)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

pub fn get(conn: &Connection, id: i64) -> anyhow::Result<Option<Facility>> {
    let sql = format!("SELECT {COLUMNS} FROM facilities WHERE id = ?");
    let mut stmt = conn.prepare(&sql)?;
    Ok(stmt.query_row(params![id], map_row).optional()?)
}

pub fn get_many(conn: &Connection, ids: &[i64]) -> anyhow::Result<Vec<Facility>> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(f) = get(conn, *id)? {
            out.push(f);
        }
    }
    Ok(out)
}

/// Trims text fields, drops empty ones and formats the phone number.
fn clean(input: &FacilityInput) -> FacilityInput {
    let mut c = input.clone();
    c.name = input.name.trim().to_string();
    c.locality = input.locality.trim().to_string();
    c.district = input.district.trim().to_string();
    c.region = input.region.trim().to_string();
    c.operator = non_empty(c.operator);
    c.street = non_empty(c.street);
    c.postal_code = non_empty(c.postal_code);
    c.municipality = non_empty(c.municipality);
    c.phone = non_empty(c.phone).map(|p| format_phone(&p));
    c.email = non_empty(c.email);
    c.website = non_empty(c.website);
    c.care_profile = non_empty(c.care_profile).map(|p| p.to_uppercase());
    c.source_url = non_empty(c.source_url);
    c.price_source = non_empty(c.price_source);
    c.data_source_date = non_empty(c.data_source_date);
    c.price_source_date = non_empty(c.price_source_date);
    c.notes = non_empty(c.notes);
    c
}

fn type_label(input: &FacilityInput) -> &'static str {
    FacilityType::parse(&input.facility_type)
        .unwrap_or(FacilityType::Dps)
        .as_str()
}

pub fn insert(conn: &Connection, input: &FacilityInput, now: &str) -> anyhow::Result<i64> {
    let c = clean(input);
    let verified_at = c.verified.then(|| now.to_string());
    let id: i64 = conn
        .query_row(
            r#"
            INSERT INTO facilities (
              name, normalized_name, facility_type, operator, street, locality, postal_code,
              municipality, district, region, phone, email, website, latitude, longitude,
              capacity, care_profile, monthly_cost, source_url, price_source, data_source_date,
              price_source_date, verified_at, notes, verified, created_at, updated_at
            ) VALUES (
              ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
              CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP)
            )
            RETURNING id
        "#,
            params![
                c.name,
                normalize_facility_name(&c.name),
                type_label(&c),
                c.operator,
                c.street,
                c.locality,
                c.postal_code,
                c.municipality,
                c.district,
                c.region,
                c.phone,
                c.email,
                c.website,
                c.latitude,
                c.longitude,
                c.capacity,
                c.care_profile,
                c.monthly_cost,
                c.source_url,
                c.price_source,
                c.data_source_date,
                c.price_source_date,
                verified_at,
                c.notes,
                c.verified,
                now,
                now
            ],
            |row| row.get(0),
        )
        .context("insert facility")?;
    Ok(id)
}

/// Returns false when no facility has this id.
pub fn update(conn: &Connection, id: i64, input: &FacilityInput, now: &str) -> anyhow::Result<bool> {
    let c = clean(input);
    let verified_at = c.verified.then(|| now.to_string());
    let changed = conn
        .execute(
            r#"
            UPDATE facilities SET
              name = ?, normalized_name = ?, facility_type = ?, operator = ?, street = ?,
              locality = ?, postal_code = ?, municipality = ?, district = ?, region = ?,
              phone = ?, email = ?, website = ?, latitude = ?, longitude = ?, capacity = ?,
              care_profile = ?, monthly_cost = ?, source_url = ?, price_source = ?,
              data_source_date = ?, price_source_date = ?,
              verified_at = CASE WHEN ? THEN COALESCE(verified_at, ?) ELSE NULL END,
              notes = ?, verified = ?, updated_at = CAST(? AS TIMESTAMP)
            WHERE id = ?
        "#,
            params![
                c.name,
                normalize_facility_name(&c.name),
                type_label(&c),
                c.operator,
                c.street,
                c.locality,
                c.postal_code,
                c.municipality,
                c.district,
                c.region,
                c.phone,
                c.email,
                c.website,
                c.latitude,
                c.longitude,
                c.capacity,
                c.care_profile,
                c.monthly_cost,
                c.source_url,
                c.price_source,
                c.data_source_date,
                c.price_source_date,
                c.verified,
                verified_at,
                c.notes,
                c.verified,
                now,
                id
            ],
        )
        .with_context(|| format!("update facility {id}"))?;
    Ok(changed > 0)
}

/// Deletes the facility together with its prices and events.
pub fn delete(conn: &mut Connection, id: i64) -> anyhow::Result<bool> {
    let tx = conn.transaction().context("begin tx")?;
    tx.execute("DELETE FROM prices WHERE facility_id = ?", params![id])?;
    tx.execute("DELETE FROM facility_events WHERE facility_id = ?", params![id])?;
    let removed = tx.execute("DELETE FROM facilities WHERE id = ?", params![id])?;
    tx.commit().context("commit facility delete")?;
    Ok(removed > 0)
}

/// Facilities with the same name and locality, compared after normalization.
pub fn find_same_name_and_locality(
    facilities: &[Facility],
    name: &str,
    locality: &str,
) -> Option<Facility> {
    let name = normalize_polish(name);
    let locality = normalize_polish(locality);
    facilities
        .iter()
        .find(|f| {
            normalize_polish(&f.name) == name
                && normalize_polish(&f.locality) == locality
        })
        .cloned()
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct NamedCount {
    pub name: String,
    pub count: i64,
}

pub fn counts_by_region(conn: &Connection) -> anyhow::Result<Vec<NamedCount>> {
    grouped_counts(conn, "region")
}

pub fn counts_by_locality(conn: &Connection) -> anyhow::Result<Vec<NamedCount>> {
    grouped_counts(conn, "locality")
}

fn grouped_counts(conn: &Connection, col: &str) -> anyhow::Result<Vec<NamedCount>> {
    let sql = format!(
        "SELECT {col}, COUNT(*)::BIGINT AS n FROM facilities GROUP BY {col} ORDER BY n DESC, {col} ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| {
        Ok(NamedCount {
            name: row.get(0)?,
            count: row.get(1)?,
        })
    })?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}
