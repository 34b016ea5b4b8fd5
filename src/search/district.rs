use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{Facility, Locality, LocalityKind};
use crate::text::normalize_polish;

/// Outcome of mapping a locality query onto a district.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Resolution {
    /// The gazetteer recognised the query; `locality` is the record that won.
    District {
        district: String,
        locality: Locality,
        facility_count: usize,
    },
    /// Nothing in the gazetteer; fall back to matching facility text fields.
    TextMatch,
}

/// Two district names refer to the same district when either normalized
/// form contains the other ("m. Kraków" vs "Kraków").
pub fn same_district(a: &str, b: &str) -> bool {
    let a = normalize_polish(a);
    let b = normalize_polish(b);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.contains(&b) || b.contains(&a)
}

pub fn facilities_in<'a>(district: &str, facilities: &'a [Facility]) -> impl Iterator<Item = &'a Facility> {
    let district = district.to_string();
    facilities
        .iter()
        .filter(move |f| same_district(&f.district, &district))
}

/// Resolves `query` against gazetteer `candidates`.
///
/// `candidates` must already be limited to the requested region; they may be
/// any superset of the localities whose normalized name contains the query.
/// `facilities` is the pool used to check that a district is populated.
pub fn resolve(query: &str, candidates: &[Locality], facilities: &[Facility]) -> Resolution {
    let q = normalize_polish(query);
    if q.is_empty() {
        return Resolution::TextMatch;
    }

    let exact: Vec<&Locality> = candidates.iter().filter(|l| l.normalized_name == q).collect();
    let pool: Vec<&Locality> = if exact.is_empty() {
        candidates
            .iter()
            .filter(|l| l.normalized_name.contains(&q))
            .collect()
    } else {
        exact.clone()
    };
    if pool.is_empty() {
        return Resolution::TextMatch;
    }

    let city = exact
        .iter()
        .filter(|l| l.kind == LocalityKind::City)
        .min_by(|a, b| a.district.cmp(&b.district).then(a.id.cmp(&b.id)));
    let primary = match city {
        Some(city) => *city,
        None => most_frequent(&pool, |_| true).unwrap_or(pool[0]),
    };

    let primary_count = facilities_in(&primary.district, facilities).count();
    if primary_count > 0 {
        return district_resolution(primary, primary_count);
    }

    let secondary: Vec<&Locality> = candidates
        .iter()
        .filter(|l| l.kind != LocalityKind::City && l.normalized_name.contains(&q))
        .collect();
    let populated = |l: &Locality| facilities_in(&l.district, facilities).next().is_some();
    if let Some(found) = most_frequent(&secondary, populated) {
        let count = facilities_in(&found.district, facilities).count();
        return district_resolution(found, count);
    }

    district_resolution(primary, 0)
}

fn district_resolution(locality: &Locality, facility_count: usize) -> Resolution {
    Resolution::District {
        district: locality.district.clone(),
        locality: locality.clone(),
        facility_count,
    }
}

/// Picks the district named by the most pool entries among those accepted by
/// `keep`. Ties go to the alphabetically first district. Returns the first
/// pool entry of the winning district so the caller keeps a concrete locality.
fn most_frequent<'a>(
    pool: &[&'a Locality],
    keep: impl Fn(&Locality) -> bool,
) -> Option<&'a Locality> {
    let mut tally: BTreeMap<&str, (usize, &'a Locality)> = BTreeMap::new();
    for l in pool.iter().copied().filter(|l| keep(l)) {
        tally
            .entry(l.district.as_str())
            .and_modify(|(n, _)| *n += 1)
            .or_insert((1, l));
    }
    // BTreeMap iterates in district order, so `max_by` on count alone would
    // prefer the last district on ties; compare reversed names instead.
    tally
        .into_iter()
        .max_by(|(da, (na, _)), (db, (nb, _))| na.cmp(nb).then(db.cmp(da)))
        .map(|(_, (_, l))| l)
}
