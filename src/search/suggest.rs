use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{Facility, FacilityType, Locality};
use crate::search::district::same_district;
use crate::text::normalize_polish;

const GAZETTEER_CANDIDATES: usize = 20;
const TOP: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub name: String,
    pub district: String,
    pub region: String,
    pub facility_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuggestResponse {
    pub suggestions: Vec<Suggestion>,
    pub total_count: usize,
    pub show_all: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SuggestResponse {
    fn empty(message: &str) -> Self {
        Self {
            suggestions: Vec::new(),
            total_count: 0,
            show_all: false,
            message: Some(message.to_string()),
        }
    }

    fn from_ranked(ranked: Vec<Suggestion>) -> Self {
        let total_count = ranked.len();
        Self {
            suggestions: ranked.into_iter().take(TOP).collect(),
            total_count,
            show_all: total_count > TOP,
            message: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SuggestQuery {
    pub q: String,
    pub region: Option<String>,
    pub district: Option<String>,
    pub facility_type: Option<FacilityType>,
}

/// Locality autocomplete.
///
/// Regions with gazetteer coverage rank gazetteer localities by how many
/// facilities their district holds; other regions group facilities by
/// their own locality field.
pub fn suggest(
    query: &SuggestQuery,
    gazetteer: &[Locality],
    covered_regions: &[String],
    facilities: &[Facility],
) -> SuggestResponse {
    if query.q.trim().chars().count() < 2 {
        return SuggestResponse::empty("Wpisz co najmniej 2 znaki");
    }
    let q = normalize_polish(&query.q);
    let region = query
        .region
        .as_deref()
        .map(normalize_polish)
        .filter(|r| !r.is_empty());

    let covered = match &region {
        Some(r) => covered_regions.contains(r),
        None => !covered_regions.is_empty(),
    };
    if covered {
        from_gazetteer(query, &q, region.as_deref(), gazetteer, facilities)
    } else {
        from_facilities(query, &q, region.as_deref(), facilities)
    }
}

fn type_ok(query: &SuggestQuery, f: &Facility) -> bool {
    query.facility_type.is_none_or(|t| t == f.facility_type)
}

fn from_gazetteer(
    query: &SuggestQuery,
    q: &str,
    region: Option<&str>,
    gazetteer: &[Locality],
    facilities: &[Facility],
) -> SuggestResponse {
    // Distinct (name, district), alphabetical, capped.
    let mut distinct: BTreeMap<(String, String), &Locality> = BTreeMap::new();
    for l in gazetteer.iter().filter(|l| {
        l.normalized_name.contains(q)
            && region.is_none_or(|r| normalize_polish(&l.region) == r)
            && query
                .district
                .as_deref()
                .is_none_or(|d| normalize_polish(&l.district) == normalize_polish(d))
    }) {
        distinct
            .entry((l.name.clone(), l.district.clone()))
            .or_insert(l);
    }
    if distinct.is_empty() {
        return SuggestResponse::empty("Nie znaleziono takiej miejscowości");
    }

    let mut ranked: Vec<(bool, Suggestion)> = distinct
        .into_values()
        .take(GAZETTEER_CANDIDATES)
        .map(|l| {
            let facility_count = facilities
                .iter()
                .filter(|f| type_ok(query, f) && same_district(&f.district, &l.district))
                .count();
            (
                l.normalized_name == q,
                Suggestion {
                    name: l.name.clone(),
                    district: l.district.clone(),
                    region: l.region.clone(),
                    facility_count,
                },
            )
        })
        .filter(|(_, s)| s.facility_count > 0)
        .collect();
    // Stable sort keeps the alphabetical order among equals.
    ranked.sort_by(|(ea, a), (eb, b)| eb.cmp(ea).then(b.facility_count.cmp(&a.facility_count)));

    SuggestResponse::from_ranked(ranked.into_iter().map(|(_, s)| s).collect())
}

fn from_facilities(
    query: &SuggestQuery,
    q: &str,
    region: Option<&str>,
    facilities: &[Facility],
) -> SuggestResponse {
    let mut groups: BTreeMap<&str, Suggestion> = BTreeMap::new();
    for f in facilities.iter().filter(|f| {
        type_ok(query, f)
            && region.is_none_or(|r| normalize_polish(&f.region) == r)
            && normalize_polish(&f.locality).contains(q)
    }) {
        groups
            .entry(f.locality.as_str())
            .or_insert_with(|| Suggestion {
                name: f.locality.clone(),
                district: f.district.clone(),
                region: f.region.clone(),
                facility_count: 0,
            })
            .facility_count += 1;
    }
    let mut ranked: Vec<Suggestion> = groups.into_values().collect();
    ranked.sort_by(|a, b| b.facility_count.cmp(&a.facility_count));
    SuggestResponse::from_ranked(ranked)
}
