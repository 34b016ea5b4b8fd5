use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::model::{Facility, FacilityType};
use crate::text::normalize_polish;

const CANDIDATES: usize = 10;
const SHOWN: usize = 3;

#[derive(Debug, Clone, Deserialize)]
pub struct RecommendationRequest {
    /// Advisor outcome: `ŚDS` for day care, anything else means DPS.
    pub recommendation: String,
    pub location: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Recommendations {
    pub facilities: Vec<Facility>,
    pub total: usize,
    pub is_exact_match: bool,
}

fn cheapest_first(a: &&Facility, b: &&Facility) -> Ordering {
    match (a.monthly_cost, b.monthly_cost) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then(a.id.cmp(&b.id))
}

/// Up to three facilities of the recommended type, widening from the
/// locality to its district and finally to every facility of that type.
pub fn recommend(req: &RecommendationRequest, facilities: &[Facility]) -> Recommendations {
    let kind = match FacilityType::parse(&req.recommendation) {
        Some(FacilityType::Sds) => FacilityType::Sds,
        _ => FacilityType::Dps,
    };
    let location = normalize_polish(&req.location);
    let of_kind: Vec<&Facility> = facilities.iter().filter(|f| f.facility_type == kind).collect();

    let in_locality = |f: &&Facility| normalize_polish(&f.locality).contains(&location);
    let in_district = |f: &&Facility| normalize_polish(&f.district).contains(&location);

    let mut pool: Vec<&Facility> = of_kind.iter().copied().filter(in_locality).collect();
    if pool.is_empty() {
        pool = of_kind.iter().copied().filter(in_district).collect();
    }
    if pool.is_empty() {
        pool = of_kind;
    }
    pool.sort_by(cheapest_first);
    pool.truncate(CANDIDATES);

    Recommendations {
        is_exact_match: pool.first().is_some_and(in_locality),
        total: pool.len(),
        facilities: pool.into_iter().take(SHOWN).cloned().collect(),
    }
}
