pub mod district;
pub mod score;
pub mod suggest;

use std::cmp::Ordering;

use serde::Serialize;

use crate::care::{self, CareProfile};
use crate::geo::{format_distance, haversine_km};
use crate::model::{Facility, FacilityType, Locality};
use crate::text::normalize_polish;

use district::{Resolution, same_district};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Sort {
    /// Match score when a query is present, name otherwise.
    #[default]
    Default,
    NameAsc,
    NameDesc,
    PriceAsc,
    PriceDesc,
    Distance,
}

pub fn parse_sort(s: Option<&str>) -> Sort {
    match s.unwrap_or("default").to_ascii_lowercase().as_str() {
        "name_asc" => Sort::NameAsc,
        "name_desc" => Sort::NameDesc,
        "price_asc" => Sort::PriceAsc,
        "price_desc" => Sort::PriceDesc,
        "distance" => Sort::Distance,
        _ => Sort::Default,
    }
}

/// `None` means both facility types.
pub fn parse_type_filter(s: Option<&str>) -> Option<FacilityType> {
    s.and_then(FacilityType::parse)
}

#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub region: Option<String>,
    pub district: Option<String>,
    pub facility_type: Option<FacilityType>,
    pub care: Vec<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub free_only: bool,
    pub origin: Option<(f64, f64)>,
    pub sort: Sort,
}

impl SearchQuery {
    fn text(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub facility: Facility,
    pub distance_km: Option<f64>,
    pub distance_label: Option<String>,
    pub match_score: Option<i32>,
    pub care_labels: Vec<CareProfile>,
    #[serde(skip)]
    sort_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocalitySuggestion {
    pub found: bool,
    pub name: String,
    pub kind: String,
    pub district: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeMode {
    All,
    ExplicitDistrict,
    District,
    TextMatch,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub results: Vec<SearchHit>,
    pub total: usize,
    pub mode: ScopeMode,
    pub districts: Vec<String>,
    pub message: String,
    pub locality_suggestion: Option<LocalitySuggestion>,
    pub query: Option<String>,
}

const NO_RESULTS_NEARBY: &str =
    "Nie znaleziono placówek w tej lokalizacji. Spróbuj wyszukać w sąsiednich miejscowościach lub powiatach.";

fn in_region(region_filter: Option<&str>, region: &str) -> bool {
    match region_filter {
        Some(want) => normalize_polish(want) == normalize_polish(region),
        None => true,
    }
}

/// Runs the whole search pipeline over an in-memory snapshot.
///
/// `gazetteer` must contain at least every locality whose normalized name
/// contains the normalized query; extra rows are harmless.
pub fn run(query: &SearchQuery, facilities: &[Facility], gazetteer: &[Locality]) -> SearchOutcome {
    let region = query.region.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let regional: Vec<Facility> = facilities
        .iter()
        .filter(|f| in_region(region, &f.region))
        .cloned()
        .collect();

    let mut resolved: Option<Locality> = None;
    let explicit = query.district.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let (mode, districts, scoped): (ScopeMode, Vec<String>, Vec<&Facility>) =
        if let Some(d) = explicit {
            let scoped = regional.iter().filter(|f| same_district(&f.district, d)).collect();
            (ScopeMode::ExplicitDistrict, vec![d.to_string()], scoped)
        } else if let Some(q) = query.text() {
            let candidates: Vec<Locality> = gazetteer
                .iter()
                .filter(|l| in_region(region, &l.region))
                .cloned()
                .collect();
            match district::resolve(q, &candidates, &regional) {
                Resolution::District {
                    district, locality, ..
                } => {
                    let scoped = regional
                        .iter()
                        .filter(|f| same_district(&f.district, &district))
                        .collect();
                    resolved = Some(locality);
                    (ScopeMode::District, vec![district], scoped)
                }
                Resolution::TextMatch => {
                    let nq = normalize_polish(q);
                    let scoped = regional.iter().filter(|f| text_matches(f, &nq)).collect();
                    (ScopeMode::TextMatch, Vec::new(), scoped)
                }
            }
        } else {
            (ScopeMode::All, Vec::new(), regional.iter().collect())
        };

    let mut results: Vec<SearchHit> = scoped
        .into_iter()
        .filter(|f| passes_filters(query, f))
        .map(|f| to_hit(query, f))
        .collect();
    sort_hits(&mut results, query.sort, query.text().is_some());

    let total = results.len();
    let locality_suggestion = match (&resolved, total) {
        (Some(l), 0) => Some(LocalitySuggestion {
            found: true,
            name: l.name.clone(),
            kind: l.kind.as_str().to_string(),
            district: l.district.clone(),
            message: NO_RESULTS_NEARBY.to_string(),
        }),
        _ => None,
    };
    let message = match (total, districts.first(), &locality_suggestion) {
        (0, _, Some(_)) => NO_RESULTS_NEARBY.to_string(),
        (0, _, None) => "Nie znaleziono placówek".to_string(),
        (n, Some(d), _) => format!("Znaleziono {n} placówek w powiecie {d}"),
        (n, None, _) => format!("Znaleziono {n} placówek"),
    };

    tracing::debug!(
        q = query.text().unwrap_or(""),
        ?mode,
        total,
        "search finished"
    );

    SearchOutcome {
        results,
        total,
        mode,
        districts,
        message,
        locality_suggestion,
        query: query.text().map(str::to_string),
    }
}

fn text_matches(f: &Facility, nq: &str) -> bool {
    normalize_polish(&f.locality).contains(nq)
        || f.municipality
            .as_deref()
            .is_some_and(|m| normalize_polish(m).contains(nq))
        || normalize_polish(&f.district).contains(nq)
        || normalize_polish(&f.name).contains(nq)
}

/// Post-scope filters. Each one can only remove facilities.
pub fn passes_filters(query: &SearchQuery, f: &Facility) -> bool {
    if let Some(kind) = query.facility_type
        && f.facility_type != kind
    {
        return false;
    }
    if query.free_only {
        if !f.is_free() {
            return false;
        }
    } else if query.min_price.is_some() || query.max_price.is_some() {
        let Some(cost) = f.monthly_cost else {
            return false;
        };
        if query.min_price.is_some_and(|min| cost < min) {
            return false;
        }
        if query.max_price.is_some_and(|max| cost > max) {
            return false;
        }
    }
    care::shares_any(f.care_profile.as_deref(), &query.care)
}

fn to_hit(query: &SearchQuery, f: &Facility) -> SearchHit {
    let distance_km = match (query.origin, f.coordinates()) {
        (Some((lat, lon)), Some((flat, flon))) => Some(haversine_km(lat, lon, flat, flon)),
        _ => None,
    };
    SearchHit {
        facility: f.clone(),
        distance_km,
        distance_label: distance_km.map(format_distance),
        match_score: query.text().map(|q| score::match_score(q, f)),
        care_labels: care::labels(f.facility_type, f.care_profile.as_deref()),
        sort_name: normalize_polish(&f.name),
    }
}

fn by_name(a: &SearchHit, b: &SearchHit) -> Ordering {
    a.sort_name
        .cmp(&b.sort_name)
        .then_with(|| a.facility.name.cmp(&b.facility.name))
        .then_with(|| a.facility.id.cmp(&b.facility.id))
}

/// `Some` values in the requested direction, `None` always last.
fn nulls_last(a: Option<f64>, b: Option<f64>, descending: bool) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) if descending => y.total_cmp(&x),
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn known_price(h: &SearchHit) -> Option<f64> {
    h.facility.monthly_cost.filter(|c| *c > 0.0)
}

pub fn sort_hits(hits: &mut [SearchHit], sort: Sort, has_query: bool) {
    match sort {
        Sort::Default if has_query => hits.sort_by(|a, b| {
            b.match_score
                .cmp(&a.match_score)
                .then_with(|| by_name(a, b))
        }),
        Sort::Default | Sort::NameAsc => hits.sort_by(by_name),
        Sort::NameDesc => hits.sort_by(|a, b| {
            b.sort_name
                .cmp(&a.sort_name)
                .then_with(|| b.facility.name.cmp(&a.facility.name))
                .then_with(|| a.facility.id.cmp(&b.facility.id))
        }),
        Sort::PriceAsc => hits.sort_by(|a, b| {
            nulls_last(known_price(a), known_price(b), false).then_with(|| by_name(a, b))
        }),
        Sort::PriceDesc => hits.sort_by(|a, b| {
            nulls_last(known_price(a), known_price(b), true).then_with(|| by_name(a, b))
        }),
        Sort::Distance => hits.sort_by(|a, b| {
            nulls_last(a.distance_km, b.distance_km, false).then_with(|| by_name(a, b))
        }),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::LocalityKind;

    pub(crate) fn facility(id: i64, name: &str, locality: &str, district: &str) -> Facility {
        Facility {
            id,
            name: name.to_string(),
            facility_type: FacilityType::Dps,
            operator: None,
            street: None,
            locality: locality.to_string(),
            postal_code: None,
            municipality: None,
            district: district.to_string(),
            region: "małopolskie".to_string(),
            phone: None,
            email: None,
            website: None,
            latitude: None,
            longitude: None,
            capacity: None,
            care_profile: None,
            monthly_cost: None,
            source_url: None,
            price_source: None,
            data_source_date: None,
            price_source_date: None,
            verified_at: None,
            notes: None,
            verified: false,
            created_at: "2025-01-01T00:00:00Z".to_string(),
            updated_at: "2025-01-01T00:00:00Z".to_string(),
        }
    }

    pub(crate) fn locality(id: i64, name: &str, kind: LocalityKind, district: &str) -> Locality {
        Locality {
            id,
            name: name.to_string(),
            normalized_name: normalize_polish(name),
            kind,
            municipality: None,
            district: district.to_string(),
            region: "małopolskie".to_string(),
        }
    }

    fn priced(id: i64, name: &str, cost: Option<f64>) -> Facility {
        let mut f = facility(id, name, "Kraków", "Kraków");
        f.monthly_cost = cost;
        f
    }

    fn ids(outcome: &SearchOutcome) -> Vec<i64> {
        outcome.results.iter().map(|h| h.facility.id).collect()
    }

    fn sample() -> (Vec<Facility>, Vec<Locality>) {
        let mut a = facility(1, "DPS Pod Lipami", "Kraków", "Kraków");
        a.monthly_cost = Some(5200.0);
        a.care_profile = Some("E,F".to_string());
        a.latitude = Some(50.06);
        a.longitude = Some(19.94);
        let mut b = facility(2, "ŚDS Przystań", "Kraków", "m. Kraków");
        b.facility_type = FacilityType::Sds;
        b.monthly_cost = Some(0.0);
        b.care_profile = Some("B".to_string());
        let mut c = facility(3, "DPS Wrzos", "Wieliczka", "wielicki");
        c.monthly_cost = Some(4300.0);
        c.care_profile = Some("E".to_string());
        c.latitude = Some(49.98);
        c.longitude = Some(20.06);
        let mut d = facility(4, "DPS Nadwiślański", "Gdańsk", "Gdańsk");
        d.region = "pomorskie".to_string();
        let gazetteer = vec![
            locality(1, "Kraków", LocalityKind::City, "Kraków"),
            locality(2, "Wieliczka", LocalityKind::City, "wielicki"),
            locality(3, "Pcim", LocalityKind::Village, "myślenicki"),
        ];
        (vec![a, b, c, d], gazetteer)
    }

    #[test]
    fn test_parse_sort() {
        assert_eq!(parse_sort(Some("PRICE_ASC")), Sort::PriceAsc);
        assert_eq!(parse_sort(Some("bogus")), Sort::Default);
        assert_eq!(parse_sort(None), Sort::Default);
    }

    #[test]
    fn test_district_resolution_scopes_results() {
        let (facilities, gazetteer) = sample();
        let query = SearchQuery {
            q: Some("krakow".to_string()),
            ..Default::default()
        };
        let out = run(&query, &facilities, &gazetteer);
        assert_eq!(out.mode, ScopeMode::District);
        assert_eq!(out.districts, vec!["Kraków"]);
        assert_eq!(ids(&out), vec![1, 2]);
        assert!(out.message.contains("Znaleziono 2"));
        assert!(out.locality_suggestion.is_none());
    }

    #[test]
    fn test_recognised_locality_without_facilities_suggests() {
        let (facilities, gazetteer) = sample();
        let query = SearchQuery {
            q: Some("Pcim".to_string()),
            ..Default::default()
        };
        let out = run(&query, &facilities, &gazetteer);
        assert_eq!(out.total, 0);
        let suggestion = out.locality_suggestion.unwrap();
        assert_eq!(suggestion.name, "Pcim");
        assert_eq!(suggestion.district, "myślenicki");
        assert_eq!(out.message, NO_RESULTS_NEARBY);
    }

    #[test]
    fn test_unknown_locality_falls_back_to_text() {
        let (facilities, gazetteer) = sample();
        let query = SearchQuery {
            q: Some("wrzos".to_string()),
            ..Default::default()
        };
        let out = run(&query, &facilities, &gazetteer);
        assert_eq!(out.mode, ScopeMode::TextMatch);
        assert_eq!(ids(&out), vec![3]);
    }

    #[test]
    fn test_region_and_explicit_district() {
        let (facilities, gazetteer) = sample();
        let query = SearchQuery {
            region: Some("pomorskie".to_string()),
            ..Default::default()
        };
        assert_eq!(ids(&run(&query, &facilities, &gazetteer)), vec![4]);

        let query = SearchQuery {
            district: Some("wielicki".to_string()),
            q: Some("krakow".to_string()),
            ..Default::default()
        };
        let out = run(&query, &facilities, &gazetteer);
        assert_eq!(out.mode, ScopeMode::ExplicitDistrict);
        assert_eq!(ids(&out), vec![3]);
    }

    #[test]
    fn test_filters_only_ever_remove() {
        let (facilities, gazetteer) = sample();
        let base = SearchQuery::default();
        let narrowed = [
            SearchQuery {
                facility_type: Some(FacilityType::Dps),
                ..Default::default()
            },
            SearchQuery {
                care: vec!["E".to_string()],
                ..Default::default()
            },
            SearchQuery {
                max_price: Some(5000.0),
                ..Default::default()
            },
            SearchQuery {
                free_only: true,
                ..Default::default()
            },
            SearchQuery {
                facility_type: Some(FacilityType::Dps),
                care: vec!["E".to_string()],
                min_price: Some(4500.0),
                ..Default::default()
            },
        ];
        let all = run(&base, &facilities, &gazetteer).total;
        for q in &narrowed {
            assert!(run(q, &facilities, &gazetteer).total <= all);
        }
        assert_eq!(ids(&run(&narrowed[3], &facilities, &gazetteer)), vec![2]);
        assert_eq!(ids(&run(&narrowed[4], &facilities, &gazetteer)), vec![1]);
    }

    #[test]
    fn test_price_bound_excludes_unknown_price() {
        let facilities = vec![priced(1, "A", None), priced(2, "B", Some(3000.0))];
        let query = SearchQuery {
            min_price: Some(0.0),
            ..Default::default()
        };
        assert_eq!(ids(&run(&query, &facilities, &[])), vec![2]);
    }

    #[test]
    fn test_price_sort_puts_unknown_and_free_last() {
        let facilities = vec![
            priced(1, "A", None),
            priced(2, "B", Some(0.0)),
            priced(3, "C", Some(4000.0)),
            priced(4, "D", Some(3000.0)),
        ];
        let asc = SearchQuery {
            sort: Sort::PriceAsc,
            ..Default::default()
        };
        assert_eq!(ids(&run(&asc, &facilities, &[])), vec![4, 3, 1, 2]);
        let desc = SearchQuery {
            sort: Sort::PriceDesc,
            ..Default::default()
        };
        assert_eq!(ids(&run(&desc, &facilities, &[])), vec![3, 4, 1, 2]);
    }

    #[test]
    fn test_distance_sort_and_labels() {
        let (facilities, gazetteer) = sample();
        let query = SearchQuery {
            region: Some("Małopolskie".to_string()),
            origin: Some((50.06, 19.94)),
            sort: Sort::Distance,
            ..Default::default()
        };
        let out = run(&query, &facilities, &gazetteer);
        assert_eq!(ids(&out), vec![1, 3, 2]);
        assert_eq!(out.results[0].distance_km, Some(0.0));
        assert_eq!(out.results[0].distance_label.as_deref(), Some("0 m"));
        assert!(out.results[2].distance_km.is_none());
    }

    #[test]
    fn test_sort_is_total_on_duplicate_names() {
        let facilities = vec![priced(9, "Dom", None), priced(3, "Dom", None), priced(5, "dom", None)];
        for sort in [Sort::NameAsc, Sort::PriceAsc, Sort::Distance, Sort::Default] {
            let query = SearchQuery {
                sort,
                ..Default::default()
            };
            let first = ids(&run(&query, &facilities, &[]));
            let mut reversed = facilities.clone();
            reversed.reverse();
            assert_eq!(first, ids(&run(&query, &reversed, &[])), "{sort:?}");
        }
    }
}
