use std::collections::BTreeMap;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{AppError, AppResult, AppState, client_ip, flatten_list, header_str};
use crate::care::{self, CareProfile};
use crate::db::events::{self, EventTypeCount, NewAppEvent, NewFacilityEvent};
use crate::db::facilities::{self, NamedCount};
use crate::db::{format_ts, gazetteer, inquiries, mops as mops_store, now_ts, prices as price_store, shares};
use crate::geo::valid_coordinate;
use crate::geocode::{GeocodeQuery, address_line};
use crate::model::{APP_EVENT_TYPES, FACILITY_EVENT_TYPES, Facility, FacilityType};
use crate::partners::{self, InquiryInput};
use crate::prices::{PriceHistory, history};
use crate::recommend::{RecommendationRequest, Recommendations, recommend};
use crate::search::suggest::{SuggestQuery, SuggestResponse};
use crate::search::{self, SearchOutcome, SearchQuery, parse_sort, parse_type_filter};
use crate::text::{normalize_polish, slugify_city};

const TOP_CITIES: usize = 10;

#[derive(Debug, Deserialize)]
pub(super) struct SearchParams {
    q: Option<String>,
    region: Option<String>,
    district: Option<String>,
    #[serde(rename = "type")]
    facility_type: Option<String>,
    care: Option<String>,
    min_price: Option<f64>,
    max_price: Option<f64>,
    free_only: Option<bool>,
    lat: Option<f64>,
    lng: Option<f64>,
    sort: Option<String>,
}

pub(super) async fn search(
    State(st): State<AppState>,
    Query(p): Query<SearchParams>,
) -> AppResult<Json<SearchOutcome>> {
    let origin = match (p.lat, p.lng) {
        (Some(lat), Some(lng)) if valid_coordinate(lat, lng) => Some((lat, lng)),
        _ => None,
    };
    let query = SearchQuery {
        q: p.q.clone(),
        region: p.region,
        district: p.district,
        facility_type: parse_type_filter(p.facility_type.as_deref()),
        care: flatten_list(p.care.as_deref()),
        min_price: p.min_price,
        max_price: p.max_price,
        free_only: p.free_only.unwrap_or(false),
        origin,
        sort: parse_sort(p.sort.as_deref()),
    };

    let normalized = normalize_polish(p.q.as_deref().unwrap_or(""));
    let (all, localities) = {
        let conn = st.db.lock().await;
        let all = facilities::list_all(&conn)?;
        let localities = if normalized.is_empty() {
            Vec::new()
        } else {
            gazetteer::matching(&conn, &normalized)?
        };
        (all, localities)
    };
    Ok(Json(search::run(&query, &all, &localities)))
}

#[derive(Debug, Deserialize)]
pub(super) struct SuggestParams {
    q: Option<String>,
    region: Option<String>,
    district: Option<String>,
    #[serde(rename = "type")]
    facility_type: Option<String>,
}

pub(super) async fn suggest(
    State(st): State<AppState>,
    Query(p): Query<SuggestParams>,
) -> AppResult<Json<SuggestResponse>> {
    let query = SuggestQuery {
        q: p.q.unwrap_or_default(),
        region: p.region,
        district: p.district,
        facility_type: parse_type_filter(p.facility_type.as_deref()),
    };
    let normalized = normalize_polish(&query.q);
    let (localities, covered, all) = {
        let conn = st.db.lock().await;
        let localities = if normalized.chars().count() < 2 {
            Vec::new()
        } else {
            gazetteer::matching(&conn, &normalized)?
        };
        (localities, gazetteer::covered_regions(&conn)?, facilities::list_all(&conn)?)
    };
    Ok(Json(search::suggest::suggest(&query, &localities, &covered, &all)))
}

#[derive(Debug, Deserialize)]
pub(super) struct ListParams {
    ids: Option<String>,
    search: Option<String>,
    #[serde(rename = "type")]
    facility_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct FacilityList {
    success: bool,
    data: Vec<Facility>,
    count: usize,
}

/// Plain listing used by favourites and comparison views: either an explicit
/// id list, or a text match over locality, municipality, district and name.
pub(super) async fn list_facilities(
    State(st): State<AppState>,
    Query(p): Query<ListParams>,
) -> AppResult<Json<FacilityList>> {
    let ids: Vec<i64> = flatten_list(p.ids.as_deref())
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    let conn = st.db.lock().await;
    let mut data = if ids.is_empty() {
        facilities::list_all(&conn)?
    } else {
        facilities::get_many(&conn, &ids)?
    };
    drop(conn);

    if let Some(needle) = p.search.as_deref().map(normalize_polish).filter(|s| !s.is_empty()) {
        data.retain(|f| {
            [
                Some(f.locality.as_str()),
                f.municipality.as_deref(),
                Some(f.district.as_str()),
                Some(f.name.as_str()),
            ]
            .into_iter()
            .flatten()
            .any(|v| normalize_polish(v).contains(&needle))
        });
    }
    if let Some(kind) = parse_type_filter(p.facility_type.as_deref()) {
        data.retain(|f| f.facility_type == kind);
    }
    if ids.is_empty() {
        data.sort_by(|a, b| a.name.cmp(&b.name));
    }

    Ok(Json(FacilityList {
        success: true,
        count: data.len(),
        data,
    }))
}

#[derive(Debug, Serialize)]
pub(super) struct FacilityDetail {
    #[serde(flatten)]
    facility: Facility,
    care_labels: Vec<CareProfile>,
}

pub(super) async fn facility_detail(
    State(st): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<FacilityDetail>> {
    let conn = st.db.lock().await;
    let facility = facilities::get(&conn, id)?
        .ok_or_else(|| AppError::not_found("Placówka nie znaleziona"))?;
    Ok(Json(FacilityDetail {
        care_labels: care::labels(facility.facility_type, facility.care_profile.as_deref()),
        facility,
    }))
}

#[derive(Debug, Serialize)]
pub(super) struct FacilityLocation {
    locality: String,
    district: String,
    region: String,
}

#[derive(Debug, Serialize)]
pub(super) struct FacilitySummary {
    id: i64,
    name: String,
    #[serde(rename = "type")]
    facility_type: FacilityType,
    location: FacilityLocation,
}

#[derive(Debug, Serialize)]
pub(super) struct FacilityPriceHistory {
    facility: FacilitySummary,
    #[serde(flatten)]
    history: PriceHistory,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

pub(super) async fn facility_prices(
    State(st): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<FacilityPriceHistory>> {
    let conn = st.db.lock().await;
    let f = facilities::get(&conn, id)?.ok_or_else(|| AppError::not_found("Facility not found"))?;
    let entries = price_store::for_facility(&conn, id)?;
    drop(conn);

    let message = entries
        .is_empty()
        .then(|| "No price history available for this facility".to_string());
    Ok(Json(FacilityPriceHistory {
        facility: FacilitySummary {
            id: f.id,
            name: f.name,
            facility_type: f.facility_type,
            location: FacilityLocation {
                locality: f.locality,
                district: f.district,
                region: f.region,
            },
        },
        history: history(&entries),
        message,
    }))
}

#[derive(Debug, Serialize)]
pub(super) struct CountsResponse {
    success: bool,
    /// Keyed by the URL-friendly region name (`malopolskie`, `slaskie`).
    counts: BTreeMap<String, i64>,
    total: i64,
}

pub(super) async fn facility_counts(State(st): State<AppState>) -> AppResult<Json<CountsResponse>> {
    let conn = st.db.lock().await;
    let by_region = facilities::counts_by_region(&conn)?;
    drop(conn);

    let mut counts: BTreeMap<String, i64> = BTreeMap::new();
    for r in &by_region {
        *counts.entry(normalize_polish(&r.name)).or_default() += r.count;
    }
    Ok(Json(CountsResponse {
        success: true,
        total: by_region.iter().map(|r| r.count).sum(),
        counts,
    }))
}

#[derive(Debug, Serialize)]
pub(super) struct TopCity {
    name: String,
    /// Search link key, e.g. `nowy+sacz`.
    slug: String,
    count: i64,
}

#[derive(Debug, Serialize)]
pub(super) struct StatsResponse {
    total: i64,
    by_region: BTreeMap<String, i64>,
    by_city: Vec<NamedCount>,
    top_cities: Vec<TopCity>,
}

pub(super) async fn stats(State(st): State<AppState>) -> AppResult<Json<StatsResponse>> {
    let conn = st.db.lock().await;
    let regions = facilities::counts_by_region(&conn)?;
    let by_city = facilities::counts_by_locality(&conn)?;
    drop(conn);

    let mut by_region: BTreeMap<String, i64> = BTreeMap::new();
    for r in regions {
        *by_region.entry(r.name.to_lowercase()).or_default() += r.count;
    }
    Ok(Json(StatsResponse {
        total: by_region.values().sum(),
        by_region,
        top_cities: by_city
            .iter()
            .take(TOP_CITIES)
            .map(|c| TopCity {
                name: c.name.clone(),
                slug: slugify_city(&c.name),
                count: c.count,
            })
            .collect(),
        by_city,
    }))
}

#[derive(Debug, Deserialize)]
pub(super) struct RecommendationBody {
    recommendation: Option<String>,
    location: Option<String>,
}

pub(super) async fn recommendations(
    State(st): State<AppState>,
    Json(body): Json<RecommendationBody>,
) -> AppResult<Json<Recommendations>> {
    let recommendation = body
        .recommendation
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("Missing recommendation parameter"))?;
    let location = body
        .location
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("Missing location parameter"))?;

    let all = {
        let conn = st.db.lock().await;
        facilities::list_all(&conn)?
    };
    let req = RecommendationRequest {
        recommendation,
        location,
    };
    let out = recommend(&req, &all);
    tracing::info!(
        location = %req.location,
        total = out.total,
        exact = out.is_exact_match,
        "recommendations"
    );
    Ok(Json(out))
}

pub(super) async fn geocode(
    State(st): State<AppState>,
    Query(q): Query<GeocodeQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let address = address_line(&q).ok_or_else(|| AppError::bad_request("Miejscowość jest wymagana"))?;
    match st.geocoder.lookup(&address).await {
        Ok(Some(hit)) => Ok(Json(serde_json::json!({
            "success": true,
            "latitude": hit.latitude,
            "longitude": hit.longitude,
            "display_name": hit.display_name,
        }))),
        Ok(None) => Ok(Json(serde_json::json!({
            "success": false,
            "message": "Nie znaleziono lokalizacji",
        }))),
        Err(e) => {
            tracing::error!("Geocoding {} failed: {:#}", address, e);
            Err(AppError::Server("Błąd geocodingu".to_string()))
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ShareBody {
    ids: Option<Vec<i64>>,
}

pub(super) async fn create_share(
    State(st): State<AppState>,
    Json(body): Json<ShareBody>,
) -> AppResult<impl IntoResponse> {
    let ids = body
        .ids
        .filter(|ids| !ids.is_empty())
        .ok_or_else(|| AppError::bad_request("IDs array is required and must not be empty"))?;

    let conn = st.db.lock().await;
    let list = shares::create(&conn, &ids, &now_ts())?;
    drop(conn);

    Ok(Json(serde_json::json!({
        "success": true,
        "url": format!("{}/s/{}", st.config.public_base_url, list.token),
        "token": list.token,
        "created": list.created_at,
    })))
}

pub(super) async fn resolve_share(
    State(st): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<impl IntoResponse> {
    let conn = st.db.lock().await;
    let list = shares::resolve(&conn, &token)?
        .ok_or_else(|| AppError::not_found("Shared list not found"))?;
    let facilities = facilities::get_many(&conn, &list.ids)?;
    drop(conn);

    Ok(Json(serde_json::json!({
        "success": true,
        "ids": list.ids,
        "facilities": facilities,
        "created": list.created_at,
        "views": list.views,
    })))
}

#[derive(Debug, Deserialize)]
pub(super) struct TrackBody {
    #[serde(alias = "placowkaId")]
    facility_id: Option<i64>,
    #[serde(alias = "eventType")]
    event_type: Option<String>,
    language: Option<String>,
    metadata: Option<serde_json::Value>,
}

pub(super) async fn track_facility_event(
    State(st): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<TrackBody>,
) -> AppResult<impl IntoResponse> {
    let facility_id = body
        .facility_id
        .ok_or_else(|| AppError::bad_request("facility_id is required and must be a number"))?;
    let event_type = body
        .event_type
        .ok_or_else(|| AppError::bad_request("event_type is required"))?;
    if !FACILITY_EVENT_TYPES.contains(&event_type.as_str()) {
        return Err(AppError::bad_request(format!(
            "Invalid event_type. Must be one of: {}",
            FACILITY_EVENT_TYPES.join(", ")
        )));
    }

    let ev = NewFacilityEvent {
        facility_id,
        event_type,
        language: body.language,
        user_agent: Some(header_str(&headers, "user-agent").unwrap_or_else(|| "unknown".to_string())),
        referer: header_str(&headers, "referer"),
        ip_address: Some(client_ip(&headers)),
        metadata: body.metadata,
    };
    let conn = st.db.lock().await;
    let event_id = events::record_facility_event(&conn, &ev, &now_ts())?;
    drop(conn);

    tracing::debug!(event_id, facility_id, event_type = %ev.event_type, "tracked facility event");
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "success": true, "event_id": event_id })),
    ))
}

#[derive(Debug, Deserialize)]
pub(super) struct EventCountParams {
    #[serde(alias = "placowkaId")]
    facility_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct EventCounts {
    facility_id: i64,
    stats: Vec<EventTypeCount>,
}

pub(super) async fn facility_event_counts(
    State(st): State<AppState>,
    Query(p): Query<EventCountParams>,
) -> AppResult<Json<EventCounts>> {
    let facility_id = p
        .facility_id
        .ok_or_else(|| AppError::bad_request("facility_id is required"))?;
    let conn = st.db.lock().await;
    let stats = events::counts_for_facility(&conn, facility_id)?;
    Ok(Json(EventCounts { facility_id, stats }))
}

#[derive(Debug, Deserialize)]
pub(super) struct AppTrackBody {
    #[serde(alias = "eventType")]
    event_type: Option<String>,
    language: Option<String>,
    metadata: Option<serde_json::Value>,
}

pub(super) async fn track_app_event(
    State(st): State<AppState>,
    Json(body): Json<AppTrackBody>,
) -> AppResult<impl IntoResponse> {
    let event_type = body
        .event_type
        .filter(|t| APP_EVENT_TYPES.contains(&t.as_str()))
        .ok_or_else(|| AppError::bad_request("Invalid event type"))?;
    let ev = NewAppEvent {
        event_type,
        language: body.language,
        metadata: body.metadata,
    };
    let conn = st.db.lock().await;
    let event_id = events::record_app_event(&conn, &ev, &now_ts())?;
    Ok(Json(serde_json::json!({ "success": true, "event_id": event_id })))
}

#[derive(Debug, Deserialize)]
pub(super) struct MopsParams {
    city: Option<String>,
}

/// All MOPS contacts by display name, or the one for `?city=`.
pub(super) async fn mops(
    State(st): State<AppState>,
    Query(p): Query<MopsParams>,
) -> AppResult<Response> {
    let conn = st.db.lock().await;
    let Some(city) = p.city.filter(|c| !c.trim().is_empty()) else {
        return Ok(Json(mops_store::list_all(&conn)?).into_response());
    };
    let contact = mops_store::find_by_city(&conn, &city)?.ok_or_else(|| {
        AppError::not_found(format!("MOPS dla miasta \"{}\" nie został znaleziony", city.trim()))
    })?;
    Ok(Json(contact).into_response())
}

pub(super) async fn submit_inquiry(
    State(st): State<AppState>,
    Json(body): Json<InquiryInput>,
) -> AppResult<impl IntoResponse> {
    let inquiry = body.validate().map_err(AppError::Validation)?;

    let now = Utc::now();
    let window = Duration::hours(partners::WINDOW_HOURS);
    let conn = st.db.lock().await;
    let recent = inquiries::count_by_email_since(&conn, &inquiry.email, &format_ts(now - window))?;
    if recent >= partners::MAX_PER_WINDOW {
        return Err(AppError::RateLimited {
            message: "Osiągnięto limit zgłoszeń. Spróbuj ponownie jutro.".to_string(),
            reset_at: (now + window).to_rfc3339(),
        });
    }
    let id = inquiries::insert(&conn, &inquiry, &format_ts(now))?;
    drop(conn);

    tracing::info!(id, partner_type = inquiry.partner_type.as_str(), "partner inquiry received");
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "success": true,
            "message": "Dziękujemy za zgłoszenie! Skontaktujemy się wkrótce.",
            "id": id,
        })),
    ))
}
