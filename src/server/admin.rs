use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{AppError, AppResult, AppState, client_ip, header_str};
use crate::analytics::{self, AnalyticsReport};
use crate::db::inquiries::{self as inquiry_store, Inquiry};
use crate::db::prices::PriceUpsert;
use crate::db::security::{self, SecurityLogEntry};
use crate::db::{facilities, now_ts, prices as price_store};
use crate::export;
use crate::matching::{
    self, DuplicateCheck, DuplicateQuery, ImportPreview, ImportRequest, parse_price_csv,
};
use crate::model::{Facility, FacilityInput, PriceEntry, SecurityEvent};
use crate::partners::INQUIRY_STATUSES;
use crate::prices::{AdminPriceOverview, AdminPriceQuery, DEFAULT_ADMIN_YEAR, admin_overview};
use crate::search::parse_type_filter;
use crate::text::normalize_polish;

const DEFAULT_PAGE_SIZE: usize = 50;
const MAX_PAGE_SIZE: usize = 500;
const SECURITY_LOG_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub(super) struct ListParams {
    search: Option<String>,
    #[serde(rename = "type")]
    facility_type: Option<String>,
    page: Option<usize>,
    page_size: Option<usize>,
}

#[derive(Debug, Serialize)]
pub(super) struct FacilityPage {
    facilities: Vec<Facility>,
    total: usize,
    page: usize,
    page_size: usize,
}

pub(super) async fn list_facilities(
    State(st): State<AppState>,
    Query(p): Query<ListParams>,
) -> AppResult<Json<FacilityPage>> {
    let all = {
        let conn = st.db.lock().await;
        facilities::list_all(&conn)?
    };
    let needle = p.search.as_deref().map(normalize_polish).filter(|s| !s.is_empty());
    let kind = parse_type_filter(p.facility_type.as_deref());
    let mut matching: Vec<Facility> = all
        .into_iter()
        .filter(|f| kind.is_none_or(|k| f.facility_type == k))
        .filter(|f| {
            needle.as_deref().is_none_or(|n| {
                normalize_polish(&f.name).contains(n)
                    || normalize_polish(&f.locality).contains(n)
                    || normalize_polish(&f.district).contains(n)
            })
        })
        .collect();
    matching.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

    let page = p.page.unwrap_or(1).max(1);
    let page_size = p.page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let total = matching.len();
    let facilities = matching
        .into_iter()
        .skip((page - 1) * page_size)
        .take(page_size)
        .collect();
    Ok(Json(FacilityPage {
        facilities,
        total,
        page,
        page_size,
    }))
}

#[derive(Debug, Serialize)]
pub(super) struct FacilityRecord {
    facility: Facility,
    prices: Vec<PriceEntry>,
}

pub(super) async fn get_facility(
    State(st): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<FacilityRecord>> {
    let conn = st.db.lock().await;
    let facility = facilities::get(&conn, id)?
        .ok_or_else(|| AppError::not_found("Placówka nie znaleziona"))?;
    let prices = price_store::for_facility(&conn, id)?;
    Ok(Json(FacilityRecord { facility, prices }))
}

/// The year's price entry written alongside a facility save.
fn price_for_save(id: i64, input: &FacilityInput) -> Option<PriceUpsert> {
    let year = input.price_year?;
    let amount = input.monthly_cost?;
    Some(PriceUpsert {
        facility_id: id,
        year,
        amount,
        cost_kind: None,
        source: input.price_source.clone(),
        verified: input.verified,
        notes: None,
        effective_from: None,
    })
}

fn validated(input: &FacilityInput) -> AppResult<()> {
    let errors = input.validate();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

pub(super) async fn create_facility(
    State(st): State<AppState>,
    Json(input): Json<FacilityInput>,
) -> AppResult<Response> {
    validated(&input)?;
    let now = now_ts();
    let conn = st.db.lock().await;

    if !input.force_add {
        let all = facilities::list_all(&conn)?;
        if let Some(existing) =
            facilities::find_same_name_and_locality(&all, &input.name, &input.locality)
        {
            return Err(AppError::Conflict {
                message: "Placówka o takiej nazwie już istnieje w tej miejscowości".to_string(),
                existing: Box::new(serde_json::to_value(&existing).map_err(anyhow::Error::from)?),
            });
        }
    }

    let id = facilities::insert(&conn, &input, &now)?;
    if let Some(price) = price_for_save(id, &input) {
        price_store::upsert(&conn, &price, &now)?;
    }
    let facility = facilities::get(&conn, id)?;
    drop(conn);

    tracing::info!(id, name = %input.name, "facility created");
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "success": true, "facility": facility })),
    )
        .into_response())
}

pub(super) async fn update_facility(
    State(st): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<FacilityInput>,
) -> AppResult<Json<serde_json::Value>> {
    validated(&input)?;
    let now = now_ts();
    let conn = st.db.lock().await;
    if !facilities::update(&conn, id, &input, &now)? {
        return Err(AppError::not_found("Placówka nie znaleziona"));
    }
    if let Some(price) = price_for_save(id, &input) {
        price_store::upsert(&conn, &price, &now)?;
    }
    let facility = facilities::get(&conn, id)?;
    drop(conn);

    tracing::info!(id, "facility updated");
    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Placówka zaktualizowana",
        "facility": facility,
    })))
}

pub(super) async fn delete_facility(
    State(st): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> AppResult<Json<serde_json::Value>> {
    let mut conn = st.db.lock().await;
    let facility = facilities::get(&conn, id)?
        .ok_or_else(|| AppError::not_found("Placówka nie znaleziona"))?;
    facilities::delete(&mut conn, id)?;

    let meta = serde_json::json!({ "facility_id": id, "name": facility.name });
    security::log(
        &conn,
        SecurityEvent::FacilityDeleted,
        Some(&client_ip(&headers)),
        header_str(&headers, "user-agent").as_deref(),
        Some(&meta),
        &now_ts(),
    )?;
    drop(conn);

    tracing::info!(id, name = %facility.name, "facility deleted");
    Ok(Json(serde_json::json!({
        "success": true,
        "message": format!("Placówka \"{}\" została usunięta", facility.name),
    })))
}

pub(super) async fn check_duplicate(
    State(st): State<AppState>,
    Query(q): Query<DuplicateQuery>,
) -> AppResult<Json<DuplicateCheck>> {
    let all = {
        let conn = st.db.lock().await;
        facilities::list_all(&conn)?
    };
    Ok(Json(matching::check_duplicate(&q, &all)))
}

pub(super) async fn list_prices(
    State(st): State<AppState>,
    Query(q): Query<AdminPriceQuery>,
) -> AppResult<Json<AdminPriceOverview>> {
    let (all, prices) = {
        let conn = st.db.lock().await;
        (facilities::list_all(&conn)?, price_store::all(&conn)?)
    };
    Ok(Json(admin_overview(&q, &all, &prices)))
}

#[derive(Debug, Deserialize)]
pub(super) struct BulkPrices {
    updates: Vec<PriceUpsert>,
}

pub(super) async fn upsert_prices(
    State(st): State<AppState>,
    Json(body): Json<BulkPrices>,
) -> AppResult<Json<serde_json::Value>> {
    let mut conn = st.db.lock().await;
    let updated = price_store::upsert_many(&mut conn, &body.updates, &now_ts())?;
    Ok(Json(serde_json::json!({ "success": true, "updated": updated })))
}

pub(super) async fn delete_price(
    State(st): State<AppState>,
    Path((facility_id, year)): Path<(i64, i32)>,
) -> AppResult<Json<serde_json::Value>> {
    let conn = st.db.lock().await;
    let deleted = price_store::delete(&conn, facility_id, year)?;
    if deleted == 0 {
        return Err(AppError::not_found("Cena nie znaleziona"));
    }
    Ok(Json(serde_json::json!({ "success": true, "deleted": deleted })))
}

#[derive(Debug, Deserialize)]
pub(super) struct YearParam {
    year: Option<i32>,
}

/// Body is the raw price-list CSV; `?year=` picks the price column.
pub(super) async fn import_preview(
    State(st): State<AppState>,
    Query(p): Query<YearParam>,
    body: Bytes,
) -> AppResult<Json<ImportPreview>> {
    let year = p.year.unwrap_or(DEFAULT_ADMIN_YEAR);
    let rows = parse_price_csv(&body).map_err(|e| AppError::bad_request(format!("{e:#}")))?;
    let all = {
        let conn = st.db.lock().await;
        facilities::list_all(&conn)?
    };
    let preview = matching::preview(rows, &all, year);
    tracing::info!(
        year,
        matched = preview.matched,
        fuzzy = preview.fuzzy,
        unmatched = preview.unmatched,
        "price import preview"
    );
    Ok(Json(preview))
}

pub(super) async fn import_apply(
    State(st): State<AppState>,
    Json(req): Json<ImportRequest>,
) -> AppResult<Json<serde_json::Value>> {
    if req.updates.is_empty() {
        return Err(AppError::bad_request("Invalid request body"));
    }
    let date = Utc::now().format("%d.%m.%Y").to_string();
    let upserts = matching::to_upserts(&req, &date);
    let mut conn = st.db.lock().await;
    let updated = price_store::upsert_many(&mut conn, &upserts, &now_ts())?;
    drop(conn);

    tracing::info!(year = req.year, updated, "price import applied");
    Ok(Json(serde_json::json!({
        "success": true,
        "updated": updated,
        "message": format!("Zaimportowano {updated} cen"),
    })))
}

fn csv_attachment(filename: &str, body: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub(super) struct ExportParams {
    mode: Option<String>,
}

pub(super) async fn export_facilities(
    State(st): State<AppState>,
    Query(p): Query<ExportParams>,
) -> AppResult<Response> {
    let today = Utc::now().format("%Y-%m-%d").to_string();
    let template = p.mode.as_deref() == Some("template");
    let csv = if template {
        export::facilities_template()?
    } else {
        let all = {
            let conn = st.db.lock().await;
            facilities::list_all(&conn)?
        };
        export::facilities_csv(&all)?
    };
    Ok(csv_attachment(&export::facilities_filename(template, &today), csv))
}

pub(super) async fn export_prices(
    State(st): State<AppState>,
    Query(p): Query<YearParam>,
) -> AppResult<Response> {
    let year = p.year.unwrap_or(DEFAULT_ADMIN_YEAR);
    let today = Utc::now().format("%Y-%m-%d").to_string();
    let (all, prices) = {
        let conn = st.db.lock().await;
        (facilities::list_all(&conn)?, price_store::all(&conn)?)
    };
    let csv = export::prices_csv(&all, &prices, year)?;
    Ok(csv_attachment(&export::prices_filename(year, &today), csv))
}

#[derive(Debug, Deserialize)]
pub(super) struct DaysParam {
    days: Option<i64>,
}

pub(super) async fn analytics(
    State(st): State<AppState>,
    Query(p): Query<DaysParam>,
) -> AppResult<Json<AnalyticsReport>> {
    let days = p.days.filter(|d| *d > 0).unwrap_or(analytics::DEFAULT_DAYS);
    let conn = st.db.lock().await;
    Ok(Json(analytics::report(&conn, days, Utc::now())?))
}

#[derive(Debug, Deserialize)]
pub(super) struct LimitParam {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub(super) struct SecurityLog {
    entries: Vec<SecurityLogEntry>,
}

pub(super) async fn security_log(
    State(st): State<AppState>,
    Query(p): Query<LimitParam>,
) -> AppResult<Json<SecurityLog>> {
    let limit = p.limit.unwrap_or(SECURITY_LOG_LIMIT).min(1000);
    let conn = st.db.lock().await;
    Ok(Json(SecurityLog {
        entries: security::recent(&conn, limit)?,
    }))
}

#[derive(Debug, Deserialize)]
pub(super) struct InquiryParams {
    status: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

#[derive(Debug, Serialize)]
pub(super) struct Pagination {
    total: i64,
    limit: usize,
    offset: usize,
    has_more: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct InquiryPage {
    inquiries: Vec<Inquiry>,
    pagination: Pagination,
}

pub(super) async fn list_inquiries(
    State(st): State<AppState>,
    Query(p): Query<InquiryParams>,
) -> AppResult<Json<InquiryPage>> {
    let limit = p.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = p.offset.unwrap_or(0);
    let status = p.status.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let conn = st.db.lock().await;
    let (inquiries, total) = inquiry_store::list(&conn, status, limit, offset)?;
    Ok(Json(InquiryPage {
        inquiries,
        pagination: Pagination {
            total,
            limit,
            offset,
            has_more: ((offset + limit) as i64) < total,
        },
    }))
}

#[derive(Debug, Deserialize)]
pub(super) struct StatusBody {
    status: String,
}

pub(super) async fn update_inquiry_status(
    State(st): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<StatusBody>,
) -> AppResult<Json<serde_json::Value>> {
    let status = body.status.trim();
    if !INQUIRY_STATUSES.contains(&status) {
        return Err(AppError::bad_request(format!(
            "Nieprawidłowy status. Dozwolone: {}",
            INQUIRY_STATUSES.join(", ")
        )));
    }
    let conn = st.db.lock().await;
    if !inquiry_store::set_status(&conn, id, status)? {
        return Err(AppError::not_found("Zgłoszenie nie znalezione"));
    }
    Ok(Json(serde_json::json!({ "success": true, "id": id, "status": status })))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::db::facilities::fixtures::{input, seed};
    use crate::server::auth::tests::{authed, login_cookie};
    use crate::server::test_support::*;

    fn new_facility(name: &str) -> serde_json::Value {
        json!({
            "name": name,
            "facility_type": "DPS",
            "locality": "Bochnia",
            "district": "bocheński",
            "region": "małopolskie",
            "phone": "+48 14 612 34 56",
            "monthly_cost": 4800.0,
            "price_year": 2025,
            "verified": true,
        })
    }

    fn body(v: serde_json::Value) -> Body {
        Body::from(v.to_string())
    }

    #[tokio::test]
    async fn test_create_validates_and_rejects_duplicates() {
        let state = test_state();
        let cookie = login_cookie(&state).await;

        let resp = send(&state, authed("POST", "/api/admin/facilities", &cookie, body(json!({ "name": "X" })))).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let errs = body_json(resp).await;
        assert_eq!(errs["error"], "Błąd walidacji");
        assert!(errs["details"].as_array().unwrap().iter().any(|e| e["field"] == "name"));

        let resp = send(&state, authed("POST", "/api/admin/facilities", &cookie, body(new_facility("DPS Bochnia")))).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created = body_json(resp).await;
        let id = created["facility"]["id"].as_i64().unwrap();

        let resp = send(&state, authed("POST", "/api/admin/facilities", &cookie, body(new_facility("DPS Bochnia")))).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(resp).await["existing"]["id"], id);

        let mut forced = new_facility("DPS Bochnia");
        forced["force_add"] = json!(true);
        let resp = send(&state, authed("POST", "/api/admin/facilities", &cookie, body(forced))).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let uri = format!("/api/admin/facilities/{id}");
        let record = body_json(send(&state, authed("GET", &uri, &cookie, Body::empty())).await).await;
        assert_eq!(record["prices"][0]["year"], 2025);
        assert_eq!(record["prices"][0]["amount"], 4800.0);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let state = test_state();
        let id = {
            let conn = state.db.lock().await;
            seed(&conn, input("DPS Stary", "DPS", "Tarnów", "Tarnów"))
        };
        let cookie = login_cookie(&state).await;
        let uri = format!("/api/admin/facilities/{id}");

        let resp = send(&state, authed("PUT", &uri, &cookie, body(new_facility("DPS Nowy")))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["facility"]["name"], "DPS Nowy");

        let resp = send(&state, authed("PUT", "/api/admin/facilities/999", &cookie, body(new_facility("DPS Nowy")))).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = send(&state, authed("DELETE", &uri, &cookie, Body::empty())).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let resp = send(&state, authed("GET", &uri, &cookie, Body::empty())).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let log = body_json(send(&state, authed("GET", "/api/admin/security-log", &cookie, Body::empty())).await).await;
        assert_eq!(log["entries"][0]["event_type"], "facility_deleted");
        assert_eq!(log["entries"][0]["metadata"]["name"], "DPS Nowy");
    }

    #[tokio::test]
    async fn test_list_pages_and_duplicate_check() {
        let state = test_state();
        {
            let conn = state.db.lock().await;
            for name in ["DPS C", "DPS A", "DPS B"] {
                seed(&conn, input(name, "DPS", "Kraków", "Kraków"));
            }
        }
        let cookie = login_cookie(&state).await;
        let page = body_json(
            send(&state, authed("GET", "/api/admin/facilities?page=2&page_size=2", &cookie, Body::empty())).await,
        )
        .await;
        assert_eq!(page["total"], 3);
        assert_eq!(page["facilities"][0]["name"], "DPS C");

        let resp = send(
            &state,
            authed("GET", "/api/admin/facilities/check-duplicate?nazwa=DPS%20A&miejscowosc=Krak%C3%B3w", &cookie, Body::empty()),
        )
        .await;
        let check = body_json(resp).await;
        assert_eq!(check["exists"], true);
        assert_eq!(check["matched_by"], "nazwa");
    }

    #[tokio::test]
    async fn test_price_import_preview_and_apply() {
        let state = test_state();
        let id = {
            let conn = state.db.lock().await;
            seed(&conn, input("Dom Pomocy Społecznej w Bochni", "DPS", "Bochnia", "bocheński"))
        };
        let cookie = login_cookie(&state).await;

        let csv = "lp;powiat;nazwa;adres;typ;cena_2025\n1;bocheński;Dom Pomocy Społecznej w Bochni;ul. Partyzantów 1;DPS;5 100,50\n2;tarnowski;DPS Nieznany;;DPS;4000\n";
        let resp = send(&state, authed("POST", "/api/admin/prices/import/preview?year=2025", &cookie, Body::from(csv))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let preview = body_json(resp).await;
        assert_eq!(preview["matched"], 1);
        assert_eq!(preview["unmatched"], 1);
        assert_eq!(preview["rows"][0]["amount"], 5100.5);
        assert_eq!(preview["updates"], json!([{ "facility_id": id, "amount": 5100.5, "source": null }]));

        let req = json!({ "year": 2025, "updates": preview["updates"].clone(), "default_source": "BIP" });
        let resp = send(&state, authed("POST", "/api/admin/prices/import", &cookie, body(req))).await;
        let applied = body_json(resp).await;
        assert_eq!(applied["message"], "Zaimportowano 1 cen");

        let overview = body_json(send(&state, authed("GET", "/api/admin/prices?year=2025", &cookie, Body::empty())).await).await;
        assert_eq!(overview["stats"]["with_price_year"], 1);
        let entry = &overview["facilities"][0]["prices"][0];
        assert_eq!(entry["source"], "BIP");
        assert_eq!(entry["verified"], true);

        let uri = format!("/api/admin/prices/{id}/2025");
        let resp = send(&state, authed("DELETE", &uri, &cookie, Body::empty())).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let resp = send(&state, authed("DELETE", &uri, &cookie, Body::empty())).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_exports_are_attachments() {
        let state = test_state();
        let cookie = login_cookie(&state).await;
        let resp = send(&state, authed("GET", "/api/admin/export/facilities?mode=template", &cookie, Body::empty())).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let disposition = resp.headers()["content-disposition"].to_str().unwrap().to_string();
        assert_eq!(disposition, "attachment; filename=\"placowki_template.csv\"");
        assert!(body_text(resp).await.starts_with("id,nazwa,"));

        let resp = send(&state, authed("GET", "/api/admin/prices/export?year=2024", &cookie, Body::empty())).await;
        let disposition = resp.headers()["content-disposition"].to_str().unwrap().to_string();
        assert!(disposition.starts_with("attachment; filename=\"ceny-dps-2024-"));
        assert!(body_text(resp).await.contains("cena_2024"));
    }

    #[tokio::test]
    async fn test_analytics_report_shape() {
        let state = test_state();
        let cookie = login_cookie(&state).await;
        let resp = send(&state, authed("GET", "/api/admin/analytics?days=7", &cookie, Body::empty())).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let report = body_json(resp).await;
        assert_eq!(report["overview"]["total_events"], 0);
        assert!(report["local_insights"].is_object());
    }

    #[tokio::test]
    async fn test_partnership_inquiries_list_and_status() {
        let state = test_state();
        {
            let conn = state.db.lock().await;
            for (email, at) in [("a@mops.pl", "2025-06-01 09:00:00"), ("b@dps.pl", "2025-06-02 09:00:00")] {
                let form = crate::partners::InquiryInput {
                    name: "Anna Nowak".to_string(),
                    email: email.to_string(),
                    organization: "MOPS Kraków".to_string(),
                    partner_type: "mops".to_string(),
                    message: "Prosimy o kontakt w sprawie współpracy.".to_string(),
                    gdpr_consent: true,
                    ..Default::default()
                };
                crate::db::inquiries::insert(&conn, &form.validate().unwrap(), at).unwrap();
            }
        }
        let resp = send(&state, get("/api/admin/partnership")).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let cookie = login_cookie(&state).await;
        let page = body_json(send(&state, authed("GET", "/api/admin/partnership?limit=1", &cookie, Body::empty())).await).await;
        assert_eq!(page["inquiries"][0]["email"], "b@dps.pl");
        assert_eq!(page["pagination"], json!({ "total": 2, "limit": 1, "offset": 0, "has_more": true }));

        let resp = send(&state, authed("PATCH", "/api/admin/partnership/1", &cookie, body(json!({ "status": "spam" })))).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let resp = send(&state, authed("PATCH", "/api/admin/partnership/99", &cookie, body(json!({ "status": "contacted" })))).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp = send(&state, authed("PATCH", "/api/admin/partnership/1", &cookie, body(json!({ "status": "contacted" })))).await;
        assert_eq!(body_json(resp).await["status"], "contacted");

        let uri = "/api/admin/partnership?status=contacted";
        let page = body_json(send(&state, authed("GET", uri, &cookie, Body::empty())).await).await;
        assert_eq!(page["pagination"]["total"], 1);
        assert_eq!(page["inquiries"][0]["email"], "a@mops.pl");
    }
}
