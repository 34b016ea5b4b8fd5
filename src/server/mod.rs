mod admin;
mod auth;
mod error;
mod public;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use axum::Router;
use axum::http::HeaderMap;
use axum::middleware;
use axum::routing::{delete, get, patch, post};
use chrono::{DateTime, Utc};
use duckdb::Connection;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

use crate::cli::ServeArgs;
use crate::geocode::Geocoder;
use crate::storage::{StoragePaths, file_present_nonempty};

pub use error::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub admin_password: Option<String>,
    pub admin_enabled: bool,
    pub public_base_url: String,
    pub secure_cookies: bool,
}

/// Live admin sessions: token -> expiry.
pub type Sessions = Arc<Mutex<HashMap<String, DateTime<Utc>>>>;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub sessions: Sessions,
    pub config: Arc<ServerConfig>,
    pub geocoder: Geocoder,
}

impl AppState {
    pub fn new(conn: Connection, config: ServerConfig, geocoder: Geocoder) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            sessions: Arc::new(Mutex::new(HashMap::new())),
            config: Arc::new(config),
            geocoder,
        }
    }
}

pub async fn run(opts: ServeArgs) -> anyhow::Result<()> {
    let paths = StoragePaths::new(&opts.data_dir);
    if !file_present_nonempty(&paths.duckdb_path) {
        return Err(anyhow!(
            "DuckDB not found at {}. Run: kompas-backend import",
            paths.duckdb_path.display()
        ));
    }
    let conn = crate::db::open(&paths.duckdb_path)?;

    if opts.admin_enabled && opts.admin_password.is_none() {
        tracing::warn!("ADMIN_PASSWORD is not set; admin login will fail");
    }
    let config = ServerConfig {
        admin_password: opts.admin_password.clone(),
        admin_enabled: opts.admin_enabled,
        public_base_url: opts.public_base_url.trim_end_matches('/').to_string(),
        secure_cookies: opts.secure_cookies,
    };
    let geocoder = Geocoder::new(&opts.nominatim_url)?;
    let app = router(AppState::new(conn, config, geocoder));

    let addr: SocketAddr = format!("{}:{}", opts.host, opts.port)
        .parse()
        .context("parse host:port")?;

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let protected = Router::new()
        .route(
            "/facilities",
            get(admin::list_facilities).post(admin::create_facility),
        )
        .route("/facilities/check-duplicate", get(admin::check_duplicate))
        .route(
            "/facilities/:id",
            get(admin::get_facility)
                .put(admin::update_facility)
                .delete(admin::delete_facility),
        )
        .route("/prices", get(admin::list_prices).post(admin::upsert_prices))
        .route("/prices/:facility_id/:year", delete(admin::delete_price))
        .route("/prices/import/preview", post(admin::import_preview))
        .route("/prices/import", post(admin::import_apply))
        .route("/prices/export", get(admin::export_prices))
        .route("/export/facilities", get(admin::export_facilities))
        .route("/analytics", get(admin::analytics))
        .route("/security-log", get(admin::security_log))
        .route("/partnership", get(admin::list_inquiries))
        .route("/partnership/:id", patch(admin::update_inquiry_status))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session,
        ));

    let admin_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .merge(protected)
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_enabled,
        ));

    Router::new()
        .route("/api/search", get(public::search))
        .route("/api/suggest", get(public::suggest))
        .route("/api/facilities", get(public::list_facilities))
        .route("/api/facilities/counts", get(public::facility_counts))
        .route("/api/facilities/:id", get(public::facility_detail))
        .route("/api/facilities/:id/prices", get(public::facility_prices))
        .route("/api/stats", get(public::stats))
        .route("/api/recommendations", post(public::recommendations))
        .route("/api/geocode", get(public::geocode))
        .route("/api/share", post(public::create_share))
        .route("/api/share/:token", get(public::resolve_share))
        .route(
            "/api/analytics/track",
            get(public::facility_event_counts).post(public::track_facility_event),
        )
        .route("/api/analytics/app-track", post(public::track_app_event))
        .route("/api/mops", get(public::mops))
        .route("/api/partnership", post(public::submit_inquiry))
        .nest("/api/admin", admin_routes)
        .layer(cors)
        .with_state(state)
}

/// First `x-forwarded-for` entry, then `x-real-ip`, then `"unknown"`.
pub(crate) fn client_ip(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    forwarded.or(real).unwrap_or("unknown").to_string()
}

pub(crate) fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// `"a,b" , "c"` -> `["a", "b", "c"]`, skipping blanks.
pub(crate) fn flatten_list(v: Option<&str>) -> Vec<String> {
    let Some(raw) = v else {
        return Vec::new();
    };
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, Response};
    use tower::ServiceExt;

    use super::*;

    pub fn state_with(conn: Connection, password: Option<&str>, enabled: bool) -> AppState {
        let config = ServerConfig {
            admin_password: password.map(str::to_string),
            admin_enabled: enabled,
            public_base_url: "https://kompas.test".to_string(),
            secure_cookies: false,
        };
        let geocoder = Geocoder::new("http://127.0.0.1:9").unwrap();
        AppState::new(conn, config, geocoder)
    }

    pub fn test_state() -> AppState {
        state_with(crate::db::open_in_memory().unwrap(), Some("tajne"), true)
    }

    pub async fn send(state: &AppState, req: Request<Body>) -> Response<Body> {
        router(state.clone()).oneshot(req).await.unwrap()
    }

    pub async fn body_json(resp: Response<Body>) -> serde_json::Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    pub async fn body_text(resp: Response<Body>) -> String {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    pub fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_ip() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), "unknown");
        headers.insert("x-real-ip", "10.0.0.2".parse().unwrap());
        assert_eq!(client_ip(&headers), "10.0.0.2");
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers), "203.0.113.7");
    }

    #[test]
    fn test_flatten_list() {
        assert!(flatten_list(None).is_empty());
        assert_eq!(flatten_list(Some("a, b,,c ")), vec!["a", "b", "c"]);
    }
}
