use axum::Json;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::{Duration, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::Deserialize;

use super::{AppError, AppResult, AppState, client_ip, header_str};
use crate::db::{format_ts, security};
use crate::model::SecurityEvent;

pub const SESSION_COOKIE: &str = "admin_session";
const SESSION_HOURS: i64 = 24;
const TOKEN_LEN: usize = 32;
const MAX_FAILED_LOGINS: i64 = 5;
const LOCKOUT_MINUTES: i64 = 15;

fn new_session_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Value of `name` in the `Cookie` header, if present.
fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_string())
        .filter(|v| !v.is_empty())
}

fn session_cookie(token: &str, max_age: i64, secure: bool) -> String {
    let mut cookie = format!("{SESSION_COOKIE}={token}; HttpOnly; SameSite=Strict; Max-Age={max_age}; Path=/");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn with_cookie(cookie: String, body: serde_json::Value) -> AppResult<Response> {
    let value = HeaderValue::from_str(&cookie).map_err(|e| anyhow::anyhow!("bad cookie header: {e}"))?;
    let mut resp = Json(body).into_response();
    resp.headers_mut().insert(header::SET_COOKIE, value);
    Ok(resp)
}

pub(super) async fn require_enabled(State(st): State<AppState>, req: Request, next: Next) -> Response {
    if !st.config.admin_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }
    next.run(req).await
}

pub(super) async fn require_session(State(st): State<AppState>, req: Request, next: Next) -> Response {
    let Some(token) = cookie_value(req.headers(), SESSION_COOKIE) else {
        return AppError::Unauthorized.into_response();
    };
    {
        let mut sessions = st.sessions.lock().await;
        let live = sessions.get(&token).copied().is_some_and(|expires| expires > Utc::now());
        if !live {
            sessions.remove(&token);
            return AppError::Unauthorized.into_response();
        }
    }
    next.run(req).await
}

#[derive(Debug, Deserialize)]
pub(super) struct LoginBody {
    #[serde(default)]
    password: String,
}

pub(super) async fn login(
    State(st): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<LoginBody>,
) -> AppResult<Response> {
    let ip = client_ip(&headers);
    let user_agent = header_str(&headers, "user-agent");
    let now = Utc::now();
    let ts = format_ts(now);

    let conn = st.db.lock().await;
    let since = format_ts(now - Duration::minutes(LOCKOUT_MINUTES));
    let attempts = security::failed_logins_since(&conn, &ip, &since)?;
    if attempts >= MAX_FAILED_LOGINS {
        let meta = serde_json::json!({ "attempts": attempts });
        security::log(&conn, SecurityEvent::RateLimit, Some(&ip), user_agent.as_deref(), Some(&meta), &ts)?;
        tracing::warn!(ip = %ip, attempts, "admin login rate limited");
        return Err(AppError::TooManyRequests(
            "Zbyt wiele prób logowania. Spróbuj ponownie za 15 minut.".to_string(),
        ));
    }

    let Some(expected) = st.config.admin_password.as_deref() else {
        tracing::error!("ADMIN_PASSWORD not configured");
        return Err(AppError::Server("Błąd konfiguracji serwera".to_string()));
    };

    if body.password != expected {
        let meta = serde_json::json!({
            "passwordLength": body.password.chars().count(),
            "attempts": attempts + 1,
        });
        security::log(&conn, SecurityEvent::LoginFailed, Some(&ip), user_agent.as_deref(), Some(&meta), &ts)?;
        tracing::warn!(ip = %ip, attempts = attempts + 1, "admin login failed");
        return Err(AppError::WrongPassword("Nieprawidłowe hasło".to_string()));
    }

    security::log(&conn, SecurityEvent::LoginSuccess, Some(&ip), user_agent.as_deref(), None, &ts)?;
    drop(conn);

    let token = new_session_token();
    {
        let mut sessions = st.sessions.lock().await;
        sessions.retain(|_, expires| *expires > now);
        sessions.insert(token.clone(), now + Duration::hours(SESSION_HOURS));
    }
    tracing::info!(ip = %ip, "admin logged in");

    with_cookie(
        session_cookie(&token, SESSION_HOURS * 3600, st.config.secure_cookies),
        serde_json::json!({ "success": true }),
    )
}

pub(super) async fn logout(State(st): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    if let Some(token) = cookie_value(&headers, SESSION_COOKIE) {
        st.sessions.lock().await.remove(&token);
    }
    let ip = client_ip(&headers);
    let user_agent = header_str(&headers, "user-agent");
    {
        let conn = st.db.lock().await;
        security::log(
            &conn,
            SecurityEvent::Logout,
            Some(&ip),
            user_agent.as_deref(),
            None,
            &format_ts(Utc::now()),
        )?;
    }
    with_cookie(
        session_cookie("", 0, st.config.secure_cookies),
        serde_json::json!({ "success": true }),
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;

    use super::*;
    use crate::server::test_support::*;

    /// Logs in with the test password and returns the `Cookie` header value.
    pub async fn login_cookie(state: &AppState) -> String {
        let resp = send(state, json_request("POST", "/api/admin/login", json!({ "password": "tajne" }))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let set = resp.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
        set.split(';').next().unwrap().to_string()
    }

    pub fn authed(method: &str, uri: &str, cookie: &str, body: Body) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::COOKIE, cookie)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .unwrap()
    }

    #[test]
    fn test_cookie_value() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, "theme=dark; admin_session=abc123".parse().unwrap());
        assert_eq!(cookie_value(&headers, SESSION_COOKIE).as_deref(), Some("abc123"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn test_session_cookie_flags() {
        let c = session_cookie("tok", 86400, true);
        assert_eq!(c, "admin_session=tok; HttpOnly; SameSite=Strict; Max-Age=86400; Path=/; Secure");
    }

    #[tokio::test]
    async fn test_login_sets_session_and_unlocks_admin() {
        let state = test_state();
        let resp = send(&state, get("/api/admin/security-log")).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let cookie = login_cookie(&state).await;
        assert!(cookie.starts_with("admin_session="));

        let resp = send(&state, authed("GET", "/api/admin/security-log", &cookie, Body::empty())).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["entries"][0]["event_type"], "login_success");

        let resp = send(&state, authed("POST", "/api/admin/logout", &cookie, Body::empty())).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let resp = send(&state, authed("GET", "/api/admin/security-log", &cookie, Body::empty())).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_wrong_password_then_rate_limit() {
        let state = test_state();
        for _ in 0..5 {
            let req = json_request("POST", "/api/admin/login", json!({ "password": "zle" }));
            let resp = send(&state, req).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(body_json(resp).await["error"], "Nieprawidłowe hasło");
        }
        let resp = send(&state, json_request("POST", "/api/admin/login", json!({ "password": "tajne" }))).await;
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);

        let conn = state.db.lock().await;
        let log = security::recent(&conn, 10).unwrap();
        assert_eq!(log[0].event_type, "rate_limit");
        assert_eq!(log[1].metadata.as_ref().unwrap()["attempts"], 5);
    }

    #[tokio::test]
    async fn test_missing_password_config() {
        let state = state_with(crate::db::open_in_memory().unwrap(), None, true);
        let resp = send(&state, json_request("POST", "/api/admin/login", json!({ "password": "x" }))).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(resp).await["error"], "Błąd konfiguracji serwera");
    }

    #[tokio::test]
    async fn test_disabled_admin_is_not_found() {
        let state = state_with(crate::db::open_in_memory().unwrap(), Some("tajne"), false);
        let resp = send(&state, json_request("POST", "/api/admin/login", json!({ "password": "tajne" }))).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp = send(&state, get("/api/admin/facilities")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
