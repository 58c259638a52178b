use axum::extract::{Query, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use indexmap::IndexSet;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "session";
pub const TOKEN_COOKIE: &str = "auth_token";

/// Upper bound on live login sessions. Logins without a matching logout
/// would otherwise accumulate for the life of the process; past the cap
/// the oldest session is evicted first.
const MAX_SESSIONS: usize = 64;

/// Shared authorization state: the static operator token plus the set of
/// sessions opened through the login form, newest last.
#[derive(Clone)]
pub struct AuthState {
    token: Arc<String>,
    admin_path: String,
    sessions: Arc<Mutex<IndexSet<String>>>,
}

impl AuthState {
    pub fn new(token: impl Into<String>, admin_path: impl Into<String>) -> Self {
        Self {
            token: Arc::new(token.into()),
            admin_path: admin_path.into(),
            sessions: Arc::new(Mutex::new(IndexSet::new())),
        }
    }

    pub fn token_matches(&self, candidate: &str) -> bool {
        candidate == self.token.as_str()
    }

    /// Opens a fresh login session and returns its id.
    pub fn open_session(&self) -> String {
        let id = Uuid::new_v4().to_string();
        let mut sessions = self.lock_sessions();
        sessions.insert(id.clone());
        while sessions.len() > MAX_SESSIONS {
            sessions.shift_remove_index(0);
        }
        id
    }

    pub fn close_session(&self, id: &str) {
        self.lock_sessions().shift_remove(id);
    }

    fn session_is_live(&self, id: &str) -> bool {
        self.lock_sessions().contains(id)
    }

    pub fn login_url(&self) -> String {
        format!("{}/login", self.admin_path)
    }

    /// Accepts a request that carries the token in the `Authorization`
    /// header or the `key` query parameter, holds a live login session, or
    /// presents the long-lived token cookie. Checked in that order.
    fn request_is_authorized(&self, request: &Request) -> bool {
        if let Some(header) = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
        {
            if self.token_matches(header) {
                return true;
            }
        }

        if let Ok(Query(params)) =
            Query::<HashMap<String, String>>::try_from_uri(request.uri())
        {
            if let Some(key) = params.get("key") {
                if self.token_matches(key) {
                    return true;
                }
            }
        }

        let jar = CookieJar::from_headers(request.headers());
        if let Some(session) = jar.get(SESSION_COOKIE) {
            if self.session_is_live(session.value()) {
                return true;
            }
        }
        if let Some(cookie) = jar.get(TOKEN_COOKIE) {
            if self.token_matches(cookie.value()) {
                return true;
            }
        }

        false
    }

    // Session bookkeeping must survive a panicked holder; the set stays valid.
    fn lock_sessions(&self) -> MutexGuard<'_, IndexSet<String>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Guards the JSON surface: unauthorized callers get the flat 403 body
/// scripts and workers match on.
pub async fn require_api_auth(
    State(auth): State<AuthState>,
    request: Request,
    next: Next,
) -> Response {
    if auth.request_is_authorized(&request) {
        return next.run(request).await;
    }
    forbidden()
}

/// Guards operator pages: browsers get bounced to the login form instead of
/// a bare 403.
pub async fn require_ui_auth(
    State(auth): State<AuthState>,
    request: Request,
    next: Next,
) -> Response {
    if auth.request_is_authorized(&request) {
        return next.run(request).await;
    }
    Redirect::to(&auth.login_url()).into_response()
}

/// The report endpoint trusts only the `Authorization` header. Query keys
/// and operator cookies do not count for worker traffic.
pub async fn require_report_auth(
    State(auth): State<AuthState>,
    request: Request,
    next: Next,
) -> Response {
    let authorized = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|header| auth.token_matches(header));

    if authorized {
        return next.run(request).await;
    }
    forbidden()
}

pub fn forbidden() -> Response {
    (StatusCode::FORBIDDEN, Json(json!({ "error": "Forbidden" }))).into_response()
}
