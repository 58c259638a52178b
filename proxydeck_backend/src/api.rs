use crate::aliases::AliasService;
use crate::auth::{self, AuthState};
use crate::bootstrap::DeckServices;
use crate::config::DeckConfig;
use crate::dispatch::{DispatchError, DispatchOutcome, DispatchService, RefreshRequest};
use crate::events::{EventLog, EVENT_TAIL_LIMIT};
use crate::pages;
use crate::registry::{ProxyView, RegistryError, RegistryService, ReportInput};
use crate::settings::{ConsoleSettings, SettingsService, SettingsUpdate};
use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Everything the handlers need, cheap to clone per request.
#[derive(Clone)]
pub struct AppState {
    pub config: DeckConfig,
    pub auth: AuthState,
    pub registry: RegistryService,
    pub aliases: AliasService,
    pub settings: SettingsService,
    pub events: EventLog,
    pub dispatch: DispatchService,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl ApiError {
    fn into_response_parts(self) -> (StatusCode, ErrorResponse) {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ErrorResponse { error: msg }),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorResponse { error: msg }),
            ApiError::Internal(err) => {
                tracing::error!(error = ?err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse {
                        error: "internal server error".into(),
                    },
                )
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.into_response_parts();
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Binds the console and serves it until the process stops.
pub async fn serve_http(config: DeckConfig, services: DeckServices) -> Result<()> {
    let auth_state = AuthState::new(config.api_token.clone(), config.admin_path.clone());
    let admin_path = config.admin_path.clone();
    let api_port = config.api_port;

    let state = AppState {
        config,
        auth: auth_state.clone(),
        registry: services.registry,
        aliases: services.aliases,
        settings: services.settings,
        events: services.events,
        dispatch: services.dispatch,
    };

    let public = Router::new()
        .route("/", get(pages::index))
        .route("/logout", get(pages::logout))
        .route(
            &format!("{admin_path}/login"),
            get(pages::login_form).post(pages::login_submit),
        );

    let admin_pages = Router::new()
        .route(&admin_path, get(pages::admin_panel))
        .route(&format!("{admin_path}/logs"), get(pages::logs_page))
        .route_layer(middleware::from_fn_with_state(
            auth_state.clone(),
            auth::require_ui_auth,
        ));

    let api = Router::new()
        .route("/api/list", get(list_nodes))
        .route("/api/rename", post(rename_node))
        .route("/api/config", get(get_config).post(update_config))
        .route("/api/refresh", post(trigger_refresh))
        .route("/api/events", get(list_events))
        .route("/api/docs", get(api_docs))
        .route_layer(middleware::from_fn_with_state(
            auth_state.clone(),
            auth::require_api_auth,
        ));

    // Workers authenticate with the Authorization header alone, so the
    // report route carries its own guard.
    let report = Router::new()
        .route("/api/report", post(report_node))
        .route_layer(middleware::from_fn_with_state(
            auth_state,
            auth::require_report_auth,
        ));

    let app = Router::new()
        .merge(public)
        .merge(admin_pages)
        .merge(api)
        .merge(report)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], api_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "console listening");
    axum::serve(listener, app)
        .await
        .context("HTTP server stopped unexpectedly")?;
    Ok(())
}

#[derive(Serialize)]
struct StatusReply {
    status: &'static str,
}

#[derive(Serialize)]
struct ConfigReply {
    status: &'static str,
    config: ConsoleSettings,
}

#[derive(Serialize)]
struct RefreshReply {
    results: Vec<DispatchOutcome>,
}

#[derive(Serialize)]
struct EventsReply {
    logs: Vec<String>,
}

#[derive(Deserialize)]
struct RenameRequest {
    id: Option<String>,
    name: Option<String>,
}

async fn report_node(
    State(state): State<AppState>,
    Json(payload): Json<ReportInput>,
) -> ApiResult<StatusReply> {
    match state.registry.report(payload) {
        Ok(_) => Ok(Json(StatusReply { status: "ok" })),
        Err(RegistryError::MissingId) => Err(ApiError::BadRequest("Missing ID".to_string())),
        Err(RegistryError::Internal(err)) => Err(ApiError::Internal(err)),
    }
}

async fn list_nodes(State(state): State<AppState>) -> ApiResult<Vec<ProxyView>> {
    Ok(Json(state.registry.list()?))
}

async fn rename_node(
    State(state): State<AppState>,
    Json(payload): Json<RenameRequest>,
) -> ApiResult<StatusReply> {
    let id = payload.id.as_deref().map(str::trim).unwrap_or_default();
    if id.is_empty() {
        return Err(ApiError::BadRequest("Missing ID".to_string()));
    }
    state
        .aliases
        .set(id, payload.name.as_deref().unwrap_or_default())?;
    Ok(Json(StatusReply { status: "ok" }))
}

async fn get_config(State(state): State<AppState>) -> ApiResult<ConsoleSettings> {
    Ok(Json(state.settings.current()?))
}

async fn update_config(
    State(state): State<AppState>,
    Json(payload): Json<SettingsUpdate>,
) -> ApiResult<ConfigReply> {
    let config = state.settings.apply(payload)?;
    Ok(Json(ConfigReply {
        status: "ok",
        config,
    }))
}

async fn trigger_refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> ApiResult<RefreshReply> {
    match state.dispatch.refresh(payload).await {
        Ok(results) => Ok(Json(RefreshReply { results })),
        Err(DispatchError::NoTargets) => {
            Err(ApiError::NotFound("No targets found".to_string()))
        }
        Err(DispatchError::Internal(err)) => Err(ApiError::Internal(err)),
    }
}

async fn list_events(State(state): State<AppState>) -> ApiResult<EventsReply> {
    Ok(Json(EventsReply {
        logs: state.events.tail(EVENT_TAIL_LIMIT),
    }))
}

async fn api_docs() -> Json<serde_json::Value> {
    Json(json!({
        "meta": {
            "name": "proxydeck console API",
            "version": env!("CARGO_PKG_VERSION"),
            "auth": "Header 'Authorization: <TOKEN>' or query '?key=<TOKEN>'",
        },
        "endpoints": [
            {
                "path": "POST /api/report",
                "desc": "Worker self-report; header auth only",
                "body": {"id": "required", "ip": "...", "status": "online|changing", "tier": "..."},
            },
            {
                "path": "GET /api/list",
                "desc": "Every known node with alias and rotation note",
            },
            {
                "path": "POST /api/rename",
                "desc": "Set or clear a display alias",
                "body": {"id": "required", "name": "blank clears"},
            },
            {
                "path": "POST /api/refresh",
                "desc": "Broadcast a rotation command",
                "body": {"id": "one id", "ids": ["several"], "all": true, "tier": "standard|premium|toggle"},
            },
            {
                "path": "GET /api/config",
                "desc": "Current console settings",
            },
            {
                "path": "POST /api/config",
                "desc": "Partial settings update",
                "body": {"timezone": 8},
            },
            {
                "path": "GET /api/events",
                "desc": "Last 100 event log lines",
            },
        ],
    }))
}
