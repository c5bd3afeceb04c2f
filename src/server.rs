//! HTTP API and web interface.
//!
//! Every route sits behind HTTP Basic authentication checked against the
//! [`AuthConfig`] handed in at startup. Core operations block on external
//! commands, so handlers run them on the blocking thread pool.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::{
    headers::{authorization::Basic, Authorization},
    TypedHeader,
};
use lazy_static::lazy_static;
use serde::Deserialize;
use serde_json::json;
use tera::{Context, Tera};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::AuthConfig;
use crate::diagnostics::{DEFAULT_PING_COUNT, DEFAULT_PING_HOST};
use crate::error::WifiManagerError;
use crate::manager::WifiManager;

const INDEX_TEMPLATE: &str = include_str!("../templates/index.html");

lazy_static! {
    static ref TEMPLATES: Tera = {
        let mut tera = Tera::default();
        if let Err(e) = tera.add_raw_template("index.html", INDEX_TEMPLATE) {
            error!(error = %e, "template parsing error");
        }
        tera.autoescape_on(vec![".html"]);
        tera
    };
}

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub auth: AuthConfig,
}

#[derive(Clone)]
struct AppState {
    manager: Arc<WifiManager>,
    client_interface: String,
}

#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    pub ssid: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ForgetRequest {
    pub ssid: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PingRequest {
    pub host: Option<String>,
    pub count: Option<u32>,
}

/// Failure of the server machinery itself, as opposed to a refused operation.
struct ApiError(anyhow::Error);

impl<E: Into<anyhow::Error>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "success": false, "message": self.0.to_string() })),
        )
            .into_response()
    }
}

pub async fn run_server(manager: Arc<WifiManager>, config: ServerConfig) -> anyhow::Result<()> {
    if config.auth.is_default() {
        warn!("serving with default credentials, set [auth] in the config file");
    }

    let app = router(manager, config.auth);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "wifi manager listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Builds the full application router.
pub fn router(manager: Arc<WifiManager>, auth: AuthConfig) -> Router {
    let state = AppState {
        client_interface: manager.client_interface().to_string(),
        manager,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index_handler))
        .route("/api/scan", get(scan_handler))
        .route("/api/rescan", post(rescan_handler))
        .route("/api/current", get(current_handler))
        .route("/api/saved", get(saved_handler))
        .route("/api/connect", post(connect_handler))
        .route("/api/forget", post(forget_handler))
        .route("/api/ping", post(ping_handler))
        .route("/api/diagnostics", get(diagnostics_handler))
        .route("/api/status", get(status_handler))
        .layer(middleware::from_fn_with_state(Arc::new(auth), require_auth))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn require_auth(
    State(auth): State<Arc<AuthConfig>>,
    credentials: Option<TypedHeader<Authorization<Basic>>>,
    request: Request,
    next: Next,
) -> Response {
    match credentials {
        Some(TypedHeader(Authorization(basic))) if auth.verify(basic.username(), basic.password()) => {
            next.run(request).await
        }
        _ => (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Basic realm=\"WiFi Manager\"")],
            "Unauthorized",
        )
            .into_response(),
    }
}

/// Runs a blocking manager call off the async executor.
async fn blocking<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&WifiManager) -> T + Send + 'static,
    T: Send + 'static,
{
    let manager = state.manager.clone();
    tokio::task::spawn_blocking(move || f(&manager))
        .await
        .map_err(|e| ApiError::from(WifiManagerError::Task(e.to_string())))
}

fn ssid_required() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "message": "SSID is required" })),
    )
        .into_response()
}

async fn index_handler(State(state): State<AppState>) -> Response {
    let mut context = Context::new();
    context.insert("client_interface", &state.client_interface);
    context.insert("version", env!("CARGO_PKG_VERSION"));

    match TEMPLATES.render("index.html", &context) {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!(error = %e, "template render error");
            (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
        }
    }
}

async fn scan_handler(State(state): State<AppState>) -> Result<Response, ApiError> {
    let networks = blocking(&state, |m| m.scan()).await?;
    Ok(Json(json!({ "success": true, "networks": networks })).into_response())
}

async fn rescan_handler(State(state): State<AppState>) -> Result<Response, ApiError> {
    let networks = blocking(&state, |m| m.rescan()).await?;
    Ok(Json(json!({ "success": true, "networks": networks })).into_response())
}

async fn current_handler(State(state): State<AppState>) -> Result<Response, ApiError> {
    let (current, ip) = blocking(&state, |m| (m.current(), m.current_ip())).await?;
    Ok(Json(json!({ "success": true, "current": current, "ip": ip })).into_response())
}

async fn saved_handler(State(state): State<AppState>) -> Result<Response, ApiError> {
    let saved = blocking(&state, |m| m.saved_networks()).await??;
    Ok(Json(json!({ "success": true, "networks": saved })).into_response())
}

async fn connect_handler(
    State(state): State<AppState>,
    Json(body): Json<ConnectRequest>,
) -> Result<Response, ApiError> {
    let Some(ssid) = body.ssid.filter(|s| !s.is_empty()) else {
        return Ok(ssid_required());
    };
    let password = body.password;

    let outcome = blocking(&state, move |m| m.connect(&ssid, password.as_deref())).await?;
    Ok(Json(outcome).into_response())
}

async fn forget_handler(
    State(state): State<AppState>,
    Json(body): Json<ForgetRequest>,
) -> Result<Response, ApiError> {
    let Some(ssid) = body.ssid.filter(|s| !s.is_empty()) else {
        return Ok(ssid_required());
    };

    let outcome = blocking(&state, move |m| m.forget(&ssid)).await?;
    Ok(Json(outcome).into_response())
}

async fn ping_handler(
    State(state): State<AppState>,
    body: Option<Json<PingRequest>>,
) -> Result<Response, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let host = body.host.unwrap_or_else(|| DEFAULT_PING_HOST.to_string());
    let count = body.count.unwrap_or(DEFAULT_PING_COUNT);

    let report = blocking(&state, move |m| m.ping(&host, count)).await?;
    Ok(Json(report).into_response())
}

async fn diagnostics_handler(State(state): State<AppState>) -> Result<Response, ApiError> {
    let diagnostics = blocking(&state, |m| m.collect_diagnostics()).await?;
    Ok(Json(json!({ "success": true, "diagnostics": diagnostics })).into_response())
}

async fn status_handler(State(state): State<AppState>) -> Result<Response, ApiError> {
    let status = blocking(&state, |m| m.status()).await??;
    Ok(Json(json!({
        "success": true,
        "current": status.current,
        "ip": status.ip,
        "saved_count": status.saved_count,
    }))
    .into_response())
}
