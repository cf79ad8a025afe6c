//! HTTP server implementation

use crate::error::{ApiError, Result, ServerError, status_for};
use crate::openapi::{DOCS_HTML, openapi_document};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, State, rejection::BytesRejection},
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use safe_exec::{Engine, ExecutionOutcome};
use safe_exec_common::{ErrorBody, ErrorCode};
use serde_json::{Value, json};
use std::{net::SocketAddr, sync::Arc};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Bytes of JSON framing allowed on top of the escaped script.
const BODY_OVERHEAD_BYTES: usize = 4096;

/// Configuration for the HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind. Use port 0 to bind to a random available port.
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

#[derive(Clone)]
struct AppState {
    engine: Arc<Engine>,
}

/// Largest body accepted before the script is even looked at. JSON escaping
/// grows a script at most six-fold (`\u0001` for one control byte), so any
/// script within the ceiling fits however it is escaped.
pub fn body_limit(max_script_bytes: usize) -> usize {
    max_script_bytes
        .saturating_mul(6)
        .saturating_add(BODY_OVERHEAD_BYTES)
}

/// Build the service router around a shared engine.
pub fn build_router(engine: Arc<Engine>) -> Router {
    let limit = body_limit(engine.config().script_limits.max_script_bytes);
    Router::new()
        .route("/health", get(health_check))
        .route("/execute", post(handle_execute))
        .route("/openapi.json", get(openapi_json))
        .route("/docs", get(swagger_ui))
        .layer(DefaultBodyLimit::max(limit))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { engine })
}

/// Bind and serve until ctrl-c / SIGTERM.
pub async fn start_server(config: ServerConfig, engine: Arc<Engine>) -> Result<()> {
    let app = build_router(engine);

    // Bind first to learn the actual port when port 0 is used.
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: config.bind_addr,
            source,
        })?;
    let local_addr = listener.local_addr().map_err(ServerError::Serve)?;
    info!("safe_exec listening on http://{}", local_addr);
    info!("Execute endpoint (POST): http://{}/execute", local_addr);
    info!("API docs: http://{}/docs", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ServerError::Serve)?;

    info!("safe_exec stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

async fn health_check() -> Json<Value> {
    Json(json!({ "ok": true }))
}

async fn openapi_json() -> Json<Value> {
    Json(openapi_document())
}

async fn swagger_ui() -> Html<&'static str> {
    Html(DOCS_HTML)
}

/// Whether the request declares a JSON body (`application/json` or any
/// `application/*+json`, parameters allowed).
pub fn is_json_content_type(headers: &HeaderMap) -> bool {
    let Some(value) = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let mime = value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
}

async fn handle_execute(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Response {
    if !is_json_content_type(&headers) {
        return ApiError::new(
            ErrorCode::BadContentType,
            "Content-Type must be application/json",
        )
        .into_response();
    }

    let body = match body {
        Ok(body) => body,
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            let limit = state.engine.config().script_limits.max_script_bytes;
            debug!("Rejected oversized request body: {}", rejection);
            return ApiError::new(
                ErrorCode::ScriptTooLarge,
                format!("Script exceeds {limit} bytes"),
            )
            .into_response();
        }
        Err(rejection) => {
            debug!("Failed to read request body: {}", rejection);
            return ApiError::new(ErrorCode::BadBody, "Request body must be a JSON object")
                .into_response();
        }
    };

    let report = state.engine.execute_body(&body).await;
    outcome_response(report.outcome)
}

fn outcome_response(outcome: ExecutionOutcome) -> Response {
    match outcome {
        ExecutionOutcome::Success { .. } => (StatusCode::OK, Json(outcome)).into_response(),
        ExecutionOutcome::Failure { error } => error_response(error),
    }
}

fn error_response(error: ErrorBody) -> Response {
    debug!(code = %error.code, status = %status_for(error.code), "Request failed");
    ApiError(error).into_response()
}
