//! HTTP endpoint serving the registry in the text exposition format
//!
//! ## Endpoints
//!
//! - `GET /metrics` - Runs a scrape (optionally behind a bearer token)
//! - `GET /health` - Liveness check, never scrapes

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus::{Encoder, Registry, TextEncoder};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Bind address (e.g., "0.0.0.0:9663")
    pub bind_addr: SocketAddr,

    /// Optional bearer token protecting `/metrics`
    pub auth_token: Option<String>,
}

/// Build the router serving `registry`
pub fn router(registry: Registry, auth_token: Option<String>) -> Router {
    let mut metrics = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(registry);

    if let Some(token) = auth_token {
        metrics = metrics.route_layer(axum::middleware::from_fn_with_state(
            Arc::<str>::from(token),
            require_token,
        ));
    }

    Router::new()
        .route("/health", get(health_handler))
        .merge(metrics)
        .layer(TraceLayer::new_for_http())
}

/// Spawn the HTTP server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
pub async fn spawn_http_server(
    config: HttpConfig,
    registry: Registry,
) -> anyhow::Result<SocketAddr> {
    info!("starting HTTP server on {}", config.bind_addr);

    let app = router(registry, config.auth_token);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("HTTP server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    });

    Ok(addr)
}

/// GET /health
async fn health_handler() -> &'static str {
    "ok"
}

/// GET /metrics
///
/// Gathering runs registered collectors synchronously, so it is moved to the
/// blocking pool.
async fn metrics_handler(State(registry): State<Registry>) -> Result<Response, MetricsError> {
    let families = tokio::task::spawn_blocking(move || registry.gather())
        .await
        .map_err(|e| MetricsError::Gather(e.to_string()))?;

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&families, &mut buffer)
        .map_err(|e| MetricsError::Encode(e.to_string()))?;

    Ok((
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response())
}

/// Errors while producing the exposition
#[derive(Debug)]
pub enum MetricsError {
    Gather(String),
    Encode(String),
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> Response {
        let message = match self {
            MetricsError::Gather(msg) => format!("failed to gather metrics: {msg}"),
            MetricsError::Encode(msg) => format!("failed to encode metrics: {msg}"),
        };
        error!("{message}");

        (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
    }
}

/// Lets a scrape through only if it carries the configured bearer token
async fn require_token(
    State(token): State<Arc<str>>,
    request: Request,
    next: Next,
) -> Result<Response, TokenRejection> {
    match bearer_token(request.headers()) {
        None => Err(TokenRejection::Missing),
        Some(presented) if presented == &*token => Ok(next.run(request).await),
        Some(_) => Err(TokenRejection::Mismatch),
    }
}

/// Token of an `Authorization: Bearer <token>` header, scheme case-insensitive
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
}

/// Why a scrape was turned away
#[derive(Debug, PartialEq)]
enum TokenRejection {
    /// No bearer credentials at all
    Missing,
    Mismatch,
}

impl IntoResponse for TokenRejection {
    fn into_response(self) -> Response {
        match self {
            TokenRejection::Missing => (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, "Bearer")],
                "bearer token required",
            )
                .into_response(),
            TokenRejection::Mismatch => {
                warn!("rejected scrape with a wrong token");
                (StatusCode::FORBIDDEN, "token rejected").into_response()
            }
        }
    }
}
