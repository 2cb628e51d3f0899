//! HTTP diagnostic surface for medctx.
//!
//! Exposes the aggregator over a small JSON API: context aggregation,
//! classification, patient insights, stats, and cache control.
//!
//! Built on Axum.

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use medctx_aggregator::{Aggregator, AggregatorStats, FetchRequest, HealthStatus};
use medctx_core::error::Error;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub aggregator: Arc<Aggregator>,
    pub started_at: DateTime<Utc>,
}

type SharedState = Arc<GatewayState>;

impl GatewayState {
    pub fn new(aggregator: Arc<Aggregator>) -> SharedState {
        Arc::new(Self {
            aggregator,
            started_at: Utc::now(),
        })
    }
}

/// Build the Axum router with all gateway routes.
///
/// Layers applied:
/// - CORS restricted to the local dashboard origin
/// - Request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::exact(HeaderValue::from_static(
            "http://localhost:8080",
        )))
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/context", post(context_handler))
        .route("/api/classify", post(classify_handler))
        .route("/api/insights/{subject_id}", get(insights_handler))
        .route("/api/stats", get(stats_handler))
        .route("/api/cache", delete(clear_cache_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1 MB body limit
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
pub async fn start(
    config: &medctx_config::AppConfig,
    aggregator: Arc<Aggregator>,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let app = build_router(GatewayState::new(aggregator));

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Errors ---

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Maps domain errors onto HTTP status codes.
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            other => {
                warn!(error = %other, "Request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    #[serde(flatten)]
    report: medctx_aggregator::HealthReport,
    version: &'static str,
}

async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let report = state.aggregator.health().await;
    let code = match report.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::SERVICE_UNAVAILABLE,
    };
    (
        code,
        Json(HealthResponse {
            report,
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

async fn context_handler(
    State(state): State<SharedState>,
    Json(request): Json<FetchRequest>,
) -> Result<Response, ApiError> {
    let context = state.aggregator.fetch(request).await?;
    Ok(Json(context.as_ref()).into_response())
}

#[derive(Deserialize)]
struct ClassifyRequest {
    query: String,
}

async fn classify_handler(
    State(state): State<SharedState>,
    Json(request): Json<ClassifyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.aggregator.classify(&request.query)?))
}

async fn insights_handler(
    State(state): State<SharedState>,
    Path(subject_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.aggregator.insights(&subject_id).await?))
}

#[derive(Serialize)]
struct StatsResponse {
    #[serde(flatten)]
    stats: AggregatorStats,
    uptime_secs: i64,
}

async fn stats_handler(State(state): State<SharedState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        stats: state.aggregator.stats(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    })
}

#[derive(Serialize)]
struct ClearedResponse {
    cleared: bool,
}

async fn clear_cache_handler(
    State(state): State<SharedState>,
) -> Result<Json<ClearedResponse>, ApiError> {
    state.aggregator.clear_cache().await?;
    Ok(Json(ClearedResponse { cleared: true }))
}
