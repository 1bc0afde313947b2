//! HTTP API for training, prediction, health checks and Prometheus metrics

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use forecast_lib::{
    ErrorKind, ForecastService, Metrics, ModelInfo, PredictionError,
    PredictionRequest, PredictionResult, TrainingError,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

const DEFAULT_MODEL_TYPE: &str = "decision_tree";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ForecastService>,
}

impl AppState {
    pub fn new(service: Arc<ForecastService>) -> Self {
        Self { service }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RetrainRequest {
    #[serde(default)]
    pub model_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
struct ReadinessResponse {
    ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    detail: String,
}

/// Error returned by the forecast handlers
#[derive(Debug)]
pub struct ApiError {
    kind: ErrorKind,
    detail: String,
}

impl ApiError {
    fn internal(detail: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Internal,
            detail: detail.into(),
        }
    }

    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::BadRequest,
            detail: detail.into(),
        }
    }
}

impl From<PredictionError> for ApiError {
    fn from(e: PredictionError) -> Self {
        Self {
            kind: e.kind(),
            detail: e.to_string(),
        }
    }
}

impl From<TrainingError> for ApiError {
    fn from(e: TrainingError) -> Self {
        Self {
            kind: e.kind(),
            detail: e.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::internal(format!("worker task failed: {}", e))
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotTrained => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn kind_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::NotTrained => "model_not_trained",
        ErrorKind::NotFound => "not_found",
        ErrorKind::BadRequest => "bad_request",
        ErrorKind::Internal => "internal",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.kind);
        if status.is_server_error() {
            error!(status = status.as_u16(), detail = %self.detail, "Request failed");
        }
        let body = ErrorBody {
            error: kind_label(self.kind),
            detail: self.detail,
        };
        (status, Json(body)).into_response()
    }
}

/// An empty body is the default request; anything else must parse
fn parse_retrain_body(body: &[u8]) -> Result<RetrainRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(RetrainRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("invalid retrain body: {}", e)))
}

/// Train a new model; the body is optional and defaults to a decision tree
async fn retrain(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Metrics>, ApiError> {
    let model_type = parse_retrain_body(&body)?
        .model_type
        .unwrap_or_else(|| DEFAULT_MODEL_TYPE.to_string());

    let service = state.service.clone();
    let metrics = tokio::task::spawn_blocking(move || service.train(&model_type)).await??;
    Ok(Json(metrics))
}

async fn predict(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PredictionRequest>,
) -> Result<Json<PredictionResult>, ApiError> {
    let service = state.service.clone();
    let result = tokio::task::spawn_blocking(move || service.predict(&request)).await??;
    Ok(Json(result))
}

async fn model_info(State(state): State<Arc<AppState>>) -> Result<Json<ModelInfo>, ApiError> {
    let service = state.service.clone();
    let info = tokio::task::spawn_blocking(move || service.model_info()).await??;
    Ok(Json(info))
}

/// Health check response - the process is up
async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy",
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

/// Readiness check response - returns 200 once a model is serving, 503 otherwise
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.service.is_ready() {
        (
            StatusCode::OK,
            Json(ReadinessResponse {
                ready: true,
                reason: None,
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                ready: false,
                reason: Some("no trained model loaded"),
            }),
        )
    }
}

/// Prometheus metrics endpoint
async fn metrics() -> Result<impl IntoResponse, ApiError> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    ))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/retrain", post(retrain))
        .route("/predict", post(predict))
        .route("/model_info", get(model_info))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
