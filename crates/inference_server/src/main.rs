use std::{net::SocketAddr, path::Path, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use inference::{AnalysisError, AnalysisRequest, InferenceEngine, MockInferenceEngine};
use scan_core::{catalog::Catalog, ingest::is_image_media_type};
use shared::{
    domain::UploadedFile,
    error::{ApiError, ErrorCode},
    protocol::{CategoryListResponse, PredictRequest, PredictResponse},
};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::load_settings;

/// Room for the JSON envelope around the base64 payload.
const ENVELOPE_HEADROOM_BYTES: usize = 64 * 1024;

struct AppState {
    catalog: Catalog,
    engine: Arc<dyn InferenceEngine>,
    max_upload_bytes: usize,
}

type HttpError = (StatusCode, Json<ApiError>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = load_settings();
    let catalog = match settings.catalog_path.as_deref() {
        Some(path) => Catalog::load_file(Path::new(path))
            .with_context(|| format!("failed to load catalog from '{path}'"))?,
        None => Catalog::builtin(),
    };

    let mut engine = MockInferenceEngine::new();
    if let Some(ms) = settings.simulated_latency_ms {
        engine = engine.with_latency(Duration::from_millis(ms));
    }

    let state = AppState {
        catalog,
        engine: Arc::new(engine),
        max_upload_bytes: usize::try_from(settings.max_upload_bytes)
            .context("max_upload_bytes does not fit in memory on this platform")?,
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, max_upload_bytes = settings.max_upload_bytes, "inference server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = transport_limit(state.max_upload_bytes);
    Router::new()
        .route("/healthz", get(healthz))
        .route("/categories", get(list_categories))
        .route("/predict", post(predict))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .with_state(state)
}

/// Largest request body that can still carry `max_upload_bytes` of image
/// data once base64-encoded.
fn transport_limit(max_upload_bytes: usize) -> usize {
    max_upload_bytes
        .saturating_add(2)
        .saturating_div(3)
        .saturating_mul(4)
        .saturating_add(ENVELOPE_HEADROOM_BYTES)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn list_categories(State(state): State<Arc<AppState>>) -> Json<CategoryListResponse> {
    Json(CategoryListResponse {
        categories: state.catalog.categories().to_vec(),
    })
}

async fn predict(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PredictRequest>,
) -> Result<Json<PredictResponse>, HttpError> {
    let Some(category) = state.catalog.get(&req.category_id) else {
        return Err(bad_request(format!(
            "unknown category '{}'",
            req.category_id
        )));
    };

    if !is_image_media_type(&req.media_type) {
        return Err(bad_request(format!(
            "unsupported type: {}",
            req.media_type
        )));
    }

    let bytes = STANDARD
        .decode(req.image_b64.as_bytes())
        .map_err(|error| bad_request(format!("image_b64 is not valid base64: {error}")))?;
    if bytes.is_empty() {
        return Err(bad_request("image body cannot be empty"));
    }
    if bytes.len() > state.max_upload_bytes {
        return Err((
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(ApiError::new(
                ErrorCode::Validation,
                format!("image exceeds {} bytes", state.max_upload_bytes),
            )),
        ));
    }

    let preview_data_uri = format!("data:{};base64,{}", req.media_type, req.image_b64);
    let request = AnalysisRequest {
        file: UploadedFile {
            file_name: req.file_name,
            media_type: req.media_type,
            bytes,
            preview_data_uri,
            uploaded_at: Utc::now(),
        },
        category: category.clone(),
    };

    match state.engine.analyze(&request).await {
        Ok(result) => {
            info!(
                category = %request.category.id,
                file_name = %request.file.file_name,
                detected = result.detected(),
                confidence = result.confidence().value(),
                "prediction served"
            );
            Ok(Json(PredictResponse::from(&result)))
        }
        Err(error) => {
            warn!(
                category = %request.category.id,
                file_name = %request.file.file_name,
                %error,
                "prediction failed"
            );
            Err(analysis_failure(&error))
        }
    }
}

fn bad_request(message: impl Into<String>) -> HttpError {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiError::new(ErrorCode::Validation, message)),
    )
}

fn analysis_failure(error: &AnalysisError) -> HttpError {
    let (status, code) = match error {
        AnalysisError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, ErrorCode::Timeout),
        AnalysisError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, ErrorCode::Unavailable),
        AnalysisError::Engine(_)
        | AnalysisError::Backend { .. }
        | AnalysisError::InvalidResponse(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::Internal)
        }
    };
    (status, Json(ApiError::new(code, error.to_string())))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
