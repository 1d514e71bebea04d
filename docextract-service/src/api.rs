//! HTTP API for the document extraction service.
//!
//! - `POST /api/documents/extract` starts an extraction job
//! - `GET /api/documents/extract/{job_id}` polls it
//! - `GET /health` reports service and vision-service status

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::extraction::{ExtractionService, VisionProcessor};

pub mod extraction;
use extraction::{extract_handler, get_result_handler};

/// Application state
pub struct AppState {
    pub service: Arc<ExtractionService>,
    pub vision: Option<Arc<VisionProcessor>>,
    pub start_time: Instant,
}

/// Build the API router
pub fn router(
    service: Arc<ExtractionService>,
    vision: Option<Arc<VisionProcessor>>,
    max_upload_bytes: usize,
) -> Router {
    let state = Arc::new(AppState {
        service,
        vision,
        start_time: Instant::now(),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route(
            "/documents/extract",
            post(extract_handler).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/documents/extract/{job_id}", get(get_result_handler));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// === Health ===

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let vision_available = match &state.vision {
        Some(vision) => Some(vision.health_check().await),
        None => None,
    };

    let status = match vision_available {
        Some(false) => "degraded: vision service unavailable",
        _ => "healthy",
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        active_jobs: state.service.job_count(),
        vision_configured: state.vision.is_some(),
        vision_available: vision_available.unwrap_or(false),
    })
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_seconds: u64,
    active_jobs: usize,
    vision_configured: bool,
    vision_available: bool,
}
