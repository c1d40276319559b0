//! REST API server for field reports
//!
//! Routes:
//! - `POST /api/upload-video`: site video in, report keys and URLs out
//! - `GET`/`POST /api/report`: read or overwrite a report document
//! - `POST`/`DELETE /api/report-image`: operator image edits
//! - `GET /api/browse-reports` and `GET /api/asset`: navigation and asset proxy
//!
//! Every `/api` route requires a bearer token resolved to a user id.

pub mod auth;
pub mod config;
mod error;
mod handlers;
mod types;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use field_report_orchestrator::IngestionController;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use auth::{AuthenticatedUser, CallerResolver, StaticTokenResolver};
pub use config::{build_state, ServerConfig};
pub use error::ApiError;
pub use handlers::*;
pub use types::*;

/// Largest accepted video upload
pub const DEFAULT_MAX_VIDEO_BYTES: usize = 200 * 1024 * 1024;
/// Largest accepted report image
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Request body limits per upload route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_video_bytes: usize,
    pub max_image_bytes: usize,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_video_bytes: DEFAULT_MAX_VIDEO_BYTES,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }
}

/// API server state shared across handlers
#[derive(Clone)]
pub struct ApiState {
    /// Report pipeline and document operations
    pub controller: Arc<IngestionController>,
    /// Bearer token verification
    pub auth: Arc<dyn CallerResolver>,
    /// Where uploaded videos are staged (system temp dir when `None`)
    pub upload_dir: Option<PathBuf>,
    pub limits: UploadLimits,
}

impl ApiState {
    #[must_use]
    pub fn new(controller: IngestionController, auth: Arc<dyn CallerResolver>) -> Self {
        Self {
            controller: Arc::new(controller),
            auth,
            upload_dir: None,
            limits: UploadLimits::default(),
        }
    }

    #[must_use]
    pub fn with_upload_dir(mut self, upload_dir: Option<PathBuf>) -> Self {
        self.upload_dir = upload_dir;
        self
    }

    #[must_use]
    pub fn with_limits(mut self, limits: UploadLimits) -> Self {
        self.limits = limits;
        self
    }
}

/// Build the API router with all endpoints
pub fn build_router(state: ApiState) -> Router {
    let limits = state.limits;
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Ingestion
        .route(
            "/api/upload-video",
            post(upload_video).layer(DefaultBodyLimit::max(limits.max_video_bytes)),
        )
        // Report documents
        .route("/api/report", get(get_report).post(save_report))
        .route(
            "/api/report-image",
            post(add_report_image)
                .delete(delete_report_image)
                .layer(DefaultBodyLimit::max(limits.max_image_bytes)),
        )
        // Navigation
        .route("/api/browse-reports", get(browse_reports))
        .route("/api/asset", get(get_asset))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve on an already bound listener
pub async fn serve(listener: tokio::net::TcpListener, state: ApiState) -> Result<(), std::io::Error> {
    axum::serve(listener, build_router(state)).await
}

/// Start the API server
pub async fn start_server(addr: &str, state: ApiState) -> Result<(), std::io::Error> {
    tracing::info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve(listener, state).await
}
