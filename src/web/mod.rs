//! Web layer module
//!
//! HTTP interface for the streaming backend. Handlers are thin and delegate
//! to the service layer; responses use the standardized envelope from
//! [`responses`]; authentication and correlation context come from the
//! extractors in [`extractors`].

use anyhow::Result;
use axum::{
    Router,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::Config;
use crate::hls::HlsManifestGenerator;
use crate::observability::AppObservability;
use crate::repositories::{DatabasePing, SongCatalog, SubscriberDirectory};
use crate::services::{CircuitBreakerManager, SessionManager, StreamTokenVerifier};
use crate::transport::{CdnDelivery, ResilientStore};

pub mod extractors;
pub mod handlers;
pub mod openapi;
pub mod responses;

// Re-export commonly used types
pub use extractors::{AuthenticatedUser, RequestContext};
pub use responses::{ApiResponse, handle_error, handle_result};

/// Shared application state injected into every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub session_manager: Arc<SessionManager>,
    pub hls: Arc<HlsManifestGenerator>,
    pub catalog: Arc<dyn SongCatalog>,
    pub subscribers: Arc<dyn SubscriberDirectory>,
    pub storage: Arc<ResilientStore>,
    pub cdn: Arc<CdnDelivery>,
    pub breaker_manager: Arc<CircuitBreakerManager>,
    pub db: Arc<dyn DatabasePing>,
    pub token_verifier: Arc<StreamTokenVerifier>,
    pub observability: Arc<AppObservability>,
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/stream/start", post(handlers::stream::start_stream))
        .route("/stream/heartbeat", post(handlers::stream::heartbeat))
        .route("/stream/refresh", post(handlers::stream::refresh_stream))
        .route("/stream/change", post(handlers::stream::change_song))
        .route("/stream/end", post(handlers::stream::end_stream))
        .route("/stream/sessions", get(handlers::stream::list_sessions))
        .route(
            "/stream/{song_id}/master.m3u8",
            get(handlers::hls::master_playlist),
        )
        .route(
            "/stream/{song_id}/{variant}/playlist.m3u8",
            get(handlers::hls::media_playlist),
        )
        .route("/buffer/config", post(handlers::buffer::buffer_config))
        .route("/health", get(handlers::health::health_check))
        .route("/health/live", get(handlers::health::liveness_check))
        .route("/health/ready", get(handlers::health::readiness_check))
        .merge(
            SwaggerUi::new("/docs")
                .url("/api-docs/openapi.json", openapi::ApiDoc::openapi()),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Web server configuration and setup
pub struct WebServer {
    app: Router,
    addr: SocketAddr,
}

impl WebServer {
    pub fn new(state: AppState) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", state.config.web.host, state.config.web.port)
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid listen address: {e}"))?;
        let app = build_router(state);
        Ok(Self { app, addr })
    }

    /// Serve until the cancellation token fires
    pub async fn serve(self, cancellation_token: CancellationToken) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("Listening on {}", self.addr);

        axum::serve(listener, self.app)
            .with_graceful_shutdown(async move { cancellation_token.cancelled().await })
            .await?;
        Ok(())
    }
}
