//! OpenAPI document for the streaming API

use utoipa::OpenApi;

use crate::web::handlers;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Cadenza Streaming API",
        description = "Adaptive audio streaming backend: sessions, buffer strategy, HLS delivery and health.",
        license(name = "MIT")
    ),
    paths(
        handlers::stream::start_stream,
        handlers::stream::heartbeat,
        handlers::stream::refresh_stream,
        handlers::stream::change_song,
        handlers::stream::end_stream,
        handlers::stream::list_sessions,
        handlers::hls::master_playlist,
        handlers::hls::media_playlist,
        handlers::buffer::buffer_config,
        handlers::health::health_check,
        handlers::health::liveness_check,
        handlers::health::readiness_check,
    ),
    tags(
        (name = "stream", description = "Streaming session lifecycle"),
        (name = "hls", description = "HLS playlist generation"),
        (name = "buffer", description = "Adaptive buffer strategy"),
        (name = "health", description = "Health and readiness"),
    )
)]
pub struct ApiDoc;
