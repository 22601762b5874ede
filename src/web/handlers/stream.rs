//! Streaming session HTTP handlers
//!
//! Thin wrappers over the session manager: request DTOs in, standardized
//! envelopes out. Heartbeat handling stays cheap (no outbound I/O beyond
//! the stores) so clients with tight heartbeat windows are not penalized.

use axum::{Json, extract::State, response::IntoResponse};
use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{
    BufferConfiguration, BufferObservation, DeviceClass, NetworkProfile, PlaybackCounters,
    PlaybackState, PreloadHint, StreamType, StreamingSession,
};
use crate::services::session_manager::StartSessionRequest;
use crate::web::{
    AppState,
    extractors::{AuthenticatedUser, RequestContext},
    responses::{handle_error, handle_result, ok},
};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartStreamBody {
    pub song_id: Uuid,
    pub device_id: String,
    #[serde(default)]
    pub device_name: Option<String>,
    pub device_type: DeviceClass,
    /// Requested quality in kbps; clamped to the subscription's ceiling
    pub quality: u32,
    #[serde(default = "default_stream_type")]
    pub stream_type: StreamType,
    pub network_profile: NetworkProfile,
}

fn default_stream_type() -> StreamType {
    StreamType::Direct
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartStreamResponse {
    pub session_id: Uuid,
    pub signed_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_url: Option<String>,
    pub buffer_config: BufferConfiguration,
    pub preload_hints: Vec<PreloadHint>,
    pub expires_at: DateTime<Utc>,
}

/// Start a streaming session
#[utoipa::path(
    post,
    path = "/stream/start",
    request_body = StartStreamBody,
    responses(
        (status = 200, description = "Session started", body = StartStreamResponse),
        (status = 402, description = "Concurrent stream limit reached"),
        (status = 404, description = "Song or quality not found"),
    ),
    tag = "stream"
)]
pub async fn start_stream(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    context: RequestContext,
    Json(body): Json<StartStreamBody>,
) -> impl IntoResponse {
    let request = StartSessionRequest {
        song_id: body.song_id,
        device_id: body.device_id,
        device_name: body.device_name,
        device_class: body.device_type,
        quality: body.quality,
        stream_type: body.stream_type,
        network_profile: body.network_profile,
        ip_address: context.client_ip.clone(),
        user_agent: context.user_agent.clone(),
    };

    let local_hour = chrono::Local::now().hour();
    match state
        .session_manager
        .start_session(user.user_id, request, local_hour)
        .await
    {
        Ok(started) => ok(
            StartStreamResponse {
                session_id: started.session.session_id,
                signed_url: started.signed_url,
                manifest_url: started.manifest_url,
                buffer_config: started.buffer_config,
                preload_hints: started.preload_hints,
                expires_at: started.expires_at,
            },
            context.request_id,
        ),
        Err(err) => handle_error(err, context.request_id),
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatBody {
    pub session_id: Uuid,
    #[serde(default)]
    pub streamed_seconds: u64,
    #[serde(default)]
    pub streamed_bytes: u64,
    #[serde(default)]
    pub buffering_events: u32,
    #[serde(default)]
    pub buffering_duration_ms: u64,
    /// Optional playing/paused transition
    #[serde(default)]
    pub state: Option<PlaybackState>,
    /// Optional buffer observation for health scoring
    #[serde(default)]
    pub buffer: Option<BufferObservation>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_config: Option<BufferConfiguration>,
}

/// Record a session heartbeat
#[utoipa::path(
    post,
    path = "/stream/heartbeat",
    request_body = HeartbeatBody,
    responses(
        (status = 200, description = "Heartbeat accepted", body = HeartbeatResponse),
        (status = 404, description = "Unknown session"),
        (status = 410, description = "Session expired"),
    ),
    tag = "stream"
)]
pub async fn heartbeat(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    context: RequestContext,
    Json(body): Json<HeartbeatBody>,
) -> impl IntoResponse {
    let counters = PlaybackCounters {
        streamed_seconds: body.streamed_seconds,
        streamed_bytes: body.streamed_bytes,
        buffering_events: body.buffering_events,
        buffering_duration_ms: body.buffering_duration_ms,
    };

    match state
        .session_manager
        .heartbeat(
            user.user_id,
            body.session_id,
            &counters,
            body.buffer.as_ref(),
            body.state,
        )
        .await
    {
        Ok(outcome) => ok(
            HeartbeatResponse {
                ok: true,
                updated_config: outcome.updated_config,
            },
            context.request_id,
        ),
        Err(err) => handle_error(err, context.request_id),
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionRefBody {
    pub session_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AckResponse {
    pub ok: bool,
}

/// End a streaming session (idempotent)
#[utoipa::path(
    post,
    path = "/stream/end",
    request_body = SessionRefBody,
    responses(
        (status = 200, description = "Session ended", body = AckResponse),
        (status = 404, description = "Unknown session"),
    ),
    tag = "stream"
)]
pub async fn end_stream(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    context: RequestContext,
    Json(body): Json<SessionRefBody>,
) -> impl IntoResponse {
    match state
        .session_manager
        .end_session(user.user_id, body.session_id)
        .await
    {
        Ok(_) => ok(AckResponse { ok: true }, context.request_id),
        Err(err) => handle_error(err, context.request_id),
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub session_id: Uuid,
    pub signed_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_url: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Re-issue signed URLs for a live session
#[utoipa::path(
    post,
    path = "/stream/refresh",
    request_body = SessionRefBody,
    responses(
        (status = 200, description = "Fresh signed URL", body = RefreshResponse),
        (status = 410, description = "Session expired"),
    ),
    tag = "stream"
)]
pub async fn refresh_stream(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    context: RequestContext,
    Json(body): Json<SessionRefBody>,
) -> impl IntoResponse {
    match state
        .session_manager
        .refresh_url(user.user_id, body.session_id)
        .await
    {
        Ok(refreshed) => ok(
            RefreshResponse {
                session_id: refreshed.session_id,
                signed_url: refreshed.signed_url,
                manifest_url: refreshed.manifest_url,
                expires_at: refreshed.expires_at,
            },
            context.request_id,
        ),
        Err(err) => handle_error(err, context.request_id),
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSongBody {
    pub session_id: Uuid,
    pub song_id: Uuid,
}

/// Switch the playing song without reopening the session
#[utoipa::path(
    post,
    path = "/stream/change",
    request_body = ChangeSongBody,
    responses(
        (status = 200, description = "Song changed", body = AckResponse),
        (status = 404, description = "Unknown session or song"),
    ),
    tag = "stream"
)]
pub async fn change_song(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    context: RequestContext,
    Json(body): Json<ChangeSongBody>,
) -> impl IntoResponse {
    match state
        .session_manager
        .change_song(user.user_id, body.session_id, body.song_id)
        .await
    {
        Ok(_) => ok(AckResponse { ok: true }, context.request_id),
        Err(err) => handle_error(err, context.request_id),
    }
}

/// List the caller's live sessions
#[utoipa::path(
    get,
    path = "/stream/sessions",
    responses(
        (status = 200, description = "Live sessions", body = [StreamingSession]),
    ),
    tag = "stream"
)]
pub async fn list_sessions(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    context: RequestContext,
) -> impl IntoResponse {
    handle_result(
        state.session_manager.list_active(user.user_id).await,
        context.request_id,
    )
}
