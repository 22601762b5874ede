//! HLS playlist HTTP handlers

use axum::{
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::web::{
    AppState,
    extractors::{AuthenticatedUser, RequestContext},
    responses::handle_error,
};

const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

fn playlist_response(playlist: String) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, PLAYLIST_CONTENT_TYPE),
            (header::CACHE_CONTROL, "public, max-age=60"),
        ],
        playlist,
    )
        .into_response()
}

/// Serve the master playlist for a song
#[utoipa::path(
    get,
    path = "/stream/{song_id}/master.m3u8",
    params(("song_id" = Uuid, Path, description = "Song id")),
    responses(
        (status = 200, description = "Master playlist", body = String, content_type = "application/vnd.apple.mpegurl"),
        (status = 404, description = "Song not found"),
    ),
    tag = "hls"
)]
pub async fn master_playlist(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    context: RequestContext,
    Path(song_id): Path<Uuid>,
) -> Response {
    let result = async {
        let song = state
            .catalog
            .song(song_id)
            .await?
            .ok_or_else(|| AppError::not_found("song", song_id.to_string()))?;
        let tier = state.subscribers.subscription_tier(user.user_id).await?;
        state.hls.generate_master(&song, tier.is_premium())
    }
    .await;

    match result {
        Ok(playlist) => {
            state.observability.manifests_served.add(1, &[]);
            playlist_response(playlist)
        }
        Err(err) => handle_error(err, context.request_id),
    }
}

#[derive(Debug, Deserialize)]
pub struct MediaPlaylistParams {
    /// Segment duration override, from the client's buffer configuration
    #[serde(default)]
    pub segment: Option<u32>,
}

/// Serve the media playlist for one quality variant
#[utoipa::path(
    get,
    path = "/stream/{song_id}/{variant}/playlist.m3u8",
    params(
        ("song_id" = Uuid, Path, description = "Song id"),
        ("variant" = String, Path, description = "Variant name, e.g. audio_192kbps"),
    ),
    responses(
        (status = 200, description = "Media playlist", body = String, content_type = "application/vnd.apple.mpegurl"),
        (status = 404, description = "Song or quality not found"),
    ),
    tag = "hls"
)]
pub async fn media_playlist(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    context: RequestContext,
    Path((song_id, variant)): Path<(Uuid, String)>,
    Query(params): Query<MediaPlaylistParams>,
) -> Response {
    let result = async {
        let quality = parse_variant(&variant)?;
        let tier = state.subscribers.subscription_tier(user.user_id).await?;
        // The master already filters variants for free callers; a direct
        // media request above the ceiling gets the same answer
        if !tier.is_premium() && quality > state.config.buffer.free_max_bitrate_kbps {
            return Err(AppError::not_found(
                "quality",
                format!("{quality}kbps for song {song_id}"),
            ));
        }
        let song = state
            .catalog
            .song(song_id)
            .await?
            .ok_or_else(|| AppError::not_found("song", song_id.to_string()))?;
        state.hls.generate_media(&song, quality, params.segment)
    }
    .await;

    match result {
        Ok(playlist) => {
            state.observability.manifests_served.add(1, &[]);
            playlist_response(playlist)
        }
        Err(err) => handle_error(err, context.request_id),
    }
}

/// Parse `audio_{kbps}kbps` variant path segments
fn parse_variant(variant: &str) -> Result<u32, AppError> {
    variant
        .strip_prefix("audio_")
        .and_then(|rest| rest.strip_suffix("kbps"))
        .and_then(|kbps| kbps.parse::<u32>().ok())
        .ok_or_else(|| AppError::validation(format!("Invalid variant '{variant}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_parsing() {
        assert_eq!(parse_variant("audio_192kbps").unwrap(), 192);
        assert_eq!(parse_variant("audio_64kbps").unwrap(), 64);
        assert!(parse_variant("video_192kbps").is_err());
        assert!(parse_variant("audio_kbps").is_err());
        assert!(parse_variant("audio_192").is_err());
    }
}
