//! Domain model definitions
//!
//! Value types shared across the buffer strategy engine, the session
//! controller and the web layer. Wire-visible types serialize as camelCase
//! and carry `utoipa` schemas for the OpenAPI document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

/// Client device classes recognised by the buffer strategy engine
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceClass {
    Mobile,
    Tablet,
    Desktop,
    Tv,
    SmartSpeaker,
    Car,
    Unknown,
}

/// How the media bytes reach the client
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamType {
    Direct,
    Cdn,
    Hls,
}

/// Streaming session lifecycle states
///
/// Allowed transitions: ACTIVE -> {PAUSED, ENDED, EXPIRED},
/// PAUSED -> {ACTIVE, ENDED, EXPIRED}. Terminal states never re-open.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Active,
    Paused,
    Ended,
    Expired,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Ended | SessionStatus::Expired)
    }

    /// Whether the session still counts against the concurrency cap
    pub fn is_live(&self) -> bool {
        matches!(self, SessionStatus::Active | SessionStatus::Paused)
    }

    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        match self {
            SessionStatus::Active => next != SessionStatus::Active,
            SessionStatus::Paused => next != SessionStatus::Paused,
            SessionStatus::Ended | SessionStatus::Expired => false,
        }
    }
}

/// Subscription tiers known to the concurrency cap and quality filters
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionTier {
    Free,
    Premium,
    Family,
}

impl SubscriptionTier {
    pub fn is_premium(&self) -> bool {
        !matches!(self, SubscriptionTier::Free)
    }
}

/// Client-reported playback state carried on heartbeats
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    Paused,
}

/// Coarse network connection classes reported by clients
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionType {
    Wifi,
    Cellular,
    Ethernet,
    Other,
}

/// Live network conditions reported by a client at stream start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkProfile {
    pub bandwidth_kbps: u32,
    pub latency_ms: u32,
    pub jitter_ms: u32,
    /// Packet loss percentage in [0, 100]
    pub packet_loss_pct: f64,
    pub connection_type: ConnectionType,
}

impl NetworkProfile {
    /// Validate reported values, collecting per-field messages
    pub fn validate(&self) -> Result<(), std::collections::HashMap<String, Vec<String>>> {
        let mut fields: std::collections::HashMap<String, Vec<String>> = Default::default();

        if self.bandwidth_kbps == 0 {
            fields
                .entry("bandwidthKbps".to_string())
                .or_default()
                .push("Bandwidth must be > 0".to_string());
        }
        if !(0.0..=100.0).contains(&self.packet_loss_pct) || self.packet_loss_pct.is_nan() {
            fields
                .entry("packetLossPct".to_string())
                .or_default()
                .push("Packet loss must be between 0 and 100".to_string());
        }

        if fields.is_empty() { Ok(()) } else { Err(fields) }
    }
}

/// Server-computed client buffering parameters for one stream start
///
/// Invariants: `min_buffer_sec <= target_buffer_sec <= max_buffer_sec`,
/// `rebuffer_threshold_sec < target_buffer_sec`, and
/// `min_bitrate_kbps <= start_bitrate_kbps <= max_bitrate_kbps`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BufferConfiguration {
    pub min_buffer_sec: f64,
    pub target_buffer_sec: f64,
    pub max_buffer_sec: f64,
    pub preload_sec: f64,
    pub segment_sec: u32,
    pub rebuffer_threshold_sec: f64,
    pub adaptive_bitrate_enabled: bool,
    pub min_bitrate_kbps: u32,
    pub start_bitrate_kbps: u32,
    pub max_bitrate_kbps: u32,
    pub bitrate_adaptation_interval_sec: u32,
    pub recommended_quality: u32,
}

/// Buffer health status bands
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum BufferHealthStatus {
    Healthy,
    Warning,
    Critical,
    Poor,
}

/// Weighted buffer health verdict with component scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BufferHealthScore {
    /// Overall score in [0, 1]
    pub score: f64,
    pub status: BufferHealthStatus,
    pub buffer_level_score: f64,
    pub starvation_score: f64,
    pub rebuffer_score: f64,
    pub recommendations: Vec<String>,
}

/// Client-side buffer observations used for health scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct BufferObservation {
    pub current_buffered_sec: f64,
    pub target_buffer_sec: f64,
    pub starvation_events_last_minute: u32,
    /// Total rebuffering time over the last minute, in seconds
    pub rebuffer_duration_last_minute_sec: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter_ms: Option<u32>,
}

/// One server-suggested next-song candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PreloadHint {
    pub song_id: Uuid,
    /// Probability in [0, 1]; hint lists are sorted descending
    pub probability: f64,
    pub reason: String,
}

/// Cumulative playback counters reported on heartbeats
///
/// All counters are cumulative for the session; the server deduplicates
/// retried heartbeats by taking the max, never by summing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackCounters {
    pub streamed_seconds: u64,
    pub streamed_bytes: u64,
    pub buffering_events: u32,
    pub buffering_duration_ms: u64,
}

impl PlaybackCounters {
    /// Merge a reported snapshot, keeping every counter monotonic
    pub fn merge_max(&mut self, reported: &PlaybackCounters) {
        self.streamed_seconds = self.streamed_seconds.max(reported.streamed_seconds);
        self.streamed_bytes = self.streamed_bytes.max(reported.streamed_bytes);
        self.buffering_events = self.buffering_events.max(reported.buffering_events);
        self.buffering_duration_ms = self
            .buffering_duration_ms
            .max(reported.buffering_duration_ms);
    }
}

/// One active playback stream tracked by the session controller
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StreamingSession {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub song_id: Uuid,
    pub device_id: String,
    pub device_name: Option<String>,
    pub device_class: DeviceClass,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    /// Selected quality in kbps
    pub quality: u32,
    pub stream_type: StreamType,
    /// Network conditions reported at stream start, kept for opportunistic
    /// reconfiguration on degraded heartbeats
    pub network_profile: NetworkProfile,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub last_heartbeat_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub counters: PlaybackCounters,
}

/// Catalog entry for one song, as resolved through the song catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongInfo {
    pub song_id: Uuid,
    pub duration_secs: f64,
    /// Precomputed quality variants in kbps, unordered
    pub available_qualities: Vec<u32>,
}

/// One (song, played-at) entry of a user's listening history
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackEvent {
    pub song_id: Uuid,
    pub played_at: DateTime<Utc>,
    pub skipped: bool,
}
