//! Streaming session controller
//!
//! Owns the lifecycle of playback sessions: admission under per-user
//! concurrency caps, heartbeat accounting, song changes, explicit ends and
//! signed URL refresh. The concurrency check runs inside a short per-user
//! critical section so two racing starts cannot both observe room; signing
//! and strategy computation happen outside it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::buffer::{PreloadPredictor, compute_buffer_config, compute_health_score};
use crate::config::{BufferPolicyConfig, ConcurrencyLimits};
use crate::errors::{AppError, AppResult, RepositoryError};
use crate::models::{
    BufferConfiguration, BufferHealthStatus, BufferObservation, DeviceClass, NetworkProfile,
    PlaybackCounters, PlaybackState, PreloadHint, SessionStatus, SongInfo, StreamType,
    StreamingSession, SubscriptionTier,
};
use crate::observability::AppObservability;
use crate::repositories::{
    BufferMetricsRepository, SessionRepository, SongCatalog, SubscriberDirectory,
};
use crate::transport::CdnDelivery;

/// Request to open a new streaming session
#[derive(Debug, Clone)]
pub struct StartSessionRequest {
    pub song_id: Uuid,
    pub device_id: String,
    pub device_name: Option<String>,
    pub device_class: DeviceClass,
    pub quality: u32,
    pub stream_type: StreamType,
    pub network_profile: NetworkProfile,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Everything a client needs to begin playback
#[derive(Debug, Clone)]
pub struct StartedSession {
    pub session: StreamingSession,
    pub signed_url: String,
    pub manifest_url: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub buffer_config: BufferConfiguration,
    pub preload_hints: Vec<PreloadHint>,
}

/// Result of a heartbeat, with an opportunistic reconfiguration when the
/// reported buffer health has degraded
#[derive(Debug, Clone)]
pub struct HeartbeatOutcome {
    pub session: StreamingSession,
    pub updated_config: Option<BufferConfiguration>,
}

/// Fresh signed URL for a still-live session
#[derive(Debug, Clone)]
pub struct RefreshedUrl {
    pub session_id: Uuid,
    pub signed_url: String,
    pub manifest_url: Option<String>,
    pub expires_at: DateTime<Utc>,
}

pub struct SessionManager {
    sessions: Arc<dyn SessionRepository>,
    subscribers: Arc<dyn SubscriberDirectory>,
    catalog: Arc<dyn SongCatalog>,
    buffer_metrics: Arc<dyn BufferMetricsRepository>,
    cdn: Arc<CdnDelivery>,
    preload: PreloadPredictor,
    buffer_policy: BufferPolicyConfig,
    limits: ConcurrencyLimits,
    url_ttl: Duration,
    base_url: String,
    observability: Arc<AppObservability>,
    /// Per-user admission locks, sharded by user id
    user_locks: RwLock<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl SessionManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        subscribers: Arc<dyn SubscriberDirectory>,
        catalog: Arc<dyn SongCatalog>,
        buffer_metrics: Arc<dyn BufferMetricsRepository>,
        cdn: Arc<CdnDelivery>,
        preload: PreloadPredictor,
        buffer_policy: BufferPolicyConfig,
        limits: ConcurrencyLimits,
        url_ttl: Duration,
        base_url: String,
        observability: Arc<AppObservability>,
    ) -> Self {
        Self {
            sessions,
            subscribers,
            catalog,
            buffer_metrics,
            cdn,
            preload,
            buffer_policy,
            limits,
            url_ttl,
            base_url,
            observability,
            user_locks: RwLock::new(HashMap::new()),
        }
    }

    /// Start a streaming session.
    ///
    /// Validation and strategy computation run before admission; the
    /// per-user lock covers only the count-and-insert so it is never held
    /// across signing or any outbound I/O.
    pub async fn start_session(
        &self,
        user_id: Uuid,
        request: StartSessionRequest,
        local_hour: u32,
    ) -> AppResult<StartedSession> {
        let tier = self.subscribers.subscription_tier(user_id).await?;
        let song = self.resolve_song(request.song_id).await?;
        let quality = self.effective_quality(&song, request.quality, tier)?;

        let buffer_config = compute_buffer_config(
            &self.buffer_policy,
            &request.network_profile,
            request.device_class,
            tier.is_premium(),
        )?;

        let now = Utc::now();
        let session = StreamingSession {
            session_id: Uuid::new_v4(),
            user_id,
            song_id: request.song_id,
            device_id: request.device_id,
            device_name: request.device_name,
            device_class: request.device_class,
            ip_address: request.ip_address,
            user_agent: request.user_agent,
            quality,
            stream_type: request.stream_type,
            network_profile: request.network_profile,
            status: SessionStatus::Active,
            started_at: now,
            last_heartbeat_at: now,
            ended_at: None,
            counters: PlaybackCounters::default(),
        };

        self.admit(&session, tier).await?;

        let (signed_url, manifest_url, expires_at) = match self
            .issue_urls(&session, now)
            .await
        {
            Ok(urls) => urls,
            Err(err) => {
                // Roll the admission back so a failed start does not pin a
                // concurrency slot
                let _ = self.sessions.end(session.session_id, Utc::now()).await;
                return Err(err);
            }
        };

        let preload_hints = match self
            .preload
            .predict(
                user_id,
                session.song_id,
                local_hour,
                self.buffer_policy.preload_hint_count,
            )
            .await
        {
            Ok(hints) => hints,
            Err(err) => {
                // Hints are best-effort; a degraded history store must not
                // block playback
                warn!("Preload prediction failed for user {user_id}: {err}");
                Vec::new()
            }
        };

        self.observability.sessions_started.add(1, &[]);
        self.observability.active_sessions.add(1, &[]);
        info!(
            "Session started: {} | user: {} | song: {} | {}kbps {} on {}",
            session.session_id,
            session.user_id,
            session.song_id,
            session.quality,
            session.stream_type,
            session.device_class,
        );

        Ok(StartedSession {
            session,
            signed_url,
            manifest_url,
            expires_at,
            buffer_config,
            preload_hints,
        })
    }

    /// Record a heartbeat: monotonic counter merge, freshness stamp, and an
    /// opportunistic config update when reported health is degraded
    pub async fn heartbeat(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        counters: &PlaybackCounters,
        observation: Option<&BufferObservation>,
        state: Option<PlaybackState>,
    ) -> AppResult<HeartbeatOutcome> {
        let session = self.owned_session(user_id, session_id, "heartbeat").await?;
        self.reject_terminal(&session)?;

        let received_at = Utc::now();
        let session = self
            .sessions
            .record_heartbeat(session_id, received_at, counters, state)
            .await
            .map_err(|err| Self::map_mutation_error(err, session_id))?;

        self.observability.heartbeats.add(1, &[]);

        let mut updated_config = None;
        if let Some(observation) = observation {
            if let Err(err) = self
                .buffer_metrics
                .append(session_id, received_at, observation)
                .await
            {
                warn!("Buffer metrics append failed for session {session_id}: {err}");
            }

            let health = compute_health_score(observation);
            if matches!(
                health.status,
                BufferHealthStatus::Critical | BufferHealthStatus::Poor
            ) {
                debug!(
                    "Session {session_id} reported {} buffer health, recomputing configuration",
                    health.status
                );
                let tier = self.subscribers.subscription_tier(user_id).await?;
                updated_config = compute_buffer_config(
                    &self.buffer_policy,
                    &session.network_profile,
                    session.device_class,
                    tier.is_premium(),
                )
                .ok();
            }
        }

        Ok(HeartbeatOutcome {
            session,
            updated_config,
        })
    }

    /// Atomically switch the playing song, preserving counters
    pub async fn change_song(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        new_song_id: Uuid,
    ) -> AppResult<StreamingSession> {
        let session = self.owned_session(user_id, session_id, "change song").await?;
        self.reject_terminal(&session)?;
        self.resolve_song(new_song_id).await?;

        self.sessions
            .change_song(session_id, new_song_id, Utc::now())
            .await
            .map_err(|err| Self::map_mutation_error(err, session_id))
    }

    /// End a session. Idempotent: ending a terminal session succeeds.
    pub async fn end_session(&self, user_id: Uuid, session_id: Uuid) -> AppResult<StreamingSession> {
        let before = self.owned_session(user_id, session_id, "end").await?;
        let session = self.sessions.end(session_id, Utc::now()).await?;

        if before.status.is_live() {
            self.observability.sessions_ended.add(1, &[]);
            self.observability.active_sessions.add(-1, &[]);
            info!(
                "Session ended: {} | user: {} | streamed: {}s / {} bytes | buffering: {} events",
                session.session_id,
                session.user_id,
                session.counters.streamed_seconds,
                session.counters.streamed_bytes,
                session.counters.buffering_events,
            );
        }
        Ok(session)
    }

    /// Re-issue signed URLs for a still-live session
    pub async fn refresh_url(&self, user_id: Uuid, session_id: Uuid) -> AppResult<RefreshedUrl> {
        let session = self.owned_session(user_id, session_id, "refresh").await?;
        self.reject_terminal(&session)?;

        let now = Utc::now();
        let (signed_url, manifest_url, expires_at) = self.issue_urls(&session, now).await?;
        Ok(RefreshedUrl {
            session_id,
            signed_url,
            manifest_url,
            expires_at,
        })
    }

    /// Current ACTIVE and PAUSED sessions for a user
    pub async fn list_active(&self, user_id: Uuid) -> AppResult<Vec<StreamingSession>> {
        Ok(self.sessions.live_for_user(user_id).await?)
    }

    /// Check-and-insert under the per-user admission lock
    async fn admit(&self, session: &StreamingSession, tier: SubscriptionTier) -> AppResult<()> {
        let lock = self.user_lock(session.user_id).await;
        let _guard = lock.lock().await;

        let current = self.sessions.count_live_for_user(session.user_id).await?;
        let max = self.limits.limit_for(tier);
        if current >= max {
            debug!(
                "Concurrent stream limit hit for user {} ({current}/{max}, tier {tier})",
                session.user_id
            );
            self.observability.concurrency_rejections.add(1, &[]);
            return Err(AppError::ConcurrentLimit { current, max });
        }

        self.sessions.insert(session.clone()).await?;
        Ok(())
    }

    async fn user_lock(&self, user_id: Uuid) -> Arc<Mutex<()>> {
        {
            let locks = self.user_locks.read().await;
            if let Some(lock) = locks.get(&user_id) {
                return lock.clone();
            }
        }
        let mut locks = self.user_locks.write().await;
        locks.entry(user_id).or_default().clone()
    }

    async fn issue_urls(
        &self,
        session: &StreamingSession,
        now: DateTime<Utc>,
    ) -> AppResult<(String, Option<String>, DateTime<Utc>)> {
        let key = media_key(session.song_id, session.quality);
        let expires_at = now
            + chrono::Duration::from_std(self.url_ttl)
                .unwrap_or_else(|_| chrono::Duration::hours(1));

        let signed_url = match session.stream_type {
            StreamType::Direct => self.cdn.signed_origin_url(&key, self.url_ttl, now)?,
            StreamType::Cdn | StreamType::Hls => {
                let (url, _via_cdn) = self.cdn.signed_media_url(&key, self.url_ttl, now).await?;
                url
            }
        };

        let manifest_url = match session.stream_type {
            StreamType::Hls => Some(format!(
                "{}/stream/{}/master.m3u8",
                self.base_url.trim_end_matches('/'),
                session.song_id
            )),
            _ => None,
        };

        self.observability.signed_urls_issued.add(1, &[]);
        Ok((signed_url, manifest_url, expires_at))
    }

    async fn resolve_song(&self, song_id: Uuid) -> AppResult<SongInfo> {
        self.catalog
            .song(song_id)
            .await?
            .ok_or_else(|| AppError::not_found("song", song_id.to_string()))
    }

    /// Validate the requested quality exists, then clamp it to the tier's
    /// bitrate ceiling using the nearest available variant below it
    fn effective_quality(
        &self,
        song: &SongInfo,
        requested: u32,
        tier: SubscriptionTier,
    ) -> AppResult<u32> {
        if !song.available_qualities.contains(&requested) {
            return Err(AppError::not_found(
                "quality",
                format!("{requested}kbps for song {}", song.song_id),
            ));
        }

        let cap = if tier.is_premium() {
            u32::MAX
        } else {
            self.buffer_policy.free_max_bitrate_kbps
        };
        if requested <= cap {
            return Ok(requested);
        }

        song.available_qualities
            .iter()
            .copied()
            .filter(|q| *q <= cap)
            .max()
            .or_else(|| song.available_qualities.iter().copied().min())
            .ok_or_else(|| AppError::not_found("quality", format!("for song {}", song.song_id)))
    }

    async fn owned_session(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        action: &str,
    ) -> AppResult<StreamingSession> {
        let session = self
            .sessions
            .find(session_id)
            .await?
            .ok_or_else(|| AppError::not_found("session", session_id.to_string()))?;

        if session.user_id != user_id {
            return Err(AppError::PermissionDenied {
                action: action.to_string(),
                resource: format!("session {session_id}"),
            });
        }
        Ok(session)
    }

    fn reject_terminal(&self, session: &StreamingSession) -> AppResult<()> {
        if session.status.is_terminal() {
            return Err(AppError::Expired {
                resource: "session".to_string(),
                id: session.session_id.to_string(),
            });
        }
        Ok(())
    }

    /// A mutation can race the janitor between our status check and the
    /// store's critical section; surface that as EXPIRED
    fn map_mutation_error(err: RepositoryError, session_id: Uuid) -> AppError {
        match err {
            RepositoryError::ConstraintViolation { .. } => AppError::Expired {
                resource: "session".to_string(),
                id: session_id.to_string(),
            },
            other => other.into(),
        }
    }
}

/// Storage key layout for precomputed quality variants
pub fn media_key(song_id: Uuid, quality_kbps: u32) -> String {
    format!("audio/{song_id}/{quality_kbps}kbps/full.mp3")
}
