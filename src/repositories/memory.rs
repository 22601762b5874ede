//! In-memory repository implementations
//!
//! Reference implementations backing the session controller's active index,
//! standalone deployments and the test suite. All stores serialize their
//! mutations through a single `RwLock`, which gives every trait operation
//! the atomicity the contracts require.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::{RepositoryError, RepositoryResult};
use crate::models::{
    BufferObservation, PlaybackCounters, PlaybackEvent, PlaybackState, SessionStatus, SongInfo,
    StreamingSession, SubscriptionTier,
};

use super::traits::{
    BufferMetricsRepository, DatabasePing, ListeningHistory, SessionRepository, SongCatalog,
    SubscriberDirectory,
};

/// In-memory session store
#[derive(Default, Clone)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, StreamingSession>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(session_id: Uuid) -> RepositoryError {
    RepositoryError::RecordNotFound {
        entity: "streaming_session".to_string(),
        field: "session_id".to_string(),
        value: session_id.to_string(),
    }
}

fn terminal_state(session: &StreamingSession) -> RepositoryError {
    RepositoryError::ConstraintViolation {
        constraint: "session_status".to_string(),
        message: format!(
            "session {} is {} and cannot be mutated",
            session.session_id, session.status
        ),
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionStore {
    async fn insert(&self, session: StreamingSession) -> RepositoryResult<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.session_id) {
            return Err(RepositoryError::ConstraintViolation {
                constraint: "session_id_unique".to_string(),
                message: format!("session {} already exists", session.session_id),
            });
        }
        sessions.insert(session.session_id, session);
        Ok(())
    }

    async fn find(&self, session_id: Uuid) -> RepositoryResult<Option<StreamingSession>> {
        Ok(self.sessions.read().await.get(&session_id).cloned())
    }

    async fn live_for_user(&self, user_id: Uuid) -> RepositoryResult<Vec<StreamingSession>> {
        let sessions = self.sessions.read().await;
        let mut live: Vec<StreamingSession> = sessions
            .values()
            .filter(|s| s.user_id == user_id && s.status.is_live())
            .cloned()
            .collect();
        live.sort_by_key(|s| s.started_at);
        Ok(live)
    }

    async fn count_live_for_user(&self, user_id: Uuid) -> RepositoryResult<u32> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .values()
            .filter(|s| s.user_id == user_id && s.status.is_live())
            .count() as u32)
    }

    async fn record_heartbeat(
        &self,
        session_id: Uuid,
        received_at: DateTime<Utc>,
        counters: &PlaybackCounters,
        state: Option<PlaybackState>,
    ) -> RepositoryResult<StreamingSession> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&session_id).ok_or_else(|| not_found(session_id))?;

        if session.status.is_terminal() {
            return Err(terminal_state(session));
        }

        session.counters.merge_max(counters);
        // Server-receive order: never move the heartbeat stamp backwards
        if received_at > session.last_heartbeat_at {
            session.last_heartbeat_at = received_at;
        }
        match state {
            Some(PlaybackState::Paused) if session.status == SessionStatus::Active => {
                session.status = SessionStatus::Paused;
            }
            Some(PlaybackState::Playing) if session.status == SessionStatus::Paused => {
                session.status = SessionStatus::Active;
            }
            _ => {}
        }

        Ok(session.clone())
    }

    async fn change_song(
        &self,
        session_id: Uuid,
        new_song_id: Uuid,
        received_at: DateTime<Utc>,
    ) -> RepositoryResult<StreamingSession> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&session_id).ok_or_else(|| not_found(session_id))?;

        if session.status.is_terminal() {
            return Err(terminal_state(session));
        }

        session.song_id = new_song_id;
        if received_at > session.last_heartbeat_at {
            session.last_heartbeat_at = received_at;
        }
        Ok(session.clone())
    }

    async fn end(
        &self,
        session_id: Uuid,
        ended_at: DateTime<Utc>,
    ) -> RepositoryResult<StreamingSession> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&session_id).ok_or_else(|| not_found(session_id))?;

        if !session.status.is_terminal() {
            session.status = SessionStatus::Ended;
            session.ended_at = Some(ended_at);
        }
        Ok(session.clone())
    }

    async fn expire_stale(
        &self,
        cutoff: DateTime<Utc>,
        expired_at: DateTime<Utc>,
    ) -> RepositoryResult<Vec<StreamingSession>> {
        let mut sessions = self.sessions.write().await;
        let mut expired = Vec::new();

        // The staleness re-check happens under the write lock, so any
        // heartbeat recorded before we got here has already advanced
        // last_heartbeat_at and the session survives the scan.
        for session in sessions.values_mut() {
            if session.status.is_live() && session.last_heartbeat_at < cutoff {
                session.status = SessionStatus::Expired;
                session.ended_at = Some(expired_at);
                expired.push(session.clone());
            }
        }

        Ok(expired)
    }
}

/// In-memory listening history
///
/// Playlist contexts are registered explicitly; co-play counts are derived
/// from recorded playback events (a song counts as co-played when it
/// directly followed the anchor song within the window).
#[derive(Default)]
pub struct InMemoryListeningHistory {
    playlist_contexts: RwLock<HashMap<(Uuid, Uuid), Vec<Uuid>>>,
    events: RwLock<HashMap<Uuid, Vec<PlaybackEvent>>>,
}

impl InMemoryListeningHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the remaining tracks of a playlist the user is playing
    pub async fn set_playlist_context(&self, user_id: Uuid, song_id: Uuid, successors: Vec<Uuid>) {
        self.playlist_contexts
            .write()
            .await
            .insert((user_id, song_id), successors);
    }

    pub async fn record_play(&self, user_id: Uuid, song_id: Uuid, played_at: DateTime<Utc>, skipped: bool) {
        self.events.write().await.entry(user_id).or_default().push(PlaybackEvent {
            song_id,
            played_at,
            skipped,
        });
    }
}

#[async_trait]
impl ListeningHistory for InMemoryListeningHistory {
    async fn playlist_successors(
        &self,
        user_id: Uuid,
        song_id: Uuid,
        limit: usize,
    ) -> RepositoryResult<Vec<Uuid>> {
        Ok(self
            .playlist_contexts
            .read()
            .await
            .get(&(user_id, song_id))
            .map(|successors| successors.iter().copied().take(limit).collect())
            .unwrap_or_default())
    }

    async fn co_played_songs(
        &self,
        user_id: Uuid,
        song_id: Uuid,
        window: chrono::Duration,
    ) -> RepositoryResult<Vec<(Uuid, u32)>> {
        let events = self.events.read().await;
        let Some(history) = events.get(&user_id) else {
            return Ok(Vec::new());
        };

        let horizon = Utc::now() - window;
        let mut counts: HashMap<Uuid, u32> = HashMap::new();
        for pair in history.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if prev.song_id == song_id && next.song_id != song_id && next.played_at >= horizon {
                *counts.entry(next.song_id).or_insert(0) += 1;
            }
        }

        Ok(counts.into_iter().collect())
    }

    async fn skip_rate_last_24h(&self, user_id: Uuid) -> RepositoryResult<f64> {
        let events = self.events.read().await;
        let Some(history) = events.get(&user_id) else {
            return Ok(0.0);
        };

        let horizon = Utc::now() - chrono::Duration::hours(24);
        let recent: Vec<_> = history.iter().filter(|e| e.played_at >= horizon).collect();
        if recent.is_empty() {
            return Ok(0.0);
        }
        let skipped = recent.iter().filter(|e| e.skipped).count();
        Ok(skipped as f64 / recent.len() as f64)
    }
}

/// In-memory song catalog
#[derive(Default)]
pub struct InMemorySongCatalog {
    songs: RwLock<HashMap<Uuid, SongInfo>>,
}

impl InMemorySongCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, song: SongInfo) {
        self.songs.write().await.insert(song.song_id, song);
    }
}

#[async_trait]
impl SongCatalog for InMemorySongCatalog {
    async fn song(&self, song_id: Uuid) -> RepositoryResult<Option<SongInfo>> {
        Ok(self.songs.read().await.get(&song_id).cloned())
    }
}

/// In-memory subscriber directory; unknown users default to the free tier
#[derive(Default)]
pub struct InMemorySubscriberDirectory {
    tiers: RwLock<HashMap<Uuid, SubscriptionTier>>,
}

impl InMemorySubscriberDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_tier(&self, user_id: Uuid, tier: SubscriptionTier) {
        self.tiers.write().await.insert(user_id, tier);
    }
}

#[async_trait]
impl SubscriberDirectory for InMemorySubscriberDirectory {
    async fn subscription_tier(&self, user_id: Uuid) -> RepositoryResult<SubscriptionTier> {
        Ok(self
            .tiers
            .read()
            .await
            .get(&user_id)
            .copied()
            .unwrap_or(SubscriptionTier::Free))
    }
}

/// In-memory append-only buffer metrics sink
#[derive(Default)]
pub struct InMemoryBufferMetrics {
    rows: RwLock<Vec<(Uuid, DateTime<Utc>, BufferObservation)>>,
}

impl InMemoryBufferMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn rows_for_session(&self, session_id: Uuid) -> Vec<(DateTime<Utc>, BufferObservation)> {
        self.rows
            .read()
            .await
            .iter()
            .filter(|(id, _, _)| *id == session_id)
            .map(|(_, at, obs)| (*at, obs.clone()))
            .collect()
    }
}

#[async_trait]
impl BufferMetricsRepository for InMemoryBufferMetrics {
    async fn append(
        &self,
        session_id: Uuid,
        received_at: DateTime<Utc>,
        observation: &BufferObservation,
    ) -> RepositoryResult<()> {
        self.rows
            .write()
            .await
            .push((session_id, received_at, observation.clone()));
        Ok(())
    }
}

/// In-memory database ping; failure can be injected for health tests
#[derive(Default)]
pub struct InMemoryDatabasePing {
    failing: RwLock<bool>,
}

impl InMemoryDatabasePing {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_failing(&self, failing: bool) {
        *self.failing.write().await = failing;
    }
}

#[async_trait]
impl DatabasePing for InMemoryDatabasePing {
    async fn ping(&self) -> RepositoryResult<Duration> {
        if *self.failing.read().await {
            return Err(RepositoryError::ConnectionFailed {
                message: "injected ping failure".to_string(),
            });
        }
        Ok(Duration::from_micros(50))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConnectionType, DeviceClass, NetworkProfile, StreamType};

    fn session(user_id: Uuid, started_at: DateTime<Utc>) -> StreamingSession {
        StreamingSession {
            session_id: Uuid::new_v4(),
            user_id,
            song_id: Uuid::new_v4(),
            device_id: "dev-1".to_string(),
            device_name: None,
            device_class: DeviceClass::Desktop,
            ip_address: None,
            user_agent: None,
            quality: 192,
            stream_type: StreamType::Direct,
            network_profile: NetworkProfile {
                bandwidth_kbps: 4000,
                latency_ms: 30,
                jitter_ms: 10,
                packet_loss_pct: 0.0,
                connection_type: ConnectionType::Wifi,
            },
            status: SessionStatus::Active,
            started_at,
            last_heartbeat_at: started_at,
            ended_at: None,
            counters: PlaybackCounters::default(),
        }
    }

    #[tokio::test]
    async fn heartbeat_after_cutoff_survives_expiry_scan() {
        let store = InMemorySessionStore::new();
        let user = Uuid::new_v4();
        let started = Utc::now() - chrono::Duration::seconds(300);
        let s = session(user, started);
        let id = s.session_id;
        store.insert(s).await.unwrap();

        // Heartbeat arrives before the janitor runs its scan
        let now = Utc::now();
        store
            .record_heartbeat(id, now, &PlaybackCounters::default(), None)
            .await
            .unwrap();

        let cutoff = now - chrono::Duration::seconds(90);
        let expired = store.expire_stale(cutoff, now).await.unwrap();
        assert!(expired.is_empty());
        assert_eq!(store.find(id).await.unwrap().unwrap().status, SessionStatus::Active);
    }

    #[tokio::test]
    async fn stale_sessions_expire() {
        let store = InMemorySessionStore::new();
        let started = Utc::now() - chrono::Duration::seconds(300);
        let s = session(Uuid::new_v4(), started);
        let id = s.session_id;
        store.insert(s).await.unwrap();

        let now = Utc::now();
        let cutoff = now - chrono::Duration::seconds(90);
        let expired = store.expire_stale(cutoff, now).await.unwrap();
        assert_eq!(expired.len(), 1);

        let stored = store.find(id).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Expired);
        assert!(stored.ended_at.is_some());

        // An expired session refuses further heartbeats
        let err = store
            .record_heartbeat(id, Utc::now(), &PlaybackCounters::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::ConstraintViolation { .. }));
    }

    #[tokio::test]
    async fn end_is_idempotent() {
        let store = InMemorySessionStore::new();
        let s = session(Uuid::new_v4(), Utc::now());
        let id = s.session_id;
        store.insert(s).await.unwrap();

        let first = store.end(id, Utc::now()).await.unwrap();
        assert_eq!(first.status, SessionStatus::Ended);
        let first_ended_at = first.ended_at;

        let second = store.end(id, Utc::now()).await.unwrap();
        assert_eq!(second.status, SessionStatus::Ended);
        assert_eq!(second.ended_at, first_ended_at);
    }

    #[tokio::test]
    async fn heartbeat_toggles_pause_state() {
        let store = InMemorySessionStore::new();
        let s = session(Uuid::new_v4(), Utc::now());
        let id = s.session_id;
        store.insert(s).await.unwrap();

        let paused = store
            .record_heartbeat(id, Utc::now(), &PlaybackCounters::default(), Some(PlaybackState::Paused))
            .await
            .unwrap();
        assert_eq!(paused.status, SessionStatus::Paused);

        let resumed = store
            .record_heartbeat(id, Utc::now(), &PlaybackCounters::default(), Some(PlaybackState::Playing))
            .await
            .unwrap();
        assert_eq!(resumed.status, SessionStatus::Active);
    }

    #[tokio::test]
    async fn co_play_counts_follow_recorded_plays() {
        let history = InMemoryListeningHistory::new();
        let user = Uuid::new_v4();
        let anchor = Uuid::new_v4();
        let follow_a = Uuid::new_v4();
        let follow_b = Uuid::new_v4();

        let now = Utc::now();
        // anchor -> a, anchor -> a, anchor -> b
        for (song, offset) in [
            (anchor, 50),
            (follow_a, 49),
            (anchor, 40),
            (follow_a, 39),
            (anchor, 30),
            (follow_b, 29),
        ] {
            history
                .record_play(user, song, now - chrono::Duration::minutes(offset), false)
                .await;
        }

        let co_played = history
            .co_played_songs(user, anchor, chrono::Duration::days(30))
            .await
            .unwrap();
        let counts: HashMap<Uuid, u32> = co_played.into_iter().collect();
        assert_eq!(counts[&follow_a], 2);
        assert_eq!(counts[&follow_b], 1);
    }

    #[tokio::test]
    async fn skip_rate_only_counts_the_last_day() {
        let history = InMemoryListeningHistory::new();
        let user = Uuid::new_v4();
        let now = Utc::now();

        // Two recent plays, one skipped; an old skip outside the window
        history
            .record_play(user, Uuid::new_v4(), now - chrono::Duration::hours(1), true)
            .await;
        history
            .record_play(user, Uuid::new_v4(), now - chrono::Duration::hours(2), false)
            .await;
        history
            .record_play(user, Uuid::new_v4(), now - chrono::Duration::days(3), true)
            .await;

        let rate = history.skip_rate_last_24h(user).await.unwrap();
        assert!((rate - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn live_count_ignores_terminal_sessions() {
        let store = InMemorySessionStore::new();
        let user = Uuid::new_v4();
        let a = session(user, Utc::now());
        let b = session(user, Utc::now());
        let ended_id = a.session_id;
        store.insert(a).await.unwrap();
        store.insert(b).await.unwrap();
        store.end(ended_id, Utc::now()).await.unwrap();

        assert_eq!(store.count_live_for_user(user).await.unwrap(), 1);
        assert_eq!(store.live_for_user(user).await.unwrap().len(), 1);
    }
}
