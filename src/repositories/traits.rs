//! Repository trait definitions
//!
//! These traits define the data-access contracts the core requires from
//! external collaborators. Implementations must make each operation atomic
//! with respect to the backing store: session mutations in particular are
//! total-ordered per session by the owning store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::RepositoryResult;
use crate::models::{
    BufferObservation, PlaybackCounters, PlaybackState, SongInfo, StreamingSession,
    SubscriptionTier,
};

/// Store for streaming sessions (persistence plus active index)
///
/// The session controller owns all business rules; the store guarantees
/// atomicity and per-session ordering. `record_heartbeat` and `change_song`
/// must refuse terminal sessions, and `expire_stale` must re-check
/// `last_heartbeat_at` under the same critical section that performs the
/// transition so a heartbeat received before the cutoff always wins.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn insert(&self, session: StreamingSession) -> RepositoryResult<()>;

    async fn find(&self, session_id: Uuid) -> RepositoryResult<Option<StreamingSession>>;

    /// Sessions in ACTIVE or PAUSED state for one user
    async fn live_for_user(&self, user_id: Uuid) -> RepositoryResult<Vec<StreamingSession>>;

    async fn count_live_for_user(&self, user_id: Uuid) -> RepositoryResult<u32>;

    /// Merge heartbeat counters (monotonic max), stamp `last_heartbeat_at`,
    /// and apply an optional playing/paused transition
    async fn record_heartbeat(
        &self,
        session_id: Uuid,
        received_at: DateTime<Utc>,
        counters: &PlaybackCounters,
        state: Option<PlaybackState>,
    ) -> RepositoryResult<StreamingSession>;

    /// Swap the playing song atomically, preserving counters
    async fn change_song(
        &self,
        session_id: Uuid,
        new_song_id: Uuid,
        received_at: DateTime<Utc>,
    ) -> RepositoryResult<StreamingSession>;

    /// Transition to ENDED. Idempotent: terminal sessions return unchanged.
    async fn end(
        &self,
        session_id: Uuid,
        ended_at: DateTime<Utc>,
    ) -> RepositoryResult<StreamingSession>;

    /// Expire every live session whose `last_heartbeat_at` is before the
    /// cutoff; returns the sessions that were transitioned
    async fn expire_stale(
        &self,
        cutoff: DateTime<Utc>,
        expired_at: DateTime<Utc>,
    ) -> RepositoryResult<Vec<StreamingSession>>;
}

/// Listening history capability used by the preload predictor
#[async_trait]
pub trait ListeningHistory: Send + Sync {
    /// Subsequent tracks of a playlist the user is currently playing
    /// through, in play order; empty when no playlist context exists
    async fn playlist_successors(
        &self,
        user_id: Uuid,
        song_id: Uuid,
        limit: usize,
    ) -> RepositoryResult<Vec<Uuid>>;

    /// Songs co-played with the given song inside the sliding window,
    /// with conditional play counts
    async fn co_played_songs(
        &self,
        user_id: Uuid,
        song_id: Uuid,
        window: chrono::Duration,
    ) -> RepositoryResult<Vec<(Uuid, u32)>>;

    /// Fraction of plays the user skipped over the last 24 hours, in [0, 1]
    async fn skip_rate_last_24h(&self, user_id: Uuid) -> RepositoryResult<f64>;
}

/// Song catalog capability: duration and precomputed quality variants
#[async_trait]
pub trait SongCatalog: Send + Sync {
    async fn song(&self, song_id: Uuid) -> RepositoryResult<Option<SongInfo>>;
}

/// Resolves a user's subscription tier (billing is external)
#[async_trait]
pub trait SubscriberDirectory: Send + Sync {
    async fn subscription_tier(&self, user_id: Uuid) -> RepositoryResult<SubscriptionTier>;
}

/// Append-only sink for client buffer metrics, keyed (sessionId, receivedAt)
#[async_trait]
pub trait BufferMetricsRepository: Send + Sync {
    async fn append(
        &self,
        session_id: Uuid,
        received_at: DateTime<Utc>,
        observation: &BufferObservation,
    ) -> RepositoryResult<()>;
}

/// Connectivity probe against the backing database, for the health surface
#[async_trait]
pub trait DatabasePing: Send + Sync {
    /// Round-trip a trivial statement, returning the observed latency
    async fn ping(&self) -> RepositoryResult<std::time::Duration>;
}
