//! Session expiry janitor
//!
//! A single periodic task that expires sessions whose last heartbeat is
//! older than the heartbeat timeout. The store re-checks freshness inside
//! its own critical section, so a heartbeat received before the scan's
//! cutoff always wins over the scan.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::observability::AppObservability;
use crate::repositories::SessionRepository;

pub struct SessionJanitor {
    sessions: Arc<dyn SessionRepository>,
    heartbeat_timeout: Duration,
    interval: Duration,
    observability: Arc<AppObservability>,
}

impl SessionJanitor {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        heartbeat_timeout: Duration,
        interval: Duration,
        observability: Arc<AppObservability>,
    ) -> Self {
        Self {
            sessions,
            heartbeat_timeout,
            interval,
            observability,
        }
    }

    /// Spawn the scan loop; it stops when the token is cancelled
    pub fn spawn(self, cancellation_token: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep().await;
                    }
                    _ = cancellation_token.cancelled() => {
                        debug!("Session janitor shutting down");
                        break;
                    }
                }
            }
        })
    }

    pub async fn sweep(&self) {
        let now = Utc::now();
        let cutoff = now
            - chrono::Duration::from_std(self.heartbeat_timeout)
                .unwrap_or_else(|_| chrono::Duration::seconds(90));

        match self.sessions.expire_stale(cutoff, now).await {
            Ok(expired) => {
                for session in &expired {
                    warn!(
                        "Session expired: {} | user: {} | last heartbeat: {} | streamed: {}s",
                        session.session_id,
                        session.user_id,
                        session.last_heartbeat_at,
                        session.counters.streamed_seconds,
                    );
                }
                if !expired.is_empty() {
                    self.observability
                        .sessions_expired
                        .add(expired.len() as u64, &[]);
                    self.observability.active_sessions.add(-(expired.len() as i64), &[]);
                }
            }
            Err(err) => {
                warn!("Session expiry sweep failed: {err}");
            }
        }
    }
}
