//! Probing circuit breaker implementation
//!
//! Consecutive failures trip the breaker open; after the reset timeout a
//! bounded number of concurrent probe calls is admitted, and enough probe
//! successes close the circuit again. The internal lock is held only across
//! admission and bookkeeping, never across the dispatched operation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::utils::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerResult,
    CircuitBreakerSnapshot, CircuitBreakerState,
};

#[derive(Debug)]
struct ProbingState {
    state: CircuitBreakerState,
    /// Consecutive failures while closed
    failure_count: u32,
    /// Consecutive successes while half-open
    success_count: u32,
    /// Probe calls currently in flight while half-open
    inflight_probes: u32,
    /// When the circuit last opened (monotonic, drives the reset timer)
    last_opened: Option<Instant>,
    /// Wall-clock companions for the health surface
    opened_at: Option<DateTime<Utc>>,
    last_failure_at: Option<DateTime<Utc>>,
    total_calls: u64,
    successful_calls: u64,
    failed_calls: u64,
}

impl Default for ProbingState {
    fn default() -> Self {
        Self {
            state: CircuitBreakerState::Closed,
            failure_count: 0,
            success_count: 0,
            inflight_probes: 0,
            last_opened: None,
            opened_at: None,
            last_failure_at: None,
            total_calls: 0,
            successful_calls: 0,
            failed_calls: 0,
        }
    }
}

#[derive(Debug)]
pub struct ProbingCircuitBreaker {
    config: CircuitBreakerConfig,
    state: Arc<RwLock<ProbingState>>,
}

enum Admission {
    Regular,
    Probe,
    Denied(CircuitBreakerState),
}

impl ProbingCircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        debug!("Creating ProbingCircuitBreaker with config: {:?}", config);
        Self {
            config,
            state: Arc::new(RwLock::new(ProbingState::default())),
        }
    }

    /// Decide whether a call may be dispatched, transitioning OPEN to
    /// HALF_OPEN when the reset timeout has elapsed
    async fn admit(&self) -> Admission {
        let mut state = self.state.write().await;

        match state.state {
            CircuitBreakerState::Closed => Admission::Regular,
            CircuitBreakerState::Open => {
                let dwell_elapsed = state
                    .last_opened
                    .is_some_and(|opened| opened.elapsed() >= self.config.reset_timeout);
                if dwell_elapsed {
                    info!("Circuit breaker transitioning from Open to HalfOpen");
                    state.state = CircuitBreakerState::HalfOpen;
                    state.success_count = 0;
                    state.inflight_probes = 1;
                    Admission::Probe
                } else {
                    debug!("Circuit breaker open, blocking request");
                    Admission::Denied(CircuitBreakerState::Open)
                }
            }
            CircuitBreakerState::HalfOpen => {
                if state.inflight_probes < self.config.half_open_max_probes {
                    state.inflight_probes += 1;
                    Admission::Probe
                } else {
                    debug!("Circuit breaker half-open probe budget exhausted, blocking request");
                    Admission::Denied(CircuitBreakerState::HalfOpen)
                }
            }
        }
    }

    /// Record the outcome of a dispatched call and update state
    async fn record_result(&self, success: bool, was_probe: bool) {
        let mut state = self.state.write().await;

        state.total_calls += 1;
        if was_probe {
            state.inflight_probes = state.inflight_probes.saturating_sub(1);
        }

        if success {
            state.successful_calls += 1;
            match state.state {
                CircuitBreakerState::Closed => {
                    state.failure_count = 0;
                }
                CircuitBreakerState::HalfOpen => {
                    state.success_count += 1;
                    if state.success_count >= self.config.success_threshold {
                        info!("Circuit breaker transitioning from HalfOpen to Closed");
                        state.state = CircuitBreakerState::Closed;
                        state.failure_count = 0;
                        state.success_count = 0;
                        state.inflight_probes = 0;
                    }
                }
                // A straggler admitted before the trip; nothing to transition
                CircuitBreakerState::Open => {}
            }
        } else {
            state.failed_calls += 1;
            state.last_failure_at = Some(Utc::now());
            match state.state {
                CircuitBreakerState::Closed => {
                    state.failure_count += 1;
                    if state.failure_count >= self.config.failure_threshold {
                        warn!(
                            "Circuit breaker opening after {} consecutive failures",
                            state.failure_count
                        );
                        Self::open(&mut state);
                    }
                }
                CircuitBreakerState::HalfOpen => {
                    warn!("Circuit breaker returning to Open state from HalfOpen due to probe failure");
                    Self::open(&mut state);
                }
                CircuitBreakerState::Open => {
                    state.last_opened = Some(Instant::now());
                }
            }
        }
    }

    fn open(state: &mut ProbingState) {
        state.state = CircuitBreakerState::Open;
        state.last_opened = Some(Instant::now());
        state.opened_at = Some(Utc::now());
        state.success_count = 0;
        state.inflight_probes = 0;
    }
}

#[async_trait]
impl CircuitBreaker for ProbingCircuitBreaker {
    async fn execute<T, F, Fut>(&self, mut operation: F) -> CircuitBreakerResult<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: std::future::Future<Output = Result<T, String>> + Send,
        T: Send,
    {
        let start_time = Instant::now();

        let was_probe = match self.admit().await {
            Admission::Regular => false,
            Admission::Probe => true,
            Admission::Denied(state) => {
                return CircuitBreakerResult {
                    result: Err(CircuitBreakerError::CircuitOpen),
                    state,
                    execution_time: start_time.elapsed(),
                };
            }
        };

        let result = tokio::time::timeout(self.config.operation_timeout, operation()).await;
        let execution_time = start_time.elapsed();

        match result {
            Ok(Ok(value)) => {
                self.record_result(true, was_probe).await;
                CircuitBreakerResult {
                    result: Ok(value),
                    state: self.state().await,
                    execution_time,
                }
            }
            Ok(Err(error)) => {
                self.record_result(false, was_probe).await;
                CircuitBreakerResult {
                    result: Err(CircuitBreakerError::ServiceError(error)),
                    state: self.state().await,
                    execution_time,
                }
            }
            Err(_) => {
                self.record_result(false, was_probe).await;
                CircuitBreakerResult {
                    result: Err(CircuitBreakerError::Timeout),
                    state: self.state().await,
                    execution_time,
                }
            }
        }
    }

    async fn state(&self) -> CircuitBreakerState {
        self.state.read().await.state
    }

    async fn is_available(&self) -> bool {
        let state = self.state.read().await;
        match state.state {
            CircuitBreakerState::Closed | CircuitBreakerState::HalfOpen => true,
            CircuitBreakerState::Open => state
                .last_opened
                .is_some_and(|opened| opened.elapsed() >= self.config.reset_timeout),
        }
    }

    async fn force_open(&self) {
        info!("Manually forcing circuit breaker to Open state");
        let mut state = self.state.write().await;
        Self::open(&mut state);
    }

    async fn force_closed(&self) {
        info!("Manually forcing circuit breaker to Closed state");
        let mut state = self.state.write().await;
        state.state = CircuitBreakerState::Closed;
        state.failure_count = 0;
        state.success_count = 0;
        state.inflight_probes = 0;
    }

    async fn snapshot(&self) -> CircuitBreakerSnapshot {
        let state = self.state.read().await;
        let failure_rate = if state.total_calls > 0 {
            state.failed_calls as f64 / state.total_calls as f64
        } else {
            0.0
        };

        CircuitBreakerSnapshot {
            state: state.state,
            failure_count: state.failure_count,
            success_count: state.success_count,
            total_calls: state.total_calls,
            successful_calls: state.successful_calls,
            failed_calls: state.failed_calls,
            failure_rate,
            last_failure_at: state.last_failure_at,
            opened_at: match state.state {
                CircuitBreakerState::Closed => None,
                _ => state.opened_at,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn breaker(reset_timeout: Duration) -> ProbingCircuitBreaker {
        ProbingCircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 5,
            success_threshold: 2,
            half_open_max_probes: 3,
            reset_timeout,
            operation_timeout: Duration::from_secs(1),
        })
    }

    async fn fail(cb: &ProbingCircuitBreaker) {
        let _ = cb
            .execute(|| async { Err::<(), String>("boom".to_string()) })
            .await;
    }

    async fn succeed(cb: &ProbingCircuitBreaker) {
        let _ = cb.execute(|| async { Ok::<_, String>(()) }).await;
    }

    #[tokio::test]
    async fn consecutive_failures_trip_the_breaker() {
        let cb = breaker(Duration::from_secs(60));

        for _ in 0..4 {
            fail(&cb).await;
        }
        assert_eq!(cb.state().await, CircuitBreakerState::Closed);

        fail(&cb).await;
        assert_eq!(cb.state().await, CircuitBreakerState::Open);
    }

    #[tokio::test]
    async fn open_breaker_fast_fails_without_invoking_operation() {
        let cb = breaker(Duration::from_secs(60));
        cb.force_open().await;

        let invocations = AtomicU32::new(0);
        let result = cb
            .execute(|| {
                invocations.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, String>(()) }
            })
            .await;

        assert!(matches!(result.result, Err(CircuitBreakerError::CircuitOpen)));
        assert_eq!(invocations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn success_resets_consecutive_failure_count() {
        let cb = breaker(Duration::from_secs(60));

        for _ in 0..4 {
            fail(&cb).await;
        }
        succeed(&cb).await;
        for _ in 0..4 {
            fail(&cb).await;
        }
        // 4 failures, success, 4 failures: threshold of 5 never reached
        assert_eq!(cb.state().await, CircuitBreakerState::Closed);
    }

    #[tokio::test]
    async fn recovery_needs_success_threshold_probes() {
        let cb = breaker(Duration::from_millis(50));

        for _ in 0..5 {
            fail(&cb).await;
        }
        assert_eq!(cb.state().await, CircuitBreakerState::Open);

        tokio::time::sleep(Duration::from_millis(60)).await;

        succeed(&cb).await;
        assert_eq!(cb.state().await, CircuitBreakerState::HalfOpen);
        succeed(&cb).await;
        assert_eq!(cb.state().await, CircuitBreakerState::Closed);
    }

    #[tokio::test]
    async fn probe_failure_reopens_and_restarts_the_timer() {
        let cb = breaker(Duration::from_millis(50));

        for _ in 0..5 {
            fail(&cb).await;
        }
        tokio::time::sleep(Duration::from_millis(60)).await;

        fail(&cb).await;
        assert_eq!(cb.state().await, CircuitBreakerState::Open);

        // Timer restarted: still open right after the failed probe
        let result = cb.execute(|| async { Ok::<_, String>(()) }).await;
        assert!(matches!(result.result, Err(CircuitBreakerError::CircuitOpen)));
    }

    #[tokio::test]
    async fn half_open_admits_bounded_concurrent_probes() {
        let cb = Arc::new(breaker(Duration::from_millis(50)));

        for _ in 0..5 {
            fail(&cb).await;
        }
        tokio::time::sleep(Duration::from_millis(60)).await;

        // Three slow probes occupy the whole budget
        let (release_tx, release_rx) = tokio::sync::watch::channel(false);
        let mut probes = Vec::new();
        for _ in 0..3 {
            let cb = cb.clone();
            let release = release_rx.clone();
            probes.push(tokio::spawn(async move {
                cb.execute(move || {
                    let mut release = release.clone();
                    async move {
                        while !*release.borrow_and_update() {
                            if release.changed().await.is_err() {
                                break;
                            }
                        }
                        Ok::<_, String>(())
                    }
                })
                .await
            }));
        }
        // Give the probe tasks time to be admitted
        tokio::time::sleep(Duration::from_millis(20)).await;

        let denied = cb.execute(|| async { Ok::<_, String>(()) }).await;
        assert!(matches!(denied.result, Err(CircuitBreakerError::CircuitOpen)));

        release_tx.send(true).unwrap();
        for probe in probes {
            assert!(probe.await.unwrap().result.is_ok());
        }
        assert_eq!(cb.state().await, CircuitBreakerState::Closed);
    }

    #[tokio::test]
    async fn operation_timeout_counts_as_failure() {
        let cb = ProbingCircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            success_threshold: 2,
            half_open_max_probes: 3,
            reset_timeout: Duration::from_secs(60),
            operation_timeout: Duration::from_millis(10),
        });

        let result = cb
            .execute(|| async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok::<_, String>(())
            })
            .await;

        assert!(matches!(result.result, Err(CircuitBreakerError::Timeout)));
        assert_eq!(cb.state().await, CircuitBreakerState::Open);
    }

    #[tokio::test]
    async fn snapshot_reports_counters() {
        let cb = breaker(Duration::from_secs(60));
        succeed(&cb).await;
        fail(&cb).await;

        let snapshot = cb.snapshot().await;
        assert_eq!(snapshot.total_calls, 2);
        assert_eq!(snapshot.successful_calls, 1);
        assert_eq!(snapshot.failed_calls, 1);
        assert_eq!(snapshot.failure_count, 1);
        assert!(snapshot.last_failure_at.is_some());
        assert!(snapshot.opened_at.is_none());
    }
}
