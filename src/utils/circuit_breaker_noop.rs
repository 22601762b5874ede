//! No-op circuit breaker
//!
//! Passes every operation straight through. Useful for tests and for
//! disabling protection on a single dependency via configuration; never
//! appropriate in production.

use async_trait::async_trait;
use std::time::Instant;

use crate::utils::circuit_breaker::{
    CircuitBreaker, CircuitBreakerError, CircuitBreakerResult, CircuitBreakerSnapshot,
    CircuitBreakerState,
};

#[derive(Debug, Default)]
pub struct NoOpCircuitBreaker;

impl NoOpCircuitBreaker {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CircuitBreaker for NoOpCircuitBreaker {
    async fn execute<T, F, Fut>(&self, mut operation: F) -> CircuitBreakerResult<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: std::future::Future<Output = Result<T, String>> + Send,
        T: Send,
    {
        let start_time = Instant::now();
        let result = operation()
            .await
            .map_err(CircuitBreakerError::ServiceError);
        CircuitBreakerResult {
            result,
            state: CircuitBreakerState::Closed,
            execution_time: start_time.elapsed(),
        }
    }

    async fn state(&self) -> CircuitBreakerState {
        CircuitBreakerState::Closed
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn force_open(&self) {}

    async fn force_closed(&self) {}

    async fn snapshot(&self) -> CircuitBreakerSnapshot {
        CircuitBreakerSnapshot {
            state: CircuitBreakerState::Closed,
            failure_count: 0,
            success_count: 0,
            total_calls: 0,
            successful_calls: 0,
            failed_calls: 0,
            failure_rate: 0.0,
            last_failure_at: None,
            opened_at: None,
        }
    }
}
