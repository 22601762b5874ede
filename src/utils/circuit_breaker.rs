use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Generic result for circuit breaker operations
#[derive(Debug, Clone)]
pub struct CircuitBreakerResult<T> {
    pub result: Result<T, CircuitBreakerError>,
    pub state: CircuitBreakerState,
    pub execution_time: Duration,
}

#[derive(Debug, Clone)]
pub enum CircuitBreakerError {
    /// Circuit breaker is open (or out of probe budget), operation blocked
    CircuitOpen,
    /// Operation failed due to underlying service error
    ServiceError(String),
    /// Operation timed out
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitBreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Generic circuit breaker trait that different implementations can provide
#[async_trait]
pub trait CircuitBreaker: Send + Sync {
    /// Execute an async operation through the circuit breaker
    async fn execute<T, F, Fut>(&self, operation: F) -> CircuitBreakerResult<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, String>> + Send,
        T: Send;

    /// Get current circuit breaker state
    async fn state(&self) -> CircuitBreakerState;

    /// Check if operations are currently allowed
    async fn is_available(&self) -> bool;

    /// Force circuit breaker to open state (for testing)
    async fn force_open(&self);

    /// Force circuit breaker to closed state (for testing)
    async fn force_closed(&self);

    /// Get a point-in-time view of the breaker, for health reporting
    async fn snapshot(&self) -> CircuitBreakerSnapshot;
}

/// Point-in-time breaker state exposed on the health surface
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerSnapshot {
    pub state: CircuitBreakerState,
    /// Consecutive failures observed in the closed state
    pub failure_count: u32,
    /// Consecutive successes observed in the half-open state
    pub success_count: u32,
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub failure_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opened_at: Option<DateTime<Utc>>,
}

/// Configuration for circuit breakers
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip the breaker
    pub failure_threshold: u32,
    /// Consecutive half-open successes that close it again
    pub success_threshold: u32,
    /// Concurrent probe calls admitted while half-open
    pub half_open_max_probes: u32,
    /// Dwell time in the open state before probing resumes
    pub reset_timeout: Duration,
    /// Deadline applied to each dispatched operation
    pub operation_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            half_open_max_probes: 3,
            reset_timeout: Duration::from_secs(60),
            operation_timeout: Duration::from_secs(5),
        }
    }
}

/// Factory selector for the available implementations
pub enum CircuitBreakerType {
    /// Probing implementation with bounded half-open admission (recommended)
    Probing,
    /// WARNING: NoOp circuit breaker always passes operations through - DO NOT USE IN PRODUCTION
    #[allow(dead_code)]
    NoOp,
}

/// Concrete circuit breaker implementation that wraps different types
#[derive(Debug)]
pub enum ConcreteCircuitBreaker {
    Probing(crate::utils::circuit_breaker_probing::ProbingCircuitBreaker),
    NoOp(crate::utils::circuit_breaker_noop::NoOpCircuitBreaker),
}

#[async_trait]
impl CircuitBreaker for ConcreteCircuitBreaker {
    async fn execute<T, F, Fut>(&self, operation: F) -> CircuitBreakerResult<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, String>> + Send,
        T: Send,
    {
        match self {
            ConcreteCircuitBreaker::Probing(cb) => cb.execute(operation).await,
            ConcreteCircuitBreaker::NoOp(cb) => cb.execute(operation).await,
        }
    }

    async fn state(&self) -> CircuitBreakerState {
        match self {
            ConcreteCircuitBreaker::Probing(cb) => cb.state().await,
            ConcreteCircuitBreaker::NoOp(cb) => cb.state().await,
        }
    }

    async fn is_available(&self) -> bool {
        match self {
            ConcreteCircuitBreaker::Probing(cb) => cb.is_available().await,
            ConcreteCircuitBreaker::NoOp(cb) => cb.is_available().await,
        }
    }

    async fn force_open(&self) {
        match self {
            ConcreteCircuitBreaker::Probing(cb) => cb.force_open().await,
            ConcreteCircuitBreaker::NoOp(cb) => cb.force_open().await,
        }
    }

    async fn force_closed(&self) {
        match self {
            ConcreteCircuitBreaker::Probing(cb) => cb.force_closed().await,
            ConcreteCircuitBreaker::NoOp(cb) => cb.force_closed().await,
        }
    }

    async fn snapshot(&self) -> CircuitBreakerSnapshot {
        match self {
            ConcreteCircuitBreaker::Probing(cb) => cb.snapshot().await,
            ConcreteCircuitBreaker::NoOp(cb) => cb.snapshot().await,
        }
    }
}

// Implement CircuitBreaker for Arc<ConcreteCircuitBreaker> to make it easier to use
#[async_trait]
impl CircuitBreaker for Arc<ConcreteCircuitBreaker> {
    async fn execute<T, F, Fut>(&self, operation: F) -> CircuitBreakerResult<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, String>> + Send,
        T: Send,
    {
        self.as_ref().execute(operation).await
    }

    async fn state(&self) -> CircuitBreakerState {
        self.as_ref().state().await
    }

    async fn is_available(&self) -> bool {
        self.as_ref().is_available().await
    }

    async fn force_open(&self) {
        self.as_ref().force_open().await
    }

    async fn force_closed(&self) {
        self.as_ref().force_closed().await
    }

    async fn snapshot(&self) -> CircuitBreakerSnapshot {
        self.as_ref().snapshot().await
    }
}

/// Create a circuit breaker from a config profile
pub fn create_circuit_breaker_from_profile(
    profile: &crate::config::CircuitBreakerProfileConfig,
) -> Result<Arc<ConcreteCircuitBreaker>, String> {
    let cb_type = match profile.implementation_type.as_str() {
        "probing" => CircuitBreakerType::Probing,
        "noop" => CircuitBreakerType::NoOp,
        other => {
            return Err(format!(
                "Unsupported circuit breaker type: {other} (supported: probing, noop)"
            ));
        }
    };

    let config = CircuitBreakerConfig {
        failure_threshold: profile.failure_threshold,
        success_threshold: profile.success_threshold,
        half_open_max_probes: profile.half_open_max_probes,
        reset_timeout: profile.reset_timeout,
        operation_timeout: profile.operation_timeout,
    };

    Ok(create_circuit_breaker(cb_type, config))
}

/// Factory function to create different circuit breaker implementations
pub fn create_circuit_breaker(
    cb_type: CircuitBreakerType,
    config: CircuitBreakerConfig,
) -> Arc<ConcreteCircuitBreaker> {
    use crate::utils::{
        circuit_breaker_noop::NoOpCircuitBreaker, circuit_breaker_probing::ProbingCircuitBreaker,
    };

    let cb = match cb_type {
        CircuitBreakerType::Probing => {
            ConcreteCircuitBreaker::Probing(ProbingCircuitBreaker::new(config))
        }
        CircuitBreakerType::NoOp => {
            warn!("CREATING NOOP CIRCUIT BREAKER - THIS SHOULD NOT BE USED IN PRODUCTION!");
            ConcreteCircuitBreaker::NoOp(NoOpCircuitBreaker::new())
        }
    };

    Arc::new(cb)
}
