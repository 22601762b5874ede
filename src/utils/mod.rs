//! Shared utilities
//!
//! Home of the resilience primitives: the circuit breaker abstraction with
//! its implementations, and retry-with-backoff.

pub mod circuit_breaker;
pub mod circuit_breaker_noop;
pub mod circuit_breaker_probing;
pub mod retry;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerResult,
    CircuitBreakerSnapshot, CircuitBreakerState, ConcreteCircuitBreaker, create_circuit_breaker,
    create_circuit_breaker_from_profile,
};
pub use retry::{RetryConfig, RetryableError, with_retry};
