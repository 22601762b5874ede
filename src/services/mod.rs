//! Service layer
//!
//! Business logic sitting between the web handlers and the repositories:
//! the session controller and its janitor, the circuit breaker registry,
//! and URL/token signing.

pub mod circuit_breaker_manager;
pub mod session_janitor;
pub mod session_manager;
pub mod signing;

pub use circuit_breaker_manager::CircuitBreakerManager;
pub use session_janitor::SessionJanitor;
pub use session_manager::{
    HeartbeatOutcome, RefreshedUrl, SessionManager, StartSessionRequest, StartedSession,
};
pub use signing::{StreamTokenVerifier, UrlSigner};
