//! Adaptive buffer strategy engine
//!
//! Pure computation of per-stream buffer configurations, client buffer
//! health scoring and predictive preload hints. Nothing in this module
//! performs I/O directly; the preload predictor receives its data access
//! as a repository capability so every function stays deterministic and
//! testable.

pub mod engine;
pub mod health;
pub mod preload;

pub use engine::compute_buffer_config;
pub use health::compute_health_score;
pub use preload::PreloadPredictor;
