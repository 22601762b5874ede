//! Centralized error handling for the Cadenza streaming backend
//!
//! This module provides a comprehensive error handling system that unifies
//! error types across all application layers and provides consistent error
//! reporting and debugging capabilities.
//!
//! # Error Categories
//!
//! - **Repository Errors**: Data access layer failures
//! - **Transport Errors**: Object storage and CDN connectivity failures
//! - **Validation Errors**: Input validation and business rule violations
//! - **Session Errors**: Concurrency caps, expiry, ownership violations

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for Repository Results
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Convenience type alias for Transport Results
pub type TransportResult<T> = Result<T, TransportError>;
