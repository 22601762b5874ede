//! Health check HTTP handlers
//!
//! `/health` aggregates circuit breaker state across storage and CDN plus a
//! database ping into a healthy/degraded/unhealthy verdict. `/health/live`
//! only proves the process responds; `/health/ready` proves the storage
//! layer serves a token probe key. Aggregation downgrades the verdict but
//! never fails the request itself.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::time::Duration;

use crate::utils::circuit_breaker::{CircuitBreakerSnapshot, CircuitBreakerState};
use crate::web::{AppState, extractors::RequestContext};

/// Database latency above this downgrades the verdict to degraded
const DB_ELEVATED_THRESHOLD: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
enum Verdict {
    Healthy,
    Degraded,
    Unhealthy,
}

impl Verdict {
    fn worsen(&mut self, other: Verdict) {
        if (other as u8) > (*self as u8) {
            *self = other;
        }
    }

    fn for_breaker(state: CircuitBreakerState) -> Verdict {
        match state {
            CircuitBreakerState::Closed => Verdict::Healthy,
            CircuitBreakerState::HalfOpen => Verdict::Degraded,
            CircuitBreakerState::Open => Verdict::Unhealthy,
        }
    }
}

/// Aggregate health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Healthy or degraded"),
        (status = 503, description = "Unhealthy"),
    ),
    tag = "health"
)]
pub async fn health_check(State(state): State<AppState>, _context: RequestContext) -> Response {
    let mut verdict = Verdict::Healthy;

    // Every breaker registered with the central manager (storage endpoints
    // and CDN domains alike)
    let breakers = state.breaker_manager.snapshots().await;
    for snapshot in breakers.values() {
        verdict.worsen(Verdict::for_breaker(snapshot.state));
    }

    // Per-domain CDN breakers
    let cdn_domains = state.cdn.domain_snapshots().await;
    for (_, snapshot) in &cdn_domains {
        verdict.worsen(Verdict::for_breaker(snapshot.state));
    }
    let available_cdn_domains = state.cdn.available_domains().await;

    // Database ping
    let database = match state.db.ping().await {
        Ok(latency) => {
            if latency > DB_ELEVATED_THRESHOLD {
                verdict.worsen(Verdict::Degraded);
            }
            serde_json::json!({
                "status": "connected",
                "responseTimeMs": latency.as_millis() as u64,
                "elevated": latency > DB_ELEVATED_THRESHOLD,
            })
        }
        Err(err) => {
            verdict.worsen(Verdict::Unhealthy);
            serde_json::json!({
                "status": "disconnected",
                "error": err.to_string(),
            })
        }
    };

    let body = serde_json::json!({
        "status": verdict,
        "timestamp": chrono::Utc::now(),
        "version": env!("CARGO_PKG_VERSION"),
        "components": {
            "breakers": breakers,
            "cdn": {
                "domains": cdn_domains
                    .into_iter()
                    .collect::<std::collections::BTreeMap<String, CircuitBreakerSnapshot>>(),
                "availableCdnDomains": available_cdn_domains,
            },
            "database": database,
        },
    });

    let status = match verdict {
        Verdict::Healthy | Verdict::Degraded => StatusCode::OK,
        Verdict::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(body)).into_response()
}

/// Liveness check: if we can respond, we're alive
#[utoipa::path(
    get,
    path = "/health/live",
    responses((status = 200, description = "Process is responsive")),
    tag = "health"
)]
pub async fn liveness_check(_context: RequestContext) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "alive",
        "timestamp": chrono::Utc::now(),
    }))
}

/// Readiness check: storage must serve the token probe key
#[utoipa::path(
    get,
    path = "/health/ready",
    responses(
        (status = 200, description = "Ready to serve"),
        (status = 503, description = "Storage unreachable"),
    ),
    tag = "health"
)]
pub async fn readiness_check(State(state): State<AppState>, _context: RequestContext) -> Response {
    match state.storage.probe(&state.config.storage.probe_key).await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "timestamp": chrono::Utc::now(),
            })),
        )
            .into_response(),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "error": err.to_string(),
                "timestamp": chrono::Utc::now(),
            })),
        )
            .into_response(),
    }
}
