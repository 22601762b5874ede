//! Central registry of named circuit breakers
//!
//! One breaker per distinct upstream (storage endpoints, each CDN domain,
//! the database), created lazily from configuration profiles and shared by
//! reference with the collaborators that dispatch through them. The health
//! surface reads every registered breaker's snapshot from here.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::CircuitBreakerConfig;
use crate::utils::circuit_breaker::{
    CircuitBreaker, CircuitBreakerSnapshot, ConcreteCircuitBreaker,
    create_circuit_breaker_from_profile,
};

pub struct CircuitBreakerManager {
    /// Currently active circuit breakers indexed by service name
    active_breakers: Arc<RwLock<HashMap<String, Arc<ConcreteCircuitBreaker>>>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreakerManager {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            active_breakers: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Get or create the circuit breaker for a service
    pub async fn get_circuit_breaker(
        &self,
        service_name: &str,
    ) -> Result<Arc<ConcreteCircuitBreaker>, String> {
        {
            let breakers = self.active_breakers.read().await;
            if let Some(breaker) = breakers.get(service_name) {
                return Ok(breaker.clone());
            }
        }

        let profile = self.config.profile(service_name);
        info!(
            "Creating circuit breaker for service '{}' with profile: {:?}",
            service_name, profile
        );
        let breaker = create_circuit_breaker_from_profile(profile)?;

        let mut breakers = self.active_breakers.write().await;
        // Another caller may have raced us here; keep the first instance
        Ok(breakers
            .entry(service_name.to_string())
            .or_insert(breaker)
            .clone())
    }

    /// Snapshot every registered breaker, for the health surface
    pub async fn snapshots(&self) -> HashMap<String, CircuitBreakerSnapshot> {
        let breakers = self.active_breakers.read().await;
        let mut snapshots = HashMap::with_capacity(breakers.len());
        for (name, breaker) in breakers.iter() {
            snapshots.insert(name.clone(), breaker.snapshot().await);
        }
        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::circuit_breaker::CircuitBreakerState;

    #[tokio::test]
    async fn same_service_returns_the_same_breaker() {
        let manager = CircuitBreakerManager::new(CircuitBreakerConfig::default());
        let a = manager.get_circuit_breaker("storage").await.unwrap();
        let b = manager.get_circuit_breaker("storage").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn snapshots_cover_all_registered_breakers() {
        let manager = CircuitBreakerManager::new(CircuitBreakerConfig::default());
        let storage = manager.get_circuit_breaker("storage").await.unwrap();
        manager.get_circuit_breaker("database").await.unwrap();

        storage.force_open().await;

        let snapshots = manager.snapshots().await;
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots["storage"].state, CircuitBreakerState::Open);
        assert_eq!(snapshots["database"].state, CircuitBreakerState::Closed);
    }
}
