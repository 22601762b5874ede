//! Audio CDN delivery with per-domain circuit breakers
//!
//! Each CDN hostname gets its own breaker. URL issuance and fetches rotate
//! round-robin across domains whose breaker is not open; when every domain
//! is open, calls fall back to the origin object store (which carries its
//! own breaker inside [`ResilientStore`]).

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use url::Url;

use crate::errors::{TransportError, TransportResult};
use crate::services::signing::UrlSigner;
use crate::utils::circuit_breaker::{
    CircuitBreaker, CircuitBreakerSnapshot, CircuitBreakerState, ConcreteCircuitBreaker,
};
use crate::utils::retry::RetryConfig;

use super::storage::{HttpObjectStore, ObjectStore, ResilientStore};

struct CdnDomain {
    host: String,
    store: HttpObjectStore,
    breaker: Arc<ConcreteCircuitBreaker>,
}

/// CDN domain pool with rotation and origin fallback
pub struct CdnDelivery {
    domains: Vec<CdnDomain>,
    cursor: AtomicUsize,
    origin: Arc<ResilientStore>,
    signer: Arc<UrlSigner>,
    retry: RetryConfig,
}

impl CdnDelivery {
    /// Build the pool; `make_breaker` supplies one breaker per hostname so
    /// deployments can apply a per-service profile
    pub fn new(
        domains: &[String],
        origin: Arc<ResilientStore>,
        signer: Arc<UrlSigner>,
        retry: RetryConfig,
        operation_timeout: Duration,
        mut make_breaker: impl FnMut(&str) -> Arc<ConcreteCircuitBreaker>,
    ) -> TransportResult<Self> {
        let mut pool = Vec::with_capacity(domains.len());
        for host in domains {
            let base_url = Url::parse(&format!("https://{host}/")).map_err(|e| {
                TransportError::Connection {
                    endpoint: host.clone(),
                    message: format!("invalid CDN domain: {e}"),
                }
            })?;
            pool.push(CdnDomain {
                host: host.clone(),
                store: HttpObjectStore::new(host.clone(), base_url, operation_timeout),
                breaker: make_breaker(host),
            });
        }
        Ok(Self {
            domains: pool,
            cursor: AtomicUsize::new(0),
            origin,
            signer,
            retry,
        })
    }

    /// Number of CDN domains whose breaker currently admits traffic
    pub async fn available_domains(&self) -> usize {
        let mut available = 0;
        for domain in &self.domains {
            if domain.breaker.state().await != CircuitBreakerState::Open {
                available += 1;
            }
        }
        available
    }

    /// Per-domain breaker snapshots for the health surface
    pub async fn domain_snapshots(&self) -> Vec<(String, CircuitBreakerSnapshot)> {
        let mut snapshots = Vec::with_capacity(self.domains.len());
        for domain in &self.domains {
            snapshots.push((domain.host.clone(), domain.breaker.snapshot().await));
        }
        snapshots
    }

    /// Round-robin pick of the next domain whose breaker is not open
    async fn next_healthy_domain(&self) -> Option<&CdnDomain> {
        if self.domains.is_empty() {
            return None;
        }
        let start = self.cursor.fetch_add(1, Ordering::Relaxed);
        for offset in 0..self.domains.len() {
            let domain = &self.domains[(start + offset) % self.domains.len()];
            if domain.breaker.state().await != CircuitBreakerState::Open {
                return Some(domain);
            }
        }
        None
    }

    /// Issue a signed media URL, preferring a healthy CDN domain and
    /// falling back to the origin store when the whole pool is open
    pub async fn signed_media_url(
        &self,
        key: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> TransportResult<(String, bool)> {
        match self.next_healthy_domain().await {
            Some(domain) => {
                let url = self
                    .signer
                    .sign_url(domain.store.base_url(), key, ttl, now)
                    .map_err(|e| TransportError::Connection {
                        endpoint: domain.host.clone(),
                        message: e.to_string(),
                    })?;
                Ok((url, true))
            }
            None => {
                debug!("All CDN breakers open, issuing origin media URL");
                let url = self
                    .signer
                    .sign_url(self.origin.origin_base_url(), key, ttl, now)
                    .map_err(|e| TransportError::Connection {
                        endpoint: self.origin.primary_name().to_string(),
                        message: e.to_string(),
                    })?;
                Ok((url, false))
            }
        }
    }

    /// Issue a signed URL straight against the origin store, for direct
    /// (non-CDN) streams
    pub fn signed_origin_url(
        &self,
        key: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> TransportResult<String> {
        self.signer
            .sign_url(self.origin.origin_base_url(), key, ttl, now)
            .map_err(|e| TransportError::Connection {
                endpoint: self.origin.primary_name().to_string(),
                message: e.to_string(),
            })
    }

    /// Fetch an object through the CDN pool, falling back to origin when
    /// every domain breaker is open or the chosen domain fails hard
    pub async fn fetch(&self, key: &str) -> TransportResult<Vec<u8>> {
        let Some(domain) = self.next_healthy_domain().await else {
            warn!("All CDN breakers open, fetching {key} from origin");
            return self.origin.fetch(key).await;
        };

        match self.fetch_from_domain(domain, key).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if should_fall_back(&err) => {
                warn!(
                    "CDN fetch via {} failed ({err}), falling back to origin",
                    domain.host
                );
                self.origin.fetch(key).await
            }
            Err(err) => Err(err),
        }
    }

    /// One breaker call wrapping a retried fetch against a single domain
    async fn fetch_from_domain(&self, domain: &CdnDomain, key: &str) -> TransportResult<Vec<u8>> {
        let holder: Arc<std::sync::Mutex<Option<TransportError>>> =
            Arc::new(std::sync::Mutex::new(None));
        let retry = self.retry.clone();

        let result = domain
            .breaker
            .execute(|| {
                let key = key.to_string();
                let retry = retry.clone();
                let holder = holder.clone();
                let store = &domain.store;
                async move {
                    match crate::utils::retry::with_retry(
                        &retry,
                        || store.fetch(&key),
                        "cdn_fetch",
                    )
                    .await
                    {
                        Ok(bytes) => Ok(bytes),
                        Err(err) => {
                            let message = err.to_string();
                            *holder.lock().expect("holder lock poisoned") = Some(err);
                            Err(message)
                        }
                    }
                }
            })
            .await;

        match result.result {
            Ok(bytes) => Ok(bytes),
            Err(crate::utils::circuit_breaker::CircuitBreakerError::CircuitOpen) => {
                Err(TransportError::CircuitOpen {
                    endpoint: domain.host.clone(),
                })
            }
            Err(crate::utils::circuit_breaker::CircuitBreakerError::Timeout) => {
                Err(TransportError::Timeout {
                    operation: format!("cdn_fetch via {}", domain.host),
                    elapsed_ms: result.execution_time.as_millis() as u64,
                })
            }
            Err(crate::utils::circuit_breaker::CircuitBreakerError::ServiceError(message)) => {
                Err(holder
                    .lock()
                    .expect("holder lock poisoned")
                    .take()
                    .unwrap_or(TransportError::Connection {
                        endpoint: domain.host.clone(),
                        message,
                    }))
            }
        }
    }

    /// Force one domain's breaker open (for testing and drain tooling)
    pub async fn force_open_domain(&self, host: &str) {
        for domain in &self.domains {
            if domain.host == host {
                domain.breaker.force_open().await;
            }
        }
    }
}

fn should_fall_back(err: &TransportError) -> bool {
    matches!(err, TransportError::CircuitOpen { .. }) || err.is_retryable()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::circuit_breaker::{
        CircuitBreakerConfig, CircuitBreakerType, create_circuit_breaker,
    };

    fn delivery(domains: &[&str]) -> CdnDelivery {
        let origin_store: Arc<dyn ObjectStore> = Arc::new(HttpObjectStore::new(
            "origin",
            Url::parse("http://origin.test/media/").unwrap(),
            Duration::from_secs(2),
        ));
        let origin = Arc::new(ResilientStore::new(
            origin_store,
            create_circuit_breaker(CircuitBreakerType::Probing, CircuitBreakerConfig::default()),
            None,
            RetryConfig::default(),
        ));
        let hosts: Vec<String> = domains.iter().map(|d| d.to_string()).collect();
        CdnDelivery::new(
            &hosts,
            origin,
            Arc::new(UrlSigner::new("test-secret")),
            RetryConfig::default(),
            Duration::from_secs(2),
            |_| create_circuit_breaker(CircuitBreakerType::Probing, CircuitBreakerConfig::default()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn rotation_skips_open_domains() {
        let cdn = delivery(&["cdn-1.example.com", "cdn-2.example.com", "cdn-3.example.com"]);
        cdn.force_open_domain("cdn-1.example.com").await;

        for _ in 0..6 {
            let (url, via_cdn) = cdn
                .signed_media_url("audio/a/192kbps/full.mp3", Duration::from_secs(60), Utc::now())
                .await
                .unwrap();
            assert!(via_cdn);
            assert!(!url.contains("cdn-1.example.com"), "open domain selected: {url}");
        }
        assert_eq!(cdn.available_domains().await, 2);
    }

    #[tokio::test]
    async fn round_robin_alternates_between_healthy_domains() {
        let cdn = delivery(&["cdn-1.example.com", "cdn-2.example.com"]);

        let mut seen = std::collections::HashSet::new();
        for _ in 0..4 {
            let (url, _) = cdn
                .signed_media_url("audio/a/192kbps/full.mp3", Duration::from_secs(60), Utc::now())
                .await
                .unwrap();
            let host = Url::parse(&url).unwrap().host_str().unwrap().to_string();
            seen.insert(host);
        }
        assert_eq!(seen.len(), 2);
    }

    #[tokio::test]
    async fn all_domains_open_falls_back_to_origin() {
        let cdn = delivery(&["cdn-1.example.com", "cdn-2.example.com", "cdn-3.example.com"]);
        for host in ["cdn-1.example.com", "cdn-2.example.com", "cdn-3.example.com"] {
            cdn.force_open_domain(host).await;
        }

        assert_eq!(cdn.available_domains().await, 0);
        let (url, via_cdn) = cdn
            .signed_media_url("audio/a/192kbps/full.mp3", Duration::from_secs(60), Utc::now())
            .await
            .unwrap();
        assert!(!via_cdn);
        assert!(url.starts_with("http://origin.test/media/"));
    }

    #[tokio::test]
    async fn signed_urls_carry_expiry_and_signature() {
        let cdn = delivery(&["cdn-1.example.com"]);
        let (url, _) = cdn
            .signed_media_url("audio/a/192kbps/full.mp3", Duration::from_secs(60), Utc::now())
            .await
            .unwrap();
        let parsed = Url::parse(&url).unwrap();
        let params: std::collections::HashMap<_, _> = parsed.query_pairs().collect();
        assert!(params.contains_key("expires"));
        assert!(params.contains_key("signature"));
    }
}
