//! Object storage transport
//!
//! [`ObjectStore`] abstracts the origin media store; [`HttpObjectStore`]
//! talks to an HTTP-fronted store with per-call deadlines.
//! [`ResilientStore`] composes a primary and an optional fallback store
//! behind circuit breakers and retry, owning the failover decision.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;

use crate::errors::{TransportError, TransportResult};
use crate::utils::circuit_breaker::{
    CircuitBreaker, CircuitBreakerError, CircuitBreakerState, ConcreteCircuitBreaker,
};
use crate::utils::retry::{RetryConfig, with_retry};

/// A single object store endpoint
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Short endpoint name used in errors, logs and breaker registries
    fn name(&self) -> &str;

    /// Base URL media keys resolve against
    fn base_url(&self) -> &Url;

    async fn fetch(&self, key: &str) -> TransportResult<Vec<u8>>;

    async fn put(&self, key: &str, body: Vec<u8>) -> TransportResult<()>;

    /// Cheap existence check used by the readiness probe
    async fn probe(&self, key: &str) -> TransportResult<()>;
}

/// HTTP-fronted object store endpoint
pub struct HttpObjectStore {
    name: String,
    base_url: Url,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpObjectStore {
    pub fn new(name: impl Into<String>, base_url: Url, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .expect("reqwest client construction cannot fail with static options");
        Self {
            name: name.into(),
            base_url,
            client,
            timeout,
        }
    }

    fn object_url(&self, key: &str) -> TransportResult<Url> {
        self.base_url
            .join(key)
            .map_err(|e| TransportError::Connection {
                endpoint: self.name.clone(),
                message: format!("invalid object key '{key}': {e}"),
            })
    }

    fn classify(&self, err: reqwest::Error, operation: &str, started: Instant) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout {
                operation: format!("{operation} via {}", self.name),
                elapsed_ms: started.elapsed().as_millis() as u64,
            }
        } else if let Some(status) = err.status() {
            TransportError::Http {
                endpoint: self.name.clone(),
                status: status.as_u16(),
            }
        } else {
            TransportError::Connection {
                endpoint: self.name.clone(),
                message: err.to_string(),
            }
        }
    }

    fn check_status(&self, status: reqwest::StatusCode) -> TransportResult<()> {
        if status.is_success() {
            Ok(())
        } else {
            Err(TransportError::Http {
                endpoint: self.name.clone(),
                status: status.as_u16(),
            })
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn fetch(&self, key: &str) -> TransportResult<Vec<u8>> {
        let url = self.object_url(key)?;
        let started = Instant::now();
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.classify(e, "fetch", started))?;
        self.check_status(response.status())?;
        let body = response
            .bytes()
            .await
            .map_err(|e| self.classify(e, "fetch", started))?;
        Ok(body.to_vec())
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> TransportResult<()> {
        let url = self.object_url(key)?;
        let started = Instant::now();
        let response = self
            .client
            .put(url)
            .timeout(self.timeout)
            .body(body)
            .send()
            .await
            .map_err(|e| self.classify(e, "put", started))?;
        self.check_status(response.status())
    }

    async fn probe(&self, key: &str) -> TransportResult<()> {
        let url = self.object_url(key)?;
        let started = Instant::now();
        let response = self
            .client
            .head(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.classify(e, "probe", started))?;
        self.check_status(response.status())
    }
}

/// Primary/fallback object storage behind circuit breakers and retry
///
/// Failover rules: reads fail over to the fallback after a fast-fail or an
/// exhausted retryable failure on the primary; writes fail over only when
/// the caller marks the operation idempotent.
pub struct ResilientStore {
    primary: Arc<dyn ObjectStore>,
    primary_breaker: Arc<ConcreteCircuitBreaker>,
    fallback: Option<(Arc<dyn ObjectStore>, Arc<ConcreteCircuitBreaker>)>,
    retry: RetryConfig,
}

impl ResilientStore {
    pub fn new(
        primary: Arc<dyn ObjectStore>,
        primary_breaker: Arc<ConcreteCircuitBreaker>,
        fallback: Option<(Arc<dyn ObjectStore>, Arc<ConcreteCircuitBreaker>)>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            primary,
            primary_breaker,
            fallback,
            retry,
        }
    }

    pub fn primary_name(&self) -> &str {
        self.primary.name()
    }

    /// Base URL of the origin endpoint currently preferred for media URLs
    pub fn origin_base_url(&self) -> &Url {
        self.primary.base_url()
    }

    pub async fn fetch(&self, key: &str) -> TransportResult<Vec<u8>> {
        let primary_result = self
            .dispatch(&self.primary, &self.primary_breaker, key, None)
            .await;

        match primary_result {
            Ok(bytes) => Ok(bytes),
            Err(err) if should_fail_over(&err) => self.fetch_from_fallback(key, err).await,
            Err(err) => Err(err),
        }
    }

    pub async fn put(&self, key: &str, body: Vec<u8>, idempotent: bool) -> TransportResult<()> {
        let primary_result = self
            .dispatch(&self.primary, &self.primary_breaker, key, Some(body.clone()))
            .await
            .map(|_| ());

        match primary_result {
            Ok(()) => Ok(()),
            // Never fail a non-idempotent upload over silently
            Err(err) if idempotent && should_fail_over(&err) => {
                let Some((store, breaker)) = &self.fallback else {
                    return Err(err);
                };
                if breaker.state().await == CircuitBreakerState::Open {
                    return Err(err);
                }
                warn!(
                    "Storage upload failing over from {} to {}: {}",
                    self.primary.name(),
                    store.name(),
                    err
                );
                self.dispatch(store, breaker, key, Some(body)).await.map(|_| ())
            }
            Err(err) => Err(err),
        }
    }

    /// Single-attempt probe against the primary, for the readiness surface
    pub async fn probe(&self, key: &str) -> TransportResult<()> {
        let holder: ErrorHolder = Arc::new(Mutex::new(None));
        let store = self.primary.clone();
        let result = self
            .primary_breaker
            .execute(|| {
                let store = store.clone();
                let key = key.to_string();
                let holder = holder.clone();
                async move {
                    store.probe(&key).await.map_err(|err| {
                        let message = err.to_string();
                        *holder.lock().expect("holder lock poisoned") = Some(err);
                        message
                    })
                }
            })
            .await;

        unwrap_breaker_result(result, &holder, self.primary.name(), "probe")
    }

    async fn fetch_from_fallback(
        &self,
        key: &str,
        primary_err: TransportError,
    ) -> TransportResult<Vec<u8>> {
        let Some((store, breaker)) = &self.fallback else {
            return Err(primary_err);
        };
        if breaker.state().await == CircuitBreakerState::Open {
            debug!(
                "Fallback store {} unavailable, surfacing primary failure",
                store.name()
            );
            return Err(primary_err);
        }
        warn!(
            "Storage read failing over from {} to {}: {}",
            self.primary.name(),
            store.name(),
            primary_err
        );
        self.dispatch(store, breaker, key, None).await
    }

    /// One breaker call wrapping a retried operation against one endpoint.
    /// `body = None` fetches, `Some` uploads.
    async fn dispatch(
        &self,
        store: &Arc<dyn ObjectStore>,
        breaker: &Arc<ConcreteCircuitBreaker>,
        key: &str,
        body: Option<Vec<u8>>,
    ) -> TransportResult<Vec<u8>> {
        let holder: ErrorHolder = Arc::new(Mutex::new(None));
        let retry = self.retry.clone();
        let operation_name = if body.is_some() { "storage_put" } else { "storage_fetch" };

        let result = breaker
            .execute(|| {
                let store = store.clone();
                let key = key.to_string();
                let body = body.clone();
                let retry = retry.clone();
                let holder = holder.clone();
                async move {
                    let attempt = || async {
                        match &body {
                            Some(bytes) => store.put(&key, bytes.clone()).await.map(|_| Vec::new()),
                            None => store.fetch(&key).await,
                        }
                    };
                    match with_retry(&retry, attempt, operation_name).await {
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

        unwrap_breaker_result(result, &holder, store.name(), operation_name)
    }
}

type ErrorHolder = Arc<Mutex<Option<TransportError>>>;

/// Map a breaker result back to the typed transport error captured by the
/// operation, preserving non-retryable causes like HTTP 404
fn unwrap_breaker_result<T>(
    result: crate::utils::circuit_breaker::CircuitBreakerResult<T>,
    holder: &ErrorHolder,
    endpoint: &str,
    operation: &str,
) -> TransportResult<T> {
    match result.result {
        Ok(value) => Ok(value),
        Err(CircuitBreakerError::CircuitOpen) => Err(TransportError::CircuitOpen {
            endpoint: endpoint.to_string(),
        }),
        Err(CircuitBreakerError::Timeout) => Err(TransportError::Timeout {
            operation: format!("{operation} via {endpoint}"),
            elapsed_ms: result.execution_time.as_millis() as u64,
        }),
        Err(CircuitBreakerError::ServiceError(message)) => Err(holder
            .lock()
            .expect("holder lock poisoned")
            .take()
            .unwrap_or(TransportError::Connection {
                endpoint: endpoint.to_string(),
                message,
            })),
    }
}

fn should_fail_over(err: &TransportError) -> bool {
    matches!(err, TransportError::CircuitOpen { .. }) || err.is_retryable()
}
