//! Shared test harness: a fully wired application over the in-memory
//! repositories, with storage endpoints pointing at an unroutable port so
//! no test touches the network.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum_test::TestServer;
use chrono::Utc;
use uuid::Uuid;

use cadenza::buffer::PreloadPredictor;
use cadenza::config::Config;
use cadenza::hls::HlsManifestGenerator;
use cadenza::models::{SongInfo, SubscriptionTier};
use cadenza::observability::AppObservability;
use cadenza::repositories::{
    InMemoryBufferMetrics, InMemoryDatabasePing, InMemoryListeningHistory, InMemorySessionStore,
    InMemorySongCatalog, InMemorySubscriberDirectory,
};
use cadenza::services::{
    CircuitBreakerManager, SessionManager, StreamTokenVerifier, UrlSigner,
};
use cadenza::transport::{CdnDelivery, HttpObjectStore, ObjectStore, ResilientStore};
use cadenza::utils::retry::RetryConfig;
use cadenza::web::{AppState, build_router};

pub const SIGNING_SECRET: &str = "integration-test-secret";

pub struct TestApp {
    pub server: TestServer,
    pub verifier: StreamTokenVerifier,
    pub sessions: Arc<InMemorySessionStore>,
    pub catalog: Arc<InMemorySongCatalog>,
    pub subscribers: Arc<InMemorySubscriberDirectory>,
    pub history: Arc<InMemoryListeningHistory>,
    pub db: Arc<InMemoryDatabasePing>,
    pub cdn: Arc<CdnDelivery>,
    pub session_manager: Arc<SessionManager>,
}

impl TestApp {
    pub fn bearer(&self, user_id: Uuid) -> String {
        self.verifier
            .issue(user_id, Utc::now() + chrono::Duration::hours(1))
    }

    /// Register a song with the given quality variants and return its id
    pub async fn seed_song(&self, qualities: &[u32], duration_secs: f64) -> Uuid {
        let song_id = Uuid::new_v4();
        self.catalog
            .insert(SongInfo {
                song_id,
                duration_secs,
                available_qualities: qualities.to_vec(),
            })
            .await;
        song_id
    }

    pub async fn seed_user(&self, tier: SubscriptionTier) -> Uuid {
        let user_id = Uuid::new_v4();
        self.subscribers.set_tier(user_id, tier).await;
        user_id
    }
}

pub async fn spawn_app() -> TestApp {
    let mut config = Config::default();
    // Unroutable endpoints: transport tests use their own fakes
    config.storage.primary_endpoint = "http://127.0.0.1:9/media/".to_string();
    config.auth.signing_secret = SIGNING_SECRET.to_string();
    config.cdn.domains = vec![
        "cdn-1.test.example".to_string(),
        "cdn-2.test.example".to_string(),
        "cdn-3.test.example".to_string(),
    ];

    let observability = Arc::new(AppObservability::new("cadenza-test").unwrap());
    let breaker_manager = Arc::new(CircuitBreakerManager::new(
        config.circuitbreaker.clone().unwrap_or_default(),
    ));
    let retry = RetryConfig {
        max_attempts: 2,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_multiplier: 2.0,
        jitter: false,
    };

    let primary_store: Arc<dyn ObjectStore> = Arc::new(HttpObjectStore::new(
        "storage-primary",
        url::Url::parse(&config.storage.primary_endpoint).unwrap(),
        Duration::from_millis(500),
    ));
    let primary_breaker = breaker_manager
        .get_circuit_breaker("storage-primary")
        .await
        .unwrap();
    let storage = Arc::new(ResilientStore::new(
        primary_store,
        primary_breaker,
        None,
        retry.clone(),
    ));

    let signer = Arc::new(UrlSigner::new(SIGNING_SECRET));
    let mut cdn_breakers = HashMap::new();
    for host in &config.cdn.domains {
        let breaker = breaker_manager
            .get_circuit_breaker(&format!("cdn:{host}"))
            .await
            .unwrap();
        cdn_breakers.insert(host.clone(), breaker);
    }
    let cdn = Arc::new(
        CdnDelivery::new(
            &config.cdn.domains,
            storage.clone(),
            signer,
            retry,
            Duration::from_millis(500),
            |host| cdn_breakers[host].clone(),
        )
        .unwrap(),
    );

    let sessions = Arc::new(InMemorySessionStore::new());
    let history = Arc::new(InMemoryListeningHistory::new());
    let catalog = Arc::new(InMemorySongCatalog::new());
    let subscribers = Arc::new(InMemorySubscriberDirectory::new());
    let buffer_metrics = Arc::new(InMemoryBufferMetrics::new());
    let db = Arc::new(InMemoryDatabasePing::new());

    let session_manager = Arc::new(SessionManager::new(
        sessions.clone(),
        subscribers.clone(),
        catalog.clone(),
        buffer_metrics,
        cdn.clone(),
        PreloadPredictor::new(history.clone()),
        config.buffer.clone(),
        config.streaming.limits.clone(),
        config.streaming.url_ttl,
        config.web.base_url.clone(),
        observability.clone(),
    ));

    let hls = Arc::new(HlsManifestGenerator::new(
        &config.hls,
        config.buffer.free_max_bitrate_kbps,
    ));

    let state = AppState {
        config: Arc::new(config),
        session_manager: session_manager.clone(),
        hls,
        catalog: catalog.clone(),
        subscribers: subscribers.clone(),
        storage,
        cdn: cdn.clone(),
        breaker_manager,
        db: db.clone(),
        token_verifier: Arc::new(StreamTokenVerifier::new(SIGNING_SECRET)),
        observability,
    };

    let server = TestServer::new(build_router(state)).unwrap();

    TestApp {
        server,
        verifier: StreamTokenVerifier::new(SIGNING_SECRET),
        sessions,
        catalog,
        subscribers,
        history,
        db,
        cdn,
        session_manager,
    }
}
