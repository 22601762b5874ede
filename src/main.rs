use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use cadenza::{
    buffer::PreloadPredictor,
    config::Config,
    hls::HlsManifestGenerator,
    observability::AppObservability,
    repositories::{
        InMemoryBufferMetrics, InMemoryDatabasePing, InMemoryListeningHistory,
        InMemorySessionStore, InMemorySongCatalog, InMemorySubscriberDirectory,
    },
    services::{
        CircuitBreakerManager, SessionJanitor, SessionManager, StreamTokenVerifier, UrlSigner,
    },
    transport::{CdnDelivery, HttpObjectStore, ObjectStore, ResilientStore},
    utils::retry::RetryConfig,
    web::{AppState, WebServer},
};

#[derive(Parser)]
#[command(name = "cadenza")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Adaptive audio streaming backend with session tracking and resilient delivery")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Log level
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("cadenza={},tower_http=info", cli.log_level);
    let initial_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| log_filter.into());
    let (filter_layer, _reload_handle) = tracing_subscriber::reload::Layer::new(initial_filter);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Cadenza v{}", env!("CARGO_PKG_VERSION"));

    let mut config = if std::path::Path::new(&cli.config).exists() {
        let config = Config::load_from_file(&cli.config)?;
        info!("Configuration loaded from: {}", cli.config);
        config
    } else {
        info!(
            "Configuration file {} not found, using defaults",
            cli.config
        );
        Config::default()
    };

    if let Some(host) = cli.host {
        config.web.host = host;
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }

    let observability = Arc::new(AppObservability::new("cadenza")?);
    let breaker_manager = Arc::new(CircuitBreakerManager::new(
        config.circuitbreaker.clone().unwrap_or_default(),
    ));
    let retry: RetryConfig = (&config.retry).into();

    // Origin object store: primary plus optional fallback, each behind its
    // own breaker registered with the central manager
    let primary_url = Url::parse(&config.storage.primary_endpoint)
        .context("invalid storage.primary_endpoint")?;
    let primary_store: Arc<dyn ObjectStore> = Arc::new(HttpObjectStore::new(
        "storage-primary",
        primary_url,
        config.storage.operation_timeout,
    ));
    let primary_breaker = breaker_manager
        .get_circuit_breaker("storage-primary")
        .await
        .map_err(|e| anyhow!(e))?;

    let fallback = match &config.storage.fallback_endpoint {
        Some(endpoint) => {
            let url = Url::parse(endpoint).context("invalid storage.fallback_endpoint")?;
            let store: Arc<dyn ObjectStore> = Arc::new(HttpObjectStore::new(
                "storage-fallback",
                url,
                config.storage.operation_timeout,
            ));
            let breaker = breaker_manager
                .get_circuit_breaker("storage-fallback")
                .await
                .map_err(|e| anyhow!(e))?;
            Some((store, breaker))
        }
        None => None,
    };

    let storage = Arc::new(ResilientStore::new(
        primary_store,
        primary_breaker,
        fallback,
        retry.clone(),
    ));

    // CDN pool with one breaker per domain
    let signer = Arc::new(UrlSigner::new(&config.auth.signing_secret));
    let mut cdn_breakers = HashMap::new();
    for host in &config.cdn.domains {
        let breaker = breaker_manager
            .get_circuit_breaker(&format!("cdn:{host}"))
            .await
            .map_err(|e| anyhow!(e))?;
        cdn_breakers.insert(host.clone(), breaker);
    }
    let cdn = Arc::new(
        CdnDelivery::new(
            &config.cdn.domains,
            storage.clone(),
            signer.clone(),
            retry.clone(),
            config.storage.operation_timeout,
            |host| cdn_breakers[host].clone(),
        )
        .map_err(|e| anyhow!("CDN pool construction failed: {e}"))?,
    );

    // Persistence is owned by external collaborators; the standalone binary
    // wires the in-process stores
    let sessions = Arc::new(InMemorySessionStore::new());
    let history = Arc::new(InMemoryListeningHistory::new());
    let catalog = Arc::new(InMemorySongCatalog::new());
    let subscribers = Arc::new(InMemorySubscriberDirectory::new());
    let buffer_metrics = Arc::new(InMemoryBufferMetrics::new());
    let db_ping = Arc::new(InMemoryDatabasePing::new());

    let session_manager = Arc::new(SessionManager::new(
        sessions.clone(),
        subscribers.clone(),
        catalog.clone(),
        buffer_metrics,
        cdn.clone(),
        PreloadPredictor::new(history),
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

    let shutdown = tokio_util::sync::CancellationToken::new();

    let janitor = SessionJanitor::new(
        sessions,
        config.streaming.heartbeat_timeout,
        config.streaming.janitor_interval,
        observability.clone(),
    );
    let janitor_handle = janitor.spawn(shutdown.clone());

    let token_verifier = Arc::new(StreamTokenVerifier::new(&config.auth.signing_secret));
    let state = AppState {
        config: Arc::new(config),
        session_manager,
        hls,
        catalog,
        subscribers,
        storage,
        cdn,
        breaker_manager,
        db: db_ping,
        token_verifier,
        observability,
    };

    let server = WebServer::new(state)?;
    let server_handle = tokio::spawn(server.serve(shutdown.clone()));

    wait_for_shutdown_signal().await;
    info!("Shutdown signal received, draining");
    shutdown.cancel();

    server_handle.await??;
    janitor_handle.await?;
    info!("Shutdown complete");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
