use anyhow::Result;
use opentelemetry::{
    global,
    metrics::{Counter, Meter, MeterProvider, UpDownCounter},
};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use tracing::info;

/// Main observability interface providing pre-built metric instruments
///
/// Metrics are exported via OTLP to external collectors when an endpoint is
/// configured; otherwise they stay local.
#[derive(Clone)]
pub struct AppObservability {
    pub meter: Meter,

    // Session lifecycle
    pub sessions_started: Counter<u64>,
    pub sessions_ended: Counter<u64>,
    pub sessions_expired: Counter<u64>,
    pub active_sessions: UpDownCounter<i64>,
    pub heartbeats: Counter<u64>,
    pub concurrency_rejections: Counter<u64>,

    // Strategy engine and delivery
    pub buffer_configs_computed: Counter<u64>,
    pub manifests_served: Counter<u64>,
    pub signed_urls_issued: Counter<u64>,
}

impl AppObservability {
    /// Initialize observability based on environment configuration
    pub fn new(service_name: &str) -> Result<Self> {
        let provider = SdkMeterProvider::builder().build();
        global::set_meter_provider(provider.clone());

        let meter = provider.meter("cadenza");

        if let Ok(otlp_endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
            info!(
                "OpenTelemetry configured for '{}': OTLP export to {}",
                service_name, otlp_endpoint
            );
        } else {
            info!(
                "OpenTelemetry configured for '{}': local metrics only (OTLP endpoint not configured)",
                service_name
            );
        }

        Ok(Self::build_with_instruments(meter))
    }

    fn build_with_instruments(meter: Meter) -> Self {
        let sessions_started = meter
            .u64_counter("streaming_sessions_started_total")
            .with_description("Streaming sessions opened")
            .build();
        let sessions_ended = meter
            .u64_counter("streaming_sessions_ended_total")
            .with_description("Streaming sessions ended by clients")
            .build();
        let sessions_expired = meter
            .u64_counter("streaming_sessions_expired_total")
            .with_description("Streaming sessions expired by the janitor")
            .build();
        let active_sessions = meter
            .i64_up_down_counter("active_streaming_sessions")
            .with_description("Currently live streaming sessions")
            .build();
        let heartbeats = meter
            .u64_counter("session_heartbeats_total")
            .with_description("Heartbeats accepted")
            .build();
        let concurrency_rejections = meter
            .u64_counter("concurrent_limit_rejections_total")
            .with_description("Stream starts rejected by the concurrency cap")
            .build();

        let buffer_configs_computed = meter
            .u64_counter("buffer_configs_computed_total")
            .with_description("Buffer configurations computed")
            .build();
        let manifests_served = meter
            .u64_counter("hls_manifests_served_total")
            .with_description("HLS playlists rendered or served from cache")
            .build();
        let signed_urls_issued = meter
            .u64_counter("signed_media_urls_issued_total")
            .with_description("Signed media URLs issued")
            .build();

        Self {
            meter,
            sessions_started,
            sessions_ended,
            sessions_expired,
            active_sessions,
            heartbeats,
            concurrency_rejections,
            buffer_configs_computed,
            manifests_served,
            signed_urls_issued,
        }
    }
}
