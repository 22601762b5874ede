//! Application configuration
//!
//! Configuration is layered from a TOML file plus `CADENZA_`-prefixed
//! environment variables via figment. Durations accept human-readable
//! strings ("90s", "1h"). Product-tunable numbers that drive the buffer
//! strategy engine live in `[buffer]` so they can be changed without a
//! rebuild; the defaults match the shipped product behavior.

use anyhow::Result;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub mod defaults;
pub mod duration_serde;

use defaults::*;

use crate::models::DeviceClass;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub buffer: BufferPolicyConfig,
    #[serde(default)]
    pub hls: HlsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cdn: CdnConfig,
    pub circuitbreaker: Option<CircuitBreakerConfig>,
    #[serde(default)]
    pub retry: RetryPolicyConfig,
}

impl Config {
    /// Load configuration from a TOML file layered with environment overrides
    pub fn load_from_file(path: &str) -> Result<Self> {
        let config: Config = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("CADENZA_").split("__"))
            .extract()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout", with = "duration_serde::duration")]
    pub request_timeout: Duration,
    #[serde(default = "default_enable_request_logging")]
    pub enable_request_logging: bool,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_url: default_base_url(),
            request_timeout: default_request_timeout(),
            enable_request_logging: default_enable_request_logging(),
        }
    }
}

/// Signing material shared with the external token issuer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC-SHA256 key for stream tokens and signed media URLs
    #[serde(default = "default_signing_secret")]
    pub signing_secret: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            signing_secret: default_signing_secret(),
        }
    }
}

/// Session lifecycle and concurrency knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Cadence clients are expected to heartbeat at while streaming
    #[serde(
        default = "default_heartbeat_interval",
        with = "duration_serde::duration"
    )]
    pub heartbeat_interval: Duration,
    /// Sessions without a heartbeat for this long are expired
    #[serde(
        default = "default_heartbeat_timeout",
        with = "duration_serde::duration"
    )]
    pub heartbeat_timeout: Duration,
    #[serde(default = "default_janitor_interval", with = "duration_serde::duration")]
    pub janitor_interval: Duration,
    /// Signed stream URL lifetime
    #[serde(default = "default_url_ttl", with = "duration_serde::duration")]
    pub url_ttl: Duration,
    #[serde(default)]
    pub limits: ConcurrencyLimits,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: default_heartbeat_interval(),
            heartbeat_timeout: default_heartbeat_timeout(),
            janitor_interval: default_janitor_interval(),
            url_ttl: default_url_ttl(),
            limits: ConcurrencyLimits::default(),
        }
    }
}

/// Maximum concurrent live sessions per subscription tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyLimits {
    #[serde(default = "default_concurrent_free")]
    pub free: u32,
    #[serde(default = "default_concurrent_premium")]
    pub premium: u32,
    #[serde(default = "default_concurrent_family")]
    pub family: u32,
}

impl Default for ConcurrencyLimits {
    fn default() -> Self {
        Self {
            free: default_concurrent_free(),
            premium: default_concurrent_premium(),
            family: default_concurrent_family(),
        }
    }
}

impl ConcurrencyLimits {
    pub fn limit_for(&self, tier: crate::models::SubscriptionTier) -> u32 {
        match tier {
            crate::models::SubscriptionTier::Free => self.free,
            crate::models::SubscriptionTier::Premium => self.premium,
            crate::models::SubscriptionTier::Family => self.family,
        }
    }
}

/// One bandwidth band of the base buffer sizing table
///
/// `up_to_kbps = None` is the open-ended top band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandwidthBand {
    pub up_to_kbps: Option<u32>,
    pub target_buffer_sec: f64,
}

/// One jitter step of the jitter multiplier table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JitterStep {
    pub up_to_ms: Option<u32>,
    pub multiplier: f64,
}

/// Tunables for the buffer strategy engine
///
/// These are product choices, not derived invariants; they are kept in
/// configuration so product can adjust them per deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferPolicyConfig {
    #[serde(default = "default_bandwidth_bands")]
    pub bandwidth_bands: Vec<BandwidthBand>,
    #[serde(default = "default_device_multipliers")]
    pub device_multipliers: HashMap<DeviceClass, f64>,
    #[serde(default = "default_jitter_steps")]
    pub jitter_steps: Vec<JitterStep>,
    /// Packet loss percentage at which the loss multiplier saturates
    #[serde(default = "default_packet_loss_saturation_pct")]
    pub packet_loss_saturation_pct: f64,
    #[serde(default = "default_packet_loss_max_multiplier")]
    pub packet_loss_max_multiplier: f64,
    #[serde(default = "default_preload_cap_free_sec")]
    pub preload_cap_free_sec: f64,
    #[serde(default = "default_preload_cap_premium_sec")]
    pub preload_cap_premium_sec: f64,
    #[serde(default = "default_target_min_sec")]
    pub target_min_sec: f64,
    #[serde(default = "default_target_max_sec")]
    pub target_max_sec: f64,
    #[serde(default = "default_max_buffer_cap_sec")]
    pub max_buffer_cap_sec: f64,
    #[serde(default = "default_min_buffer_floor_sec")]
    pub min_buffer_floor_sec: f64,
    #[serde(default = "default_rebuffer_floor_sec")]
    pub rebuffer_floor_sec: f64,
    #[serde(default = "default_segment_min_sec")]
    pub segment_min_sec: u32,
    #[serde(default = "default_segment_max_sec")]
    pub segment_max_sec: u32,
    #[serde(default = "default_max_bitrate_ratio")]
    pub max_bitrate_ratio: f64,
    #[serde(default = "default_min_bitrate_ratio")]
    pub min_bitrate_ratio: f64,
    #[serde(default = "default_start_bitrate_ratio")]
    pub start_bitrate_ratio: f64,
    #[serde(default = "default_min_bitrate_floor_kbps")]
    pub min_bitrate_floor_kbps: u32,
    #[serde(default = "default_max_bitrate_cap_kbps")]
    pub max_bitrate_cap_kbps: u32,
    #[serde(default = "default_free_max_bitrate_kbps")]
    pub free_max_bitrate_kbps: u32,
    /// Quality ladder in kbps, ascending
    #[serde(default = "default_quality_ladder")]
    pub quality_ladder: Vec<u32>,
    #[serde(default = "default_bitrate_adaptation_interval_sec")]
    pub bitrate_adaptation_interval_sec: u32,
    /// Maximum preload hints returned per prediction
    #[serde(default = "default_preload_hint_count")]
    pub preload_hint_count: usize,
}

impl Default for BufferPolicyConfig {
    fn default() -> Self {
        Self {
            bandwidth_bands: default_bandwidth_bands(),
            device_multipliers: default_device_multipliers(),
            jitter_steps: default_jitter_steps(),
            packet_loss_saturation_pct: default_packet_loss_saturation_pct(),
            packet_loss_max_multiplier: default_packet_loss_max_multiplier(),
            preload_cap_free_sec: default_preload_cap_free_sec(),
            preload_cap_premium_sec: default_preload_cap_premium_sec(),
            target_min_sec: default_target_min_sec(),
            target_max_sec: default_target_max_sec(),
            max_buffer_cap_sec: default_max_buffer_cap_sec(),
            min_buffer_floor_sec: default_min_buffer_floor_sec(),
            rebuffer_floor_sec: default_rebuffer_floor_sec(),
            segment_min_sec: default_segment_min_sec(),
            segment_max_sec: default_segment_max_sec(),
            max_bitrate_ratio: default_max_bitrate_ratio(),
            min_bitrate_ratio: default_min_bitrate_ratio(),
            start_bitrate_ratio: default_start_bitrate_ratio(),
            min_bitrate_floor_kbps: default_min_bitrate_floor_kbps(),
            max_bitrate_cap_kbps: default_max_bitrate_cap_kbps(),
            free_max_bitrate_kbps: default_free_max_bitrate_kbps(),
            quality_ladder: default_quality_ladder(),
            bitrate_adaptation_interval_sec: default_bitrate_adaptation_interval_sec(),
            preload_hint_count: default_preload_hint_count(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HlsConfig {
    #[serde(default = "default_segment_sec")]
    pub default_segment_sec: u32,
    #[serde(default = "default_hls_codec")]
    pub codec: String,
    #[serde(default = "default_manifest_cache_size")]
    pub manifest_cache_size: usize,
}

impl Default for HlsConfig {
    fn default() -> Self {
        Self {
            default_segment_sec: default_segment_sec(),
            codec: default_hls_codec(),
            manifest_cache_size: default_manifest_cache_size(),
        }
    }
}

/// Object storage endpoints (origin media store)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_endpoint")]
    pub primary_endpoint: String,
    pub fallback_endpoint: Option<String>,
    /// Token object fetched by the readiness probe
    #[serde(default = "default_storage_probe_key")]
    pub probe_key: String,
    #[serde(
        default = "default_operation_timeout",
        with = "duration_serde::duration"
    )]
    pub operation_timeout: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            primary_endpoint: default_storage_endpoint(),
            fallback_endpoint: None,
            probe_key: default_storage_probe_key(),
            operation_timeout: default_operation_timeout(),
        }
    }
}

/// Audio CDN domain pool
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CdnConfig {
    /// CDN hostnames in rotation preference order
    #[serde(default)]
    pub domains: Vec<String>,
}

/// Circuit breaker settings: one global profile plus named per-service overrides
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CircuitBreakerConfig {
    #[serde(default)]
    pub global: CircuitBreakerProfileConfig,
    /// Named profiles, e.g. `storage`, `cdn`, `database`
    #[serde(default)]
    pub profiles: HashMap<String, CircuitBreakerProfileConfig>,
}

impl CircuitBreakerConfig {
    pub fn profile(&self, service_name: &str) -> &CircuitBreakerProfileConfig {
        self.profiles.get(service_name).unwrap_or(&self.global)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerProfileConfig {
    /// Circuit breaker implementation type: "probing" or "noop"
    #[serde(default = "default_circuit_breaker_type")]
    pub implementation_type: String,
    /// Consecutive failures before opening the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Consecutive half-open successes needed to close the circuit
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
    /// Concurrent probe calls admitted while half-open
    #[serde(default = "default_half_open_max_probes")]
    pub half_open_max_probes: u32,
    /// Dwell time in the open state before probing resumes
    #[serde(default = "default_reset_timeout", with = "duration_serde::duration")]
    pub reset_timeout: Duration,
    /// Deadline applied to each call dispatched through the breaker
    #[serde(
        default = "default_operation_timeout",
        with = "duration_serde::duration"
    )]
    pub operation_timeout: Duration,
}

impl Default for CircuitBreakerProfileConfig {
    fn default() -> Self {
        Self {
            implementation_type: default_circuit_breaker_type(),
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            half_open_max_probes: default_half_open_max_probes(),
            reset_timeout: default_reset_timeout(),
            operation_timeout: default_operation_timeout(),
        }
    }
}

/// Retry behavior for outbound storage/CDN calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicyConfig {
    #[serde(default = "default_retry_max_attempts")]
    pub max_attempts: u32,
    #[serde(
        default = "default_retry_initial_delay",
        with = "duration_serde::duration"
    )]
    pub initial_delay: Duration,
    #[serde(default = "default_retry_max_delay", with = "duration_serde::duration")]
    pub max_delay: Duration,
    #[serde(default = "default_retry_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_retry_jitter")]
    pub jitter: bool,
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_max_attempts(),
            initial_delay: default_retry_initial_delay(),
            max_delay: default_retry_max_delay(),
            backoff_multiplier: default_retry_backoff_multiplier(),
            jitter: default_retry_jitter(),
        }
    }
}

// Web defaults
fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_base_url() -> String {
    format!("http://localhost:{DEFAULT_PORT}")
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_enable_request_logging() -> bool {
    false
}

fn default_signing_secret() -> String {
    // Deployment must override this; the default only keeps dev setups working
    "cadenza-dev-secret".to_string()
}

// Streaming defaults
fn default_heartbeat_interval() -> Duration {
    DEFAULT_HEARTBEAT_INTERVAL
}

fn default_heartbeat_timeout() -> Duration {
    DEFAULT_HEARTBEAT_TIMEOUT
}

fn default_janitor_interval() -> Duration {
    DEFAULT_JANITOR_INTERVAL
}

fn default_url_ttl() -> Duration {
    DEFAULT_URL_TTL
}

fn default_concurrent_free() -> u32 {
    DEFAULT_CONCURRENT_FREE
}

fn default_concurrent_premium() -> u32 {
    DEFAULT_CONCURRENT_PREMIUM
}

fn default_concurrent_family() -> u32 {
    DEFAULT_CONCURRENT_FAMILY
}

// Buffer policy defaults
fn default_bandwidth_bands() -> Vec<BandwidthBand> {
    vec![
        BandwidthBand {
            up_to_kbps: Some(512),
            target_buffer_sec: 30.0,
        },
        BandwidthBand {
            up_to_kbps: Some(2048),
            target_buffer_sec: 20.0,
        },
        BandwidthBand {
            up_to_kbps: Some(10240),
            target_buffer_sec: 15.0,
        },
        BandwidthBand {
            up_to_kbps: None,
            target_buffer_sec: 10.0,
        },
    ]
}

fn default_device_multipliers() -> HashMap<DeviceClass, f64> {
    HashMap::from([
        (DeviceClass::Mobile, 1.2),
        (DeviceClass::Tablet, 1.1),
        (DeviceClass::Desktop, 1.0),
        (DeviceClass::Tv, 0.9),
        (DeviceClass::SmartSpeaker, 1.3),
        (DeviceClass::Car, 1.5),
        (DeviceClass::Unknown, 1.2),
    ])
}

fn default_jitter_steps() -> Vec<JitterStep> {
    vec![
        JitterStep {
            up_to_ms: Some(50),
            multiplier: 1.0,
        },
        JitterStep {
            up_to_ms: Some(100),
            multiplier: 1.1,
        },
        JitterStep {
            up_to_ms: Some(200),
            multiplier: 1.3,
        },
        JitterStep {
            up_to_ms: None,
            multiplier: 1.5,
        },
    ]
}

fn default_packet_loss_saturation_pct() -> f64 {
    5.0
}

fn default_packet_loss_max_multiplier() -> f64 {
    1.6
}

fn default_preload_cap_free_sec() -> f64 {
    60.0
}

fn default_preload_cap_premium_sec() -> f64 {
    120.0
}

fn default_target_min_sec() -> f64 {
    5.0
}

fn default_target_max_sec() -> f64 {
    60.0
}

fn default_max_buffer_cap_sec() -> f64 {
    120.0
}

fn default_min_buffer_floor_sec() -> f64 {
    5.0
}

fn default_rebuffer_floor_sec() -> f64 {
    2.0
}

fn default_segment_min_sec() -> u32 {
    2
}

fn default_segment_max_sec() -> u32 {
    10
}

fn default_max_bitrate_ratio() -> f64 {
    0.75
}

fn default_min_bitrate_ratio() -> f64 {
    0.20
}

fn default_start_bitrate_ratio() -> f64 {
    0.50
}

fn default_min_bitrate_floor_kbps() -> u32 {
    64
}

fn default_max_bitrate_cap_kbps() -> u32 {
    320
}

fn default_free_max_bitrate_kbps() -> u32 {
    DEFAULT_FREE_MAX_BITRATE_KBPS
}

fn default_quality_ladder() -> Vec<u32> {
    DEFAULT_QUALITY_LADDER.to_vec()
}

fn default_bitrate_adaptation_interval_sec() -> u32 {
    10
}

fn default_preload_hint_count() -> usize {
    3
}

// HLS defaults
fn default_segment_sec() -> u32 {
    DEFAULT_SEGMENT_SEC
}

fn default_hls_codec() -> String {
    DEFAULT_HLS_CODEC.to_string()
}

fn default_manifest_cache_size() -> usize {
    DEFAULT_MANIFEST_CACHE_SIZE
}

// Storage defaults
fn default_storage_endpoint() -> String {
    "http://localhost:9000/media".to_string()
}

fn default_storage_probe_key() -> String {
    DEFAULT_STORAGE_PROBE_KEY.to_string()
}

// Circuit breaker defaults
fn default_circuit_breaker_type() -> String {
    "probing".to_string()
}

fn default_failure_threshold() -> u32 {
    DEFAULT_FAILURE_THRESHOLD
}

fn default_success_threshold() -> u32 {
    DEFAULT_SUCCESS_THRESHOLD
}

fn default_half_open_max_probes() -> u32 {
    DEFAULT_HALF_OPEN_MAX_PROBES
}

fn default_reset_timeout() -> Duration {
    DEFAULT_RESET_TIMEOUT
}

fn default_operation_timeout() -> Duration {
    DEFAULT_OPERATION_TIMEOUT
}

// Retry defaults
fn default_retry_max_attempts() -> u32 {
    DEFAULT_RETRY_MAX_ATTEMPTS
}

fn default_retry_initial_delay() -> Duration {
    DEFAULT_RETRY_INITIAL_DELAY
}

fn default_retry_max_delay() -> Duration {
    DEFAULT_RETRY_MAX_DELAY
}

fn default_retry_backoff_multiplier() -> f64 {
    DEFAULT_RETRY_BACKOFF_MULTIPLIER
}

fn default_retry_jitter() -> bool {
    true
}
