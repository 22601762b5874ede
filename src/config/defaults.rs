//! Default values for configuration sections.

use std::time::Duration;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;

/// Expected client heartbeat cadence while streaming
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
/// Sessions without a heartbeat for this long are expired by the janitor
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(90);
pub const DEFAULT_JANITOR_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_URL_TTL: Duration = Duration::from_secs(3600);

pub const DEFAULT_CONCURRENT_FREE: u32 = 1;
pub const DEFAULT_CONCURRENT_PREMIUM: u32 = 5;
pub const DEFAULT_CONCURRENT_FAMILY: u32 = 6;

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_SUCCESS_THRESHOLD: u32 = 2;
pub const DEFAULT_HALF_OPEN_MAX_PROBES: u32 = 3;
pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_INITIAL_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_RETRY_BACKOFF_MULTIPLIER: f64 = 2.0;

pub const DEFAULT_SEGMENT_SEC: u32 = 6;
pub const DEFAULT_HLS_CODEC: &str = "mp4a.40.2";
pub const DEFAULT_MANIFEST_CACHE_SIZE: usize = 1024;

/// Quality ladder in kbps, ascending
pub const DEFAULT_QUALITY_LADDER: [u32; 6] = [64, 96, 128, 192, 256, 320];
pub const DEFAULT_FREE_MAX_BITRATE_KBPS: u32 = 192;

pub const DEFAULT_STORAGE_PROBE_KEY: &str = "healthcheck";
