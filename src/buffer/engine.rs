//! Buffer configuration computation
//!
//! Derives a client buffering configuration from live network conditions,
//! device class and subscription tier. The computation is deterministic:
//! identical inputs always produce an identical configuration. All tunable
//! numbers come from [`BufferPolicyConfig`].

use crate::config::BufferPolicyConfig;
use crate::errors::{AppError, AppResult};
use crate::models::{BufferConfiguration, DeviceClass, NetworkProfile};

/// Compute the optimal buffer configuration for one stream start.
///
/// The pipeline: base target by bandwidth band, then device, jitter and
/// packet-loss multipliers (multiplicative, order-independent), clamped to
/// the configured target range, with derived min/max/rebuffer bounds, a
/// segment duration and a bitrate ladder. Free-tier callers are capped at
/// the configured free bitrate ceiling.
pub fn compute_buffer_config(
    policy: &BufferPolicyConfig,
    profile: &NetworkProfile,
    device: DeviceClass,
    premium: bool,
) -> AppResult<BufferConfiguration> {
    profile
        .validate()
        .map_err(|fields| AppError::validation_fields("Invalid network profile", fields))?;

    let base = base_target_sec(policy, profile.bandwidth_kbps);
    let device_mult = policy
        .device_multipliers
        .get(&device)
        .copied()
        .unwrap_or(1.0);
    let jitter_mult = jitter_multiplier(policy, profile.jitter_ms);
    let loss_mult = packet_loss_multiplier(policy, profile.packet_loss_pct);

    let target_buffer_sec =
        (base * device_mult * jitter_mult * loss_mult).clamp(policy.target_min_sec, policy.target_max_sec);

    let min_buffer_sec = (target_buffer_sec * 0.5).max(policy.min_buffer_floor_sec);
    let max_buffer_sec = (target_buffer_sec * 2.0).min(policy.max_buffer_cap_sec);
    let rebuffer_threshold_sec = (target_buffer_sec * 0.3).max(policy.rebuffer_floor_sec);

    let preload_cap = if premium {
        policy.preload_cap_premium_sec
    } else {
        policy.preload_cap_free_sec
    };
    let preload_sec = (target_buffer_sec * 2.0).min(preload_cap);

    let segment_sec = ((target_buffer_sec / 4.0).round() as u32)
        .clamp(policy.segment_min_sec, policy.segment_max_sec);

    let (min_bitrate_kbps, start_bitrate_kbps, max_bitrate_kbps) =
        bitrate_ladder(policy, profile.bandwidth_kbps, premium);

    let recommended_quality = recommended_quality(policy, start_bitrate_kbps);

    Ok(BufferConfiguration {
        min_buffer_sec,
        target_buffer_sec,
        max_buffer_sec,
        preload_sec,
        segment_sec,
        rebuffer_threshold_sec,
        adaptive_bitrate_enabled: true,
        min_bitrate_kbps,
        start_bitrate_kbps,
        max_bitrate_kbps,
        bitrate_adaptation_interval_sec: policy.bitrate_adaptation_interval_sec,
        recommended_quality,
    })
}

/// Base target buffer from the bandwidth band table (upper bounds exclusive)
fn base_target_sec(policy: &BufferPolicyConfig, bandwidth_kbps: u32) -> f64 {
    for band in &policy.bandwidth_bands {
        match band.up_to_kbps {
            Some(bound) if bandwidth_kbps < bound => return band.target_buffer_sec,
            Some(_) => continue,
            None => return band.target_buffer_sec,
        }
    }
    // Table misconfigured without an open-ended band; fall back to the last entry
    policy
        .bandwidth_bands
        .last()
        .map(|b| b.target_buffer_sec)
        .unwrap_or(policy.target_min_sec)
}

fn jitter_multiplier(policy: &BufferPolicyConfig, jitter_ms: u32) -> f64 {
    for step in &policy.jitter_steps {
        match step.up_to_ms {
            Some(bound) if jitter_ms < bound => return step.multiplier,
            Some(_) => continue,
            None => return step.multiplier,
        }
    }
    1.0
}

/// Piecewise-linear from 1.0 at 0% loss to the configured maximum at
/// saturation and beyond
fn packet_loss_multiplier(policy: &BufferPolicyConfig, loss_pct: f64) -> f64 {
    let fraction = (loss_pct / policy.packet_loss_saturation_pct).clamp(0.0, 1.0);
    1.0 + fraction * (policy.packet_loss_max_multiplier - 1.0)
}

fn bitrate_ladder(policy: &BufferPolicyConfig, bandwidth_kbps: u32, premium: bool) -> (u32, u32, u32) {
    let bandwidth = bandwidth_kbps as f64;

    let mut max_bitrate = policy
        .max_bitrate_cap_kbps
        .min((bandwidth * policy.max_bitrate_ratio).floor() as u32);
    if !premium {
        max_bitrate = max_bitrate.min(policy.free_max_bitrate_kbps);
    }

    let min_bitrate = policy
        .min_bitrate_floor_kbps
        .max((bandwidth * policy.min_bitrate_ratio).floor() as u32)
        // Very low bandwidth can push the floor above the ceiling
        .min(max_bitrate);

    let start_bitrate =
        ((bandwidth * policy.start_bitrate_ratio).floor() as u32).clamp(min_bitrate, max_bitrate);

    (min_bitrate, start_bitrate, max_bitrate)
}

/// Nearest ladder value not exceeding the start bitrate; the lowest rung
/// when even that is out of reach
fn recommended_quality(policy: &BufferPolicyConfig, start_bitrate_kbps: u32) -> u32 {
    policy
        .quality_ladder
        .iter()
        .copied()
        .filter(|q| *q <= start_bitrate_kbps)
        .max()
        .or_else(|| policy.quality_ladder.iter().copied().min())
        .unwrap_or(start_bitrate_kbps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConnectionType;
    use rstest::rstest;

    fn profile(bandwidth_kbps: u32, latency_ms: u32, jitter_ms: u32, loss_pct: f64) -> NetworkProfile {
        NetworkProfile {
            bandwidth_kbps,
            latency_ms,
            jitter_ms,
            packet_loss_pct: loss_pct,
            connection_type: ConnectionType::Wifi,
        }
    }

    #[test]
    fn mid_band_mobile_premium_profile() {
        let policy = BufferPolicyConfig::default();
        let config =
            compute_buffer_config(&policy, &profile(1500, 80, 25, 0.5), DeviceClass::Mobile, true)
                .unwrap();

        // 20s band x 1.2 mobile x 1.0 jitter x 1.06 loss
        assert!((config.target_buffer_sec - 25.44).abs() < 1e-9);
        assert!((config.min_buffer_sec - config.target_buffer_sec * 0.5).abs() < 1e-9);
        assert!((config.max_buffer_sec - config.target_buffer_sec * 2.0).abs() < 1e-9);
        assert_eq!(config.segment_sec, 6);
        assert_eq!(config.max_bitrate_kbps, 320);
        assert_eq!(config.min_bitrate_kbps, 300);
        assert_eq!(config.start_bitrate_kbps, 320);
        assert_eq!(config.recommended_quality, 320);
    }

    #[test]
    fn free_tier_caps_the_ladder() {
        let policy = BufferPolicyConfig::default();
        let config =
            compute_buffer_config(&policy, &profile(1500, 80, 25, 0.5), DeviceClass::Mobile, false)
                .unwrap();
        assert_eq!(config.max_bitrate_kbps, 192);
        assert!(config.start_bitrate_kbps <= 192);
        assert!(config.recommended_quality <= 192);
        assert!((config.preload_sec - 50.88).abs() < 1e-9);
    }

    #[rstest]
    #[case(256, 30.0)]
    #[case(511, 30.0)]
    #[case(512, 20.0)]
    #[case(2047, 20.0)]
    #[case(2048, 15.0)]
    #[case(10239, 15.0)]
    #[case(10240, 10.0)]
    #[case(100_000, 10.0)]
    fn bandwidth_band_boundaries(#[case] kbps: u32, #[case] expected: f64) {
        let policy = BufferPolicyConfig::default();
        assert_eq!(base_target_sec(&policy, kbps), expected);
    }

    #[rstest]
    #[case(0, 1.0)]
    #[case(49, 1.0)]
    #[case(50, 1.1)]
    #[case(99, 1.1)]
    #[case(100, 1.3)]
    #[case(199, 1.3)]
    #[case(200, 1.5)]
    #[case(1000, 1.5)]
    fn jitter_step_boundaries(#[case] jitter: u32, #[case] expected: f64) {
        let policy = BufferPolicyConfig::default();
        assert_eq!(jitter_multiplier(&policy, jitter), expected);
    }

    #[test]
    fn packet_loss_saturates() {
        let policy = BufferPolicyConfig::default();
        assert_eq!(packet_loss_multiplier(&policy, 0.0), 1.0);
        assert!((packet_loss_multiplier(&policy, 2.5) - 1.3).abs() < 1e-9);
        assert!((packet_loss_multiplier(&policy, 5.0) - 1.6).abs() < 1e-9);
        assert!((packet_loss_multiplier(&policy, 40.0) - 1.6).abs() < 1e-9);
    }

    #[test]
    fn very_low_bandwidth_keeps_ladder_ordered() {
        let policy = BufferPolicyConfig::default();
        let config =
            compute_buffer_config(&policy, &profile(50, 300, 250, 8.0), DeviceClass::Car, false)
                .unwrap();
        assert!(config.min_bitrate_kbps <= config.start_bitrate_kbps);
        assert!(config.start_bitrate_kbps <= config.max_bitrate_kbps);
        // Car on a terrible link pins the target at the configured maximum
        assert_eq!(config.target_buffer_sec, 60.0);
        assert_eq!(config.recommended_quality, 64);
    }

    #[test]
    fn invalid_profile_is_rejected() {
        let policy = BufferPolicyConfig::default();
        let err = compute_buffer_config(
            &policy,
            &profile(0, 10, 10, 0.0),
            DeviceClass::Desktop,
            true,
        )
        .unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGUMENT");
    }

    #[test]
    fn computation_is_deterministic() {
        let policy = BufferPolicyConfig::default();
        let p = profile(4000, 40, 75, 1.2);
        let a = compute_buffer_config(&policy, &p, DeviceClass::Tablet, true).unwrap();
        let b = compute_buffer_config(&policy, &p, DeviceClass::Tablet, true).unwrap();
        assert_eq!(a, b);
    }
}
