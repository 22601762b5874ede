//! Client buffer health scoring
//!
//! Turns a client-reported buffer observation into a weighted score with a
//! status band and rule-driven recommendations.

use crate::models::{BufferHealthScore, BufferHealthStatus, BufferObservation};

const BUFFER_LEVEL_WEIGHT: f64 = 0.5;
const STARVATION_WEIGHT: f64 = 0.3;
const REBUFFER_WEIGHT: f64 = 0.2;

/// Starvation events per minute that drive the starvation score to zero
const STARVATION_SATURATION: f64 = 3.0;
/// Rebuffer seconds per minute that drive the rebuffer score to zero
const REBUFFER_SATURATION_SEC: f64 = 5.0;

fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Score a buffer observation.
///
/// `score = 0.5 * bufferLevel + 0.3 * starvation + 0.2 * rebuffer`, each
/// component in [0, 1]. Status bands: >= 0.8 HEALTHY, >= 0.6 WARNING,
/// >= 0.3 CRITICAL, else POOR.
pub fn compute_health_score(observation: &BufferObservation) -> BufferHealthScore {
    let buffer_level_score = if observation.target_buffer_sec > 0.0 {
        clamp01(observation.current_buffered_sec / observation.target_buffer_sec)
    } else {
        // No target reported yet; do not penalize the client for it
        1.0
    };
    let starvation_score =
        1.0 - clamp01(observation.starvation_events_last_minute as f64 / STARVATION_SATURATION);
    let rebuffer_score =
        1.0 - clamp01(observation.rebuffer_duration_last_minute_sec / REBUFFER_SATURATION_SEC);

    let score = clamp01(
        BUFFER_LEVEL_WEIGHT * buffer_level_score
            + STARVATION_WEIGHT * starvation_score
            + REBUFFER_WEIGHT * rebuffer_score,
    );

    let status = status_for(score);
    let recommendations = recommendations_for(status, observation, buffer_level_score);

    BufferHealthScore {
        score,
        status,
        buffer_level_score,
        starvation_score,
        rebuffer_score,
        recommendations,
    }
}

pub fn status_for(score: f64) -> BufferHealthStatus {
    if score >= 0.8 {
        BufferHealthStatus::Healthy
    } else if score >= 0.6 {
        BufferHealthStatus::Warning
    } else if score >= 0.3 {
        BufferHealthStatus::Critical
    } else {
        BufferHealthStatus::Poor
    }
}

fn recommendations_for(
    status: BufferHealthStatus,
    observation: &BufferObservation,
    buffer_level_score: f64,
) -> Vec<String> {
    let mut recommendations = Vec::new();

    match status {
        BufferHealthStatus::Healthy => {}
        BufferHealthStatus::Warning => {
            if observation.jitter_ms.is_some_and(|j| j > 200) {
                recommendations.push("Increase target buffer by 30%".to_string());
            }
            if buffer_level_score < 0.5 {
                recommendations.push("Raise preload window before next track".to_string());
            }
        }
        BufferHealthStatus::Critical => {
            recommendations.push("Increase target buffer by 50%".to_string());
            recommendations.push("Step down one bitrate level".to_string());
        }
        BufferHealthStatus::Poor => {
            recommendations.push("Switch to minimum bitrate".to_string());
            recommendations.push("Increase target buffer to maximum".to_string());
        }
    }

    if observation.starvation_events_last_minute >= 2
        && status != BufferHealthStatus::Healthy
        && !recommendations
            .iter()
            .any(|r| r.contains("bitrate"))
    {
        recommendations.push("Step down one bitrate level".to_string());
    }

    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn full_buffer_no_events_is_healthy() {
        let score = compute_health_score(&BufferObservation {
            current_buffered_sec: 20.0,
            target_buffer_sec: 20.0,
            starvation_events_last_minute: 0,
            rebuffer_duration_last_minute_sec: 0.0,
            jitter_ms: None,
        });
        assert_eq!(score.score, 1.0);
        assert_eq!(score.status, BufferHealthStatus::Healthy);
        assert!(score.recommendations.is_empty());
    }

    #[test]
    fn starving_client_scores_poor() {
        let score = compute_health_score(&BufferObservation {
            current_buffered_sec: 0.5,
            target_buffer_sec: 20.0,
            starvation_events_last_minute: 5,
            rebuffer_duration_last_minute_sec: 12.0,
            jitter_ms: None,
        });
        assert!(score.score < 0.3);
        assert_eq!(score.status, BufferHealthStatus::Poor);
        assert!(!score.recommendations.is_empty());
    }

    #[rstest]
    #[case(0.85, BufferHealthStatus::Healthy)]
    #[case(0.8, BufferHealthStatus::Healthy)]
    #[case(0.79, BufferHealthStatus::Warning)]
    #[case(0.6, BufferHealthStatus::Warning)]
    #[case(0.59, BufferHealthStatus::Critical)]
    #[case(0.3, BufferHealthStatus::Critical)]
    #[case(0.29, BufferHealthStatus::Poor)]
    #[case(0.0, BufferHealthStatus::Poor)]
    fn status_band_boundaries(#[case] score: f64, #[case] expected: BufferHealthStatus) {
        assert_eq!(status_for(score), expected);
    }

    #[test]
    fn warning_with_high_jitter_recommends_bigger_buffer() {
        // Component mix tuned to land in the WARNING band
        let score = compute_health_score(&BufferObservation {
            current_buffered_sec: 10.0,
            target_buffer_sec: 20.0,
            starvation_events_last_minute: 0,
            rebuffer_duration_last_minute_sec: 1.0,
            jitter_ms: Some(250),
        });
        assert_eq!(score.status, BufferHealthStatus::Warning);
        assert!(
            score
                .recommendations
                .iter()
                .any(|r| r.contains("Increase target buffer by 30%"))
        );
    }

    #[test]
    fn score_stays_in_unit_interval() {
        let score = compute_health_score(&BufferObservation {
            current_buffered_sec: 500.0,
            target_buffer_sec: 5.0,
            starvation_events_last_minute: 0,
            rebuffer_duration_last_minute_sec: 0.0,
            jitter_ms: None,
        });
        assert!(score.score <= 1.0);
        assert!(score.buffer_level_score <= 1.0);
    }
}
