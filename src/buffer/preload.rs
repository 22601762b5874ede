//! Predictive preload hints
//!
//! Predicts the next songs a user is likely to play so clients can warm
//! their caches. The predictor is a pure ranking over data supplied by the
//! listening-history capability; it owns no data access of its own.

use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use crate::errors::AppResult;
use crate::models::PreloadHint;
use crate::repositories::ListeningHistory;

/// Probabilities assigned to the next tracks of an actively-played playlist
const PLAYLIST_PROBABILITIES: [f64; 3] = [0.9, 0.75, 0.6];

/// Co-play ranking window
const CO_PLAY_WINDOW_DAYS: i64 = 30;

/// Commute-hour boost applied to the top hints, clamped at 1.0
const COMMUTE_BOOST: f64 = 0.1;

/// A 24h skip rate above this collapses the hint list to a single entry
const SKIP_RATE_LIMIT: f64 = 0.4;

const REASON_PLAYLIST: &str = "playlist sequence";
const REASON_CO_PLAY: &str = "frequently played together";

pub struct PreloadPredictor {
    history: Arc<dyn ListeningHistory>,
}

impl PreloadPredictor {
    pub fn new(history: Arc<dyn ListeningHistory>) -> Self {
        Self { history }
    }

    /// Predict up to `limit` next-song hints for a user.
    ///
    /// Playlist context wins over co-play ranking. During commute hours
    /// (07-09 and 17-19 local) the top three probabilities get a +0.1 boost.
    /// Users skipping more than 40% of plays in the last 24h receive at
    /// most one hint.
    pub async fn predict(
        &self,
        user_id: Uuid,
        current_song_id: Uuid,
        local_hour: u32,
        limit: usize,
    ) -> AppResult<Vec<PreloadHint>> {
        let mut hints = self.ranked_candidates(user_id, current_song_id, limit).await?;

        if is_commute_hour(local_hour) {
            for hint in hints.iter_mut().take(3) {
                hint.probability = (hint.probability + COMMUTE_BOOST).min(1.0);
            }
        }

        if self.history.skip_rate_last_24h(user_id).await? > SKIP_RATE_LIMIT {
            hints.truncate(1);
        }

        Ok(hints)
    }

    async fn ranked_candidates(
        &self,
        user_id: Uuid,
        current_song_id: Uuid,
        limit: usize,
    ) -> AppResult<Vec<PreloadHint>> {
        let successors = self
            .history
            .playlist_successors(user_id, current_song_id, PLAYLIST_PROBABILITIES.len())
            .await?;

        if !successors.is_empty() {
            let hints = successors
                .into_iter()
                .zip(PLAYLIST_PROBABILITIES)
                .take(limit)
                .map(|(song_id, probability)| PreloadHint {
                    song_id,
                    probability,
                    reason: REASON_PLAYLIST.to_string(),
                })
                .collect();
            return Ok(hints);
        }

        let co_played = self
            .history
            .co_played_songs(user_id, current_song_id, Duration::days(CO_PLAY_WINDOW_DAYS))
            .await?;

        let total: u64 = co_played.iter().map(|(_, count)| *count as u64).sum();
        if total == 0 {
            return Ok(Vec::new());
        }

        let mut hints: Vec<PreloadHint> = co_played
            .into_iter()
            .map(|(song_id, count)| PreloadHint {
                song_id,
                probability: count as f64 / total as f64,
                reason: REASON_CO_PLAY.to_string(),
            })
            .collect();

        // Stable descending order so identical inputs rank identically
        hints.sort_by(|a, b| {
            b.probability
                .partial_cmp(&a.probability)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.song_id.cmp(&b.song_id))
        });
        hints.truncate(limit);
        Ok(hints)
    }
}

fn is_commute_hour(local_hour: u32) -> bool {
    (7..9).contains(&local_hour) || (17..19).contains(&local_hour)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RepositoryResult;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct FakeHistory {
        successors: Vec<Uuid>,
        co_played: Vec<(Uuid, u32)>,
        skip_rate: f64,
    }

    #[async_trait]
    impl ListeningHistory for FakeHistory {
        async fn playlist_successors(
            &self,
            _user_id: Uuid,
            _song_id: Uuid,
            limit: usize,
        ) -> RepositoryResult<Vec<Uuid>> {
            Ok(self.successors.iter().copied().take(limit).collect())
        }

        async fn co_played_songs(
            &self,
            _user_id: Uuid,
            _song_id: Uuid,
            _window: Duration,
        ) -> RepositoryResult<Vec<(Uuid, u32)>> {
            Ok(self.co_played.clone())
        }

        async fn skip_rate_last_24h(&self, _user_id: Uuid) -> RepositoryResult<f64> {
            Ok(self.skip_rate)
        }
    }

    fn predictor(history: FakeHistory) -> PreloadPredictor {
        PreloadPredictor::new(Arc::new(history))
    }

    #[tokio::test]
    async fn playlist_context_uses_fixed_probabilities() {
        let next: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let predictor = predictor(FakeHistory {
            successors: next.clone(),
            co_played: vec![],
            skip_rate: 0.0,
        });

        let hints = predictor
            .predict(Uuid::new_v4(), Uuid::new_v4(), 12, 3)
            .await
            .unwrap();

        assert_eq!(hints.len(), 3);
        assert_eq!(hints[0].song_id, next[0]);
        assert_eq!(hints[0].probability, 0.9);
        assert_eq!(hints[1].probability, 0.75);
        assert_eq!(hints[2].probability, 0.6);
        assert!(hints.iter().all(|h| h.reason == REASON_PLAYLIST));
    }

    #[tokio::test]
    async fn co_play_counts_normalize_to_probabilities() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let predictor = predictor(FakeHistory {
            successors: vec![],
            co_played: vec![(a, 6), (b, 2)],
            skip_rate: 0.0,
        });

        let hints = predictor
            .predict(Uuid::new_v4(), Uuid::new_v4(), 12, 3)
            .await
            .unwrap();

        assert_eq!(hints.len(), 2);
        assert_eq!(hints[0].song_id, a);
        assert!((hints[0].probability - 0.75).abs() < 1e-9);
        assert!((hints[1].probability - 0.25).abs() < 1e-9);
        // Sorted descending by probability
        assert!(hints[0].probability >= hints[1].probability);
    }

    #[tokio::test]
    async fn commute_hours_boost_top_hints() {
        let next: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let predictor = predictor(FakeHistory {
            successors: next,
            co_played: vec![],
            skip_rate: 0.0,
        });

        let hints = predictor
            .predict(Uuid::new_v4(), Uuid::new_v4(), 8, 3)
            .await
            .unwrap();

        assert!((hints[0].probability - 1.0).abs() < 1e-9); // 0.9 + 0.1 clamped
        assert!((hints[1].probability - 0.85).abs() < 1e-9);
        assert!((hints[2].probability - 0.7).abs() < 1e-9);
    }

    #[tokio::test]
    async fn heavy_skippers_get_a_single_hint() {
        let next: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let predictor = predictor(FakeHistory {
            successors: next,
            co_played: vec![],
            skip_rate: 0.55,
        });

        let hints = predictor
            .predict(Uuid::new_v4(), Uuid::new_v4(), 12, 3)
            .await
            .unwrap();
        assert_eq!(hints.len(), 1);
    }

    #[tokio::test]
    async fn no_history_yields_no_hints() {
        let predictor = predictor(FakeHistory {
            successors: vec![],
            co_played: vec![],
            skip_rate: 0.0,
        });
        let hints = predictor
            .predict(Uuid::new_v4(), Uuid::new_v4(), 12, 3)
            .await
            .unwrap();
        assert!(hints.is_empty());
    }

    #[test]
    fn commute_window_boundaries() {
        let expected: HashMap<u32, bool> = HashMap::from([
            (6, false),
            (7, true),
            (8, true),
            (9, false),
            (16, false),
            (17, true),
            (18, true),
            (19, false),
        ]);
        for (hour, in_window) in expected {
            assert_eq!(is_commute_hour(hour), in_window, "hour {hour}");
        }
    }
}
