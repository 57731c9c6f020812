//! Aggregation over Last.fm responses: mainstream ("hipster") score, best
//! friend selection and taste comparison summaries.
//!
//! The scoring functions are pure. [`ChartCache`] and the `*_of` helpers glue
//! them to a [`MusicService`].

use log::{debug, info};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use crate::lastfm_client::{GatewayResult, MusicService};
use crate::models::{Period, TasteComparison, TopArtist};

/// Global chart artist names.
pub type ChartSnapshot = Arc<HashSet<String>>;

/// Process-wide snapshot of the global top-artist chart.
///
/// Filled on first use and never refreshed, so a long-running bot keeps
/// scoring against the chart as it was at startup. The lock makes the first
/// fill single-writer. A failed fetch leaves the cell empty and the next
/// caller tries again.
#[derive(Debug, Default)]
pub struct ChartCache {
    cell: Mutex<Option<ChartSnapshot>>,
}

impl ChartCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached snapshot, fetching it through `service` the first time.
    pub fn get_or_fetch<S: MusicService + ?Sized>(&self, service: &S) -> GatewayResult<ChartSnapshot> {
        let mut cell = self.cell.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(snapshot) = cell.as_ref() {
            return Ok(Arc::clone(snapshot));
        }

        let names: HashSet<String> = service.global_top_artists()?.into_iter().collect();
        info!("Cached global chart snapshot with {} artists", names.len());

        let snapshot = Arc::new(names);
        *cell = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Whether the snapshot has been fetched yet.
    #[must_use]
    pub fn is_populated(&self) -> bool {
        self.cell
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

/// Percentage of a user's weighted listening that goes to charting artists.
///
/// ```text
/// score = sum(plays of top artists in chart) / sum(plays of all top artists) * 100
/// ```
///
/// Returns `None` when the user has no plays in the list at all (empty list
/// or every play count zero); there is nothing to measure in that case.
///
/// # Examples
///
/// ```
/// use lastirc::algorithm::hipster_score;
/// use lastirc::models::TopArtist;
/// use std::collections::HashSet;
///
/// let chart: HashSet<String> = ["Drake".to_string()].into();
/// let top = vec![
///     TopArtist { name: "Drake".into(), playcount: 25 },
///     TopArtist { name: "Low".into(), playcount: 75 },
/// ];
/// assert_eq!(hipster_score(&top, &chart), Some(25.0));
/// ```
#[must_use]
pub fn hipster_score(user_top: &[TopArtist], chart: &HashSet<String>) -> Option<f64> {
    let total: u64 = user_top.iter().map(|a| a.playcount).sum();
    if total == 0 {
        return None;
    }

    let mainstream: u64 = user_top
        .iter()
        .filter(|a| chart.contains(&a.name))
        .map(|a| a.playcount)
        .sum();

    Some(mainstream as f64 / total as f64 * 100.0)
}

/// Similarity as a percentage, clamped to `[0, 100]`.
#[must_use]
pub fn taste_percentage(comparison: &TasteComparison) -> f64 {
    (comparison.score * 100.0).clamp(0.0, 100.0)
}

/// Friend with the highest score. The earliest entry wins a tie.
#[must_use]
pub fn best_friend(scores: &[(String, f64)]) -> Option<&str> {
    scores
        .iter()
        .fold(None::<&(String, f64)>, |best, candidate| match best {
            Some(b) if b.1.total_cmp(&candidate.1).is_ge() => Some(b),
            _ => Some(candidate),
        })
        .map(|(name, _)| name.as_str())
}

/// The least mainstream contestant. The earliest entry wins a tie.
#[must_use]
pub fn battle_winner(scores: &[(String, f64)]) -> Option<(&str, f64)> {
    scores
        .iter()
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(name, score)| (name.as_str(), *score))
}

/// Fetch `user`'s top artists for `period` and score them against the chart.
pub fn user_hipster_score<S: MusicService + ?Sized>(
    service: &S,
    cache: &ChartCache,
    user: &str,
    period: Period,
) -> GatewayResult<Option<f64>> {
    let chart = cache.get_or_fetch(service)?;
    let top = service.top_artists(user, period, None)?;
    let score = hipster_score(&top, &chart);
    debug!("{user} hipster score over {period}: {score:?}");
    Ok(score)
}

/// Compare `user` with each of their friends and pick the closest match.
pub fn best_friend_of<S: MusicService + ?Sized>(service: &S, user: &str) -> GatewayResult<Option<String>> {
    let friends = service.friends(user)?;

    let mut scores = Vec::with_capacity(friends.len());
    for friend in friends {
        let comparison = service.compare_taste(user, &friend)?;
        scores.push((friend, comparison.score));
    }

    Ok(best_friend(&scores).map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artist(name: &str, playcount: u64) -> TopArtist {
        TopArtist {
            name: name.to_string(),
            playcount,
        }
    }

    fn chart(names: &[&str]) -> HashSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_hipster_score_weights_by_playcount() {
        let top = vec![artist("Drake", 25), artist("Low", 50), artist("Adele", 25)];
        let score = hipster_score(&top, &chart(&["Drake", "Adele"])).unwrap();

        assert!((score - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_hipster_score_bounds() {
        let top = vec![artist("Low", 10), artist("Slint", 5)];

        assert_eq!(hipster_score(&top, &chart(&[])), Some(0.0));
        assert_eq!(hipster_score(&top, &chart(&["Low", "Slint"])), Some(100.0));
    }

    #[test]
    fn test_hipster_score_without_plays_is_none() {
        assert_eq!(hipster_score(&[], &chart(&["Drake"])), None);

        let silent = vec![artist("Drake", 0), artist("Low", 0)];
        assert_eq!(hipster_score(&silent, &chart(&["Drake"])), None);
        // Stable across calls.
        assert_eq!(hipster_score(&silent, &chart(&["Drake"])), None);
    }

    #[test]
    fn test_hipster_score_monotonic_in_chart_plays() {
        let charting = chart(&["Drake"]);
        let mut top = vec![artist("Drake", 10), artist("Low", 40)];
        let before = hipster_score(&top, &charting).unwrap();

        top[0].playcount += 25;
        let after = hipster_score(&top, &charting).unwrap();
        assert!(after > before);

        top.push(artist("Drake", 0));
        assert_eq!(hipster_score(&top, &charting).unwrap(), after);
    }

    #[test]
    fn test_taste_percentage_range() {
        for score in [0.0, 0.25, 0.5, 1.0] {
            let comparison = TasteComparison {
                score,
                matching_artist_count: 0,
                sample_artist_names: Vec::new(),
            };
            let pct = taste_percentage(&comparison);
            assert!((0.0..=100.0).contains(&pct));
            assert!((pct - score * 100.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_best_friend_picks_maximum() {
        let scores = vec![
            ("A".to_string(), 0.3),
            ("B".to_string(), 0.9),
            ("C".to_string(), 0.5),
        ];
        assert_eq!(best_friend(&scores), Some("B"));
    }

    #[test]
    fn test_best_friend_tie_goes_to_first() {
        let scores = vec![("A".to_string(), 0.7), ("B".to_string(), 0.7)];
        assert_eq!(best_friend(&scores), Some("A"));
        assert_eq!(best_friend(&[]), None);
    }

    #[test]
    fn test_battle_winner_is_least_mainstream() {
        let scores = vec![("alice".to_string(), 80.0), ("bob".to_string(), 20.0)];
        assert_eq!(battle_winner(&scores), Some(("bob", 20.0)));

        let tied = vec![("carol".to_string(), 10.0), ("dave".to_string(), 10.0)];
        assert_eq!(battle_winner(&tied), Some(("carol", 10.0)));
        assert_eq!(battle_winner(&[]), None);
    }
}
