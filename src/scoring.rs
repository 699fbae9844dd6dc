// src/scoring.rs
//! Composite importance score per story.
//!
//! score = recency * relevance * sentiment_boost
//!
//! - `recency`   : linear decay 1.0 (age 0) -> 0.5 (age >= 3 whole days)
//! - `relevance` : 1.0 when any ticker is on the watchlist, baseline otherwise
//! - `boost`     : |compound| mapped linearly onto [min, max], saturating;
//!                 fixed at 1.0 when disabled
//!
//! Scores are absolute (never re-normalized across cards) and always finite.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use crate::config::{RankingConfig, SentimentBoost};
use crate::sentiment::{SentimentAnalyzer, SentimentScore};
use crate::types::{ScoreComponents, ScoredCard, StoryFragment};

pub const MAX_AGE_DAYS: i64 = 3;
pub const RECENCY_FLOOR: f64 = 0.5;

/// Missing timestamps are infinitely old and score the floor.
pub fn recency_score(published_at: Option<DateTime<Utc>>, reference: DateTime<Utc>) -> f64 {
    let Some(published) = published_at else {
        return RECENCY_FLOOR;
    };
    let age_days = (reference - published).num_days().clamp(0, MAX_AGE_DAYS);
    1.0 - (1.0 - RECENCY_FLOOR) * (age_days as f64) / (MAX_AGE_DAYS as f64)
}

/// Binary watchlist hit; an empty watchlist always yields the baseline.
pub fn relevance_score(
    tickers: &BTreeSet<String>,
    watchlist: &BTreeSet<String>,
    baseline: f64,
) -> f64 {
    if tickers.iter().any(|t| watchlist.contains(t)) {
        1.0
    } else {
        baseline
    }
}

pub fn sentiment_boost(compound: f64, boost: &SentimentBoost) -> f64 {
    if !boost.enabled {
        return 1.0;
    }
    let magnitude = if compound.is_finite() {
        compound.abs()
    } else {
        0.0
    };
    let ratio = if boost.saturation > 0.0 {
        (magnitude / boost.saturation).min(1.0)
    } else {
        1.0
    };
    boost.min + (boost.max - boost.min) * ratio
}

/// Applies the configured scoring to fragments.
#[derive(Debug, Clone, Copy)]
pub struct Scorer<'a> {
    config: &'a RankingConfig,
    analyzer: SentimentAnalyzer,
}

impl<'a> Scorer<'a> {
    pub fn new(config: &'a RankingConfig) -> Self {
        Self {
            config,
            analyzer: SentimentAnalyzer::new(),
        }
    }

    pub fn components(
        &self,
        fragment: &StoryFragment,
        sentiment: &SentimentScore,
        reference: DateTime<Utc>,
    ) -> ScoreComponents {
        ScoreComponents {
            recency: recency_score(fragment.published_at, reference),
            relevance: relevance_score(
                &fragment.tickers,
                self.config.watchlist(),
                self.config.relevance_baseline(),
            ),
            sentiment_boost: sentiment_boost(sentiment.compound, self.config.sentiment_boost()),
        }
    }

    /// Final score of one fragment at `reference`.
    pub fn score(&self, fragment: &StoryFragment, reference: DateTime<Utc>) -> f64 {
        let sentiment = self.analyzer.analyze_fragment(fragment);
        self.components(fragment, &sentiment, reference).total()
    }

    /// Build the decorated card; the fragment is cloned, never mutated.
    pub fn score_card(
        &self,
        fragment: &StoryFragment,
        duplicate_of: Option<String>,
        reference: DateTime<Utc>,
    ) -> ScoredCard {
        let sentiment = self.analyzer.analyze_fragment(fragment);
        let components = self.components(fragment, &sentiment, reference);
        ScoredCard {
            fragment: fragment.clone(),
            sentiment,
            score: components.total(),
            components,
            duplicate_of,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 9, 0, 0).unwrap()
    }

    fn boost(enabled: bool) -> SentimentBoost {
        SentimentBoost {
            enabled,
            ..SentimentBoost::default()
        }
    }

    #[test]
    fn recency_decays_linearly_and_clamps() {
        let r = now();
        assert_eq!(recency_score(Some(r), r), 1.0);
        assert!((recency_score(Some(r - Duration::days(1)), r) - (1.0 - 0.5 / 3.0)).abs() < 1e-12);
        assert!((recency_score(Some(r - Duration::days(2)), r) - (1.0 - 1.0 / 3.0)).abs() < 1e-12);
        assert_eq!(recency_score(Some(r - Duration::days(3)), r), 0.5);
        assert_eq!(recency_score(Some(r - Duration::days(5)), r), 0.5);
        assert_eq!(recency_score(None, r), 0.5);
        // future dates clamp to age 0
        assert_eq!(recency_score(Some(r + Duration::days(2)), r), 1.0);
        // partial days count as whole days elapsed
        assert_eq!(recency_score(Some(r - Duration::hours(23)), r), 1.0);
    }

    #[test]
    fn relevance_is_binary() {
        let wl: BTreeSet<String> = ["AAPL", "MSFT"].iter().map(|s| s.to_string()).collect();
        let one: BTreeSet<String> = ["AAPL".to_string()].into_iter().collect();
        let both: BTreeSet<String> = ["AAPL".to_string(), "MSFT".to_string()].into_iter().collect();
        let other: BTreeSet<String> = ["TSLA".to_string()].into_iter().collect();
        assert_eq!(relevance_score(&one, &wl, 0.6), 1.0);
        assert_eq!(relevance_score(&both, &wl, 0.6), 1.0);
        assert_eq!(relevance_score(&other, &wl, 0.6), 0.6);
        assert_eq!(relevance_score(&one, &BTreeSet::new(), 0.6), 0.6);
    }

    #[test]
    fn boost_interpolates_and_saturates() {
        let b = boost(true);
        assert!((sentiment_boost(0.0, &b) - 0.95).abs() < 1e-12);
        assert!((sentiment_boost(0.25, &b) - 1.05).abs() < 1e-12);
        assert!((sentiment_boost(-0.25, &b) - 1.05).abs() < 1e-12);
        assert!((sentiment_boost(0.5, &b) - 1.15).abs() < 1e-12);
        assert!((sentiment_boost(0.9, &b) - 1.15).abs() < 1e-12);
        assert!((sentiment_boost(f64::NAN, &b) - 0.95).abs() < 1e-12);
    }

    #[test]
    fn disabled_boost_is_identity() {
        let b = boost(false);
        for c in [-1.0, -0.4, 0.0, 0.2, 1.0] {
            assert_eq!(sentiment_boost(c, &b), 1.0);
        }
    }
}
