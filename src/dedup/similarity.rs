// src/dedup/similarity.rs
//! Headline similarity: token-set Jaccard plus a normalized edit ratio.
//!
//! Jaccard catches the same story phrased differently by two outlets,
//! `strsim::normalized_levenshtein` catches trivial variants (case,
//! punctuation, one changed word) of the same wording.

use std::collections::BTreeSet;
use strsim::normalized_levenshtein;

use super::fingerprint::normalize_headline;

/// Short tokens that still carry meaning in market headlines.
const SHORT_KEEP: &[&str] = &["ai", "us", "eu", "fed"];

pub const DEFAULT_JACCARD_THRESHOLD: f64 = 0.6;
pub const DEFAULT_EDIT_RATIO_THRESHOLD: f64 = 0.85;

/// A headline prepared once for repeated pairwise comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlineKey {
    pub normalized: String,
    pub tokens: BTreeSet<String>,
}

impl HeadlineKey {
    pub fn new(headline: &str) -> Self {
        let normalized = normalize_headline(headline);
        let tokens = normalized
            .split(' ')
            .filter(|t| t.chars().count() > 2 || SHORT_KEEP.contains(t))
            .map(str::to_string)
            .collect();
        Self { normalized, tokens }
    }

    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }
}

/// Intersection over union; 0.0 when either side has no tokens.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let inter = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// Both measures for one pair, for logging and threshold checks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadlineSimilarity {
    pub jaccard: f64,
    pub edit_ratio: f64,
}

impl HeadlineSimilarity {
    pub fn between(a: &HeadlineKey, b: &HeadlineKey) -> Self {
        if a.is_empty() || b.is_empty() {
            return Self {
                jaccard: 0.0,
                edit_ratio: 0.0,
            };
        }
        Self {
            jaccard: jaccard(&a.tokens, &b.tokens),
            edit_ratio: normalized_levenshtein(&a.normalized, &b.normalized),
        }
    }
}

/// Thresholds above which two headlines are treated as the same story.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SimilarityThresholds {
    #[serde(default = "default_jaccard")]
    pub jaccard_threshold: f64,
    #[serde(default = "default_edit_ratio")]
    pub edit_ratio_threshold: f64,
}

fn default_jaccard() -> f64 {
    DEFAULT_JACCARD_THRESHOLD
}

fn default_edit_ratio() -> f64 {
    DEFAULT_EDIT_RATIO_THRESHOLD
}

impl Default for SimilarityThresholds {
    fn default() -> Self {
        Self {
            jaccard_threshold: DEFAULT_JACCARD_THRESHOLD,
            edit_ratio_threshold: DEFAULT_EDIT_RATIO_THRESHOLD,
        }
    }
}

impl SimilarityThresholds {
    pub fn matches(&self, sim: &HeadlineSimilarity) -> bool {
        sim.jaccard >= self.jaccard_threshold || sim.edit_ratio >= self.edit_ratio_threshold
    }

    pub fn is_near_duplicate(&self, a: &HeadlineKey, b: &HeadlineKey) -> bool {
        self.matches(&HeadlineSimilarity::between(a, b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_only_variants_match() {
        let t = SimilarityThresholds::default();
        let a = HeadlineKey::new("Fed Raises Interest Rates by 25 Basis Points");
        let b = HeadlineKey::new("FED RAISES INTEREST RATES BY 25 BASIS POINTS");
        assert!(t.is_near_duplicate(&a, &b));
    }

    #[test]
    fn same_story_different_phrasing_matches_on_tokens() {
        let t = SimilarityThresholds::default();
        let a = HeadlineKey::new("Nvidia shares jump after record quarterly revenue");
        let b = HeadlineKey::new("Record quarterly revenue: Nvidia shares jump");
        let sim = HeadlineSimilarity::between(&a, &b);
        assert!(sim.jaccard >= 0.6, "jaccard {}", sim.jaccard);
        assert!(t.matches(&sim));
    }

    #[test]
    fn unrelated_headlines_do_not_match() {
        let t = SimilarityThresholds::default();
        let a = HeadlineKey::new("Apple launches new iPhone");
        let b = HeadlineKey::new("ECB keeps deposit rate unchanged amid slowdown");
        let sim = HeadlineSimilarity::between(&a, &b);
        assert!(sim.jaccard < 0.2);
        assert!(!t.matches(&sim));
    }

    #[test]
    fn empty_headlines_never_match() {
        let t = SimilarityThresholds::default();
        let a = HeadlineKey::new("");
        let b = HeadlineKey::new("");
        assert!(!t.is_near_duplicate(&a, &b));
    }

    #[test]
    fn short_financial_tokens_are_kept() {
        let k = HeadlineKey::new("AI stocks and the Fed in US and EU");
        for t in ["ai", "fed", "us", "eu", "stocks", "and", "the"] {
            assert!(k.tokens.contains(t), "missing {t}");
        }
        assert!(!k.tokens.contains("in"));
    }
}
