// src/config.rs
//! Ranking configuration: one validated value object, built once.
//!
//! TOML shape (`config/ranking.toml`):
//! ```toml
//! total_cap = 10
//! watchlist = ["AAPL", "MSFT", "NVDA"]
//! relevance_baseline = 0.6
//!
//! [coverage]
//! US = 0.7
//! EU = 0.2
//! China = 0.1
//!
//! [sentiment_boost]
//! enabled = true
//! min = 0.95
//! max = 1.15
//! saturation = 0.5
//!
//! [dedup]
//! jaccard_threshold = 0.6
//! edit_ratio_threshold = 0.85
//! ```
//!
//! Path: `$BRIEF_CONFIG_PATH`, else `config/ranking.toml`.
//! `$BRIEF_TOTAL_CAP` overrides `total_cap` before validation.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::dedup::SimilarityThresholds;
use crate::types::{normalize_tickers, Region};

pub const DEFAULT_CONFIG_PATH: &str = "config/ranking.toml";
pub const ENV_CONFIG_PATH: &str = "BRIEF_CONFIG_PATH";
pub const ENV_TOTAL_CAP: &str = "BRIEF_TOTAL_CAP";

/// Allowed drift of the quota sum from 1.0.
pub const QUOTA_SUM_TOLERANCE: f64 = 1e-3;
pub const DEFAULT_RELEVANCE_BASELINE: f64 = 0.6;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("total_cap must be a positive integer, got {0}")]
    NonPositiveCap(i64),
    #[error("region quotas must sum to 1.0 (±{tolerance}), got {sum}")]
    QuotaSum { sum: f64, tolerance: f64 },
    #[error("quota for {region} must be a finite fraction in [0, 1], got {value}")]
    QuotaOutOfRange { region: String, value: f64 },
    #[error("unknown or non-bucketed region key in coverage: {0:?}")]
    UnknownRegion(String),
    #[error("region {0} is named more than once in coverage")]
    DuplicateRegion(String),
    #[error("coverage must name at least one region")]
    EmptyCoverage,
    #[error("sentiment boost bounds invalid: min={min}, max={max} (need 0 < min <= max, finite)")]
    BoostBounds { min: f64, max: f64 },
    #[error("sentiment boost saturation must be finite and > 0, got {0}")]
    BoostSaturation(f64),
    #[error("relevance_baseline must be a finite value in [0, 1], got {0}")]
    RelevanceBaseline(f64),
    #[error("{name} must be a finite value in (0, 1], got {value}")]
    SimilarityThreshold { name: &'static str, value: f64 },
}

/// Sentiment multiplier settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentBoost {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_boost_min")]
    pub min: f64,
    #[serde(default = "default_boost_max")]
    pub max: f64,
    /// |compound| at which the multiplier reaches `max`.
    #[serde(default = "default_saturation")]
    pub saturation: f64,
}

fn default_true() -> bool {
    true
}
fn default_boost_min() -> f64 {
    0.95
}
fn default_boost_max() -> f64 {
    1.15
}
fn default_saturation() -> f64 {
    0.5
}
fn default_relevance_baseline() -> f64 {
    DEFAULT_RELEVANCE_BASELINE
}

impl Default for SentimentBoost {
    fn default() -> Self {
        Self {
            enabled: true,
            min: default_boost_min(),
            max: default_boost_max(),
            saturation: default_saturation(),
        }
    }
}

impl SentimentBoost {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min.is_finite() && self.max.is_finite() && self.min > 0.0 && self.min <= self.max) {
            return Err(ConfigError::BoostBounds {
                min: self.min,
                max: self.max,
            });
        }
        if !(self.saturation.is_finite() && self.saturation > 0.0) {
            return Err(ConfigError::BoostSaturation(self.saturation));
        }
        Ok(())
    }
}

/// Validated region → fraction mapping over bucketed regions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionQuotas(BTreeMap<Region, f64>);

impl RegionQuotas {
    pub fn new<I>(quotas: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (Region, f64)>,
    {
        let mut map = BTreeMap::new();
        for (region, value) in quotas {
            if !region.is_bucketed() {
                return Err(ConfigError::UnknownRegion(region.to_string()));
            }
            if !(value.is_finite() && (0.0..=1.0).contains(&value)) {
                return Err(ConfigError::QuotaOutOfRange {
                    region: region.to_string(),
                    value,
                });
            }
            if map.insert(region, value).is_some() {
                return Err(ConfigError::DuplicateRegion(region.to_string()));
            }
        }
        if map.is_empty() {
            return Err(ConfigError::EmptyCoverage);
        }
        let sum: f64 = map.values().sum();
        if (sum - 1.0).abs() > QUOTA_SUM_TOLERANCE {
            return Err(ConfigError::QuotaSum {
                sum,
                tolerance: QUOTA_SUM_TOLERANCE,
            });
        }
        Ok(Self(map))
    }

    /// Region keys as written in config files ("US", "eu", "China").
    pub fn from_named(named: &BTreeMap<String, f64>) -> Result<Self, ConfigError> {
        let mut pairs = Vec::with_capacity(named.len());
        for (k, v) in named {
            let region: Region = k.parse().unwrap_or_default();
            if !region.is_bucketed() {
                return Err(ConfigError::UnknownRegion(k.clone()));
            }
            pairs.push((region, *v));
        }
        Self::new(pairs)
    }

    /// Fraction for `region`; 0.0 when not configured.
    pub fn get(&self, region: Region) -> f64 {
        self.0.get(&region).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Region, f64)> + '_ {
        self.0.iter().map(|(r, v)| (*r, *v))
    }

    pub fn sum(&self) -> f64 {
        self.0.values().sum()
    }
}

/// Everything the engine needs, validated at construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingConfig {
    quotas: RegionQuotas,
    total_cap: usize,
    watchlist: BTreeSet<String>,
    relevance_baseline: f64,
    sentiment_boost: SentimentBoost,
    similarity: SimilarityThresholds,
}

impl RankingConfig {
    pub fn new(
        quotas: RegionQuotas,
        total_cap: i64,
        watchlist: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Result<Self, ConfigError> {
        if total_cap <= 0 {
            return Err(ConfigError::NonPositiveCap(total_cap));
        }
        Ok(Self {
            quotas,
            total_cap: total_cap as usize,
            watchlist: normalize_tickers(watchlist),
            relevance_baseline: DEFAULT_RELEVANCE_BASELINE,
            sentiment_boost: SentimentBoost::default(),
            similarity: SimilarityThresholds::default(),
        })
    }

    pub fn with_sentiment_boost(mut self, boost: SentimentBoost) -> Result<Self, ConfigError> {
        boost.validate()?;
        self.sentiment_boost = boost;
        Ok(self)
    }

    pub fn with_relevance_baseline(mut self, baseline: f64) -> Result<Self, ConfigError> {
        if !(baseline.is_finite() && (0.0..=1.0).contains(&baseline)) {
            return Err(ConfigError::RelevanceBaseline(baseline));
        }
        self.relevance_baseline = baseline;
        Ok(self)
    }

    pub fn with_similarity(mut self, t: SimilarityThresholds) -> Result<Self, ConfigError> {
        for (name, value) in [
            ("jaccard_threshold", t.jaccard_threshold),
            ("edit_ratio_threshold", t.edit_ratio_threshold),
        ] {
            if !(value.is_finite() && value > 0.0 && value <= 1.0) {
                return Err(ConfigError::SimilarityThreshold { name, value });
            }
        }
        self.similarity = t;
        Ok(self)
    }

    pub fn quotas(&self) -> &RegionQuotas {
        &self.quotas
    }

    pub fn total_cap(&self) -> usize {
        self.total_cap
    }

    pub fn watchlist(&self) -> &BTreeSet<String> {
        &self.watchlist
    }

    pub fn relevance_baseline(&self) -> f64 {
        self.relevance_baseline
    }

    pub fn sentiment_boost(&self) -> &SentimentBoost {
        &self.sentiment_boost
    }

    pub fn similarity(&self) -> &SimilarityThresholds {
        &self.similarity
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let file: RankingFile = toml::from_str(s).context("parsing ranking config TOML")?;
        Ok(file.into_config(None)?)
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading ranking config from {}", path.display()))?;
        let file: RankingFile = toml::from_str(&content)
            .with_context(|| format!("parsing ranking config at {}", path.display()))?;
        let cap = parse_cap_env(std::env::var(ENV_TOTAL_CAP).ok())?;
        file.into_config(cap)
            .with_context(|| format!("invalid ranking config at {}", path.display()))
    }

    /// `$BRIEF_CONFIG_PATH`, else `config/ranking.toml`.
    pub fn load_default() -> anyhow::Result<Self> {
        Self::from_path(&default_config_path())
    }
}

pub fn default_config_path() -> PathBuf {
    std::env::var(ENV_CONFIG_PATH)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn parse_cap_env(raw: Option<String>) -> anyhow::Result<Option<i64>> {
    match raw {
        None => Ok(None),
        Some(s) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .with_context(|| format!("{ENV_TOTAL_CAP} is not an integer: {s:?}")),
    }
}

/// On-disk shape; converted into `RankingConfig` through validation.
#[derive(Debug, Clone, Deserialize)]
struct RankingFile {
    total_cap: i64,
    #[serde(default)]
    watchlist: Vec<String>,
    #[serde(default = "default_relevance_baseline")]
    relevance_baseline: f64,
    coverage: BTreeMap<String, f64>,
    #[serde(default)]
    sentiment_boost: SentimentBoost,
    #[serde(default)]
    dedup: SimilarityThresholds,
}

impl RankingFile {
    fn into_config(self, cap_override: Option<i64>) -> Result<RankingConfig, ConfigError> {
        let quotas = RegionQuotas::from_named(&self.coverage)?;
        RankingConfig::new(quotas, cap_override.unwrap_or(self.total_cap), &self.watchlist)?
            .with_relevance_baseline(self.relevance_baseline)?
            .with_sentiment_boost(self.sentiment_boost)?
            .with_similarity(self.dedup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = r#"
total_cap = 10
watchlist = ["aapl", " MSFT ", "AAPL"]

[coverage]
US = 0.7
eu = 0.2
China = 0.1

[sentiment_boost]
enabled = false
"#;

    #[test]
    fn parses_and_normalizes() {
        let cfg = RankingConfig::from_toml_str(GOOD).unwrap();
        assert_eq!(cfg.total_cap(), 10);
        assert_eq!(cfg.watchlist().len(), 2);
        assert!(cfg.watchlist().contains("MSFT"));
        assert!((cfg.quotas().get(Region::Eu) - 0.2).abs() < 1e-12);
        assert_eq!(cfg.quotas().get(Region::Other), 0.0);
        assert!(!cfg.sentiment_boost().enabled);
        // unspecified boost bounds keep their defaults
        assert!((cfg.sentiment_boost().max - 1.15).abs() < 1e-12);
        assert!((cfg.relevance_baseline() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn quota_sum_is_enforced() {
        let err = RegionQuotas::new([(Region::Us, 0.7), (Region::Eu, 0.2)]).unwrap_err();
        assert!(matches!(err, ConfigError::QuotaSum { .. }));
        assert!(RegionQuotas::new([(Region::Us, 0.7), (Region::Eu, 0.2), (Region::China, 0.1)]).is_ok());
        assert!(RegionQuotas::new([(Region::Us, 0.6665), (Region::Eu, 0.3335)]).is_ok());
    }

    #[test]
    fn rejects_bad_values() {
        let q = || RegionQuotas::new([(Region::Us, 1.0)]).unwrap();
        assert_eq!(
            RankingConfig::new(q(), -3, Vec::<String>::new()).unwrap_err(),
            ConfigError::NonPositiveCap(-3)
        );
        assert_eq!(
            RankingConfig::new(q(), 0, Vec::<String>::new()).unwrap_err(),
            ConfigError::NonPositiveCap(0)
        );
        assert!(matches!(
            RegionQuotas::new([(Region::Other, 1.0)]).unwrap_err(),
            ConfigError::UnknownRegion(_)
        ));
        assert!(matches!(
            RegionQuotas::new([(Region::Us, 1.2), (Region::Eu, -0.2)]).unwrap_err(),
            ConfigError::QuotaOutOfRange { .. }
        ));
        let bad_boost = SentimentBoost {
            min: 1.2,
            max: 1.0,
            ..Default::default()
        };
        assert!(matches!(
            RankingConfig::new(q(), 5, Vec::<String>::new())
                .unwrap()
                .with_sentiment_boost(bad_boost)
                .unwrap_err(),
            ConfigError::BoostBounds { .. }
        ));
    }

    #[test]
    fn region_named_twice_is_rejected() {
        let s = "total_cap = 5\n[coverage]\nEU = 0.5\neurope = 0.5\n";
        let err = RankingConfig::from_toml_str(s).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::DuplicateRegion("EU".into()))
        );
        assert!(matches!(
            RegionQuotas::new([(Region::Us, 0.5), (Region::Us, 0.5)]).unwrap_err(),
            ConfigError::DuplicateRegion(_)
        ));
    }

    #[test]
    fn unknown_coverage_key_is_rejected() {
        let s = r#"
total_cap = 5
[coverage]
US = 0.5
LATAM = 0.5
"#;
        let err = RankingConfig::from_toml_str(s).unwrap_err();
        assert!(format!("{err:#}").contains("LATAM"));
    }

    #[test]
    fn cap_env_parsing() {
        assert_eq!(parse_cap_env(None).unwrap(), None);
        assert_eq!(parse_cap_env(Some(" 12 ".into())).unwrap(), Some(12));
        assert!(parse_cap_env(Some("ten".into())).is_err());
    }
}
