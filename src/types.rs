// src/types.rs
//! Core value types shared by every stage of the ranking engine.
//!
//! `StoryFragment` is what extraction hands us; it is never mutated. Scoring
//! wraps it into a `ScoredCard`, and the ranker groups cards into
//! `RegionBucket`s inside one immutable `RunResult`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::sentiment::{MarketMood, SentimentScore};

/// Geographic category of a story.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE", from = "String")]
pub enum Region {
    Us,
    Eu,
    China,
    #[default]
    Other,
}

impl Region {
    pub const ALL: [Region; 4] = [Region::Us, Region::Eu, Region::China, Region::Other];

    /// Regions that can own a bucket slot. `Other` never does.
    pub const BUCKETED: [Region; 3] = [Region::Us, Region::Eu, Region::China];

    pub fn as_str(self) -> &'static str {
        match self {
            Region::Us => "US",
            Region::Eu => "EU",
            Region::China => "CHINA",
            Region::Other => "OTHER",
        }
    }

    pub fn is_bucketed(self) -> bool {
        self != Region::Other
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lenient parse: any unknown tag maps to `Other` (and is therefore never bucketed).
impl FromStr for Region {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "us" | "usa" | "united states" => Region::Us,
            "eu" | "europe" => Region::Eu,
            "china" | "cn" => Region::China,
            _ => Region::Other,
        })
    }
}

impl From<String> for Region {
    fn from(s: String) -> Self {
        s.parse().unwrap_or(Region::Other)
    }
}

/// One extracted news item, as produced upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryFragment {
    pub id: String,
    #[serde(default)]
    pub headline: String,
    #[serde(default)]
    pub body_snippet: String,
    #[serde(default)]
    pub source_name: String,
    #[serde(default)]
    pub source_url: Option<String>,
    /// `None` when missing or unparseable; treated as infinitely old.
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub region: Region,
    #[serde(default, deserialize_with = "ticker_set")]
    pub tickers: BTreeSet<String>,
}

impl StoryFragment {
    pub fn new(id: impl Into<String>, headline: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            headline: headline.into(),
            body_snippet: String::new(),
            source_name: String::new(),
            source_url: None,
            published_at: None,
            region: Region::Other,
            tickers: BTreeSet::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body_snippet = body.into();
        self
    }

    pub fn with_source(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.source_name = name.into();
        self.source_url = Some(url.into());
        self
    }

    pub fn with_region(mut self, region: Region) -> Self {
        self.region = region;
        self
    }

    pub fn published(mut self, at: DateTime<Utc>) -> Self {
        self.published_at = Some(at);
        self
    }

    pub fn with_tickers<I, S>(mut self, tickers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tickers = normalize_tickers(tickers);
        self
    }

    /// Text fed to the sentiment scorer: headline and body as one unit.
    pub fn sentiment_text(&self) -> String {
        match (self.headline.trim(), self.body_snippet.trim()) {
            ("", body) => body.to_string(),
            (head, "") => head.to_string(),
            (head, body) => format!("{head} {body}"),
        }
    }
}

/// Uppercase, trim, drop empties, dedup.
pub fn normalize_tickers<I, S>(tickers: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tickers
        .into_iter()
        .map(|t| t.as_ref().trim().trim_start_matches('$').to_ascii_uppercase())
        .filter(|t| !t.is_empty())
        .collect()
}

fn ticker_set<'de, D>(d: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<String>> = Option::deserialize(d)?;
    Ok(normalize_tickers(raw.unwrap_or_default()))
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` or a bare date. Anything else is `None`.
fn lenient_timestamp<'de, D>(d: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(d)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(ndt.and_utc());
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(ndt.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| ndt.and_utc())
}

/// Per-factor breakdown so a score can always be explained.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponents {
    pub recency: f64,
    pub relevance: f64,
    pub sentiment_boost: f64,
}

impl ScoreComponents {
    /// Product of the factors; non-finite results collapse to 0.0.
    pub fn total(&self) -> f64 {
        let t = self.recency * self.relevance * self.sentiment_boost;
        if t.is_finite() {
            t.max(0.0)
        } else {
            0.0
        }
    }
}

/// A fragment decorated with sentiment and score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCard {
    pub fragment: StoryFragment,
    pub sentiment: SentimentScore,
    pub components: ScoreComponents,
    pub score: f64,
    /// Id of the cluster representative this card was merged into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<String>,
}

impl ScoredCard {
    pub fn id(&self) -> &str {
        &self.fragment.id
    }

    pub fn region(&self) -> Region {
        self.fragment.region
    }

    pub fn is_duplicate(&self) -> bool {
        self.duplicate_of.is_some()
    }
}

/// Ranked, capped list of cards for one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionBucket {
    pub region: Region,
    /// Slots apportioned to this region.
    pub capacity: usize,
    pub cards: Vec<ScoredCard>,
}

impl RegionBucket {
    pub fn empty(region: Region, capacity: usize) -> Self {
        Self {
            region,
            capacity,
            cards: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Slots left unfilled (no cross-region backfill happens).
    pub fn shortfall(&self) -> usize {
        self.capacity.saturating_sub(self.cards.len())
    }

    pub fn ids(&self) -> Vec<&str> {
        self.cards.iter().map(|c| c.id()).collect()
    }
}

/// Output of one ranking run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub buckets: BTreeMap<Region, RegionBucket>,
    pub sentiment_summary: MarketMood,
}

impl RunResult {
    pub fn bucket(&self, region: Region) -> Option<&RegionBucket> {
        self.buckets.get(&region)
    }

    pub fn total_cards(&self) -> usize {
        self.buckets.values().map(RegionBucket::len).sum()
    }

    pub fn cards(&self) -> impl Iterator<Item = &ScoredCard> {
        self.buckets.values().flat_map(|b| b.cards.iter())
    }
}
