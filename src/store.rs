// src/store.rs
//! Persistence gateway: which fingerprints were already published, and
//! write-back of the cards a run accepted.
//!
//! The engine never touches a store; the pipeline owns it and treats every
//! failure here as a warning.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use crate::dedup::Fingerprint;
use crate::sentiment::SentimentLabel;
use crate::types::{Region, ScoredCard};

#[async_trait::async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Subset of `candidates` that has been recorded before.
    async fn lookup_fingerprints(&self, candidates: &[Fingerprint]) -> Result<BTreeSet<Fingerprint>>;

    /// Remember accepted cards, keyed by fingerprint.
    async fn record(&self, cards: &[ScoredCard]) -> Result<()>;
}

/// One persisted card. `recorded_at` is the first time its fingerprint was seen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCard {
    pub fingerprint: Fingerprint,
    pub id: String,
    pub headline: String,
    #[serde(default)]
    pub source_name: String,
    #[serde(default)]
    pub source_url: Option<String>,
    pub region: Region,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    pub score: f64,
    pub compound: f64,
    pub label: SentimentLabel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl StoredCard {
    /// `None` for cards that carry no fingerprint (never produced by the engine).
    pub fn from_card(card: &ScoredCard, recorded_at: DateTime<Utc>) -> Option<Self> {
        let fingerprint = Fingerprint::for_fragment(&card.fragment)?;
        Some(Self {
            fingerprint,
            id: card.fragment.id.clone(),
            headline: card.fragment.headline.clone(),
            source_name: card.fragment.source_name.clone(),
            source_url: card.fragment.source_url.clone(),
            region: card.fragment.region,
            published_at: card.fragment.published_at,
            score: card.score,
            compound: card.sentiment.compound,
            label: card.sentiment.label,
            duplicate_of: card.duplicate_of.clone(),
            recorded_at,
        })
    }
}

type CardMap = BTreeMap<Fingerprint, StoredCard>;

/// Insert or refresh; the first `recorded_at` of a fingerprint is kept.
fn upsert(map: &mut CardMap, cards: &[ScoredCard], now: DateTime<Utc>) -> usize {
    let mut written = 0;
    for card in cards {
        let Some(mut stored) = StoredCard::from_card(card, now) else {
            continue;
        };
        if let Some(prev) = map.get(&stored.fingerprint) {
            stored.recorded_at = prev.recorded_at;
        }
        map.insert(stored.fingerprint.clone(), stored);
        written += 1;
    }
    written
}

fn known_subset(map: &CardMap, candidates: &[Fingerprint]) -> BTreeSet<Fingerprint> {
    candidates
        .iter()
        .filter(|fp| map.contains_key(*fp))
        .cloned()
        .collect()
}

// ---------------- In-memory ----------------

/// Process-local store for tests and one-shot runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    cards: Mutex<CardMap>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fingerprints<I: IntoIterator<Item = Fingerprint>>(fps: I) -> Self {
        let epoch = DateTime::<Utc>::UNIX_EPOCH;
        let cards = fps
            .into_iter()
            .map(|fp| {
                let stored = StoredCard {
                    fingerprint: fp.clone(),
                    id: fp.to_string(),
                    headline: String::new(),
                    source_name: String::new(),
                    source_url: None,
                    region: Region::Other,
                    published_at: None,
                    score: 0.0,
                    compound: 0.0,
                    label: SentimentLabel::Neutral,
                    duplicate_of: None,
                    recorded_at: epoch,
                };
                (fp, stored)
            })
            .collect();
        Self {
            cards: Mutex::new(cards),
        }
    }

    pub async fn len(&self) -> usize {
        self.cards.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cards.lock().await.is_empty()
    }

    pub async fn snapshot(&self) -> Vec<StoredCard> {
        self.cards.lock().await.values().cloned().collect()
    }
}

#[async_trait::async_trait]
impl PersistenceGateway for MemoryStore {
    async fn lookup_fingerprints(&self, candidates: &[Fingerprint]) -> Result<BTreeSet<Fingerprint>> {
        Ok(known_subset(&*self.cards.lock().await, candidates))
    }

    async fn record(&self, cards: &[ScoredCard]) -> Result<()> {
        let mut map = self.cards.lock().await;
        upsert(&mut map, cards, Utc::now());
        Ok(())
    }
}

// ---------------- JSON file ----------------

#[derive(Debug, Default, Serialize, Deserialize)]
struct SeenFile {
    #[serde(default)]
    cards: Vec<StoredCard>,
}

/// Seen-card history kept in one JSON document, rewritten atomically
/// (`<path>.tmp` + rename). A missing file is an empty history.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    // serializes read-modify-write cycles within the process
    guard: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<CardMap> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(CardMap::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("reading seen cards from {}", self.path.display()))
            }
        };
        if raw.trim().is_empty() {
            return Ok(CardMap::new());
        }
        let file: SeenFile = serde_json::from_str(&raw)
            .with_context(|| format!("parsing seen cards at {}", self.path.display()))?;
        Ok(file
            .cards
            .into_iter()
            .map(|c| (c.fingerprint.clone(), c))
            .collect())
    }

    async fn save(&self, map: &CardMap) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let file = SeenFile {
            cards: map.values().cloned().collect(),
        };
        let body = serde_json::to_string_pretty(&file).context("serializing seen cards")?;
        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, body)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "seen_cards.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// All stored cards, ordered by fingerprint.
    pub async fn cards(&self) -> Result<Vec<StoredCard>> {
        let _g = self.guard.lock().await;
        Ok(self.load().await?.into_values().collect())
    }

    /// Record with an explicit timestamp.
    pub async fn record_at(&self, cards: &[ScoredCard], now: DateTime<Utc>) -> Result<usize> {
        let _g = self.guard.lock().await;
        let mut map = self.load().await?;
        let written = upsert(&mut map, cards, now);
        self.save(&map).await?;
        debug!(target: "brief", path = %self.path.display(), written, total = map.len(), "seen cards saved");
        Ok(written)
    }

    /// Drop records first seen before `cutoff`; returns how many were removed.
    pub async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let _g = self.guard.lock().await;
        let mut map = self.load().await?;
        let before = map.len();
        map.retain(|_, c| c.recorded_at >= cutoff);
        let removed = before - map.len();
        if removed > 0 {
            self.save(&map).await?;
        }
        Ok(removed)
    }
}

#[async_trait::async_trait]
impl PersistenceGateway for JsonFileStore {
    async fn lookup_fingerprints(&self, candidates: &[Fingerprint]) -> Result<BTreeSet<Fingerprint>> {
        let _g = self.guard.lock().await;
        Ok(known_subset(&self.load().await?, candidates))
    }

    async fn record(&self, cards: &[ScoredCard]) -> Result<()> {
        self.record_at(cards, Utc::now()).await.map(|_| ())
    }
}

// ---------------- Dry run ----------------

/// Looks up through the inner gateway, never writes.
#[derive(Debug)]
pub struct ReadOnly<G> {
    inner: G,
}

impl<G: PersistenceGateway> ReadOnly<G> {
    pub fn new(inner: G) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> G {
        self.inner
    }
}

#[async_trait::async_trait]
impl<G: PersistenceGateway> PersistenceGateway for ReadOnly<G> {
    async fn lookup_fingerprints(&self, candidates: &[Fingerprint]) -> Result<BTreeSet<Fingerprint>> {
        self.inner.lookup_fingerprints(candidates).await
    }

    async fn record(&self, cards: &[ScoredCard]) -> Result<()> {
        debug!(target: "brief", cards = cards.len(), "dry run: write-back skipped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sentiment::SentimentScore;
    use crate::types::{ScoreComponents, StoryFragment};
    use chrono::{Duration, TimeZone};

    fn card(id: &str, url: &str) -> ScoredCard {
        ScoredCard {
            fragment: StoryFragment::new(id, format!("Headline {id}"))
                .with_source("Wire", url)
                .with_region(Region::Us),
            sentiment: SentimentScore::neutral(),
            components: ScoreComponents {
                recency: 1.0,
                relevance: 1.0,
                sentiment_boost: 1.0,
            },
            score: 1.0,
            duplicate_of: None,
        }
    }

    fn t(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, 8, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryStore::new();
        let c = card("a", "https://wire.com/a?utm_source=rss");
        let fp = Fingerprint::for_fragment(&c.fragment).unwrap();
        assert!(store.lookup_fingerprints(&[fp.clone()]).await.unwrap().is_empty());
        store.record(&[c]).await.unwrap();
        let hit = store.lookup_fingerprints(&[fp.clone(), Fingerprint::from("url:https://x.com/z")]).await.unwrap();
        assert_eq!(hit.into_iter().collect::<Vec<_>>(), vec![fp]);
    }

    #[tokio::test]
    async fn seeded_memory_store_reports_only_known() {
        let known = Fingerprint::from("url:https://wire.com/old");
        let store = MemoryStore::with_fingerprints([known.clone()]);
        assert_eq!(store.len().await, 1);
        let hit = store
            .lookup_fingerprints(&[known.clone(), Fingerprint::from("url:https://wire.com/new")])
            .await
            .unwrap();
        assert_eq!(hit, [known].into_iter().collect::<BTreeSet<_>>());
    }

    #[tokio::test]
    async fn file_store_missing_file_is_empty_and_upsert_keeps_first_seen() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("seen.json"));
        assert!(store.cards().await.unwrap().is_empty());

        store.record_at(&[card("a", "https://wire.com/a")], t(1)).await.unwrap();
        store.record_at(&[card("a2", "https://wire.com/a"), card("b", "https://wire.com/b")], t(3)).await.unwrap();

        let cards = store.cards().await.unwrap();
        assert_eq!(cards.len(), 2);
        let a = cards.iter().find(|c| c.source_url.as_deref() == Some("https://wire.com/a")).unwrap();
        assert_eq!(a.id, "a2");
        assert_eq!(a.recorded_at, t(1));
        assert!(!store.path().with_file_name("seen.json.tmp").exists());
    }

    #[tokio::test]
    async fn prune_drops_old_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("seen.json"));
        store.record_at(&[card("a", "https://wire.com/a")], t(1)).await.unwrap();
        store.record_at(&[card("b", "https://wire.com/b")], t(5)).await.unwrap();
        assert_eq!(store.prune_before(t(1) + Duration::days(2)).await.unwrap(), 1);
        let left = store.cards().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, "b");
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seen.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store = JsonFileStore::new(&path);
        assert!(store.lookup_fingerprints(&[]).await.is_err());
    }

    #[tokio::test]
    async fn read_only_never_writes() {
        let ro = ReadOnly::new(MemoryStore::new());
        ro.record(&[card("a", "https://wire.com/a")]).await.unwrap();
        assert!(ro.into_inner().is_empty().await);
    }
}
