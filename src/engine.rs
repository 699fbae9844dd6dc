//! # Ranking Engine
//! Pure batch composition: dedup → sentiment → score → rank.
//! No I/O and no clock: known fingerprints and the reference time are
//! inputs, so a run is reproducible from its arguments alone.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::config::RankingConfig;
use crate::dedup::{deduplicate, DedupStats, Fingerprint};
use crate::rank::rank;
use crate::scoring::Scorer;
use crate::types::{Region, RunResult, ScoredCard, StoryFragment};

/// Capacity and fill of one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BucketFill {
    pub capacity: usize,
    pub filled: usize,
    pub shortfall: usize,
}

/// Counts reported next to every run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunDiagnostics {
    pub dedup: DedupStats,
    pub survivors: usize,
    pub bucketed: usize,
    pub fill: BTreeMap<Region, BucketFill>,
    /// Survivors tagged `OTHER`; scored but never bucketed.
    pub unbucketed_region: usize,
    pub watchlist_covered: BTreeSet<String>,
    pub watchlist_uncovered: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineOutput {
    pub result: RunResult,
    /// Every scored card: representatives and absorbed duplicates, by id.
    pub cards: Vec<ScoredCard>,
    /// Representative id -> absorbed ids.
    pub merged: BTreeMap<String, Vec<String>>,
    pub diagnostics: RunDiagnostics,
}

impl EngineOutput {
    /// Cards worth persisting so they are recognised on the next run.
    pub fn accepted_cards(&self) -> &[ScoredCard] {
        &self.cards
    }
}

/// Runs one batch against a fixed configuration.
#[derive(Debug, Clone)]
pub struct RankingEngine {
    config: RankingConfig,
}

impl RankingEngine {
    pub fn new(config: RankingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    pub fn process(
        &self,
        fragments: &[StoryFragment],
        known: &BTreeSet<Fingerprint>,
        reference: DateTime<Utc>,
    ) -> EngineOutput {
        process_batch(fragments, known, reference, &self.config)
    }
}

/// Same as [`RankingEngine::process`] without holding a config.
pub fn process_batch(
    fragments: &[StoryFragment],
    known: &BTreeSet<Fingerprint>,
    reference: DateTime<Utc>,
    config: &RankingConfig,
) -> EngineOutput {
    // 1) Clusters are final before anything is scored
    let outcome = deduplicate(fragments, known, config.similarity());

    // 2) Score representatives and absorbed members alike
    let scorer = Scorer::new(config);
    let mut cards: Vec<ScoredCard> = outcome
        .survivors
        .iter()
        .map(|s| scorer.score_card(&s.fragment, None, reference))
        .collect();
    let survivors = cards.len();
    cards.extend(
        outcome
            .absorbed
            .iter()
            .map(|a| scorer.score_card(&a.fragment, Some(a.duplicate_of.clone()), reference)),
    );
    cards.sort_by(|a, b| a.id().cmp(b.id()));

    // 3) Buckets
    let result = rank(&cards, config.quotas(), config.total_cap());

    let diagnostics = diagnose(&result, &cards, &outcome.stats, survivors, config);
    EngineOutput {
        result,
        cards,
        merged: outcome.merged,
        diagnostics,
    }
}

fn diagnose(
    result: &RunResult,
    cards: &[ScoredCard],
    stats: &DedupStats,
    survivors: usize,
    config: &RankingConfig,
) -> RunDiagnostics {
    let fill = result
        .buckets
        .iter()
        .filter(|(region, _)| region.is_bucketed())
        .map(|(region, b)| {
            (
                *region,
                BucketFill {
                    capacity: b.capacity,
                    filled: b.len(),
                    shortfall: b.shortfall(),
                },
            )
        })
        .collect();

    let bucketed_tickers: BTreeSet<&str> = result
        .cards()
        .flat_map(|c| c.fragment.tickers.iter().map(String::as_str))
        .collect();
    let (watchlist_covered, watchlist_uncovered): (BTreeSet<String>, BTreeSet<String>) = config
        .watchlist()
        .iter()
        .cloned()
        .partition(|t| bucketed_tickers.contains(t.as_str()));

    RunDiagnostics {
        dedup: *stats,
        survivors,
        bucketed: result.total_cards(),
        fill,
        unbucketed_region: cards
            .iter()
            .filter(|c| !c.is_duplicate() && !c.region().is_bucketed())
            .count(),
        watchlist_covered,
        watchlist_uncovered,
    }
}
