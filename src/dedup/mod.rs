// src/dedup/mod.rs
//! Duplicate detection: fingerprint match OR near-identical headline,
//! grouped transitively (single linkage) with a disjoint-set forest.
//!
//! - Fragments without a usable URL or headline are excluded and counted.
//! - Fragments whose fingerprint was already persisted are dropped outright.
//! - One representative survives per cluster: newest `published_at`, then
//!   longer `body_snippet`, then smallest `id`. Missing timestamps lose.
//!
//! Candidates are sorted by id before clustering, so the outcome does not
//! depend on input order.

pub mod fingerprint;
pub mod similarity;
pub mod union_find;

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::debug;

use crate::types::StoryFragment;

pub use fingerprint::{normalize_headline, normalize_url, Fingerprint};
pub use similarity::{HeadlineKey, HeadlineSimilarity, SimilarityThresholds};
pub use union_find::DisjointSet;

/// A fragment folded into another cluster member.
#[derive(Debug, Clone, PartialEq)]
pub struct Absorbed {
    pub fragment: StoryFragment,
    pub fingerprint: Fingerprint,
    /// Id of the representative, never a reference to it.
    pub duplicate_of: String,
}

/// A representative together with its fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub struct Survivor {
    pub fragment: StoryFragment,
    pub fingerprint: Fingerprint,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DedupStats {
    pub input: usize,
    pub dropped_unidentifiable: usize,
    pub dropped_repeated_id: usize,
    pub dropped_known: usize,
    pub clusters: usize,
    pub absorbed: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DedupOutcome {
    /// One per cluster, ordered by id.
    pub survivors: Vec<Survivor>,
    /// Non-representative members, ordered by id.
    pub absorbed: Vec<Absorbed>,
    /// Representative id -> absorbed ids. Provenance only.
    pub merged: BTreeMap<String, Vec<String>>,
    pub stats: DedupStats,
}

impl DedupOutcome {
    pub fn survivor_fragments(&self) -> impl Iterator<Item = &StoryFragment> {
        self.survivors.iter().map(|s| &s.fragment)
    }
}

struct Candidate<'a> {
    fragment: &'a StoryFragment,
    fingerprint: Fingerprint,
    key: HeadlineKey,
}

/// Distinct fingerprints of a batch, for the persistence lookup.
pub fn candidate_fingerprints(fragments: &[StoryFragment]) -> Vec<Fingerprint> {
    let set: BTreeSet<Fingerprint> = fragments.iter().filter_map(Fingerprint::for_fragment).collect();
    set.into_iter().collect()
}

/// Ordering that puts the cluster representative first.
pub fn canonical_order(a: &StoryFragment, b: &StoryFragment) -> Ordering {
    b.published_at
        .cmp(&a.published_at)
        .then_with(|| {
            b.body_snippet
                .chars()
                .count()
                .cmp(&a.body_snippet.chars().count())
        })
        .then_with(|| a.id.cmp(&b.id))
}

pub fn deduplicate(
    fragments: &[StoryFragment],
    known: &BTreeSet<Fingerprint>,
    thresholds: &SimilarityThresholds,
) -> DedupOutcome {
    let mut stats = DedupStats {
        input: fragments.len(),
        ..Default::default()
    };

    // 1) Screen: identity, fingerprint, history
    let mut seen_ids: HashSet<&str> = HashSet::with_capacity(fragments.len());
    let mut candidates: Vec<Candidate<'_>> = Vec::with_capacity(fragments.len());
    for f in fragments {
        if !seen_ids.insert(f.id.as_str()) {
            stats.dropped_repeated_id += 1;
            continue;
        }
        let Some(fingerprint) = Fingerprint::for_fragment(f) else {
            stats.dropped_unidentifiable += 1;
            continue;
        };
        if known.contains(&fingerprint) {
            stats.dropped_known += 1;
            continue;
        }
        candidates.push(Candidate {
            fragment: f,
            key: HeadlineKey::new(&f.headline),
            fingerprint,
        });
    }
    candidates.sort_by(|a, b| a.fragment.id.cmp(&b.fragment.id));

    // 2) Union on shared fingerprint, then on headline similarity
    let mut sets = DisjointSet::new(candidates.len());
    let mut first_by_fp: HashMap<&Fingerprint, usize> = HashMap::new();
    for (i, c) in candidates.iter().enumerate() {
        match first_by_fp.get(&c.fingerprint) {
            Some(&j) => {
                sets.union(i, j);
            }
            None => {
                first_by_fp.insert(&c.fingerprint, i);
            }
        }
    }
    for i in 0..candidates.len() {
        for j in (i + 1)..candidates.len() {
            if sets.find(i) == sets.find(j) {
                continue;
            }
            if thresholds.is_near_duplicate(&candidates[i].key, &candidates[j].key) {
                sets.union(i, j);
            }
        }
    }

    // 3) Pick a representative per cluster
    let mut survivors = Vec::new();
    let mut absorbed = Vec::new();
    let mut merged = BTreeMap::new();
    for mut group in sets.groups() {
        group.sort_by(|&a, &b| canonical_order(candidates[a].fragment, candidates[b].fragment));
        let rep = &candidates[group[0]];
        let rep_id = rep.fragment.id.clone();

        let mut absorbed_ids = Vec::with_capacity(group.len() - 1);
        for &m in &group[1..] {
            let c = &candidates[m];
            absorbed_ids.push(c.fragment.id.clone());
            absorbed.push(Absorbed {
                fragment: c.fragment.clone(),
                fingerprint: c.fingerprint.clone(),
                duplicate_of: rep_id.clone(),
            });
        }
        if !absorbed_ids.is_empty() {
            absorbed_ids.sort();
            debug!(target: "brief", representative = %rep_id, absorbed = ?absorbed_ids, "merged duplicate cluster");
            merged.insert(rep_id.clone(), absorbed_ids);
        }

        survivors.push(Survivor {
            fragment: rep.fragment.clone(),
            fingerprint: rep.fingerprint.clone(),
        });
    }
    survivors.sort_by(|a, b| a.fragment.id.cmp(&b.fragment.id));
    absorbed.sort_by(|a, b| a.fragment.id.cmp(&b.fragment.id));

    stats.clusters = survivors.len();
    stats.absorbed = absorbed.len();

    DedupOutcome {
        survivors,
        absorbed,
        merged,
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn day(d: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, 12, 0, 0).unwrap()
    }

    fn none_known() -> BTreeSet<Fingerprint> {
        BTreeSet::new()
    }

    fn ids(o: &DedupOutcome) -> Vec<&str> {
        o.survivor_fragments().map(|f| f.id.as_str()).collect()
    }

    #[test]
    fn tracking_params_collapse_to_one() {
        let a = StoryFragment::new("a", "Fed raises rates")
            .with_source("Reuters", "https://reuters.com/a?utm_source=x");
        let b = StoryFragment::new("b", "Powell speaks on policy path")
            .with_source("Reuters", "https://reuters.com/a");
        let out = deduplicate(&[a, b], &none_known(), &SimilarityThresholds::default());
        assert_eq!(out.survivors.len(), 1);
        assert_eq!(out.absorbed.len(), 1);
        assert_eq!(out.stats.clusters, 1);
    }

    #[test]
    fn clustering_is_transitive() {
        // a~b and b~c by headline, a and c alone are too far apart
        let a = StoryFragment::new("a", "Oil prices climb as OPEC extends output cuts")
            .with_source("X", "https://x.com/1");
        let b = StoryFragment::new("b", "Oil prices climb as OPEC extends cuts into 2025")
            .with_source("Y", "https://y.com/2");
        let c = StoryFragment::new("c", "OPEC extends cuts into 2025, traders react")
            .with_source("Z", "https://z.com/3");
        let t = SimilarityThresholds {
            jaccard_threshold: 0.5,
            edit_ratio_threshold: 0.99,
        };
        assert!(!t.is_near_duplicate(&HeadlineKey::new(&a.headline), &HeadlineKey::new(&c.headline)));
        let out = deduplicate(&[a, b, c], &none_known(), &t);
        assert_eq!(out.survivors.len(), 1);
        assert_eq!(out.absorbed.len(), 2);
    }

    #[test]
    fn representative_is_newest_then_longest_then_smallest_id() {
        let t = SimilarityThresholds::default();
        let url = "https://ft.com/story";
        let old_long = StoryFragment::new("a", "Story").with_source("FT", url).published(day(1)).with_body("long long long long");
        let new_short = StoryFragment::new("b", "Story").with_source("FT", url).published(day(3)).with_body("short");
        let new_long = StoryFragment::new("c", "Story").with_source("FT", url).published(day(3)).with_body("much longer body");
        let out = deduplicate(&[old_long.clone(), new_short.clone(), new_long], &none_known(), &t);
        assert_eq!(ids(&out), vec!["c"]);
        assert_eq!(out.merged.get("c").unwrap(), &vec!["a".to_string(), "b".to_string()]);

        // equal date and body length -> smallest id
        let x = StoryFragment::new("y", "Story").with_source("FT", url).published(day(3)).with_body("same");
        let y = StoryFragment::new("x", "Story").with_source("FT", url).published(day(3)).with_body("same");
        let out2 = deduplicate(&[x, y], &none_known(), &t);
        assert_eq!(ids(&out2), vec!["x"]);
    }

    #[test]
    fn missing_timestamp_loses_tie_break() {
        let url = "https://bbc.com/news/1";
        let undated = StoryFragment::new("a", "Story").with_source("BBC", url).with_body("a much longer body here");
        let dated = StoryFragment::new("b", "Story").with_source("BBC", url).published(day(1));
        let out = deduplicate(&[undated, dated], &none_known(), &SimilarityThresholds::default());
        assert_eq!(ids(&out), vec!["b"]);
        assert_eq!(out.absorbed[0].duplicate_of, "b");
    }

    #[test]
    fn known_fingerprints_are_dropped_entirely() {
        let a = StoryFragment::new("a", "Seen yesterday").with_source("WSJ", "https://wsj.com/x");
        let b = StoryFragment::new("b", "Fresh story about chips").with_source("WSJ", "https://wsj.com/y");
        let known: BTreeSet<Fingerprint> = [Fingerprint::for_fragment(&a).unwrap()].into_iter().collect();
        let out = deduplicate(&[a, b], &known, &SimilarityThresholds::default());
        assert_eq!(ids(&out), vec!["b"]);
        assert_eq!(out.stats.dropped_known, 1);
        assert!(out.absorbed.is_empty());
    }

    #[test]
    fn unidentifiable_and_repeated_ids_are_counted() {
        let blank = StoryFragment::new("a", "   ");
        let ok = StoryFragment::new("b", "Real headline");
        let again = StoryFragment::new("b", "Another headline");
        let out = deduplicate(&[blank, ok, again], &none_known(), &SimilarityThresholds::default());
        assert_eq!(ids(&out), vec!["b"]);
        assert_eq!(out.stats.dropped_unidentifiable, 1);
        assert_eq!(out.stats.dropped_repeated_id, 1);
    }

    #[test]
    fn input_order_does_not_matter() {
        let frags = vec![
            StoryFragment::new("c", "Tesla cuts prices in China").with_source("A", "https://a.com/1"),
            StoryFragment::new("a", "Tesla cuts prices in China again").with_source("B", "https://b.com/2"),
            StoryFragment::new("b", "Gold hits record").with_source("C", "https://c.com/3"),
        ];
        let mut rev = frags.clone();
        rev.reverse();
        let t = SimilarityThresholds::default();
        assert_eq!(deduplicate(&frags, &none_known(), &t), deduplicate(&rev, &none_known(), &t));
    }

    #[test]
    fn candidate_fingerprints_are_distinct() {
        let a = StoryFragment::new("a", "x").with_source("R", "https://r.com/a?utm_medium=y");
        let b = StoryFragment::new("b", "y").with_source("R", "https://r.com/a");
        let c = StoryFragment::new("c", "");
        assert_eq!(candidate_fingerprints(&[a, b, c]).len(), 1);
    }
}
