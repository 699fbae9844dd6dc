// src/rank.rs
//! Regional ranker: apportion `total_cap` across regions, then fill each
//! region's bucket with its best cards.
//!
//! - Slot counts use largest-remainder (Hamilton) apportionment and always
//!   sum to exactly `total_cap`.
//! - Within a region cards are ordered by score (desc), then id (asc).
//! - Unused slots stay unused: a short region never donates to another.
//! - `OTHER` cards and absorbed duplicates never enter a bucket.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use crate::config::RegionQuotas;
use crate::sentiment::compute_market_mood;
use crate::types::{Region, RegionBucket, RunResult, ScoredCard};

/// Absorbs float drift such as 0.7 * 10 = 6.999...
const APPORTION_EPS: f64 = 1e-9;

/// Integer slot counts per bucketed region, summing to `total_cap`.
pub fn apportion(quotas: &RegionQuotas, total_cap: usize) -> BTreeMap<Region, usize> {
    let mut counts: BTreeMap<Region, usize> = Region::BUCKETED.iter().map(|r| (*r, 0)).collect();
    let sum = quotas.sum();
    if total_cap == 0 || !(sum.is_finite() && sum > 0.0) {
        return counts;
    }

    let mut remainders: Vec<(Region, f64)> = Vec::with_capacity(Region::BUCKETED.len());
    let mut assigned = 0usize;
    for region in Region::BUCKETED {
        let share = quotas.get(region) / sum;
        let exact = share * total_cap as f64;
        let whole = (exact + APPORTION_EPS).floor().max(0.0);
        let whole_slots = (whole as usize).min(total_cap - assigned);
        counts.insert(region, whole_slots);
        assigned += whole_slots;
        if share > 0.0 {
            remainders.push((region, (exact - whole).max(0.0)));
        }
    }

    // Largest fractional remainder first; region order breaks ties.
    remainders.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let mut leftover = total_cap - assigned;
    while leftover > 0 && !remainders.is_empty() {
        for (region, _) in &remainders {
            if leftover == 0 {
                break;
            }
            if let Some(c) = counts.get_mut(region) {
                *c += 1;
            }
            leftover -= 1;
        }
    }
    counts
}

/// Descending score, ascending id.
pub fn rank_order(a: &ScoredCard, b: &ScoredCard) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.id().cmp(b.id()))
}

/// Build the run's buckets from scored cards.
///
/// The result holds a key for every region (`OTHER` always empty, capacity 0)
/// and a market mood computed over bucketed cards only.
pub fn rank(scored_cards: &[ScoredCard], quotas: &RegionQuotas, total_cap: usize) -> RunResult {
    let capacities = apportion(quotas, total_cap);

    let mut pools: BTreeMap<Region, Vec<&ScoredCard>> = BTreeMap::new();
    let mut seen_ids: HashSet<&str> = HashSet::with_capacity(scored_cards.len());
    let mut ordered: Vec<&ScoredCard> = scored_cards.iter().collect();
    ordered.sort_by(|a, b| rank_order(a, b));
    for card in ordered {
        if card.is_duplicate() || !card.region().is_bucketed() {
            continue;
        }
        if !seen_ids.insert(card.id()) {
            continue;
        }
        pools.entry(card.region()).or_default().push(card);
    }

    let mut buckets = BTreeMap::new();
    for region in Region::ALL {
        let capacity = capacities.get(&region).copied().unwrap_or(0);
        let mut bucket = RegionBucket::empty(region, capacity);
        if let Some(pool) = pools.get(&region) {
            bucket.cards = pool.iter().take(capacity).map(|c| (*c).clone()).collect();
        }
        buckets.insert(region, bucket);
    }

    let sentiment_summary =
        compute_market_mood(buckets.values().flat_map(|b| b.cards.iter().map(|c| &c.sentiment)));

    RunResult {
        buckets,
        sentiment_summary,
    }
}
