// src/pipeline.rs
//! One daily run around the pure engine:
//! lookup known fingerprints → engine → write-back.
//!
//! Gateway failures never fail the run. A failed lookup ranks the batch as
//! if nothing had been seen; a failed write keeps the computed result.
//! Both surface as `RunWarning`s.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::RankingConfig;
use crate::dedup::{candidate_fingerprints, Fingerprint};
use crate::engine::{process_batch, RunDiagnostics};
use crate::metrics::{record_gateway_error, record_run, GatewayOp};
use crate::store::{JsonFileStore, PersistenceGateway};
use crate::types::{RunResult, ScoredCard, StoryFragment};

/// Non-fatal problems met during a run.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RunWarning {
    #[error("fingerprint lookup failed, all fragments treated as unseen: {0}")]
    LookupFailed(String),
    #[error("write-back failed, result kept: {0}")]
    RecordFailed(String),
    #[error("pruning seen cards failed, history left as is: {0}")]
    PruneFailed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub result: RunResult,
    pub cards: Vec<ScoredCard>,
    pub merged: BTreeMap<String, Vec<String>>,
    pub diagnostics: RunDiagnostics,
    pub warnings: Vec<RunWarning>,
}

impl PipelineOutput {
    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Run the pipeline once against `gateway` at `reference` time.
pub async fn run_once<G>(
    gateway: &G,
    config: &RankingConfig,
    fragments: &[StoryFragment],
    reference: DateTime<Utc>,
) -> PipelineOutput
where
    G: PersistenceGateway + ?Sized,
{
    let mut warnings = Vec::new();

    // 1) Known fingerprints
    let candidates = candidate_fingerprints(fragments);
    let known: BTreeSet<Fingerprint> = if candidates.is_empty() {
        BTreeSet::new()
    } else {
        match gateway.lookup_fingerprints(&candidates).await {
            Ok(found) => found,
            Err(e) => {
                warn!(target: "brief", error = ?e, candidates = candidates.len(), "fingerprint lookup failed; treating all as unseen");
                record_gateway_error(GatewayOp::Lookup);
                warnings.push(RunWarning::LookupFailed(format!("{e:#}")));
                BTreeSet::new()
            }
        }
    };

    // 2) Pure ranking
    let out = process_batch(fragments, &known, reference, config);

    // 3) Write-back
    if !out.cards.is_empty() {
        if let Err(e) = gateway.record(out.accepted_cards()).await {
            warn!(target: "brief", error = ?e, cards = out.cards.len(), "write-back failed; result kept");
            record_gateway_error(GatewayOp::Record);
            warnings.push(RunWarning::RecordFailed(format!("{e:#}")));
        }
    }

    let d = &out.diagnostics;
    info!(
        target: "brief",
        fragments = d.dedup.input,
        dropped_unidentifiable = d.dedup.dropped_unidentifiable,
        dropped_known = d.dedup.dropped_known,
        clusters = d.dedup.clusters,
        absorbed = d.dedup.absorbed,
        bucketed = d.bucketed,
        mood = %out.result.sentiment_summary.label,
        warnings = warnings.len(),
        "pipeline run complete"
    );
    record_run(d, Utc::now().timestamp());

    PipelineOutput {
        result: out.result,
        cards: out.cards,
        merged: out.merged,
        diagnostics: out.diagnostics,
        warnings,
    }
}

/// Drop seen-card records older than `cutoff`. A failure is returned as a
/// warning so the run can still rank the batch.
pub async fn prune_history(store: &JsonFileStore, cutoff: DateTime<Utc>) -> Option<RunWarning> {
    match store.prune_before(cutoff).await {
        Ok(removed) => {
            info!(target: "brief", removed, %cutoff, "pruned seen cards");
            None
        }
        Err(e) => {
            warn!(target: "brief", error = ?e, %cutoff, "pruning seen cards failed; continuing");
            record_gateway_error(GatewayOp::Prune);
            Some(RunWarning::PruneFailed(format!("{e:#}")))
        }
    }
}
