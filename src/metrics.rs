// src/metrics.rs
//! Metric names and per-run emission through the `metrics` facade.
//! A recorder is optional; without one every call here is a no-op.

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

use crate::engine::RunDiagnostics;
use crate::types::Region;

pub const FRAGMENTS_TOTAL: &str = "brief_fragments_total";
pub const DROPPED_UNIDENTIFIABLE_TOTAL: &str = "brief_dropped_unidentifiable_total";
pub const DROPPED_KNOWN_TOTAL: &str = "brief_dropped_known_total";
pub const DEDUP_ABSORBED_TOTAL: &str = "brief_dedup_absorbed_total";
pub const BUCKETED_TOTAL: &str = "brief_bucketed_total";
pub const GATEWAY_ERRORS_TOTAL: &str = "brief_gateway_errors_total";
pub const LAST_RUN_TS: &str = "brief_pipeline_last_run_ts";

/// Gateway operation label values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayOp {
    Lookup,
    Record,
    Prune,
}

impl GatewayOp {
    pub fn as_str(self) -> &'static str {
        match self {
            GatewayOp::Lookup => "lookup",
            GatewayOp::Record => "record",
            GatewayOp::Prune => "prune",
        }
    }
}

/// One-time metrics registration (so series carry help text).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(FRAGMENTS_TOTAL, "Story fragments received by the pipeline.");
        describe_counter!(
            DROPPED_UNIDENTIFIABLE_TOTAL,
            "Fragments without a usable URL or headline."
        );
        describe_counter!(
            DROPPED_KNOWN_TOTAL,
            "Fragments whose fingerprint was already recorded."
        );
        describe_counter!(
            DEDUP_ABSORBED_TOTAL,
            "Fragments folded into another cluster member."
        );
        describe_counter!(BUCKETED_TOTAL, "Cards placed in a region bucket.");
        describe_counter!(
            GATEWAY_ERRORS_TOTAL,
            "Persistence gateway failures by operation."
        );
        describe_gauge!(LAST_RUN_TS, "Unix ts when the pipeline last ran.");
    });
}

pub fn record_run(diag: &RunDiagnostics, now_ts: i64) {
    ensure_metrics_described();
    counter!(FRAGMENTS_TOTAL).increment(diag.dedup.input as u64);
    counter!(DROPPED_UNIDENTIFIABLE_TOTAL).increment(diag.dedup.dropped_unidentifiable as u64);
    counter!(DROPPED_KNOWN_TOTAL).increment(diag.dedup.dropped_known as u64);
    counter!(DEDUP_ABSORBED_TOTAL).increment(diag.dedup.absorbed as u64);
    for region in Region::BUCKETED {
        let filled = diag.fill.get(&region).map(|f| f.filled).unwrap_or(0);
        counter!(BUCKETED_TOTAL, "region" => region.as_str()).increment(filled as u64);
    }
    gauge!(LAST_RUN_TS).set(now_ts.max(0) as f64);
}

pub fn record_gateway_error(op: GatewayOp) {
    ensure_metrics_described();
    counter!(GATEWAY_ERRORS_TOTAL, "op" => op.as_str()).increment(1);
}

/// Install the global Prometheus recorder; render its text with `handle.render()`.
pub fn install_prometheus() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("prometheus: install recorder: {e}"))?;
    ensure_metrics_described();
    Ok(handle)
}
