//! Daily brief ranking: batch entrypoint.
//! Reads a JSON array of story fragments, ranks them against the seen-card
//! store and prints the run result as JSON on stdout.
//!
//! Usage: `markets-brief <fragments.json> [--dry-run] [--at <timestamp>] [--prune-days <n>]`

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::Parser;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use markets_brief::config::RankingConfig;
use markets_brief::engine::RunDiagnostics;
use markets_brief::metrics::install_prometheus;
use markets_brief::pipeline::{prune_history, run_once, RunWarning};
use markets_brief::store::{JsonFileStore, ReadOnly};
use markets_brief::types::{parse_timestamp, RunResult, StoryFragment};
use markets_brief::DEFAULT_LOG_FILTER;

const ENV_STORE_PATH: &str = "BRIEF_STORE_PATH";
const DEFAULT_STORE_PATH: &str = "data/seen_cards.json";
const ENV_METRICS_PATH: &str = "BRIEF_METRICS_PATH";
const ENV_LOG_JSON: &str = "BRIEF_LOG_JSON";

/// Logs go to stderr so stdout stays pure JSON.
/// `BRIEF_LOG_JSON=1` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var(ENV_LOG_JSON).ok().is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    }
}

/// Rank one batch of story fragments into the daily brief.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON array of story fragments
    input: PathBuf,

    /// Look up seen cards but never write them back
    #[arg(long)]
    dry_run: bool,

    /// Reference time for recency (RFC 3339 or date); defaults to now
    #[arg(long, value_parser = parse_at)]
    at: Option<DateTime<Utc>>,

    /// Drop seen-card records older than this many days before ranking
    #[arg(long, value_parser = parse_prune_days)]
    prune_days: Option<i64>,
}

fn parse_at(raw: &str) -> Result<DateTime<Utc>, String> {
    parse_timestamp(raw).ok_or_else(|| format!("invalid timestamp {raw:?}"))
}

fn parse_prune_days(raw: &str) -> Result<i64, String> {
    let days: i64 = raw.parse().map_err(|e| format!("{e}"))?;
    if days < 0 {
        return Err("must not be negative".into());
    }
    Ok(days)
}

#[derive(Serialize)]
struct Report<'a> {
    reference_time: DateTime<Utc>,
    dry_run: bool,
    result: &'a RunResult,
    merged: &'a BTreeMap<String, Vec<String>>,
    diagnostics: &'a RunDiagnostics,
    warnings: &'a [RunWarning],
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let args = Args::parse();
    let config = RankingConfig::load_default()?;

    let raw = tokio::fs::read_to_string(&args.input)
        .await
        .with_context(|| format!("reading fragments from {}", args.input.display()))?;
    let fragments: Vec<StoryFragment> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing fragments in {}", args.input.display()))?;

    let metrics_path = std::env::var(ENV_METRICS_PATH).ok().map(PathBuf::from);
    let prometheus = if metrics_path.is_some() {
        Some(install_prometheus()?)
    } else {
        None
    };

    let store_path = std::env::var(ENV_STORE_PATH)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_STORE_PATH));
    let store = JsonFileStore::new(store_path);
    let reference = args.at.unwrap_or_else(Utc::now);

    let mut warnings = Vec::new();
    if let (Some(days), false) = (args.prune_days, args.dry_run) {
        warnings.extend(prune_history(&store, reference - Duration::days(days)).await);
    }

    let out = if args.dry_run {
        let ro = ReadOnly::new(store);
        run_once(&ro, &config, &fragments, reference).await
    } else {
        run_once(&store, &config, &fragments, reference).await
    };

    warnings.extend(out.warnings.iter().cloned());

    let report = Report {
        reference_time: reference,
        dry_run: args.dry_run,
        result: &out.result,
        merged: &out.merged,
        diagnostics: &out.diagnostics,
        warnings: &warnings,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    if let (Some(path), Some(handle)) = (metrics_path, prometheus) {
        tokio::fs::write(&path, handle.render())
            .await
            .with_context(|| format!("writing metrics to {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("markets-brief").chain(v.iter().copied()))
    }

    #[test]
    fn parses_flags_in_any_order() {
        let a = args(&["--dry-run", "in.json", "--at", "2024-06-10T09:00:00Z", "--prune-days", "30"]).unwrap();
        assert_eq!(a.input, PathBuf::from("in.json"));
        assert!(a.dry_run);
        assert_eq!(a.at, parse_timestamp("2024-06-10T09:00:00Z"));
        assert_eq!(a.prune_days, Some(30));

        let b = args(&["in.json"]).unwrap();
        assert!(!b.dry_run);
        assert!(b.at.is_none() && b.prune_days.is_none());
    }

    #[test]
    fn rejects_bad_invocations() {
        assert!(args(&[]).is_err());
        assert!(args(&["a.json", "b.json"]).is_err());
        assert!(args(&["a.json", "--verbose"]).is_err());
        assert!(args(&["a.json", "--at", "yesterday"]).is_err());
        assert!(args(&["a.json", "--prune-days", "-1"]).is_err());
        assert!(args(&["a.json", "--prune-days", "week"]).is_err());
    }
}
