// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod dedup;
pub mod engine;
pub mod metrics;
pub mod pipeline;
pub mod rank;
pub mod scoring;
pub mod sentiment;
pub mod store;
pub mod types;

/// Default `EnvFilter` directive; every event in this crate logs under the `brief` target.
pub const DEFAULT_LOG_FILTER: &str = "brief=info,warn";

// ---- Re-exports for stable public API ----
pub use crate::config::{ConfigError, RankingConfig, RegionQuotas, SentimentBoost};
pub use crate::dedup::{deduplicate, Fingerprint, SimilarityThresholds};
pub use crate::engine::{process_batch, EngineOutput, RankingEngine, RunDiagnostics};
pub use crate::pipeline::{prune_history, run_once, PipelineOutput, RunWarning};
pub use crate::rank::{apportion, rank};
pub use crate::sentiment::{compute_market_mood, MarketMood, SentimentLabel, SentimentScore};
pub use crate::store::{JsonFileStore, MemoryStore, PersistenceGateway, ReadOnly};
pub use crate::types::{Region, RegionBucket, RunResult, ScoredCard, StoryFragment};
