// tests/logging.rs
//! The binary's default filter must let the run summary through.

use chrono::{TimeZone, Utc};
use markets_brief::config::{RankingConfig, RegionQuotas};
use markets_brief::pipeline::run_once;
use markets_brief::store::MemoryStore;
use markets_brief::types::{Region, StoryFragment};
use markets_brief::DEFAULT_LOG_FILTER;
use std::io;
use std::sync::{Arc, Mutex};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn default_filter_keeps_the_run_summary() {
    let captured = Captured::default();
    let sink = captured.clone();
    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::new(DEFAULT_LOG_FILTER))
        .with(fmt::layer().with_ansi(false).with_writer(move || sink.clone()));
    let _guard = tracing::subscriber::set_default(subscriber);

    let q = RegionQuotas::new([(Region::Us, 1.0)]).unwrap();
    let cfg = RankingConfig::new(q, 3, ["AAPL"]).unwrap();
    let frags = vec![StoryFragment::new("a", "Apple rallies on services growth")
        .with_source("Wire", "https://wire.com/apple")
        .with_region(Region::Us)];
    let now = Utc.with_ymd_and_hms(2024, 6, 10, 9, 0, 0).unwrap();
    let out = run_once(&MemoryStore::new(), &cfg, &frags, now).await;
    assert_eq!(out.result.total_cards(), 1);

    let text = captured.text();
    assert!(text.contains("pipeline run complete"), "summary filtered out:\n{text}");
    assert!(text.contains("bucketed=1"), "{text}");
}
