//! Stat sink that only logs. Used when no database is configured.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use mf_core::AggregatedStat;
use mf_core::error::SinkError;
use mf_core::ports::StatSink;
use tracing::info;

#[derive(Debug, Default)]
pub struct LogStatSink {
    recorded: AtomicU64,
}

impl LogStatSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> u64 {
        self.recorded.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl StatSink for LogStatSink {
    async fn record(&self, stat: &AggregatedStat) -> Result<(), SinkError> {
        self.recorded.fetch_add(1, Ordering::Relaxed);
        info!(
            source = %stat.source,
            symbol = %stat.symbol,
            average = stat.average,
            minimum = stat.minimum,
            maximum = stat.maximum,
            samples = stat.sample_count,
            at = %stat.computed_at.to_rfc3339(),
            "[stats] window aggregated"
        );
        Ok(())
    }
}
