//! Boundaries between the pipeline and its external collaborators.
//!
//! The pipeline only ever talks to storage through these traits, so any
//! single call may fail without corrupting pipeline state. Implementations
//! must be safe to call from several tasks at once.

use async_trait::async_trait;

use crate::error::{SinkError, StoreError};
use crate::types::{AggregatedStat, Quote, WindowKey};

/// Scored sample storage addressed by window key.
///
/// Scores are Unix seconds. The store is the sole source of truth for which
/// samples are still inside a window.
#[async_trait]
pub trait WindowStore: Send + Sync {
    /// Add one sample under `key` with the given score.
    async fn add(&self, key: &WindowKey, score: i64, value: &str) -> Result<(), StoreError>;

    /// All samples with `min <= score <= max`, in score order.
    async fn range_by_score(&self, key: &WindowKey, min: i64, max: i64) -> Result<Vec<String>, StoreError>;

    /// Remove samples with `score < bound`. Returns how many were removed.
    async fn remove_below(&self, key: &WindowKey, bound: i64) -> Result<u64, StoreError>;
}

/// Durable destination for aggregated statistics.
#[async_trait]
pub trait StatSink: Send + Sync {
    async fn record(&self, stat: &AggregatedStat) -> Result<(), SinkError>;
}

/// Optional human-facing consumer of stored quotes.
pub trait PricePublisher: Send + Sync {
    fn publish(&self, quote: &Quote) -> anyhow::Result<()>;
}
