//! Periodic window reduction.
//!
//! Every tick the aggregator walks a snapshot of the key registry, reads
//! each window over `[now - retention, now]`, reduces it to average, min and
//! max, and hands the result to the stat sink. Failures are per key: one bad
//! window or sink write never stops the others.

use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use mf_core::ports::{StatSink, WindowStore};
use mf_core::{AggregatedStat, WindowKey, WindowStats, is_valid_price, time_util};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::keys::KeyRegistry;

/// Outcome counts for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub keys: usize,
    pub emitted: usize,
    pub empty: usize,
    pub failed: usize,
    pub evicted: usize,
}

pub struct Aggregator {
    store: Arc<dyn WindowStore>,
    sink: Arc<dyn StatSink>,
    registry: Arc<KeyRegistry>,
    retention_secs: i64,
    tick_interval: Duration,
    /// Consecutive empty ticks before eviction; 0 disables.
    idle_eviction_ticks: u32,
    empty_ticks: AHashMap<WindowKey, u32>,
}

impl Aggregator {
    pub fn new(
        store: Arc<dyn WindowStore>,
        sink: Arc<dyn StatSink>,
        registry: Arc<KeyRegistry>,
        retention_secs: i64,
        tick_interval: Duration,
        idle_eviction_ticks: u32,
    ) -> Self {
        Self {
            store,
            sink,
            registry,
            retention_secs,
            tick_interval,
            idle_eviction_ticks,
            empty_ticks: AHashMap::new(),
        }
    }

    /// Tick until cancelled. The first tick fires one interval after start.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("[aggregator] started, tick every {:?}", self.tick_interval);
        let mut ticker = tokio::time::interval_at(Instant::now() + self.tick_interval, self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.run_tick(time_util::now_utc()).await;
                    debug!("[aggregator] tick: {report:?}");
                }
            }
        }
        info!("[aggregator] stopped");
    }

    /// Reduce every registered window as of `now`.
    pub async fn run_tick(&mut self, now: DateTime<Utc>) -> TickReport {
        let max = now.timestamp();
        let min = max - self.retention_secs;
        let keys = self.registry.snapshot();
        let mut report = TickReport { keys: keys.len(), ..TickReport::default() };

        for key in keys {
            let raw = match self.store.range_by_score(&key, min, max).await {
                Ok(raw) => raw,
                Err(e) => {
                    error!("[aggregator] range read failed for {key}: {e}");
                    report.failed += 1;
                    continue;
                }
            };

            match WindowStats::from_samples(&parse_samples(&key, &raw)) {
                Some(stats) => {
                    self.empty_ticks.remove(&key);
                    let stat = AggregatedStat::new(&key, stats, now);
                    match self.sink.record(&stat).await {
                        Ok(()) => {
                            report.emitted += 1;
                            info!("[aggregator] {key} {stats}");
                        }
                        Err(e) => {
                            report.failed += 1;
                            error!("[aggregator] sink write failed for {key}: {e}");
                        }
                    }
                }
                None => {
                    report.empty += 1;
                    debug!("[aggregator] no prices for {key} in window");
                    if self.note_empty(&key, min) {
                        report.evicted += 1;
                        continue;
                    }
                }
            }

            if let Err(e) = self.store.remove_below(&key, min).await {
                warn!("[aggregator] prune failed for {key}: {e}");
            }
        }

        report
    }

    /// Count an empty tick for `key`; evict it once the threshold is hit and
    /// the registry confirms nothing was written inside the window.
    fn note_empty(&mut self, key: &WindowKey, window_start: i64) -> bool {
        if self.idle_eviction_ticks == 0 {
            return false;
        }
        let count = self.empty_ticks.entry(key.clone()).or_insert(0);
        *count += 1;
        if *count < self.idle_eviction_ticks {
            return false;
        }
        self.empty_ticks.remove(key);
        let evicted = self.registry.evict_if_idle(key, window_start);
        if evicted {
            info!("[aggregator] evicted idle key {key}");
        }
        evicted
    }
}

/// Parse stored samples, skipping (and logging) anything unusable.
fn parse_samples(key: &WindowKey, raw: &[String]) -> Vec<f64> {
    raw.iter()
        .filter_map(|s| match s.parse::<f64>() {
            Ok(p) if is_valid_price(p) => Some(p),
            _ => {
                warn!("[aggregator] skipping malformed sample {s:?} for {key}");
                None
            }
        })
        .collect()
}
