//! Reconnection coordinator.
//!
//! Source workers report every connect or listen failure here. The worker
//! keeps ownership of its own retry loop; the coordinator observes the
//! reports, keeps per-source health counters and logs the retry schedule.

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where in the worker cycle a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePhase {
    Connect,
    Listen,
}

impl std::fmt::Display for FailurePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            FailurePhase::Connect => "connect",
            FailurePhase::Listen => "listen",
        })
    }
}

/// One failure report from a source worker.
#[derive(Debug, Clone)]
pub struct FailureNotice {
    pub source: String,
    pub addr: String,
    pub phase: FailurePhase,
    pub error: String,
}

/// Health counters for one source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceHealth {
    pub connects: u64,
    pub total_failures: u64,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

/// Shared per-source health table.
///
/// Written by the coordinator (failures) and by workers (successful
/// connects), read by anyone holding the pipeline.
#[derive(Debug, Default)]
pub struct ReconnectStats {
    sources: RwLock<AHashMap<String, SourceHealth>>,
}

impl ReconnectStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_connected(&self, source: &str) {
        let mut sources = self.sources.write();
        let health = sources.entry(source.to_string()).or_default();
        health.connects += 1;
        health.consecutive_failures = 0;
    }

    pub fn record_failure(&self, notice: &FailureNotice) -> SourceHealth {
        let mut sources = self.sources.write();
        let health = sources.entry(notice.source.clone()).or_default();
        health.total_failures += 1;
        health.consecutive_failures = health.consecutive_failures.saturating_add(1);
        health.last_error = Some(format!("{}: {}", notice.phase, notice.error));
        health.clone()
    }

    pub fn get(&self, source: &str) -> Option<SourceHealth> {
        self.sources.read().get(source).cloned()
    }

    /// All sources seen so far, sorted by name.
    pub fn snapshot(&self) -> Vec<(String, SourceHealth)> {
        let mut all: Vec<_> = self
            .sources
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}

/// Consume failure reports until cancelled or until every sender is gone.
pub async fn run_coordinator(
    mut rx: mpsc::Receiver<FailureNotice>,
    stats: Arc<ReconnectStats>,
    retry_delay: std::time::Duration,
    cancel: CancellationToken,
) {
    info!("[reconnect] coordinator started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            notice = rx.recv() => {
                let Some(notice) = notice else {
                    debug!("[reconnect] all workers gone");
                    break;
                };
                let health = stats.record_failure(&notice);
                warn!(
                    "[reconnect] {} ({}) {} failure #{} ({} in a row): {}; retry in {:?}",
                    notice.source,
                    notice.addr,
                    notice.phase,
                    health.total_failures,
                    health.consecutive_failures,
                    notice.error,
                    retry_delay,
                );
            }
        }
    }
    info!("[reconnect] coordinator stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn notice(source: &str, phase: FailurePhase) -> FailureNotice {
        FailureNotice {
            source: source.into(),
            addr: "127.0.0.1:1".into(),
            phase,
            error: "refused".into(),
        }
    }

    #[test]
    fn counters_reset_on_connect() {
        let stats = ReconnectStats::new();
        stats.record_failure(&notice("ex1", FailurePhase::Connect));
        stats.record_failure(&notice("ex1", FailurePhase::Connect));
        let h = stats.get("ex1").unwrap();
        assert_eq!((h.total_failures, h.consecutive_failures), (2, 2));
        assert_eq!(h.last_error.as_deref(), Some("connect: refused"));

        stats.mark_connected("ex1");
        let h = stats.get("ex1").unwrap();
        assert_eq!((h.total_failures, h.consecutive_failures, h.connects), (2, 0, 1));
    }

    #[test]
    fn snapshot_is_sorted() {
        let stats = ReconnectStats::new();
        stats.mark_connected("zeta");
        stats.mark_connected("alpha");
        let names: Vec<_> = stats.snapshot().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[tokio::test]
    async fn coordinator_records_and_exits_when_senders_drop() {
        let (tx, rx) = mpsc::channel(10);
        let stats = Arc::new(ReconnectStats::new());
        let handle = tokio::spawn(run_coordinator(
            rx,
            stats.clone(),
            Duration::from_secs(5),
            CancellationToken::new(),
        ));

        tx.send(notice("ex2", FailurePhase::Listen)).await.unwrap();
        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();

        let h = stats.get("ex2").unwrap();
        assert_eq!(h.total_failures, 1);
        assert_eq!(h.last_error.as_deref(), Some("listen: refused"));
    }

    #[tokio::test]
    async fn coordinator_stops_on_cancel() {
        let (_tx, rx) = mpsc::channel::<FailureNotice>(10);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_coordinator(
            rx,
            Arc::new(ReconnectStats::new()),
            Duration::from_secs(5),
            cancel.clone(),
        ));
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }
}
