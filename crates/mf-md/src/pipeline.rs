//! Pipeline lifecycle controller.
//!
//! Wires the stages together and owns their shutdown:
//!
//! ```text
//! source workers ──try_send──► quote queue ──► collector ──► window store
//!       │                                          │              ▲
//!       └──► failure queue ──► coordinator         └─► publisher  │
//!                                                                 │
//!                         aggregator (every tick) ────────────────┘──► stat sink
//! ```
//!
//! [`Pipeline::start`] runs until [`Pipeline::stop`] is called from another
//! task. Stop cancels every stage at once; `start` then waits for the source
//! workers and afterwards for the collector, aggregator and coordinator.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use mf_core::config::{PipelineSettings, SourceConfig};
use mf_core::error::MfError;
use mf_core::Quote;
use mf_core::ports::{PricePublisher, StatSink, WindowStore};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

use crate::aggregator::Aggregator;
use crate::collector::Collector;
use crate::keys::KeyRegistry;
use crate::reconnect::{self, FailureNotice, ReconnectStats};
use crate::source::{WorkerContext, run_source_worker};

/// Sender halves held by the controller so `stop` can release them.
struct QueueHandles {
    _quotes: mpsc::Sender<Quote>,
    _failures: mpsc::Sender<FailureNotice>,
}

pub struct Pipeline {
    sources: Vec<SourceConfig>,
    settings: PipelineSettings,
    store: Arc<dyn WindowStore>,
    sink: Arc<dyn StatSink>,
    publisher: Option<Arc<dyn PricePublisher>>,
    registry: Arc<KeyRegistry>,
    reconnect_stats: Arc<ReconnectStats>,
    cancel: CancellationToken,
    queues: Mutex<Option<QueueHandles>>,
    started: AtomicBool,
}

impl Pipeline {
    pub fn new(
        sources: Vec<SourceConfig>,
        settings: PipelineSettings,
        store: Arc<dyn WindowStore>,
        sink: Arc<dyn StatSink>,
    ) -> Self {
        Self {
            sources,
            settings,
            store,
            sink,
            publisher: None,
            registry: Arc::new(KeyRegistry::new()),
            reconnect_stats: Arc::new(ReconnectStats::new()),
            cancel: CancellationToken::new(),
            queues: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn PricePublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn registry(&self) -> &Arc<KeyRegistry> {
        &self.registry
    }

    pub fn reconnect_stats(&self) -> &Arc<ReconnectStats> {
        &self.reconnect_stats
    }

    pub fn is_stopping(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Launch every stage and block until all of them have exited.
    ///
    /// Workers are launched in configuration order with the configured
    /// stagger between them. A pipeline can be started once.
    pub async fn start(&self) -> Result<(), MfError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(MfError::AlreadyStarted);
        }

        let s = &self.settings;
        let (quote_tx, quote_rx) = mpsc::channel::<Quote>(s.quote_queue_capacity);
        let (failure_tx, failure_rx) = mpsc::channel::<FailureNotice>(s.reconnect_queue_capacity);

        let auxiliary = TaskTracker::new();
        let workers = TaskTracker::new();

        let collector = Collector::new(
            self.store.clone(),
            self.registry.clone(),
            self.publisher.clone(),
            s.retention_secs(),
        );
        auxiliary.spawn(collector.run(quote_rx, self.cancel.clone()));

        let aggregator = Aggregator::new(
            self.store.clone(),
            self.sink.clone(),
            self.registry.clone(),
            s.retention_secs(),
            s.tick_interval,
            s.idle_eviction_ticks,
        );
        auxiliary.spawn(aggregator.run(self.cancel.clone()));

        auxiliary.spawn(reconnect::run_coordinator(
            failure_rx,
            self.reconnect_stats.clone(),
            s.reconnect_delay,
            self.cancel.clone(),
        ));

        let ctx = WorkerContext {
            quotes: quote_tx.clone(),
            failures: failure_tx.clone(),
            stats: self.reconnect_stats.clone(),
            settings: s.clone(),
            cancel: self.cancel.clone(),
        };
        if !self.cancel.is_cancelled() {
            *self.queues.lock() = Some(QueueHandles { _quotes: quote_tx, _failures: failure_tx });
        }

        info!("[pipeline] starting {} source workers", self.sources.len());
        for (i, source) in self.sources.iter().enumerate() {
            if i > 0 {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep(s.connect_stagger) => {}
                }
            }
            workers.spawn(run_source_worker(source.clone(), ctx.clone()));
        }
        drop(ctx);

        workers.close();
        workers.wait().await;
        info!("[pipeline] all source workers exited");

        auxiliary.close();
        auxiliary.wait().await;
        info!("[pipeline] stopped");
        Ok(())
    }

    /// Signal every stage to stop. Idempotent; returns immediately.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            info!("[pipeline] stop requested");
        }
        self.cancel.cancel();
        self.queues.lock().take();
    }
}
