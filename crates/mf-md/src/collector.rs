//! Single consumer of the shared quote queue.
//!
//! For each quote: append it to its window, register the key, prune the
//! window at `now - retention`, then hand it to the optional publisher.
//! Store and publisher failures are logged and the quote is skipped; the
//! collector itself only stops on cancellation or when every producer is
//! gone.

use std::sync::Arc;
use std::time::Duration;

use mf_core::ports::{PricePublisher, WindowStore};
use mf_core::{Quote, time_util};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::keys::KeyRegistry;

/// Upper bound on draining already-queued quotes after cancellation.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

pub struct Collector {
    store: Arc<dyn WindowStore>,
    registry: Arc<KeyRegistry>,
    publisher: Option<Arc<dyn PricePublisher>>,
    retention_secs: i64,
}

impl Collector {
    pub fn new(
        store: Arc<dyn WindowStore>,
        registry: Arc<KeyRegistry>,
        publisher: Option<Arc<dyn PricePublisher>>,
        retention_secs: i64,
    ) -> Self {
        Self { store, registry, publisher, retention_secs }
    }

    /// Store one quote at the current time.
    pub async fn ingest(&self, quote: &Quote) {
        self.ingest_at(quote, time_util::now_secs()).await
    }

    /// Store one quote with an explicit score.
    pub async fn ingest_at(&self, quote: &Quote, score: i64) {
        let key = quote.key();
        let value = quote.price.to_string();

        if let Err(e) = self.store.add(&key, score, &value).await {
            error!("[collector] store add failed for {key}: {e}");
        }
        if self.registry.register(&key, score) {
            info!("[collector] tracking new key {key}");
        }
        if let Err(e) = self.store.remove_below(&key, score - self.retention_secs).await {
            warn!("[collector] prune failed for {key}: {e}");
        }
        if let Some(publisher) = &self.publisher {
            if let Err(e) = publisher.publish(quote) {
                warn!("[collector] publish failed for {key}: {e:#}");
            }
        }
    }

    /// Consume the queue until cancelled or closed. On cancellation the
    /// queue is closed and quotes already in it are still stored.
    pub async fn run(self, mut rx: mpsc::Receiver<Quote>, cancel: CancellationToken) {
        info!("[collector] started");
        let mut stored: u64 = 0;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                quote = rx.recv() => match quote {
                    Some(q) => {
                        self.ingest(&q).await;
                        stored += 1;
                    }
                    None => {
                        debug!("[collector] all producers gone");
                        break;
                    }
                },
            }
        }

        rx.close();
        let drain = async {
            let mut drained: u64 = 0;
            while let Some(q) = rx.recv().await {
                self.ingest(&q).await;
                drained += 1;
            }
            drained
        };
        match tokio::time::timeout(DRAIN_TIMEOUT, drain).await {
            Ok(n) => stored += n,
            Err(_) => warn!("[collector] drain timed out, remaining quotes discarded"),
        }
        info!("[collector] stopped after {stored} quotes");
    }
}
