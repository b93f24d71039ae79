//! Per-source worker loop: connect, listen, report, back off, repeat.

use std::sync::Arc;

use mf_core::Quote;
use mf_core::config::{PipelineSettings, SourceConfig};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::connection::{ListenEnd, SourceConnection};
use crate::reconnect::{FailureNotice, FailurePhase, ReconnectStats};

/// Everything a worker needs besides its own source.
#[derive(Clone)]
pub struct WorkerContext {
    pub quotes: mpsc::Sender<Quote>,
    pub failures: mpsc::Sender<FailureNotice>,
    pub stats: Arc<ReconnectStats>,
    pub settings: PipelineSettings,
    pub cancel: CancellationToken,
}

/// Keep one source connected until cancelled.
///
/// Every connect or listen failure is reported to the coordinator, then the
/// worker waits the fixed reconnect delay. Both the dial and the delay are
/// abandoned as soon as `cancel` fires.
pub async fn run_source_worker(config: SourceConfig, ctx: WorkerContext) {
    let label = config.name.clone();
    let addr = config.addr();
    let delay = ctx.settings.reconnect_delay;
    let mut conn = SourceConnection::new(config, ctx.settings.dial_timeout, ctx.settings.read_timeout);

    loop {
        if ctx.cancel.is_cancelled() {
            break;
        }

        info!("[{label}] connecting to {addr}");
        let connected = tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            r = conn.connect() => r,
        };

        let failure = match connected {
            Ok(()) => {
                info!("[{label}] connected");
                ctx.stats.mark_connected(&label);
                match conn.listen(&ctx.quotes, &ctx.cancel).await {
                    Ok(ListenEnd::Cancelled) => break,
                    Ok(ListenEnd::QueueClosed) => {
                        if ctx.cancel.is_cancelled() {
                            break;
                        }
                        warn!("[{label}] quote queue closed while running");
                        None
                    }
                    Err(e) => {
                        warn!("[{label}] connection lost: {e}");
                        Some((FailurePhase::Listen, e.to_string()))
                    }
                }
            }
            Err(e) => {
                error!("[{label}] connection failed: {e}, retrying in {delay:?}");
                Some((FailurePhase::Connect, e.to_string()))
            }
        };

        if let Some((phase, error)) = failure {
            let notice = FailureNotice {
                source: label.clone(),
                addr: addr.clone(),
                phase,
                error,
            };
            tokio::select! {
                _ = ctx.cancel.cancelled() => break,
                sent = ctx.failures.send(notice) => {
                    if sent.is_err() {
                        debug!("[{label}] reconnect coordinator gone");
                    }
                }
            }
        }

        tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    conn.close();
    info!("[{label}] worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    fn settings(delay: Duration) -> PipelineSettings {
        PipelineSettings {
            reconnect_delay: delay,
            dial_timeout: Duration::from_secs(1),
            read_timeout: Duration::from_secs(2),
            ..PipelineSettings::default()
        }
    }

    fn context(
        delay: Duration,
    ) -> (WorkerContext, mpsc::Receiver<Quote>, mpsc::Receiver<FailureNotice>) {
        let (qtx, qrx) = mpsc::channel(16);
        let (ftx, frx) = mpsc::channel(10);
        let ctx = WorkerContext {
            quotes: qtx,
            failures: ftx,
            stats: Arc::new(ReconnectStats::new()),
            settings: settings(delay),
            cancel: CancellationToken::new(),
        };
        (ctx, qrx, frx)
    }

    #[tokio::test]
    async fn reconnects_after_peer_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut a, _) = listener.accept().await.unwrap();
            a.write_all(b"BTCUSD:1\n").await.unwrap();
            drop(a);
            let (mut b, _) = listener.accept().await.unwrap();
            b.write_all(b"BTCUSD:2\n").await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let (ctx, mut quotes, mut failures) = context(Duration::from_millis(50));
        let stats = ctx.stats.clone();
        let cancel = ctx.cancel.clone();
        let worker = tokio::spawn(run_source_worker(SourceConfig::new("ex1", "127.0.0.1", port), ctx));

        let wait = Duration::from_secs(2);
        let first = tokio::time::timeout(wait, quotes.recv()).await.unwrap().unwrap();
        let notice = tokio::time::timeout(wait, failures.recv()).await.unwrap().unwrap();
        let second = tokio::time::timeout(wait, quotes.recv()).await.unwrap().unwrap();

        assert_eq!((first.price, second.price), (1.0, 2.0));
        assert_eq!(notice.phase, FailurePhase::Listen);
        assert_eq!(notice.source, "ex1");
        assert_eq!(stats.get("ex1").unwrap().connects, 2);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), worker).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn cancel_interrupts_backoff() {
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().port()
        };
        let (ctx, _quotes, mut failures) = context(Duration::from_secs(30));
        let cancel = ctx.cancel.clone();
        let worker = tokio::spawn(run_source_worker(SourceConfig::new("ex9", "127.0.0.1", port), ctx));

        let notice = tokio::time::timeout(Duration::from_secs(2), failures.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(notice.phase, FailurePhase::Connect);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), worker).await.unwrap().unwrap();
    }
}
