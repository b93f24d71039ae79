//! One TCP connection to a line-oriented price source.
//!
//! Lifecycle: `Disconnected -> Connecting -> Listening -> Disconnected`.
//! [`SourceConnection::listen`] owns the socket for the duration of one
//! session and always leaves the connection `Disconnected` when it returns.

use std::time::Duration;

use mf_core::Quote;
use mf_core::config::SourceConfig;
use mf_core::error::SourceError;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::decoder;

/// Longest accepted line, newline excluded. Longer lines are discarded.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

const READ_CHUNK_BYTES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Disconnected,
    Connecting,
    Listening,
}

/// Result of offering a quote to the shared queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Enqueued,
    /// Queue full; the quote was discarded.
    Dropped,
    /// Consumer gone; nothing will be accepted again.
    Closed,
}

/// Non-blocking hand-off to the collector. Never waits for space.
pub fn offer_quote(tx: &mpsc::Sender<Quote>, quote: Quote) -> Offer {
    match tx.try_send(quote) {
        Ok(()) => Offer::Enqueued,
        Err(TrySendError::Full(_)) => Offer::Dropped,
        Err(TrySendError::Closed(_)) => Offer::Closed,
    }
}

/// Per-session line counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionCounters {
    pub lines: u64,
    pub enqueued: u64,
    pub dropped: u64,
    pub rejected: u64,
}

/// How a listen session that did not fail came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenEnd {
    Cancelled,
    QueueClosed,
}

/// Bytes of the line being assembled, capped at [`MAX_LINE_BYTES`].
/// Once the cap is crossed the rest of the line is ignored until its newline.
#[derive(Debug, Default)]
struct LineBuffer {
    bytes: Vec<u8>,
    oversized: bool,
}

impl LineBuffer {
    fn extend(&mut self, part: &[u8]) {
        if self.oversized {
            return;
        }
        if self.bytes.len() + part.len() > MAX_LINE_BYTES {
            self.oversized = true;
            self.bytes = Vec::new();
        } else {
            self.bytes.extend_from_slice(part);
        }
    }

    fn is_empty(&self) -> bool {
        self.bytes.is_empty() && !self.oversized
    }

    fn reset(&mut self) {
        self.bytes.clear();
        self.oversized = false;
    }
}

pub struct SourceConnection {
    config: SourceConfig,
    dial_timeout: Duration,
    read_timeout: Duration,
    stream: Option<TcpStream>,
    state: ConnState,
    counters: SessionCounters,
}

impl SourceConnection {
    pub fn new(config: SourceConfig, dial_timeout: Duration, read_timeout: Duration) -> Self {
        Self {
            config,
            dial_timeout,
            read_timeout,
            stream: None,
            state: ConnState::Disconnected,
            counters: SessionCounters::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    /// Counters of the current or most recent session.
    pub fn counters(&self) -> SessionCounters {
        self.counters
    }

    /// Dial the source, bounded by the dial timeout. Any previous socket is
    /// closed first.
    pub async fn connect(&mut self) -> Result<(), SourceError> {
        self.close();
        self.state = ConnState::Connecting;
        let addr = self.config.addr();

        let result = match timeout(self.dial_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("[{}] set_nodelay failed: {e}", self.config.name);
                }
                self.stream = Some(stream);
                Ok(())
            }
            Ok(Err(source)) => Err(SourceError::Connect { addr, source }),
            Err(_) => Err(SourceError::DialTimeout {
                addr,
                timeout_secs: self.dial_timeout.as_secs(),
            }),
        };
        if result.is_err() {
            self.state = ConnState::Disconnected;
        }
        result
    }

    /// Read newline-delimited records until the stream fails, the read
    /// deadline expires, the queue closes or `cancel` fires.
    ///
    /// The deadline covers each socket read, not each line. Undecodable or
    /// oversized lines are logged and skipped; they never end the session.
    pub async fn listen(
        &mut self,
        tx: &mpsc::Sender<Quote>,
        cancel: &CancellationToken,
    ) -> Result<ListenEnd, SourceError> {
        let mut stream = self.stream.take().ok_or(SourceError::NotConnected)?;
        self.state = ConnState::Listening;
        self.counters = SessionCounters::default();

        let label = self.config.name.clone();
        let mut chunk = vec![0u8; READ_CHUNK_BYTES];
        let mut line = LineBuffer::default();

        let result = 'session: loop {
            let read = tokio::select! {
                _ = cancel.cancelled() => break Ok(ListenEnd::Cancelled),
                r = timeout(self.read_timeout, stream.read(&mut chunk)) => r,
            };
            let n = match read {
                Err(_) => break Err(SourceError::ReadTimeout(self.read_timeout)),
                Ok(Err(e)) => break Err(SourceError::Read(e)),
                Ok(Ok(0)) => {
                    // Trailing line without a newline.
                    if !line.is_empty() {
                        if let Some(end) = self.finish_line(&mut line, tx, &label) {
                            break Ok(end);
                        }
                    }
                    break Err(SourceError::StreamClosed);
                }
                Ok(Ok(n)) => n,
            };

            let mut rest = &chunk[..n];
            while let Some(i) = rest.iter().position(|&b| b == b'\n') {
                line.extend(&rest[..i]);
                rest = &rest[i + 1..];
                if let Some(end) = self.finish_line(&mut line, tx, &label) {
                    break 'session Ok(end);
                }
            }
            line.extend(rest);
        };

        self.state = ConnState::Disconnected;
        info!(
            "[{label}] session ended: {} lines, {} enqueued, {} dropped, {} rejected",
            self.counters.lines, self.counters.enqueued, self.counters.dropped, self.counters.rejected
        );
        result
    }

    /// Decode and enqueue one complete line, then clear the buffer.
    fn finish_line(&mut self, line: &mut LineBuffer, tx: &mpsc::Sender<Quote>, label: &str) -> Option<ListenEnd> {
        let end = if line.oversized {
            self.counters.lines += 1;
            self.counters.rejected += 1;
            warn!("[{label}] skipping line longer than {MAX_LINE_BYTES} bytes");
            None
        } else {
            self.handle_line(&line.bytes, tx, label)
        };
        line.reset();
        end
    }

    fn handle_line(&mut self, raw: &[u8], tx: &mpsc::Sender<Quote>, label: &str) -> Option<ListenEnd> {
        let text = String::from_utf8_lossy(raw);
        let line = text.trim();
        if line.is_empty() {
            return None;
        }
        self.counters.lines += 1;

        let quote = match decoder::decode(line, label) {
            Ok(q) => q,
            Err(e) => {
                self.counters.rejected += 1;
                warn!("[{label}] skipping line: {e}");
                return None;
            }
        };

        match offer_quote(tx, quote) {
            Offer::Enqueued => self.counters.enqueued += 1,
            Offer::Dropped => {
                self.counters.dropped += 1;
                warn!("[{label}] quote queue full, dropping quote");
            }
            Offer::Closed => return Some(ListenEnd::QueueClosed),
        }
        None
    }

    /// Release the socket. Safe to call in any state, any number of times.
    pub fn close(&mut self) {
        self.stream = None;
        self.state = ConnState::Disconnected;
    }
}
