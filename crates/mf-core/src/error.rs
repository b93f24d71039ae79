//! Typed error definitions for the MarketFlow pipeline.
//!
//! Every failure inside the running pipeline is recoverable: the loop that
//! hit it logs the error and carries on. The variants here exist so log lines
//! say which stage failed, and so tests can match on the failure kind.
//! [`MfError`] wraps them for startup code that wants a single type.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Inbound line dialect, attached to decode failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `{"symbol": "...", "price": ...}`
    Json,
    /// `SYMBOL:PRICE`
    Colon,
    /// `SYMBOL PRICE ...`
    Whitespace,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dialect::Json => "json",
            Dialect::Colon => "colon",
            Dialect::Whitespace => "whitespace",
        };
        f.write_str(name)
    }
}

/// A single line could not be turned into a quote.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("{0} message has no symbol")]
    MissingSymbol(Dialect),

    #[error("{0} message has no usable price field")]
    MissingPrice(Dialect),

    #[error("invalid price {raw:?} in {dialect} message")]
    InvalidPrice { dialect: Dialect, raw: String },

    #[error("unknown message format: {0}")]
    UnknownFormat(String),
}

/// Connection-level failure of a source worker.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("dial to {addr} timed out after {timeout_secs}s")]
    DialTimeout { addr: String, timeout_secs: u64 },

    #[error("read error: {0}")]
    Read(#[from] std::io::Error),

    #[error("no data for {0:?}, read deadline expired")]
    ReadTimeout(Duration),

    #[error("connection closed by peer")]
    StreamClosed,

    #[error("listen called without an open connection")]
    NotConnected,
}

/// Sliding-window store operation failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence sink failure.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink backend error: {0}")]
    Backend(String),

    #[error("rejected stat for {key}: {reason}")]
    Rejected { key: String, reason: String },
}

/// Process-level error used while building and starting the pipeline.
#[derive(Debug, Error)]
pub enum MfError {
    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    #[error("pipeline already started")]
    AlreadyStarted,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}
