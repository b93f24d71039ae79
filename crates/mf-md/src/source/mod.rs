//! TCP price sources.
//!
//! - `connection`: one socket session, line framing and decoding
//! - `worker`: the reconnecting loop that keeps a source alive

pub mod connection;
pub mod worker;

pub use connection::{ConnState, ListenEnd, Offer, SessionCounters, SourceConnection, offer_quote};
pub use worker::{WorkerContext, run_source_worker};
