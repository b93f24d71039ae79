//! # mf-md
//!
//! Market data ingestion and aggregation for MarketFlow.
//!
//! ## Architecture
//!
//! One worker per configured source keeps a TCP connection alive and decodes
//! its newline-delimited quotes into a shared bounded queue. A single
//! collector drains the queue into per-key sliding windows, and an
//! aggregator reduces each window once per tick and hands the result to the
//! stat sink. [`pipeline::Pipeline`] owns the wiring and shutdown.
//!
//! ## Modules
//!
//! - [`decoder`]: JSON, colon and whitespace line dialects
//! - [`source`]: connection session and reconnecting worker loop
//! - [`reconnect`]: failure coordinator and per-source health counters
//! - [`keys`]: registry of active window keys
//! - [`collector`]: queue consumer, window writes and pruning
//! - [`aggregator`]: per-tick window reduction
//! - [`pipeline`]: lifecycle controller

pub mod aggregator;
pub mod collector;
pub mod decoder;
pub mod keys;
pub mod pipeline;
pub mod reconnect;
pub mod source;

pub use pipeline::Pipeline;
