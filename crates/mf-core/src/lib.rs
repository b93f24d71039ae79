//! # mf-core
//!
//! Core crate for the MarketFlow pipeline, providing:
//!
//! - **Types** (`types`): quotes, window keys, aggregated statistics
//! - **Configuration** (`config`): JSON config deserialization + validation
//! - **Error types** (`error`): per-stage error taxonomy via thiserror
//! - **Ports** (`ports`): window store, stat sink and price publisher traits
//! - **Memory store** (`memory`): in-process sliding-window store
//! - **Time utilities** (`time_util`): Unix timestamps for window scores
//! - **Logging** (`logging`): tracing-based structured logging

pub mod config;
pub mod error;
pub mod logging;
pub mod memory;
pub mod ports;
pub mod time_util;
pub mod types;

// Re-export types at crate root for convenience.
pub use types::*;
