//! # mf-store
//!
//! Storage adapters behind the `mf-core` ports:
//!
//! - [`redis_store`]: sorted-set window store
//! - [`pg_sink`]: `market_data` table writer
//! - [`log_sink`]: log-only stat sink
//! - [`console`]: stdout price publisher
//! - [`registry`]: builds the configured backends

pub mod console;
pub mod log_sink;
pub mod pg_sink;
pub mod redis_store;
pub mod registry;

pub use registry::{create_publisher, create_sink, create_store};
