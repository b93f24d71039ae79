//! Backend registry: builds the pipeline's store, sink and publisher from
//! config.

use std::sync::Arc;

use anyhow::Result;
use mf_core::config::AppConfig;
use mf_core::memory::MemoryWindowStore;
use mf_core::ports::{PricePublisher, StatSink, WindowStore};
use tracing::{info, warn};

use crate::console::ConsolePublisher;
use crate::log_sink::LogStatSink;
use crate::pg_sink::PgStatSink;
use crate::redis_store::RedisWindowStore;

/// Redis when configured, otherwise the in-process store.
pub async fn create_store(config: &AppConfig) -> Result<Arc<dyn WindowStore>> {
    match &config.redis {
        Some(redis) => {
            let store = RedisWindowStore::connect(&redis.url, redis.key_ttl_secs).await?;
            Ok(Arc::new(store))
        }
        None => {
            warn!("[registry] no redis configured, windows are kept in memory");
            Ok(Arc::new(MemoryWindowStore::new()))
        }
    }
}

/// Postgres when configured, otherwise a sink that only logs.
pub async fn create_sink(config: &AppConfig) -> Result<Arc<dyn StatSink>> {
    match &config.postgres {
        Some(pg) => Ok(Arc::new(PgStatSink::connect(pg).await?)),
        None => {
            info!("[registry] no postgres configured, stats are logged only");
            Ok(Arc::new(LogStatSink::new()))
        }
    }
}

pub fn create_publisher(config: &AppConfig) -> Option<Arc<dyn PricePublisher>> {
    if config.publisher.console {
        Some(Arc::new(ConsolePublisher::new()))
    } else {
        None
    }
}
