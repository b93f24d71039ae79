//! Postgres stat sink.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use mf_core::AggregatedStat;
use mf_core::config::PostgresConfig;
use mf_core::error::SinkError;
use mf_core::ports::StatSink;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tracing::info;

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS market_data (
    id            BIGSERIAL PRIMARY KEY,
    exchange      TEXT             NOT NULL,
    pair_name     TEXT             NOT NULL,
    average_price DOUBLE PRECISION NOT NULL,
    min_price     DOUBLE PRECISION NOT NULL,
    max_price     DOUBLE PRECISION NOT NULL,
    timestamp     TIMESTAMPTZ      NOT NULL
)
"#;

const INSERT_STAT: &str = r#"
INSERT INTO market_data (exchange, pair_name, average_price, min_price, max_price, timestamp)
VALUES ($1, $2, $3, $4, $5, $6)
"#;

pub struct PgStatSink {
    pool: PgPool,
}

impl PgStatSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Build a pool from config, create the table if needed.
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        let pool = create_pool(config).await?;
        let sink = Self::new(pool);
        sink.ensure_schema().await?;
        Ok(sink)
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(CREATE_TABLE)
            .execute(&self.pool)
            .await
            .context("failed to create market_data table")?;
        Ok(())
    }
}

pub async fn create_pool(config: &PostgresConfig) -> Result<PgPool> {
    let opts = PgConnectOptions::from_str(&config.url).context("failed to parse database url")?;
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect_with(opts)
        .await
        .context("failed to create database pool")?;
    info!("[postgres] pool ready (max={})", config.max_connections);
    Ok(pool)
}

#[async_trait]
impl StatSink for PgStatSink {
    async fn record(&self, stat: &AggregatedStat) -> Result<(), SinkError> {
        sqlx::query(INSERT_STAT)
            .bind(&stat.source)
            .bind(&stat.symbol)
            .bind(stat.average)
            .bind(stat.minimum)
            .bind(stat.maximum)
            .bind(stat.computed_at)
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) => SinkError::Rejected {
                    key: stat.key().to_string(),
                    reason: db.to_string(),
                },
                other => SinkError::Backend(other.to_string()),
            })?;
        Ok(())
    }
}
