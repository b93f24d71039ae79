//! Configuration parsing for the MarketFlow pipeline.
//!
//! All settings come from a single JSON config file. The top-level structure
//! contains logging metadata, a `sources` array (one entry per market-data
//! feed), pipeline timing knobs, and optional backend sections.
//!
//! # Example config
//!
//! ```json
//! {
//!   "marketflow": { "module_name": "marketflow", "log_path": "/tmp/log" },
//!   "sources": [
//!     { "name": "exchange1", "host": "127.0.0.1", "port": 40101 },
//!     { "name": "exchange2", "host": "127.0.0.1", "port": 40102 }
//!   ],
//!   "pipeline": { "retention_secs": 60, "tick_secs": 10 },
//!   "redis": { "url": "redis://127.0.0.1:6379/0" },
//!   "postgres": { "url": "postgres://mf:mf@127.0.0.1/marketflow" },
//!   "publisher": { "console": true }
//! }
//! ```
//!
//! `REDIS_URL` and `DATABASE_URL` in the environment override the urls in the
//! file (and enable the backend if the section is absent).

use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;

use crate::error::MfError;

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Module metadata (name, log path).
    pub marketflow: Option<ModuleMeta>,

    /// Market-data sources, one connection worker each.
    pub sources: Vec<SourceConfig>,

    /// Timing and capacity knobs; every field has a default.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Redis sorted-set window store. In-memory store when absent.
    pub redis: Option<RedisConfig>,

    /// Postgres stat sink. Stats are only logged when absent.
    pub postgres: Option<PostgresConfig>,

    /// Optional human-facing price output.
    #[serde(default)]
    pub publisher: PublisherConfig,
}

/// Module metadata block.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleMeta {
    pub module_name: Option<String>,
    pub log_path: Option<String>,
}

/// One market-data source reachable over TCP.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
}

impl SourceConfig {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self { name: name.into(), host: host.into(), port }
    }

    /// `host:port`, suitable for `TcpStream::connect`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Pipeline timing and capacity settings as written in the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// How long a sample stays eligible for aggregation (default: 60).
    pub retention_secs: u64,
    /// Aggregation tick interval (default: 10).
    pub tick_secs: u64,
    /// TCP dial timeout (default: 10).
    pub dial_timeout_secs: u64,
    /// Idle read deadline, refreshed on every read (default: 30).
    pub read_timeout_secs: u64,
    /// Fixed delay between reconnect attempts (default: 5).
    pub reconnect_delay_secs: u64,
    /// Delay between launching consecutive source workers (default: 100).
    pub connect_stagger_ms: u64,
    /// Shared quote queue capacity (default: 1000).
    pub quote_queue_capacity: usize,
    /// Reconnection notification queue capacity (default: 10).
    pub reconnect_queue_capacity: usize,
    /// Consecutive empty ticks before a key is evicted; 0 disables (default: 30).
    pub idle_eviction_ticks: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retention_secs: 60,
            tick_secs: 10,
            dial_timeout_secs: 10,
            read_timeout_secs: 30,
            reconnect_delay_secs: 5,
            connect_stagger_ms: 100,
            quote_queue_capacity: 1000,
            reconnect_queue_capacity: 10,
            idle_eviction_ticks: 30,
        }
    }
}

impl PipelineConfig {
    /// Convert to the runtime representation used by the pipeline.
    pub fn settings(&self) -> PipelineSettings {
        PipelineSettings {
            retention: Duration::from_secs(self.retention_secs),
            tick_interval: Duration::from_secs(self.tick_secs),
            dial_timeout: Duration::from_secs(self.dial_timeout_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            reconnect_delay: Duration::from_secs(self.reconnect_delay_secs),
            connect_stagger: Duration::from_millis(self.connect_stagger_ms),
            quote_queue_capacity: self.quote_queue_capacity,
            reconnect_queue_capacity: self.reconnect_queue_capacity,
            idle_eviction_ticks: self.idle_eviction_ticks,
        }
    }
}

/// Runtime pipeline settings. Tests build these directly with short
/// durations.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub retention: Duration,
    pub tick_interval: Duration,
    pub dial_timeout: Duration,
    pub read_timeout: Duration,
    pub reconnect_delay: Duration,
    pub connect_stagger: Duration,
    pub quote_queue_capacity: usize,
    pub reconnect_queue_capacity: usize,
    pub idle_eviction_ticks: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        PipelineConfig::default().settings()
    }
}

impl PipelineSettings {
    /// Retention in whole seconds, the unit of window scores.
    pub fn retention_secs(&self) -> i64 {
        self.retention.as_secs() as i64
    }
}

/// Redis window store settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    /// TTL refreshed on every write so abandoned windows expire (default: 120).
    /// Must be at least `pipeline.retention_secs`.
    #[serde(default = "default_key_ttl_secs")]
    pub key_ttl_secs: u64,
}

fn default_key_ttl_secs() -> u64 {
    120
}

/// Postgres stat sink settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PostgresConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout_secs() -> u64 {
    5
}

/// Price publisher settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublisherConfig {
    /// Print every stored quote to stdout.
    #[serde(default)]
    pub console: bool,
}

impl AppConfig {
    /// Returns the module name, defaulting to `"marketflow"`.
    pub fn module_name(&self) -> String {
        self.marketflow
            .as_ref()
            .and_then(|m| m.module_name.clone())
            .unwrap_or_else(|| "marketflow".to_string())
    }

    /// Returns the log path.
    pub fn log_path(&self) -> Option<String> {
        self.marketflow.as_ref().and_then(|m| m.log_path.clone())
    }

    /// Apply `REDIS_URL` / `DATABASE_URL` overrides from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("REDIS_URL").filter(|u| !u.is_empty()) {
            match self.redis.as_mut() {
                Some(redis) => redis.url = url,
                None => self.redis = Some(RedisConfig { url, key_ttl_secs: default_key_ttl_secs() }),
            }
        }
        if let Some(url) = lookup("DATABASE_URL").filter(|u| !u.is_empty()) {
            match self.postgres.as_mut() {
                Some(pg) => pg.url = url,
                None => {
                    self.postgres = Some(PostgresConfig {
                        url,
                        max_connections: default_max_connections(),
                        acquire_timeout_secs: default_acquire_timeout_secs(),
                    })
                }
            }
        }
    }

    /// Check the config is well-formed before anything is started.
    pub fn validate(&self) -> Result<(), MfError> {
        if self.sources.is_empty() {
            return Err(MfError::Config("no sources configured".into()));
        }

        let mut seen = HashSet::new();
        for src in &self.sources {
            if src.name.trim().is_empty() {
                return Err(MfError::Config("source with empty name".into()));
            }
            if src.name.contains(':') {
                return Err(MfError::Config(format!("source name '{}' must not contain ':'", src.name)));
            }
            if src.host.trim().is_empty() {
                return Err(MfError::Config(format!("source '{}' has empty host", src.name)));
            }
            if src.port == 0 {
                return Err(MfError::Config(format!("source '{}' has port 0", src.name)));
            }
            if !seen.insert(src.name.as_str()) {
                return Err(MfError::Config(format!("duplicate source name '{}'", src.name)));
            }
        }

        let p = &self.pipeline;
        let non_zero = [
            ("retention_secs", p.retention_secs),
            ("tick_secs", p.tick_secs),
            ("dial_timeout_secs", p.dial_timeout_secs),
            ("read_timeout_secs", p.read_timeout_secs),
            ("reconnect_delay_secs", p.reconnect_delay_secs),
            ("quote_queue_capacity", p.quote_queue_capacity as u64),
            ("reconnect_queue_capacity", p.reconnect_queue_capacity as u64),
        ];
        for (name, value) in non_zero {
            if value == 0 {
                return Err(MfError::Config(format!("pipeline.{name} must be > 0")));
            }
        }
        if p.tick_secs > p.retention_secs {
            return Err(MfError::Config(format!(
                "pipeline.tick_secs ({}) exceeds retention_secs ({})",
                p.tick_secs, p.retention_secs
            )));
        }

        if let Some(redis) = &self.redis {
            if redis.key_ttl_secs < p.retention_secs {
                return Err(MfError::Config(format!(
                    "redis.key_ttl_secs ({}) must be at least retention_secs ({})",
                    redis.key_ttl_secs, p.retention_secs
                )));
            }
        }

        Ok(())
    }
}

/// Load and parse a JSON config file, apply environment overrides and
/// validate it.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let mut config: AppConfig = serde_json::from_str(&content)?;
    config.apply_overrides(|k| std::env::var(k).ok());
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const MINIMAL: &str = r#"{
        "sources": [
            { "name": "exchange1", "host": "127.0.0.1", "port": 40101 },
            { "name": "exchange2", "host": "127.0.0.1", "port": 40102 }
        ]
    }"#;

    fn parse(json: &str) -> AppConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn defaults_match_design_constants() {
        let cfg = parse(MINIMAL);
        let s = cfg.pipeline.settings();
        assert_eq!(s.retention, Duration::from_secs(60));
        assert_eq!(s.tick_interval, Duration::from_secs(10));
        assert_eq!(s.dial_timeout, Duration::from_secs(10));
        assert_eq!(s.read_timeout, Duration::from_secs(30));
        assert_eq!(s.reconnect_delay, Duration::from_secs(5));
        assert_eq!(s.connect_stagger, Duration::from_millis(100));
        assert_eq!(s.quote_queue_capacity, 1000);
        assert_eq!(s.reconnect_queue_capacity, 10);
        assert!(cfg.redis.is_none());
        assert!(cfg.postgres.is_none());
        assert!(!cfg.publisher.console);
        assert_eq!(cfg.module_name(), "marketflow");
        cfg.validate().unwrap();
    }

    #[test]
    fn partial_pipeline_section_keeps_other_defaults() {
        let cfg = parse(
            r#"{
                "sources": [{ "name": "a", "host": "h", "port": 1 }],
                "pipeline": { "tick_secs": 5 },
                "redis": { "url": "redis://localhost" }
            }"#,
        );
        assert_eq!(cfg.pipeline.tick_secs, 5);
        assert_eq!(cfg.pipeline.retention_secs, 60);
        assert_eq!(cfg.redis.unwrap().key_ttl_secs, 120);
    }

    #[test]
    fn rejects_bad_sources() {
        let cases = [
            r#"{ "sources": [] }"#,
            r#"{ "sources": [{ "name": "", "host": "h", "port": 1 }] }"#,
            r#"{ "sources": [{ "name": "a:b", "host": "h", "port": 1 }] }"#,
            r#"{ "sources": [{ "name": "a", "host": "", "port": 1 }] }"#,
            r#"{ "sources": [{ "name": "a", "host": "h", "port": 0 }] }"#,
            r#"{ "sources": [{ "name": "a", "host": "h", "port": 1 }, { "name": "a", "host": "h", "port": 2 }] }"#,
        ];
        for json in cases {
            let err = parse(json).validate().unwrap_err();
            assert!(matches!(err, MfError::Config(_)), "{json}");
        }
    }

    #[test]
    fn rejects_bad_pipeline_knobs() {
        let mut cfg = parse(MINIMAL);
        cfg.pipeline.quote_queue_capacity = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = parse(MINIMAL);
        cfg.pipeline.tick_secs = 120;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn redis_ttl_must_cover_retention() {
        let with_ttl = |ttl: u64| {
            let mut cfg = parse(MINIMAL);
            cfg.pipeline.retention_secs = 300;
            cfg.redis = Some(RedisConfig { url: "redis://localhost".into(), key_ttl_secs: ttl });
            cfg.validate()
        };
        assert!(matches!(with_ttl(0), Err(MfError::Config(_))));
        assert!(matches!(with_ttl(30), Err(MfError::Config(_))));
        assert!(with_ttl(300).is_ok());
        assert!(with_ttl(600).is_ok());
    }

    #[test]
    fn env_overrides_enable_backends() {
        let mut cfg = parse(MINIMAL);
        cfg.apply_overrides(|k| match k {
            "REDIS_URL" => Some("redis://cache:6379".into()),
            "DATABASE_URL" => Some("postgres://db/mf".into()),
            _ => None,
        });
        assert_eq!(cfg.redis.unwrap().url, "redis://cache:6379");
        let pg = cfg.postgres.unwrap();
        assert_eq!(pg.url, "postgres://db/mf");
        assert_eq!(pg.max_connections, 5);
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut cfg = parse(MINIMAL);
        cfg.apply_overrides(|_| Some(String::new()));
        assert!(cfg.redis.is_none());
        assert!(cfg.postgres.is_none());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let cfg = load_config(file.path()).unwrap();
        assert_eq!(cfg.sources.len(), 2);
        assert_eq!(cfg.sources[0].addr(), "127.0.0.1:40101");
    }

    #[test]
    fn load_rejects_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{ "sources": [] }"#).unwrap();
        assert!(load_config(file.path()).is_err());
    }
}
