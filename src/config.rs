use serde::Deserialize;
use std::time::Duration;

use crate::models::DEFAULT_CACHE_TTL;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// TMDb API key, appended to every provider request
    pub tmdb_api_key: String,

    /// TMDb API base URL
    #[serde(default = "default_tmdb_api_url")]
    pub tmdb_api_url: String,

    /// PostgreSQL connection URL; the in-memory store is used when unset
    #[serde(default)]
    pub database_url: Option<String>,

    /// Redis connection URL for the genre-list memo; kept in memory when unset
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Hard timeout for a single provider request attempt
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Linear backoff base: the wait before retry `n` is `n * retry_backoff_secs`
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,

    /// Attempts per provider request, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Ceiling on concurrent in-flight provider requests during a batch fetch
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,

    /// Freshness window given to newly cached entities, in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: i64,
}

fn default_tmdb_api_url() -> String {
    "https://api.themoviedb.org/3".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_retry_backoff_secs() -> u64 {
    2
}

fn default_max_attempts() -> u32 {
    3
}

fn default_batch_concurrency() -> usize {
    5
}

fn default_cache_ttl_secs() -> i64 {
    DEFAULT_CACHE_TTL
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let config = envy::from_env::<Config>()
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the service cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tmdb_api_key.trim().is_empty() {
            anyhow::bail!("TMDB_API_KEY must not be empty");
        }
        if self.max_attempts == 0 {
            anyhow::bail!("MAX_ATTEMPTS must be at least 1");
        }
        if self.batch_concurrency == 0 {
            anyhow::bail!("BATCH_CONCURRENCY must be at least 1");
        }
        if self.cache_ttl_secs < 0 {
            anyhow::bail!("CACHE_TTL_SECS must not be negative");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }
}
