/// Configuration management for Voting Service
///
/// Loads configuration from environment variables.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,
    /// Which ledger/post store backend to run against
    pub storage: StorageBackend,
    /// Database configuration (required for the postgres backend)
    pub database: Option<DatabaseConfig>,
    /// Redis configuration (enables the cross-instance event bridge)
    pub redis: Option<RedisConfig>,
    /// Vote command settings
    pub voting: VotingConfig,
    /// Score aggregator settings
    pub aggregation: AggregationConfig,
    /// Change propagator settings
    pub propagation: PropagationConfig,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (dev, staging, prod)
    pub env: String,
    /// Server host to bind to
    pub host: String,
    /// HTTP port
    pub http_port: u16,
    /// `json` for structured log lines, anything else for text
    pub log_format: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            other => anyhow::bail!("unknown STORAGE_BACKEND: {}", other),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL
    pub url: String,
    /// Max connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Min connections in pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis URL (redis://host:port)
    pub url: String,
    /// Pub/Sub channel for mutation events
    pub events_channel: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VotingConfig {
    /// Read-decide-write attempts before a conflict surfaces as transient
    pub max_attempts: u32,
    /// Upper bound on any single ledger/post store call
    pub store_timeout: Duration,
    /// How long a vote command waits for the first score recompute
    pub score_wait: Duration,
    /// Leaderboard size when the caller does not ask for one
    pub leaderboard_default_size: usize,
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            store_timeout: Duration::from_millis(5000),
            score_wait: Duration::from_millis(250),
            leaderboard_default_size: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Retries after the first failed recompute
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    /// Add ±30% random jitter to each backoff
    pub jitter: bool,
    /// Full reconciliation period; zero disables the worker
    pub reconcile_interval: Duration,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
            reconcile_interval: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropagationConfig {
    /// Bursts inside this window collapse into one refresh per observer
    pub coalesce_window: Duration,
    /// Pending mutation events before the propagator falls back to
    /// refreshing every observer
    pub event_capacity: usize,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            coalesce_window: Duration::from_millis(250),
            event_capacity: 1024,
        }
    }
}

// Default values
fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_millis(key: &str, default: Duration) -> Duration {
    Duration::from_millis(env_or(key, default.as_millis() as u64))
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let app = AppConfig {
            env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: env_or("PORT", 8010),
            log_format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string()),
        };

        let storage = match std::env::var("STORAGE_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => StorageBackend::Postgres,
        };

        let database = match std::env::var("DATABASE_URL") {
            Ok(url) => Some(DatabaseConfig {
                url,
                max_connections: env_or("DB_MAX_CONNECTIONS", default_max_connections()),
                min_connections: env_or("DB_MIN_CONNECTIONS", default_min_connections()),
            }),
            Err(e) if storage == StorageBackend::Postgres => {
                return Err(e).context(
                    "DATABASE_URL environment variable not set (required by STORAGE_BACKEND=postgres)",
                );
            }
            Err(_) => None,
        };

        let redis = std::env::var("REDIS_URL").ok().map(|url| RedisConfig {
            url,
            events_channel: std::env::var("REDIS_EVENTS_CHANNEL")
                .unwrap_or_else(|_| vote_events::EventPublisher::DEFAULT_CHANNEL.to_string()),
        });

        let voting_defaults = VotingConfig::default();
        let voting = VotingConfig {
            max_attempts: env_or("VOTE_MAX_ATTEMPTS", voting_defaults.max_attempts).max(1),
            store_timeout: env_millis("STORE_TIMEOUT_MS", voting_defaults.store_timeout),
            score_wait: env_millis("SCORE_WAIT_MS", voting_defaults.score_wait),
            leaderboard_default_size: env_or(
                "LEADERBOARD_DEFAULT_SIZE",
                voting_defaults.leaderboard_default_size,
            ),
        };

        let aggregation_defaults = AggregationConfig::default();
        let aggregation = AggregationConfig {
            max_retries: env_or("AGGREGATION_MAX_RETRIES", aggregation_defaults.max_retries),
            initial_backoff: env_millis(
                "AGGREGATION_INITIAL_BACKOFF_MS",
                aggregation_defaults.initial_backoff,
            ),
            max_backoff: env_millis("AGGREGATION_MAX_BACKOFF_MS", aggregation_defaults.max_backoff),
            reconcile_interval: Duration::from_secs(env_or(
                "RECONCILE_INTERVAL_SECS",
                aggregation_defaults.reconcile_interval.as_secs(),
            )),
            ..aggregation_defaults
        };

        let propagation_defaults = PropagationConfig::default();
        let propagation = PropagationConfig {
            coalesce_window: env_millis("COALESCE_WINDOW_MS", propagation_defaults.coalesce_window),
            event_capacity: env_or("EVENT_QUEUE_CAPACITY", propagation_defaults.event_capacity)
                .max(1),
        };

        Ok(Config {
            app,
            storage,
            database,
            redis,
            voting,
            aggregation,
            propagation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        std::env::set_var("DATABASE_URL", "postgres://test");
        std::env::remove_var("STORAGE_BACKEND");

        let config = Config::from_env().unwrap();

        assert_eq!(config.app.env, "development");
        assert_eq!(config.app.host, "0.0.0.0");
        assert_eq!(config.app.http_port, 8010);
        assert_eq!(config.storage, StorageBackend::Postgres);
        let database = config.database.unwrap();
        assert_eq!(database.max_connections, 20);
        assert_eq!(database.min_connections, 5);
        assert_eq!(config.voting.max_attempts, 5);
        assert_eq!(config.voting.leaderboard_default_size, 5);
        assert_eq!(config.propagation.coalesce_window, Duration::from_millis(250));
        assert_eq!(config.aggregation.reconcile_interval, Duration::from_secs(300));
    }

    #[test]
    fn test_storage_backend_parse() {
        assert_eq!(
            "memory".parse::<StorageBackend>().unwrap(),
            StorageBackend::Memory
        );
        assert_eq!(
            "PostgreSQL".parse::<StorageBackend>().unwrap(),
            StorageBackend::Postgres
        );
        assert!("sqlite".parse::<StorageBackend>().is_err());
    }
}
