//! Engine configuration
//!
//! Plain struct loaded from environment variables with typed defaults —
//! no reflection-based binding or config-crate.

use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub symbol: String,

    /// Postgres connection string.
    pub database_url: String,
    pub db_pool_size: u32,

    /// Broadcaster trailing debounce window.
    pub broadcast_debounce: Duration,
    /// Broadcaster hard deadline from first coalesced event.
    pub broadcast_max_wait: Duration,

    /// WorkQueue retry backoff base.
    pub retry_backoff_base: Duration,
    /// WorkQueue retry backoff multiplicative factor.
    pub retry_backoff_factor: u32,
    /// WorkQueue max delivery attempts before a job is moved to the
    /// failed-jobs partition.
    pub retry_max_attempts: u32,

    /// How far into the future the candle gap-fill maintenance task will
    /// synthesize flat candles.
    pub candle_gap_fill_horizon: Duration,
    /// How often the gap-fill maintenance task wakes to check for a
    /// stale bucket.
    pub candle_gap_fill_tick: Duration,
    /// How long closed candles are retained before eligible for pruning.
    /// No sweep job is implemented; this is a configuration hook only.
    pub candle_retention: Duration,

    pub logging: LoggingConfig,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub log_dir: String,
    pub log_file: String,
    /// "hourly", "daily", or anything else for non-rotating.
    pub rotation: String,
    pub log_level: String,
    pub use_json: bool,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        EngineConfig {
            symbol: env_or("EXCHANGE_SYMBOL", "XYZ"),
            database_url: env_or(
                "DATABASE_URL",
                "postgres://localhost/single_exchange_core",
            ),
            db_pool_size: env_parsed_or("DB_POOL_SIZE", 10),
            broadcast_debounce: Duration::from_millis(env_parsed_or("BROADCAST_DEBOUNCE_MS", 50)),
            broadcast_max_wait: Duration::from_millis(env_parsed_or("BROADCAST_MAX_WAIT_MS", 500)),
            retry_backoff_base: Duration::from_millis(env_parsed_or("RETRY_BACKOFF_BASE_MS", 100)),
            retry_backoff_factor: env_parsed_or("RETRY_BACKOFF_FACTOR", 2),
            retry_max_attempts: env_parsed_or("RETRY_MAX_ATTEMPTS", 3),
            candle_gap_fill_horizon: Duration::from_secs(
                env_parsed_or("CANDLE_GAP_FILL_HORIZON_SECS", 3600),
            ),
            candle_gap_fill_tick: Duration::from_secs(env_parsed_or("CANDLE_GAP_FILL_TICK_SECS", 15)),
            candle_retention: Duration::from_secs(env_parsed_or(
                "CANDLE_RETENTION_SECS",
                60 * 60 * 24 * 30,
            )),
            logging: LoggingConfig {
                log_dir: env_or("LOG_DIR", "logs"),
                log_file: env_or("LOG_FILE", "exchange-core.log"),
                rotation: env_or("LOG_ROTATION", "daily"),
                log_level: env_or("LOG_LEVEL", "info"),
                use_json: env_parsed_or("LOG_JSON", false),
            },
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
