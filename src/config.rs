//! Service configuration from environment variables
//!
//! Loaded once at startup and handed to `Service::new`; nothing reads the
//! environment after that.

use std::env;
use std::time::Duration;

/// Configuration for the velocity service
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Path to SQLite database file
    pub db_path: String,

    /// Directory holding `*.sql` schema files
    pub schema_dir: String,

    /// Queue group shared by every handler subscription of this service
    pub queue_group: String,

    /// Per-subscription channel buffer (messages)
    pub channel_buffer: usize,

    /// Default deadline for `Bus::request`, in milliseconds
    pub request_timeout_ms: u64,

    /// Registers the destructive `insights.store.drop` handler
    pub test_mode: bool,

    /// Name of the scoring policy (`trailing_mean_delta`, `raw_count`, `ewma`)
    pub scoring: String,

    /// Lookback window for windowed scoring policies
    pub window_days: u32,

    /// Smoothing factor for `ewma`
    pub ewma_alpha: f64,

    /// Largest accepted `[start, end]` span for a velocity query
    pub max_range_days: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            db_path: "velocity.db".to_string(),
            schema_dir: "sql".to_string(),
            queue_group: "velocity".to_string(),
            channel_buffer: 1_024,
            request_timeout_ms: 5_000,
            test_mode: false,
            scoring: "trailing_mean_delta".to_string(),
            window_days: 7,
            ewma_alpha: 0.5,
            max_range_days: 366,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `VELOCITY_DB_PATH` (default: velocity.db)
    /// - `VELOCITY_SCHEMA_DIR` (default: sql)
    /// - `BUS_QUEUE_GROUP` (default: velocity)
    /// - `BUS_CHANNEL_BUFFER` (default: 1024)
    /// - `REQUEST_TIMEOUT_MS` (default: 5000)
    /// - `TEST_MODE` (default: false)
    /// - `VELOCITY_SCORING` (default: trailing_mean_delta)
    /// - `VELOCITY_WINDOW_DAYS` (default: 7)
    /// - `VELOCITY_EWMA_ALPHA` (default: 0.5)
    /// - `VELOCITY_MAX_RANGE_DAYS` (default: 366)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup
    ///
    /// Unparseable values fall back to the default for that key.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Self {
            db_path: lookup("VELOCITY_DB_PATH").unwrap_or(defaults.db_path),

            schema_dir: lookup("VELOCITY_SCHEMA_DIR").unwrap_or(defaults.schema_dir),

            queue_group: lookup("BUS_QUEUE_GROUP")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.queue_group),

            channel_buffer: lookup("BUS_CHANNEL_BUFFER")
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.channel_buffer),

            request_timeout_ms: lookup("REQUEST_TIMEOUT_MS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.request_timeout_ms),

            test_mode: lookup("TEST_MODE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.test_mode),

            scoring: lookup("VELOCITY_SCORING")
                .map(|s| s.trim().to_lowercase())
                .unwrap_or(defaults.scoring),

            window_days: lookup("VELOCITY_WINDOW_DAYS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.window_days),

            ewma_alpha: lookup("VELOCITY_EWMA_ALPHA")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.ewma_alpha),

            max_range_days: lookup("VELOCITY_MAX_RANGE_DAYS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_range_days),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
