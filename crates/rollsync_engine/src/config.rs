//! Configuration for the sync engine.

use crate::error::{SyncError, SyncResult};
use rand::Rng;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Export API base URL (e.g. `https://export.example.com/api`).
    pub base_url: String,
    /// Bound on every HTTP request, connect included.
    pub timeout: Duration,
    /// Pause between successful cycles of one collection.
    pub sync_interval: Duration,
    /// Backoff after failed cycles.
    pub retry: RetryConfig,
    /// Consecutive failures of one collection after which failures are
    /// logged at error level.
    pub failure_alert_threshold: u32,
    /// `User-Agent` sent with every request.
    pub user_agent: String,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(30),
            sync_interval: Duration::from_secs(300),
            retry: RetryConfig::default(),
            failure_alert_threshold: 5,
            user_agent: format!("rollsync/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Loads a configuration from a JSON file.
    ///
    /// Fields missing from the file keep their defaults.
    pub fn from_json_file(path: &Path) -> SyncResult<Self> {
        let data = std::fs::read(path)
            .map_err(|e| SyncError::Config(format!("cannot read {}: {e}", path.display())))?;
        let file: ConfigFile = serde_json::from_slice(&data)
            .map_err(|e| SyncError::Config(format!("invalid {}: {e}", path.display())))?;
        file.into_config()
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the pause between successful cycles.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the consecutive-failure alert threshold.
    pub fn with_failure_alert_threshold(mut self, threshold: u32) -> Self {
        self.failure_alert_threshold = threshold;
        self
    }

    /// Checks the configuration for values the engine cannot work with.
    pub fn validate(&self) -> SyncResult<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(SyncError::Config(format!(
                "base_url must be an http(s) URL, got {:?}",
                self.base_url
            )));
        }
        if self.timeout.is_zero() {
            return Err(SyncError::Config("timeout must be greater than zero".into()));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(SyncError::Config(
                "backoff_multiplier must be at least 1.0".into(),
            ));
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("http://localhost")
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a configuration with the given initial delay.
    pub fn new(initial_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay: Duration::from_secs(600),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, add_jitter: bool) -> Self {
        self.add_jitter = add_jitter;
        self
    }

    /// Calculates the delay after `failures` consecutive failures.
    ///
    /// Zero failures means no delay.
    pub fn delay_for_attempt(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(failures.saturating_sub(1)).unwrap_or(i32::MAX);
        let base_delay = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            // Add up to 25% jitter
            let jitter = delay_secs * 0.25 * rand::thread_rng().gen_range(0.0..1.0);
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

/// On-disk form of [`SyncConfig`].
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    /// Export API base URL.
    pub base_url: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Pause between successful cycles in seconds.
    pub sync_interval_secs: Option<u64>,
    /// First retry delay in seconds.
    pub retry_initial_secs: Option<u64>,
    /// Maximum retry delay in seconds.
    pub retry_max_secs: Option<u64>,
    /// Backoff multiplier.
    pub retry_multiplier: Option<f64>,
    /// Whether to add jitter.
    pub retry_jitter: Option<bool>,
    /// Consecutive-failure alert threshold.
    pub failure_alert_threshold: Option<u32>,
}

impl ConfigFile {
    /// Applies the file's values over the defaults.
    pub fn into_config(self) -> SyncResult<SyncConfig> {
        let base_url = self
            .base_url
            .ok_or_else(|| SyncError::Config("base_url is required".into()))?;
        let mut config = SyncConfig::new(base_url);

        if let Some(secs) = self.timeout_secs {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.sync_interval_secs {
            config.sync_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = self.retry_initial_secs {
            config.retry.initial_delay = Duration::from_secs(secs);
        }
        if let Some(secs) = self.retry_max_secs {
            config.retry.max_delay = Duration::from_secs(secs);
        }
        if let Some(multiplier) = self.retry_multiplier {
            config.retry.backoff_multiplier = multiplier;
        }
        if let Some(jitter) = self.retry_jitter {
            config.retry.add_jitter = jitter;
        }
        if let Some(threshold) = self.failure_alert_threshold {
            config.failure_alert_threshold = threshold;
        }

        config.validate()?;
        Ok(config)
    }
}
