use crate::core::{PersistError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Backoff settings for the retry loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Delay before the first retry, doubled for each further retry.
    pub base_delay_ms: u64,
    /// Upper bound applied before jitter.
    pub max_delay_ms: u64,
    /// Lower bound applied after jitter.
    pub min_delay_ms: u64,
    /// Relative jitter, e.g. `0.25` for ±25%.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 10_000,
            min_delay_ms: 100,
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.base_delay_ms == 0 {
            return Err("base_delay_ms must be > 0".to_string());
        }
        if self.min_delay_ms > self.max_delay_ms {
            return Err("min_delay_ms cannot exceed max_delay_ms".to_string());
        }
        if !(0.0..1.0).contains(&self.jitter) {
            return Err("jitter must be within [0, 1)".to_string());
        }
        Ok(())
    }
}

/// Process-wide defaults for the persistence pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Per-attempt wall-clock budget
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry: RetryPolicy,
    /// Budget for the pre-write connection probe
    pub connection_check_timeout_ms: u64,
    /// Probes slower than this count as unhealthy
    pub max_latency_ms: u64,
    pub stability_sample_interval_ms: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_retries: 3,
            retry: RetryPolicy::default(),
            connection_check_timeout_ms: 3_000,
            max_latency_ms: 5_000,
            stability_sample_interval_ms: 250,
        }
    }
}

impl PersistenceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn connection_check_timeout(mut self, timeout: Duration) -> Self {
        self.connection_check_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn max_latency(mut self, latency: Duration) -> Self {
        self.max_latency_ms = latency.as_millis() as u64;
        self
    }

    pub fn stability_sample_interval(mut self, interval: Duration) -> Self {
        self.stability_sample_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Loads a JSON config file. Missing keys fall back to defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            PersistError::Config(format!("read config '{}': {}", path.display(), err))
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|err| {
            PersistError::Config(format!("parse config '{}': {}", path.display(), err))
        })?;
        config.validate().map_err(PersistError::Config)?;
        Ok(config)
    }

    /// Overlays `ROBUST_PERSIST_*` environment variables on the defaults.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(value) = env_u64("ROBUST_PERSIST_TIMEOUT_MS")? {
            self.timeout_ms = value;
        }
        if let Some(value) = env_u64("ROBUST_PERSIST_MAX_RETRIES")? {
            self.max_retries = u32::try_from(value).map_err(|_| {
                PersistError::Config("ROBUST_PERSIST_MAX_RETRIES is out of range".to_string())
            })?;
        }
        if let Some(value) = env_u64("ROBUST_PERSIST_RETRY_BASE_DELAY_MS")? {
            self.retry.base_delay_ms = value;
        }
        if let Some(value) = env_u64("ROBUST_PERSIST_RETRY_MAX_DELAY_MS")? {
            self.retry.max_delay_ms = value;
        }
        if let Some(value) = env_u64("ROBUST_PERSIST_CONNECTION_CHECK_TIMEOUT_MS")? {
            self.connection_check_timeout_ms = value;
        }
        if let Some(value) = env_u64("ROBUST_PERSIST_MAX_LATENCY_MS")? {
            self.max_latency_ms = value;
        }

        self.validate().map_err(PersistError::Config)?;
        Ok(self)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.timeout_ms == 0 {
            return Err("timeout_ms must be > 0".to_string());
        }
        if self.connection_check_timeout_ms == 0 {
            return Err("connection_check_timeout_ms must be > 0".to_string());
        }
        if self.max_latency_ms == 0 {
            return Err("max_latency_ms must be > 0".to_string());
        }
        if self.stability_sample_interval_ms == 0 {
            return Err("stability_sample_interval_ms must be > 0".to_string());
        }
        self.retry.validate()
    }
}

fn env_u64(name: &str) -> Result<Option<u64>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| PersistError::Config(format!("{name} must be a non-negative integer"))),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(PersistError::Config(format!("{name}: {err}"))),
    }
}

/// Caller-supplied options for a single save. Unset fields use the config defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveOptions {
    pub timeout_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub validate_schema: Option<bool>,
    pub enable_logging: Option<bool>,
}

impl SaveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn validate_schema(mut self, enabled: bool) -> Self {
        self.validate_schema = Some(enabled);
        self
    }

    pub fn enable_logging(mut self, enabled: bool) -> Self {
        self.enable_logging = Some(enabled);
        self
    }

    pub(crate) fn resolve(&self, config: &PersistenceConfig) -> ResolvedOptions {
        ResolvedOptions {
            timeout: Duration::from_millis(self.timeout_ms.unwrap_or(config.timeout_ms).max(1)),
            max_retries: self.max_retries.unwrap_or(config.max_retries),
            validate_schema: self.validate_schema.unwrap_or(true),
            enable_logging: self.enable_logging.unwrap_or(true),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ResolvedOptions {
    pub timeout: Duration,
    pub max_retries: u32,
    pub validate_schema: bool,
    pub enable_logging: bool,
}
