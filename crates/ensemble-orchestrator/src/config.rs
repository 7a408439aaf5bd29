//! Startup configuration. Immutable for the lifetime of an orchestrator.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use ensemble_types::{EnsembleError, Result};

// ---------------------------------------------------------------------------
// OrchestratorConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub rate_limit: RateLimitConfig,
    pub health: HealthConfig,
    pub cache: CacheConfig,
}

impl OrchestratorConfig {
    /// Load a JSON configuration file. Missing sections fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    pub fn from_json_str(data: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let rl = &self.rate_limit;
        if rl.requests_per_minute == 0 || rl.tokens_per_minute == 0 || rl.concurrent_requests == 0
        {
            return Err(EnsembleError::Config(
                "rate limit ceilings must be greater than zero".into(),
            ));
        }
        if !(rl.throttle_factor > 0.0 && rl.throttle_factor <= 1.0) {
            return Err(EnsembleError::Config(format!(
                "throttle_factor must be in (0, 1], got {}",
                rl.throttle_factor
            )));
        }
        if rl.window.is_zero() {
            return Err(EnsembleError::Config("rate limit window must be non-zero".into()));
        }
        if self.health.failure_threshold == 0 {
            return Err(EnsembleError::Config(
                "failure_threshold must be greater than zero".into(),
            ));
        }
        if self.health.timeout.is_zero() || self.health.probe_interval.is_zero() {
            return Err(EnsembleError::Config(
                "health timeout and probe_interval must be non-zero".into(),
            ));
        }
        if self.cache.max_entries == 0 {
            return Err(EnsembleError::Config(
                "cache max_entries must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RateLimitConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub tokens_per_minute: u64,
    pub concurrent_requests: u32,
    /// Tighten ceilings while a provider is Degraded or Unhealthy.
    pub adaptive_throttling: bool,
    /// Multiplier applied to every ceiling while throttled.
    pub throttle_factor: f64,
    /// Hint returned when the concurrency ceiling rejects a call.
    #[serde(with = "crate::duration_serde")]
    pub retry_after: Duration,
    /// Length of the fixed counting window.
    #[serde(with = "crate::duration_serde")]
    pub window: Duration,
    pub scope: LimitScope,
    pub mode: AdmissionMode,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            tokens_per_minute: 100_000,
            concurrent_requests: 5,
            adaptive_throttling: true,
            throttle_factor: 0.5,
            retry_after: Duration::from_secs(1),
            window: Duration::from_secs(60),
            scope: LimitScope::PerProvider,
            mode: AdmissionMode::Reject,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitScope {
    #[default]
    PerProvider,
    Global,
}

/// What the limiter does when a ceiling would be exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdmissionMode {
    /// Reject immediately with a retry-after hint.
    #[default]
    Reject,
    /// Sleep for the retry-after hint and try again, up to `max_wait`.
    Wait {
        #[serde(with = "crate::duration_serde")]
        max_wait: Duration,
    },
}

// ---------------------------------------------------------------------------
// HealthConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Deadline for a single active probe.
    #[serde(with = "crate::duration_serde")]
    pub timeout: Duration,
    pub failure_threshold: u32,
    #[serde(with = "crate::duration_serde")]
    pub failure_window: Duration,
    /// Period of background probes; also the staleness bound for lazy probes.
    #[serde(with = "crate::duration_serde")]
    pub probe_interval: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            failure_threshold: 3,
            failure_window: Duration::from_secs(5 * 60),
            probe_interval: Duration::from_secs(60),
        }
    }
}

// ---------------------------------------------------------------------------
// CacheConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    #[serde(with = "crate::duration_serde")]
    pub ttl: Duration,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(24 * 3600),
            max_entries: 1000,
        }
    }
}
