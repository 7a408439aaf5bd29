//! Per-provider health tracking over a sliding failure window.
//!
//! A provider turns Unhealthy once failures inside the window reach the
//! configured threshold, and stays Unhealthy until an active probe succeeds.
//! Time passing alone never restores it.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;

use ensemble_llm::DynProvider;

use crate::config::HealthConfig;

// ---------------------------------------------------------------------------
// HealthStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    /// Recent failures below the threshold. Still eligible for calls.
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_available(self) -> bool {
        !matches!(self, HealthStatus::Unhealthy)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        };
        f.pad(s)
    }
}

/// Point-in-time view of one provider's health record.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub provider: String,
    pub status: HealthStatus,
    pub failures_in_window: usize,
    pub total_failures: u64,
    pub last_checked: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// HealthRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct HealthRecord {
    failures: VecDeque<Instant>,
    unhealthy: bool,
    last_probe: Option<Instant>,
    last_checked: Option<DateTime<Utc>>,
    total_failures: u64,
}

impl HealthRecord {
    fn prune(&mut self, now: Instant, config: &HealthConfig) {
        while let Some(oldest) = self.failures.front() {
            if now.duration_since(*oldest) >= config.failure_window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }

    fn status(&self) -> HealthStatus {
        if self.unhealthy {
            HealthStatus::Unhealthy
        } else if !self.failures.is_empty() {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    /// Returns `true` if this failure tripped the threshold.
    fn push_failure(&mut self, now: Instant, config: &HealthConfig) -> bool {
        self.failures.push_back(now);
        self.total_failures += 1;
        if !self.unhealthy && self.failures.len() >= config.failure_threshold as usize {
            self.unhealthy = true;
            return true;
        }
        false
    }
}

// ---------------------------------------------------------------------------
// HealthMonitor
// ---------------------------------------------------------------------------

/// Owns one health record per registered provider, each behind its own lock.
#[derive(Debug)]
pub struct HealthMonitor {
    config: HealthConfig,
    order: Vec<String>,
    records: HashMap<String, Mutex<HealthRecord>>,
}

impl HealthMonitor {
    pub fn new<I, S>(config: HealthConfig, providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut order = Vec::new();
        let mut records = HashMap::new();
        for name in providers {
            let name = name.into();
            if records
                .insert(name.clone(), Mutex::new(HealthRecord::default()))
                .is_none()
            {
                order.push(name);
            }
        }
        Self {
            config,
            order,
            records,
        }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Unknown providers read as Unhealthy.
    pub fn status(&self, provider: &str) -> HealthStatus {
        let Some(record) = self.records.get(provider) else {
            return HealthStatus::Unhealthy;
        };
        let mut record = record.lock();
        record.prune(Instant::now(), &self.config);
        record.status()
    }

    /// Healthy or Degraded.
    pub fn is_healthy(&self, provider: &str) -> bool {
        self.status(provider).is_available()
    }

    /// Record the outcome of a real call and return the resulting status.
    pub fn record_outcome(&self, provider: &str, success: bool) -> HealthStatus {
        let Some(record) = self.records.get(provider) else {
            tracing::warn!(provider, "Outcome recorded for unregistered provider");
            return HealthStatus::Unhealthy;
        };
        let now = Instant::now();
        let mut record = record.lock();
        record.prune(now, &self.config);
        if !success && record.push_failure(now, &self.config) {
            tracing::warn!(
                provider,
                failures = record.failures.len(),
                window_secs = self.config.failure_window.as_secs(),
                "Provider marked unhealthy"
            );
        }
        record.status()
    }

    /// Actively probe a provider, bounded by the configured timeout.
    ///
    /// Success lifts an Unhealthy verdict and clears its failure window;
    /// failure (including timeout) counts as one failure.
    pub async fn probe(&self, provider: &DynProvider) -> bool {
        let name = provider.name();
        let healthy = tokio::time::timeout(self.config.timeout, provider.check_health())
            .await
            .unwrap_or_else(|_| {
                tracing::debug!(provider = name, "Health probe timed out");
                false
            });

        let Some(record) = self.records.get(name) else {
            return healthy;
        };
        let now = Instant::now();
        let mut record = record.lock();
        record.last_probe = Some(now);
        record.last_checked = Some(Utc::now());
        record.prune(now, &self.config);

        if healthy {
            // Only a recovery resets the window.
            if record.unhealthy {
                tracing::info!(provider = name, "Provider recovered after successful probe");
                record.unhealthy = false;
                record.failures.clear();
            }
        } else if record.push_failure(now, &self.config) {
            tracing::warn!(provider = name, "Provider marked unhealthy by probe");
        }
        healthy
    }

    /// Whether the provider has not been probed within `probe_interval`.
    pub fn needs_probe(&self, provider: &str) -> bool {
        let Some(record) = self.records.get(provider) else {
            return false;
        };
        match record.lock().last_probe {
            None => true,
            Some(at) => at.elapsed() >= self.config.probe_interval,
        }
    }

    /// Lifetime number of recorded failures.
    pub fn failure_count(&self, provider: &str) -> u64 {
        self.records
            .get(provider)
            .map(|r| r.lock().total_failures)
            .unwrap_or(0)
    }

    pub fn report(&self, provider: &str) -> Option<HealthReport> {
        let record = self.records.get(provider)?;
        let mut record = record.lock();
        record.prune(Instant::now(), &self.config);
        Some(HealthReport {
            provider: provider.to_string(),
            status: record.status(),
            failures_in_window: record.failures.len(),
            total_failures: record.total_failures,
            last_checked: record.last_checked,
        })
    }

    /// Reports for every provider in registration order.
    pub fn snapshot(&self) -> Vec<HealthReport> {
        self.order.iter().filter_map(|p| self.report(p)).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
