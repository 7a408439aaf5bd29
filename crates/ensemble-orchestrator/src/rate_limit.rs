//! Admission control: requests-per-window, tokens-per-window and in-flight
//! ceilings, per provider or global, with adaptive throttling.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use ensemble_types::{EnsembleError, Result};

use crate::config::{AdmissionMode, LimitScope, RateLimitConfig};
use crate::health::{HealthMonitor, HealthStatus};

// ---------------------------------------------------------------------------
// Admission
// ---------------------------------------------------------------------------

/// Outcome of an admission check. Rejection is a control signal, not an error.
#[derive(Debug)]
pub enum Admission {
    Admitted(Permit),
    Rejected { retry_after: Duration },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted(_))
    }
}

// ---------------------------------------------------------------------------
// LimiterState
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct LimiterState {
    window_index: u64,
    requests: u32,
    tokens: u64,
    in_flight: u32,
}

impl LimiterState {
    fn roll(&mut self, window_index: u64) {
        if window_index != self.window_index {
            self.window_index = window_index;
            self.requests = 0;
            self.tokens = 0;
        }
    }
}

/// Counters of one limiter state, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LimiterUsage {
    pub requests: u32,
    pub tokens: u64,
    pub in_flight: u32,
}

// ---------------------------------------------------------------------------
// Permit
// ---------------------------------------------------------------------------

/// Holds one in-flight slot; dropping it releases the slot.
#[derive(Debug)]
pub struct Permit {
    state: Arc<Mutex<LimiterState>>,
    estimated_tokens: u64,
    clock: Arc<Clock>,
}

impl Permit {
    /// Charge tokens actually used beyond the admission estimate to the
    /// current window.
    pub fn settle(&self, actual_tokens: u64) {
        let extra = actual_tokens.saturating_sub(self.estimated_tokens);
        if extra == 0 {
            return;
        }
        let (index, _) = self.clock.position(Instant::now());
        let mut state = self.state.lock();
        state.roll(index);
        state.tokens = state.tokens.saturating_add(extra);
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Fixed, non-overlapping windows aligned to the limiter's epoch.
#[derive(Debug)]
struct Clock {
    epoch: Instant,
    window: Duration,
}

impl Clock {
    /// Window index at `now` and the time remaining until the next boundary.
    fn position(&self, now: Instant) -> (u64, Duration) {
        let elapsed = now.duration_since(self.epoch).as_nanos();
        let window = self.window.as_nanos().max(1);
        let index = elapsed / window;
        let next_boundary = (index + 1) * window;
        let remaining = Duration::from_nanos((next_boundary - elapsed) as u64);
        (index as u64, remaining)
    }
}

// ---------------------------------------------------------------------------
// RateLimiter
// ---------------------------------------------------------------------------

pub struct RateLimiter {
    config: RateLimitConfig,
    clock: Arc<Clock>,
    states: HashMap<String, Arc<Mutex<LimiterState>>>,
    global: Arc<Mutex<LimiterState>>,
    health: Arc<HealthMonitor>,
}

impl RateLimiter {
    pub fn new<I, S>(config: RateLimitConfig, providers: I, health: Arc<HealthMonitor>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let states = providers
            .into_iter()
            .map(|p| (p.into(), Arc::new(Mutex::new(LimiterState::default()))))
            .collect();
        Self {
            clock: Arc::new(Clock {
                epoch: Instant::now(),
                window: config.window,
            }),
            config,
            states,
            global: Arc::new(Mutex::new(LimiterState::default())),
            health,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn state_for(&self, provider: &str) -> Option<&Arc<Mutex<LimiterState>>> {
        match self.config.scope {
            LimitScope::Global => self.states.get(provider).map(|_| &self.global),
            LimitScope::PerProvider => self.states.get(provider),
        }
    }

    /// Whether adaptive throttling currently applies to `provider`.
    pub fn is_throttled(&self, provider: &str) -> bool {
        self.config.adaptive_throttling && self.health.status(provider) != HealthStatus::Healthy
    }

    fn ceiling(&self, base: u64, throttled: bool) -> u64 {
        if throttled {
            ((base as f64 * self.config.throttle_factor).floor() as u64).max(1)
        } else {
            base
        }
    }

    /// Non-blocking admission check.
    pub fn try_acquire(&self, provider: &str, estimated_tokens: u64) -> Admission {
        let Some(state) = self.state_for(provider) else {
            tracing::warn!(provider, "Admission requested for unregistered provider");
            return Admission::Rejected {
                retry_after: self.config.retry_after,
            };
        };

        let throttled = self.is_throttled(provider);
        let rpm = self.ceiling(self.config.requests_per_minute as u64, throttled);
        let tpm = self.ceiling(self.config.tokens_per_minute, throttled);
        let concurrency = self.ceiling(self.config.concurrent_requests as u64, throttled);

        let (index, until_boundary) = self.clock.position(Instant::now());
        let mut guard = state.lock();
        guard.roll(index);

        if guard.requests as u64 + 1 > rpm {
            tracing::debug!(provider, requests = guard.requests, rpm, "Request ceiling reached");
            return Admission::Rejected {
                retry_after: until_boundary,
            };
        }
        // An oversized prompt is still admitted into an empty window so it cannot starve.
        if guard.tokens > 0 && guard.tokens + estimated_tokens > tpm {
            tracing::debug!(provider, tokens = guard.tokens, tpm, "Token ceiling reached");
            return Admission::Rejected {
                retry_after: until_boundary,
            };
        }
        if guard.in_flight as u64 + 1 > concurrency {
            tracing::debug!(provider, in_flight = guard.in_flight, "Concurrency ceiling reached");
            return Admission::Rejected {
                retry_after: self.config.retry_after,
            };
        }

        guard.requests += 1;
        guard.tokens += estimated_tokens;
        guard.in_flight += 1;
        drop(guard);

        Admission::Admitted(Permit {
            state: state.clone(),
            estimated_tokens,
            clock: self.clock.clone(),
        })
    }

    /// Admission honoring the configured mode. In `Wait` mode the call sleeps
    /// on the retry-after hint until admitted, `max_wait` is exhausted, or
    /// `cancel` fires.
    pub async fn acquire(
        &self,
        provider: &str,
        estimated_tokens: u64,
        cancel: &CancellationToken,
    ) -> Result<Admission> {
        let max_wait = match self.config.mode {
            AdmissionMode::Reject => return Ok(self.try_acquire(provider, estimated_tokens)),
            AdmissionMode::Wait { max_wait } => max_wait,
        };

        let deadline = Instant::now() + max_wait;
        loop {
            if cancel.is_cancelled() {
                return Err(EnsembleError::Cancelled);
            }
            let retry_after = match self.try_acquire(provider, estimated_tokens) {
                admitted @ Admission::Admitted(_) => return Ok(admitted),
                Admission::Rejected { retry_after } => retry_after,
            };
            if Instant::now() + retry_after > deadline {
                return Ok(Admission::Rejected { retry_after });
            }
            tracing::debug!(provider, wait_ms = retry_after.as_millis() as u64, "Waiting for admission");
            tokio::select! {
                _ = cancel.cancelled() => return Err(EnsembleError::Cancelled),
                _ = tokio::time::sleep(retry_after) => {}
            }
        }
    }

    /// Current counters for the state governing `provider`.
    pub fn usage(&self, provider: &str) -> Option<LimiterUsage> {
        let state = self.state_for(provider)?;
        let (index, _) = self.clock.position(Instant::now());
        let mut guard = state.lock();
        guard.roll(index);
        Some(LimiterUsage {
            requests: guard.requests,
            tokens: guard.tokens,
            in_flight: guard.in_flight,
        })
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("providers", &self.states.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
