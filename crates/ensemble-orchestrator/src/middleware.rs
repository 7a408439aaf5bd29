use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

use ensemble_llm::{LlmResponse, Prompt};
use ensemble_types::Result;

// ---------------------------------------------------------------------------
// Middleware
// ---------------------------------------------------------------------------

/// Observes every outbound provider call. Hooks run on the calling task and
/// must not block.
pub trait Middleware: Send + Sync {
    fn before(&self, _provider: &str, _prompt: &Prompt) {}
    fn after(&self, _provider: &str, _result: &Result<LlmResponse>, _elapsed: Duration) {}
}

// ---------------------------------------------------------------------------
// Built-in middleware: LoggingMiddleware
// ---------------------------------------------------------------------------

pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn before(&self, provider: &str, prompt: &Prompt) {
        tracing::info!(
            provider,
            estimated_tokens = prompt.estimated_tokens(),
            "LLM request"
        );
    }

    fn after(&self, provider: &str, result: &Result<LlmResponse>, elapsed: Duration) {
        match result {
            Ok(response) => tracing::info!(
                provider,
                model = %response.model,
                input_tokens = response.usage.input_tokens,
                output_tokens = response.usage.output_tokens,
                elapsed_ms = elapsed.as_millis() as u64,
                "LLM response"
            ),
            Err(e) => tracing::warn!(
                provider,
                error = %e,
                elapsed_ms = elapsed.as_millis() as u64,
                "LLM call failed"
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Built-in middleware: UsageTracker
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ProviderCounters {
    calls: AtomicU64,
    failures: AtomicU64,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
    latency_ms: AtomicU64,
}

/// Snapshot of one provider's call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProviderMetrics {
    pub calls: u64,
    pub failures: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_latency_ms: u64,
}

impl ProviderMetrics {
    pub fn avg_latency_ms(&self) -> u64 {
        if self.calls == 0 {
            0
        } else {
            self.total_latency_ms / self.calls
        }
    }
}

/// Per-provider call, failure, token and latency counters. The provider set
/// is fixed at construction so recording never takes a lock.
#[derive(Debug, Default)]
pub struct UsageTracker {
    counters: HashMap<String, ProviderCounters>,
}

impl UsageTracker {
    pub fn new<I, S>(providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            counters: providers
                .into_iter()
                .map(|p| (p.into(), ProviderCounters::default()))
                .collect(),
        }
    }

    pub fn get(&self, provider: &str) -> Option<ProviderMetrics> {
        let c = self.counters.get(provider)?;
        Some(ProviderMetrics {
            calls: c.calls.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
            input_tokens: c.input_tokens.load(Ordering::Relaxed),
            output_tokens: c.output_tokens.load(Ordering::Relaxed),
            total_latency_ms: c.latency_ms.load(Ordering::Relaxed),
        })
    }

    pub fn total_input_tokens(&self) -> u64 {
        self.counters
            .values()
            .map(|c| c.input_tokens.load(Ordering::Relaxed))
            .sum()
    }

    pub fn total_output_tokens(&self) -> u64 {
        self.counters
            .values()
            .map(|c| c.output_tokens.load(Ordering::Relaxed))
            .sum()
    }
}

impl Middleware for UsageTracker {
    fn after(&self, provider: &str, result: &Result<LlmResponse>, elapsed: Duration) {
        let Some(c) = self.counters.get(provider) else {
            return;
        };
        c.calls.fetch_add(1, Ordering::Relaxed);
        c.latency_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
        match result {
            Ok(response) => {
                c.input_tokens
                    .fetch_add(response.usage.input_tokens, Ordering::Relaxed);
                c.output_tokens
                    .fetch_add(response.usage.output_tokens, Ordering::Relaxed);
            }
            Err(_) => {
                c.failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use ensemble_llm::Usage;
    use ensemble_types::EnsembleError;

    #[test]
    fn tracker_counts_success_and_failure() {
        let tracker = UsageTracker::new(["a"]);
        let ok: Result<LlmResponse> = Ok(LlmResponse::new("hi", "m").with_usage(Usage::new(10, 20)));
        let err: Result<LlmResponse> = Err(EnsembleError::Timeout {
            provider: "a".into(),
            timeout_ms: 100,
        });
        tracker.after("a", &ok, Duration::from_millis(100));
        tracker.after("a", &err, Duration::from_millis(300));

        let metrics = tracker.get("a").unwrap();
        assert_eq!(metrics.calls, 2);
        assert_eq!(metrics.failures, 1);
        assert_eq!(metrics.input_tokens, 10);
        assert_eq!(metrics.output_tokens, 20);
        assert_eq!(metrics.avg_latency_ms(), 200);
        assert_eq!(tracker.total_input_tokens(), 10);
        assert_eq!(tracker.total_output_tokens(), 20);
    }

    #[test]
    fn tracker_ignores_unknown_provider() {
        let tracker = UsageTracker::new(["a"]);
        let ok: Result<LlmResponse> = Ok(LlmResponse::new("hi", "m"));
        tracker.after("b", &ok, Duration::ZERO);
        assert!(tracker.get("b").is_none());
        assert_eq!(tracker.get("a").unwrap(), ProviderMetrics::default());
    }

    #[test]
    fn avg_latency_of_no_calls_is_zero() {
        assert_eq!(ProviderMetrics::default().avg_latency_ms(), 0);
    }

    #[test]
    fn logging_middleware_handles_both_outcomes() {
        let prompt = Prompt::new("hello");
        LoggingMiddleware.before("a", &prompt);
        LoggingMiddleware.after("a", &Ok(LlmResponse::new("x", "m")), Duration::from_millis(5));
        LoggingMiddleware.after("a", &Err(EnsembleError::Cancelled), Duration::ZERO);
    }
}
