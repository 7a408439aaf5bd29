//! Multi-provider orchestration for Ensemble.
//!
//! The [`Orchestrator`] owns one [`HealthMonitor`], one [`RateLimiter`] and
//! one [`ResponseCache`], and routes each [`GenerationRequest`] to a single
//! provider, to every eligible provider concurrently, or to the best-scored
//! of them.

pub mod cache;
pub mod config;
mod duration_serde;
pub mod health;
pub mod middleware;
mod orchestrator;
pub mod rate_limit;
pub mod scorer;

pub use cache::{CacheStats, ResponseCache};
pub use config::{
    AdmissionMode, CacheConfig, HealthConfig, LimitScope, OrchestratorConfig, RateLimitConfig,
};
pub use duration_serde::{format_duration, parse_duration_str};
pub use health::{HealthMonitor, HealthReport, HealthStatus};
pub use middleware::{LoggingMiddleware, Middleware, ProviderMetrics, UsageTracker};
pub use orchestrator::{GenerationRequest, Orchestrator, OrchestratorBuilder};
pub use rate_limit::{Admission, LimiterUsage, Permit, RateLimiter};
pub use scorer::{DefaultScorer, ResponseScorer};
pub use tokio_util::sync::CancellationToken;
