use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use ensemble_llm::{ensure_embeddable, DynProvider, Prompt, ProviderAdapter, ProviderResponse};
use ensemble_types::{EnsembleError, Result};

use crate::cache::{CacheStats, ResponseCache};
use crate::config::OrchestratorConfig;
use crate::health::{HealthMonitor, HealthReport};
use crate::middleware::{Middleware, ProviderMetrics, UsageTracker};
use crate::rate_limit::{Admission, Permit, RateLimiter};
use crate::scorer::{DefaultScorer, ResponseScorer};

// ---------------------------------------------------------------------------
// GenerationRequest
// ---------------------------------------------------------------------------

/// A generation request as submitted by an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: Prompt,
    /// Restricts and orders the candidate set. Empty means every provider in
    /// registration order. Unknown names are ignored.
    pub preferred_providers: Vec<String>,
    /// Skip the cache lookup. A successful result still refreshes the entry.
    pub bypass_cache: bool,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<Prompt>) -> Self {
        Self {
            prompt: prompt.into(),
            preferred_providers: Vec::new(),
            bypass_cache: false,
        }
    }

    pub fn prefer(mut self, provider: impl Into<String>) -> Self {
        self.preferred_providers.push(provider.into());
        self
    }

    pub fn with_bypass_cache(mut self, bypass: bool) -> Self {
        self.bypass_cache = bypass;
        self
    }
}

// ---------------------------------------------------------------------------
// Skip reasons
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Skip {
    Unhealthy,
    ProbeFailed,
    RateLimited(Duration),
}

impl std::fmt::Display for Skip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Skip::Unhealthy => f.write_str("unhealthy"),
            Skip::ProbeFailed => f.write_str("health probe failed"),
            Skip::RateLimited(d) => write!(f, "rate limited (retry after {}ms)", d.as_millis()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum CacheScope {
    One,
    All,
}

impl CacheScope {
    fn as_str(self) -> &'static str {
        match self {
            CacheScope::One => "one",
            CacheScope::All => "all",
        }
    }
}

// ---------------------------------------------------------------------------
// OrchestratorBuilder
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    providers: Vec<DynProvider>,
    scorer: Option<Box<dyn ResponseScorer>>,
    middleware: Vec<Box<dyn Middleware>>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Register an adapter. Registration order is the default candidate
    /// order and the scorer's final tie-breaker.
    pub fn register(mut self, adapter: impl ProviderAdapter + 'static) -> Self {
        self.providers.push(DynProvider::new(adapter));
        self
    }

    pub fn register_dyn(mut self, provider: DynProvider) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn scorer(mut self, scorer: impl ResponseScorer + 'static) -> Self {
        self.scorer = Some(Box::new(scorer));
        self
    }

    pub fn middleware(mut self, m: impl Middleware + 'static) -> Self {
        self.middleware.push(Box::new(m));
        self
    }

    pub fn build(self) -> Result<Orchestrator> {
        self.config.validate()?;
        if self.providers.is_empty() {
            return Err(EnsembleError::Config(
                "at least one provider must be registered".into(),
            ));
        }

        let mut index = HashMap::new();
        for (i, provider) in self.providers.iter().enumerate() {
            if index.insert(provider.name().to_string(), i).is_some() {
                return Err(EnsembleError::Config(format!(
                    "duplicate provider name '{}'",
                    provider.name()
                )));
            }
        }

        let names: Vec<String> = self.providers.iter().map(|p| p.name().to_string()).collect();
        let health = Arc::new(HealthMonitor::new(
            self.config.health.clone(),
            names.iter().cloned(),
        ));
        let limiter = RateLimiter::new(
            self.config.rate_limit.clone(),
            names.iter().cloned(),
            health.clone(),
        );

        tracing::info!(
            providers = ?names,
            cache_enabled = self.config.cache.enabled,
            "Orchestrator ready"
        );

        Ok(Orchestrator {
            cache: ResponseCache::new(&self.config.cache),
            usage: UsageTracker::new(names),
            scorer: self.scorer.unwrap_or_else(|| Box::new(DefaultScorer)),
            middleware: self.middleware,
            providers: self.providers,
            index,
            health,
            limiter,
            config: self.config,
        })
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Routes requests across registered providers, consulting health, limits
/// and the response cache. All operations take `&self`; share it behind an
/// `Arc`.
pub struct Orchestrator {
    providers: Vec<DynProvider>,
    index: HashMap<String, usize>,
    config: OrchestratorConfig,
    health: Arc<HealthMonitor>,
    limiter: RateLimiter,
    cache: ResponseCache<Vec<ProviderResponse>>,
    scorer: Box<dyn ResponseScorer>,
    middleware: Vec<Box<dyn Middleware>>,
    usage: UsageTracker,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    // -- Generation ---------------------------------------------------------

    /// Generate from the first eligible provider.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<ProviderResponse> {
        ensure_prompt(&request.prompt)?;
        if cancel.is_cancelled() {
            return Err(EnsembleError::Cancelled);
        }
        let candidates = self.candidates(&request.preferred_providers)?;
        let key = self.cache_key(CacheScope::One, &candidates, request);

        if !request.bypass_cache {
            if let Some(hit) = self.cache.lookup(&key).and_then(|mut v| v.pop()) {
                tracing::debug!(provider = %hit.provider, "Cache hit");
                return Ok(hit);
            }
        }

        let estimated = request.prompt.estimated_tokens();
        let mut skipped = Vec::new();
        for &idx in &candidates {
            match self.admit(idx, estimated, cancel).await? {
                Ok(permit) => {
                    let response = self.call(idx, &request.prompt, permit, cancel).await?;
                    self.cache.insert_default(key, vec![response.clone()]);
                    return Ok(response);
                }
                Err(skip) => {
                    tracing::debug!(provider = %self.providers[idx].name(), reason = %skip, "Skipping provider");
                    skipped.push((idx, skip));
                }
            }
        }
        Err(self.no_eligible(&skipped))
    }

    /// Fan the request out to every eligible provider concurrently.
    ///
    /// Per-provider failures are recorded against health and absorbed; only
    /// zero successes is an error. Order of the result is unspecified.
    pub async fn generate_from_all(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<ProviderResponse>> {
        ensure_prompt(&request.prompt)?;
        if cancel.is_cancelled() {
            return Err(EnsembleError::Cancelled);
        }
        let candidates = self.candidates(&request.preferred_providers)?;
        let key = self.cache_key(CacheScope::All, &candidates, request);

        if !request.bypass_cache {
            if let Some(hit) = self.cache.lookup(&key).filter(|v| !v.is_empty()) {
                tracing::debug!(responses = hit.len(), "Cache hit");
                return Ok(hit);
            }
        }

        let estimated = request.prompt.estimated_tokens();
        let attempts = candidates.iter().map(move |&idx| async move {
            match self.admit(idx, estimated, cancel).await? {
                Ok(permit) => self.call(idx, &request.prompt, permit, cancel).await.map(Some),
                Err(skip) => {
                    tracing::debug!(provider = %self.providers[idx].name(), reason = %skip, "Skipping provider");
                    Ok(None)
                }
            }
        });
        let results = join_all(attempts).await;

        if cancel.is_cancelled() {
            return Err(EnsembleError::Cancelled);
        }

        let responses: Vec<ProviderResponse> = results
            .into_iter()
            .filter_map(|r| r.ok().flatten())
            .collect();
        if responses.is_empty() {
            return Err(EnsembleError::AllProvidersFailed {
                attempted: candidates.len(),
            });
        }

        tracing::info!(
            responses = responses.len(),
            candidates = candidates.len(),
            "Fan-out complete"
        );
        self.cache.insert_default(key, responses.clone());
        Ok(responses)
    }

    /// Fan out, then keep the response the scorer ranks first.
    pub async fn generate_best(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<ProviderResponse> {
        let responses = self.generate_from_all(request, cancel).await?;
        self.scorer
            .select_best(&responses)
            .ok_or_else(|| EnsembleError::ProviderUnavailable {
                reason: "scorer selected no response".into(),
            })
    }

    // -- Embeddings ---------------------------------------------------------

    /// Embed `text` with the named provider, or the first eligible one.
    /// Embeddings are never cached.
    pub async fn embed(
        &self,
        text: &str,
        provider: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<f32>> {
        ensure_embeddable(text)?;
        if cancel.is_cancelled() {
            return Err(EnsembleError::Cancelled);
        }
        let preferred: Vec<String> = provider.map(String::from).into_iter().collect();
        let candidates = self.candidates(&preferred)?;
        let estimated = Prompt::new(text).estimated_tokens();

        let mut skipped = Vec::new();
        for &idx in &candidates {
            let _permit = match self.admit(idx, estimated, cancel).await? {
                Ok(permit) => permit,
                Err(skip) => {
                    skipped.push((idx, skip));
                    continue;
                }
            };
            let adapter = &self.providers[idx];
            let name = adapter.name();

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(EnsembleError::Cancelled),
                r = adapter.embed(text) => r,
            };
            let result = result.and_then(|vector| match adapter.embedding_dimensions() {
                Some(expected) if vector.len() != expected => {
                    Err(EnsembleError::MalformedResponse {
                        provider: name.to_string(),
                        message: format!(
                            "expected {expected}-dimensional embedding, got {}",
                            vector.len()
                        ),
                    })
                }
                _ => Ok(vector),
            });

            return match result {
                Ok(vector) => {
                    self.health.record_outcome(name, true);
                    Ok(vector)
                }
                Err(e) => {
                    self.record_failure(name, &e);
                    Err(e)
                }
            };
        }
        Err(self.no_eligible(&skipped))
    }

    // -- Health -------------------------------------------------------------

    /// Probe one provider now.
    pub async fn probe(&self, provider: &str) -> Result<bool> {
        let idx = self.index.get(provider).copied().ok_or_else(|| {
            EnsembleError::InvalidArgument(format!("unknown provider '{provider}'"))
        })?;
        Ok(self.health.probe(&self.providers[idx]).await)
    }

    /// Probe every provider concurrently. Results are in registration order.
    pub async fn probe_all(&self) -> Vec<(String, bool)> {
        let probes = self.providers.iter().map(move |p| async move {
            (p.name().to_string(), self.health.probe(p).await)
        });
        join_all(probes).await
    }

    /// Spawn the periodic prober. Runs every `health.probe_interval` until
    /// `shutdown` is cancelled. Periodic probes are the only path back from
    /// Unhealthy.
    pub fn spawn_health_probes(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let period = this.config.health.probe_interval;
            tracing::info!(interval_ms = period.as_millis() as u64, "Starting health prober");
            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        let results = this.probe_all().await;
                        let healthy = results.iter().filter(|(_, ok)| *ok).count();
                        tracing::debug!(healthy, total = results.len(), "Health probe cycle complete");
                    }
                    _ = shutdown.cancelled() => {
                        tracing::info!("Shutdown signal received, stopping health prober");
                        break;
                    }
                }
            }
        })
    }

    /// Whether any provider is Healthy or Degraded.
    pub fn is_healthy(&self) -> bool {
        self.providers.iter().any(|p| self.health.is_healthy(p.name()))
    }

    pub fn health_snapshot(&self) -> Vec<HealthReport> {
        self.health.snapshot()
    }

    // -- Accessors ----------------------------------------------------------

    /// Provider names in registration order.
    pub fn providers(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn cache(&self) -> &ResponseCache<Vec<ProviderResponse>> {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn scorer(&self) -> &dyn ResponseScorer {
        self.scorer.as_ref()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Built-in call counters, in registration order.
    pub fn metrics(&self) -> Vec<(String, ProviderMetrics)> {
        self.providers
            .iter()
            .filter_map(|p| {
                self.usage
                    .get(p.name())
                    .map(|m| (p.name().to_string(), m))
            })
            .collect()
    }

    // -- Internals ----------------------------------------------------------

    fn candidates(&self, preferred: &[String]) -> Result<Vec<usize>> {
        if preferred.is_empty() {
            return Ok((0..self.providers.len()).collect());
        }
        let mut out = Vec::with_capacity(preferred.len());
        for name in preferred {
            match self.index.get(name) {
                Some(&idx) if !out.contains(&idx) => out.push(idx),
                Some(_) => {}
                None => tracing::debug!(provider = %name, "Ignoring unknown preferred provider"),
            }
        }
        if out.is_empty() {
            return Err(EnsembleError::ProviderUnavailable {
                reason: format!(
                    "none of the preferred providers are registered: {}",
                    preferred.join(", ")
                ),
            });
        }
        Ok(out)
    }

    fn cache_key(&self, scope: CacheScope, candidates: &[usize], request: &GenerationRequest) -> String {
        let providers = if request.preferred_providers.is_empty() {
            "*".to_string()
        } else {
            candidates
                .iter()
                .map(|&i| self.providers[i].name())
                .collect::<Vec<_>>()
                .join(",")
        };
        format!("{}:{}:{}", scope.as_str(), providers, request.prompt.fingerprint())
    }

    /// Health filter, lazy probe, then limiter admission. The outer error is
    /// reserved for cancellation.
    async fn admit(
        &self,
        idx: usize,
        estimated_tokens: u64,
        cancel: &CancellationToken,
    ) -> Result<std::result::Result<Permit, Skip>> {
        let provider = &self.providers[idx];
        let name = provider.name();

        if !self.health.is_healthy(name) {
            return Ok(Err(Skip::Unhealthy));
        }
        if self.health.needs_probe(name) {
            let healthy = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(EnsembleError::Cancelled),
                ok = self.health.probe(provider) => ok,
            };
            if !healthy {
                return Ok(Err(Skip::ProbeFailed));
            }
        }

        if cancel.is_cancelled() {
            return Err(EnsembleError::Cancelled);
        }
        match self.limiter.acquire(name, estimated_tokens, cancel).await? {
            Admission::Admitted(permit) => Ok(Ok(permit)),
            Admission::Rejected { retry_after } => Ok(Err(Skip::RateLimited(retry_after))),
        }
    }

    /// One adapter call wrapped in middleware, cancellation and outcome
    /// recording. The permit is held until the call settles.
    async fn call(
        &self,
        idx: usize,
        prompt: &Prompt,
        permit: Permit,
        cancel: &CancellationToken,
    ) -> Result<ProviderResponse> {
        let provider = &self.providers[idx];
        let name = provider.name();

        for m in &self.middleware {
            m.before(name, prompt);
        }
        let started = Instant::now();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(provider = %name, "Provider call cancelled");
                return Err(EnsembleError::Cancelled);
            }
            r = provider.generate(prompt) => r,
        };
        let elapsed = started.elapsed();

        self.usage.after(name, &result, elapsed);
        for m in &self.middleware {
            m.after(name, &result, elapsed);
        }

        match result {
            Ok(response) => {
                self.health.record_outcome(name, true);
                permit.settle(response.usage.total_tokens);
                Ok(ProviderResponse {
                    provider: name.to_string(),
                    registration_index: idx,
                    response,
                })
            }
            Err(e) => {
                self.record_failure(name, &e);
                Err(e)
            }
        }
    }

    fn record_failure(&self, provider: &str, error: &EnsembleError) {
        tracing::warn!(provider = %provider, error = %error, "Provider call failed");
        if error.is_provider_failure() {
            self.health.record_outcome(provider, false);
        }
    }

    fn no_eligible(&self, skipped: &[(usize, Skip)]) -> EnsembleError {
        if let [(idx, skip)] = skipped {
            let provider = self.providers[*idx].name().to_string();
            match skip {
                Skip::Unhealthy => return EnsembleError::Unhealthy { provider },
                Skip::RateLimited(d) => {
                    return EnsembleError::RateLimited {
                        provider,
                        retry_after_ms: d.as_millis() as u64,
                    }
                }
                Skip::ProbeFailed => {}
            }
        }

        let limited: Option<Vec<(usize, Duration)>> = skipped
            .iter()
            .map(|(idx, skip)| match skip {
                Skip::RateLimited(d) => Some((*idx, *d)),
                _ => None,
            })
            .collect();
        if let Some((idx, wait)) = limited.and_then(|l| l.into_iter().min_by_key(|(_, d)| *d)) {
            return EnsembleError::RateLimited {
                provider: self.providers[idx].name().to_string(),
                retry_after_ms: wait.as_millis() as u64,
            };
        }

        let reason = skipped
            .iter()
            .map(|(idx, skip)| format!("{}: {}", self.providers[*idx].name(), skip))
            .collect::<Vec<_>>()
            .join("; ");
        EnsembleError::ProviderUnavailable { reason }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("providers", &self.providers())
            .field("config", &self.config)
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

fn ensure_prompt(prompt: &Prompt) -> Result<()> {
    if prompt.is_empty() {
        return Err(EnsembleError::InvalidArgument(
            "prompt cannot be empty or whitespace".into(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ensemble_llm::LlmResponse;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Echo {
        name: &'static str,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ProviderAdapter for Echo {
        async fn generate(&self, prompt: &Prompt) -> Result<LlmResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(LlmResponse::new(format!("{}: {}", self.name, prompt.content), "echo"))
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0])
        }
        async fn check_health(&self) -> bool {
            true
        }
        fn name(&self) -> &str {
            self.name
        }
        fn default_model(&self) -> &str {
            "echo"
        }
    }

    fn echo(name: &'static str) -> (Echo, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Echo {
                name,
                calls: calls.clone(),
            },
            calls,
        )
    }

    #[tokio::test]
    async fn cancelled_admission_takes_no_quota() {
        let orch = Orchestrator::builder().register(echo("a").0).build().unwrap();
        let cancel = CancellationToken::new();
        // Probe first so admission goes straight to the limiter.
        assert!(orch.probe("a").await.unwrap());
        cancel.cancel();

        let err = orch.admit(0, 10, &cancel).await.unwrap_err();
        assert!(matches!(err, EnsembleError::Cancelled));
        let usage = orch.limiter().usage("a").unwrap();
        assert_eq!(usage.requests, 0);
        assert_eq!(usage.tokens, 0);
        assert_eq!(usage.in_flight, 0);
    }

    #[test]
    fn build_requires_providers() {
        let err = Orchestrator::builder().build().unwrap_err();
        assert!(matches!(err, EnsembleError::Config(_)));
    }

    #[test]
    fn build_rejects_duplicate_names() {
        let err = Orchestrator::builder()
            .register(echo("a").0)
            .register(echo("a").0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("duplicate provider name 'a'"));
    }

    #[test]
    fn build_validates_config() {
        let mut config = OrchestratorConfig::default();
        config.cache.max_entries = 0;
        let err = Orchestrator::builder()
            .config(config)
            .register(echo("a").0)
            .build()
            .unwrap_err();
        assert!(matches!(err, EnsembleError::Config(_)));
    }

    #[tokio::test]
    async fn empty_prompt_is_invalid() {
        let orch = Orchestrator::builder().register(echo("a").0).build().unwrap();
        let err = orch
            .generate(&GenerationRequest::new("   "), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EnsembleError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn first_registered_provider_wins() {
        let (a, a_calls) = echo("a");
        let (b, b_calls) = echo("b");
        let orch = Orchestrator::builder().register(a).register(b).build().unwrap();
        let resp = orch
            .generate(&GenerationRequest::new("hi"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(resp.provider, "a");
        assert_eq!(resp.registration_index, 0);
        assert_eq!(a_calls.load(Ordering::SeqCst), 1);
        assert_eq!(b_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn preferred_provider_reorders_candidates() {
        let (a, _) = echo("a");
        let (b, _) = echo("b");
        let orch = Orchestrator::builder().register(a).register(b).build().unwrap();
        let resp = orch
            .generate(
                &GenerationRequest::new("hi").prefer("missing").prefer("b"),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(resp.provider, "b");
    }

    #[tokio::test]
    async fn only_unknown_preferred_providers_is_unavailable() {
        let orch = Orchestrator::builder().register(echo("a").0).build().unwrap();
        let err = orch
            .generate(
                &GenerationRequest::new("hi").prefer("zzz"),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EnsembleError::ProviderUnavailable { .. }));
    }

    #[tokio::test]
    async fn cache_keys_are_scoped_by_mode_and_preference() {
        let (a, _) = echo("a");
        let (b, _) = echo("b");
        let orch = Orchestrator::builder().register(a).register(b).build().unwrap();
        let plain = GenerationRequest::new("hi");
        let preferred = GenerationRequest::new("hi").prefer("b");
        let one = orch.cache_key(CacheScope::One, &[0, 1], &plain);
        let all = orch.cache_key(CacheScope::All, &[0, 1], &plain);
        let pref = orch.cache_key(CacheScope::One, &[1], &preferred);
        assert!(one.starts_with("one:*:"));
        assert!(all.starts_with("all:*:"));
        assert!(pref.starts_with("one:b:"));
        assert_ne!(one, pref);
    }

    #[tokio::test]
    async fn accessors_report_registration_order() {
        let orch = Orchestrator::builder()
            .register(echo("b").0)
            .register(echo("a").0)
            .build()
            .unwrap();
        assert_eq!(orch.providers(), vec!["b", "a"]);
        assert!(orch.is_healthy());
        let names: Vec<_> = orch.metrics().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert!(orch.probe("a").await.unwrap());
        assert!(orch.probe("zzz").await.is_err());
    }
}
