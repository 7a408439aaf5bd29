use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use ensemble_llm::{normalize, Prompt};
use ensemble_orchestrator::{GenerationRequest, Orchestrator};
use ensemble_types::{EnsembleError, Result};

/// Suggestions returned whenever optimization falls back to the original prompt.
pub const FALLBACK_SUGGESTIONS: [&str; 3] = [
    "Self-improving optimization failed",
    "Using original prompt as fallback",
    "Consider reviewing LLM provider settings",
];

// ---------------------------------------------------------------------------
// OptimizationResult
// ---------------------------------------------------------------------------

/// When `is_error` is set, `optimized_prompt` is the caller's prompt unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub optimized_prompt: String,
    /// Whitespace-normalized form of `optimized_prompt`.
    pub cleaned_prompt: String,
    pub suggestions: Vec<String>,
    pub is_error: bool,
}

impl OptimizationResult {
    pub fn fallback(original: &str) -> Self {
        Self {
            optimized_prompt: original.to_string(),
            cleaned_prompt: original.to_string(),
            suggestions: FALLBACK_SUGGESTIONS.iter().map(|s| s.to_string()).collect(),
            is_error: true,
        }
    }
}

/// The structured payload the provider is asked to return.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SuggestionPayload {
    #[serde(rename = "optimizedPrompt")]
    pub optimized_prompt: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

// ---------------------------------------------------------------------------
// PromptOptimizer
// ---------------------------------------------------------------------------

#[async_trait]
pub trait PromptOptimizer: Send + Sync {
    /// Never fails: every error path resolves to a fallback result.
    async fn optimize(&self, prompt: &str, goal: &str, context: &str) -> OptimizationResult;

    async fn is_healthy(&self) -> bool;
}

// ---------------------------------------------------------------------------
// DefaultOptimizer
// ---------------------------------------------------------------------------

pub struct DefaultOptimizer {
    orchestrator: Arc<Orchestrator>,
    provider: Option<String>,
    cancel: CancellationToken,
}

impl DefaultOptimizer {
    /// `provider` pins the rewrite to one backend; `None` lets the
    /// orchestrator choose.
    pub fn new(orchestrator: Arc<Orchestrator>, provider: Option<String>) -> Self {
        Self {
            orchestrator,
            provider,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort in-flight rewrites when `cancel` fires. A cancelled rewrite
    /// falls back like any other failure.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    async fn rewrite(&self, prompt: &str, goal: &str, context: &str) -> Result<OptimizationResult> {
        let mut request =
            GenerationRequest::new(Prompt::new(build_optimization_prompt(prompt, goal, context)))
                .with_bypass_cache(true);
        if let Some(provider) = &self.provider {
            request = request.prefer(provider.clone());
        }

        let response = self.orchestrator.generate(&request, &self.cancel).await?;
        let payload = parse_suggestions(&response.provider, response.text())?;

        Ok(OptimizationResult {
            cleaned_prompt: normalize(&payload.optimized_prompt),
            optimized_prompt: payload.optimized_prompt,
            suggestions: payload.suggestions,
            is_error: false,
        })
    }
}

#[async_trait]
impl PromptOptimizer for DefaultOptimizer {
    async fn optimize(&self, prompt: &str, goal: &str, context: &str) -> OptimizationResult {
        if !self.is_healthy().await {
            tracing::warn!(provider = ?self.provider, "Optimizer provider unhealthy, using original prompt");
            return OptimizationResult::fallback(prompt);
        }

        match self.rewrite(prompt, goal, context).await {
            Ok(result) => {
                tracing::debug!(suggestions = result.suggestions.len(), "Prompt optimized");
                result
            }
            Err(e) => {
                tracing::warn!(error = %e, "Prompt optimization failed, using original prompt");
                OptimizationResult::fallback(prompt)
            }
        }
    }

    async fn is_healthy(&self) -> bool {
        match &self.provider {
            Some(name) => self.orchestrator.health().is_healthy(name),
            None => self.orchestrator.is_healthy(),
        }
    }
}

impl std::fmt::Debug for DefaultOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultOptimizer")
            .field("provider", &self.provider)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Prompt construction and parsing
// ---------------------------------------------------------------------------

pub fn build_optimization_prompt(prompt: &str, goal: &str, context: &str) -> String {
    format!(
        "You are a prompt optimizer. Rewrite the prompt below so it serves its goal \
         in the given context more effectively.\n\n\
         Original prompt: {prompt}\n\
         Goal: {goal}\n\
         Context: {context}\n\n\
         Respond with a single JSON object and nothing else:\n\
         {{\"optimizedPrompt\": \"<improved prompt>\", \
         \"suggestions\": [\"<reasoning for a change>\", \"<suggestion for future prompts>\"]}}"
    )
}

/// Extract the suggestion payload from a provider reply, tolerating
/// markdown code fences around the JSON.
pub fn parse_suggestions(provider: &str, text: &str) -> Result<SuggestionPayload> {
    let cleaned = strip_fences(text);
    let payload: SuggestionPayload =
        serde_json::from_str(cleaned).map_err(|e| EnsembleError::MalformedResponse {
            provider: provider.to_string(),
            message: format!("optimizer payload: {e}"),
        })?;
    if payload.optimized_prompt.trim().is_empty() {
        return Err(EnsembleError::MalformedResponse {
            provider: provider.to_string(),
            message: "optimizer payload has an empty optimizedPrompt".into(),
        });
    }
    Ok(payload)
}

fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence.
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use ensemble_llm::{LlmResponse, ProviderAdapter};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        reply: std::result::Result<&'static str, ()>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ProviderAdapter for Scripted {
        async fn generate(&self, _prompt: &Prompt) -> Result<LlmResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.reply {
                Ok(text) => Ok(LlmResponse::new(text, "m")),
                Err(()) => Err(EnsembleError::Timeout {
                    provider: "scripted".into(),
                    timeout_ms: 10,
                }),
            }
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![])
        }
        async fn check_health(&self) -> bool {
            true
        }
        fn name(&self) -> &str {
            "scripted"
        }
        fn default_model(&self) -> &str {
            "m"
        }
    }

    fn optimizer(reply: std::result::Result<&'static str, ()>) -> (DefaultOptimizer, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let orch = Orchestrator::builder()
            .register(Scripted {
                reply,
                calls: calls.clone(),
            })
            .build()
            .unwrap();
        (
            DefaultOptimizer::new(Arc::new(orch), Some("scripted".into())),
            calls,
        )
    }

    #[tokio::test]
    async fn parses_fenced_payload() {
        let (opt, _) = optimizer(Ok(
            "```json\n{\"optimizedPrompt\": \"Write   a haiku about Rust\", \"suggestions\": [\"be specific\"]}\n```",
        ));
        let result = opt.optimize("poem", "art", "blog").await;
        assert!(!result.is_error);
        assert_eq!(result.optimized_prompt, "Write   a haiku about Rust");
        assert_eq!(result.cleaned_prompt, "Write a haiku about Rust");
        assert_eq!(result.suggestions, vec!["be specific"]);
    }

    #[tokio::test]
    async fn malformed_payload_falls_back_to_original() {
        let (opt, calls) = optimizer(Ok("Sure! Here is a better prompt: ..."));
        let result = opt.optimize("original prompt", "goal", "ctx").await;
        assert!(result.is_error);
        assert_eq!(result.optimized_prompt, "original prompt");
        assert_eq!(result.cleaned_prompt, "original prompt");
        assert_eq!(result.suggestions, FALLBACK_SUGGESTIONS.to_vec());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transport_failure_falls_back() {
        let (opt, _) = optimizer(Err(()));
        let result = opt.optimize("keep me", "g", "c").await;
        assert!(result.is_error);
        assert_eq!(result.optimized_prompt, "keep me");
    }

    #[tokio::test]
    async fn unhealthy_provider_makes_no_call() {
        let (opt, calls) = optimizer(Ok("{}"));
        for _ in 0..3 {
            opt.orchestrator.health().record_outcome("scripted", false);
        }
        assert!(!opt.is_healthy().await);
        let result = opt.optimize("as is", "g", "c").await;
        assert!(result.is_error);
        assert_eq!(result.optimized_prompt, "as is");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancelled_optimizer_falls_back() {
        let (opt, calls) = optimizer(Ok("{\"optimizedPrompt\": \"x\"}"));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let opt = opt.with_cancellation(cancel);
        let result = opt.optimize("orig", "g", "c").await;
        assert!(result.is_error);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn strip_fences_variants() {
        assert_eq!(strip_fences("  {\"a\":1}  "), "{\"a\":1}");
        assert_eq!(strip_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_fences("```\n{\"a\":1}```"), "{\"a\":1}");
    }

    #[test]
    fn empty_optimized_prompt_is_malformed() {
        let err = parse_suggestions("p", "{\"optimizedPrompt\": \"  \"}").unwrap_err();
        assert!(matches!(err, EnsembleError::MalformedResponse { .. }));
    }

    #[test]
    fn optimization_prompt_embeds_inputs() {
        let text = build_optimization_prompt("P", "G", "C");
        assert!(text.contains("Original prompt: P"));
        assert!(text.contains("Goal: G"));
        assert!(text.contains("Context: C"));
        assert!(text.contains("\"optimizedPrompt\""));
    }
}
