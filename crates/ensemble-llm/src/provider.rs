use async_trait::async_trait;

use crate::{LlmResponse, Prompt};
use ensemble_types::{EnsembleError, Result};

// ---------------------------------------------------------------------------
// ProviderAdapter
// ---------------------------------------------------------------------------

/// Uniform capability surface implemented once per backend.
///
/// Adapters are stateless with respect to health, limits and caching; they
/// issue exactly one outbound call per invocation and report the outcome.
/// Transport deadlines are the adapter's responsibility and must surface as
/// [`EnsembleError::Timeout`].
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    async fn generate(&self, prompt: &Prompt) -> Result<LlmResponse>;

    /// Fails with `InvalidArgument` on empty input, before any network call.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Reachability check. Never errors: any failure reads as `false`.
    async fn check_health(&self) -> bool;

    fn name(&self) -> &str;
    fn default_model(&self) -> &str;

    /// Declared embedding dimensionality, when the backend has a fixed one.
    fn embedding_dimensions(&self) -> Option<usize> {
        None
    }
}

/// Shared precondition for `ProviderAdapter::embed`.
pub fn ensure_embeddable(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(EnsembleError::InvalidArgument(
            "embedding input cannot be empty or whitespace".into(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// DynProvider
// ---------------------------------------------------------------------------

pub struct DynProvider(Box<dyn ProviderAdapter>);

impl DynProvider {
    pub fn new(provider: impl ProviderAdapter + 'static) -> Self {
        Self(Box::new(provider))
    }

    pub fn from_boxed(provider: Box<dyn ProviderAdapter>) -> Self {
        Self(provider)
    }

    pub async fn generate(&self, prompt: &Prompt) -> Result<LlmResponse> {
        self.0.generate(prompt).await
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.0.embed(text).await
    }

    pub async fn check_health(&self) -> bool {
        self.0.check_health().await
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub fn default_model(&self) -> &str {
        self.0.default_model()
    }

    pub fn embedding_dimensions(&self) -> Option<usize> {
        self.0.embedding_dimensions()
    }
}

impl std::fmt::Debug for DynProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynProvider")
            .field("name", &self.name())
            .field("model", &self.default_model())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
