use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::http::{build_client, parse_embedding, send_json, DEFAULT_TIMEOUT};
use crate::{ensure_embeddable, LlmResponse, Prompt, ProviderAdapter, Usage};
use ensemble_types::{EnsembleError, Result};

const PROVIDER: &str = "gemini";

// ---------------------------------------------------------------------------
// GeminiAdapter
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct GeminiAdapter {
    name: String,
    api_key: String,
    client: reqwest::Client,
    base_url: String,
    model: String,
    embedding_model: String,
    timeout: Duration,
}

impl GeminiAdapter {
    pub fn new(api_key: String) -> Self {
        Self {
            name: PROVIDER.to_string(),
            api_key,
            client: build_client(DEFAULT_TIMEOUT),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.0-flash".to_string(),
            embedding_model: "text-embedding-004".to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Register under a different name, e.g. two accounts of one backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    pub fn with_embedding_model(mut self, model: String) -> Self {
        self.embedding_model = model;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self.timeout = timeout;
        self
    }

    pub fn from_env() -> Result<Self> {
        let key = std::env::var("GOOGLE_API_KEY")
            .or_else(|_| std::env::var("GEMINI_API_KEY"))
            .map_err(|_| EnsembleError::AuthError {
                provider: PROVIDER.into(),
            })?;
        Ok(Self::new(key))
    }

    fn build_request_body(&self, prompt: &Prompt) -> serde_json::Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt.flatten() }]
            }]
        })
    }

    fn parse_response(&self, json: serde_json::Value) -> Result<LlmResponse> {
        let candidates = json["candidates"]
            .as_array()
            .ok_or_else(|| malformed(&self.name, "Missing candidates in response"))?;

        let candidate = candidates
            .first()
            .ok_or_else(|| malformed(&self.name, "Empty candidates array"))?;

        let text: String = candidate["content"]["parts"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let usage_meta = &json["usageMetadata"];
        let input_tokens = usage_meta["promptTokenCount"].as_u64().unwrap_or(0);
        let output_tokens = usage_meta["candidatesTokenCount"].as_u64().unwrap_or(0);
        let total_tokens = usage_meta["totalTokenCount"]
            .as_u64()
            .unwrap_or(input_tokens + output_tokens);

        let model = json["modelVersion"].as_str().unwrap_or(&self.model);

        Ok(LlmResponse::new(text, model).with_usage(Usage {
            input_tokens,
            output_tokens,
            total_tokens,
        }))
    }

    fn url(&self, model: &str, action: &str) -> String {
        format!("{}/models/{}{}", self.base_url, model, action)
    }
}

fn malformed(provider: &str, message: &str) -> EnsembleError {
    EnsembleError::MalformedResponse {
        provider: provider.into(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// ProviderAdapter implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    async fn generate(&self, prompt: &Prompt) -> Result<LlmResponse> {
        let body = self.build_request_body(prompt);
        let request = self
            .client
            .post(self.url(&self.model, ":generateContent"))
            .header("X-Goog-Api-Key", &self.api_key)
            .json(&body);

        let json = send_json(&self.name, self.timeout, request).await?;
        self.parse_response(json)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        ensure_embeddable(text)?;

        let body = json!({
            "content": {
                "parts": [{ "text": text }],
                "role": "user"
            }
        });
        let request = self
            .client
            .post(self.url(&self.embedding_model, ":embedContent"))
            .header("X-Goog-Api-Key", &self.api_key)
            .json(&body);

        let json = send_json(&self.name, self.timeout, request).await?;
        parse_embedding(&self.name, &json["embedding"]["values"])
    }

    async fn check_health(&self) -> bool {
        match self
            .client
            .get(self.url(&self.model, ""))
            .header("X-Goog-Api-Key", &self.api_key)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::debug!(provider = %self.name, error = %e, "Health check request failed");
                false
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    fn embedding_dimensions(&self) -> Option<usize> {
        match self.embedding_model.as_str() {
            "text-embedding-004" | "embedding-001" => Some(768),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
