use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::http::{build_client, parse_embedding, send_json, DEFAULT_TIMEOUT};
use crate::{ensure_embeddable, LlmResponse, Prompt, ProviderAdapter, Usage};
use ensemble_types::{EnsembleError, Result};

const PROVIDER: &str = "openai";

// ---------------------------------------------------------------------------
// OpenAiAdapter
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct OpenAiAdapter {
    name: String,
    api_key: String,
    client: reqwest::Client,
    base_url: String,
    model: String,
    embedding_model: String,
    timeout: Duration,
}

impl OpenAiAdapter {
    pub fn new(api_key: String) -> Self {
        Self {
            name: PROVIDER.to_string(),
            api_key,
            client: build_client(DEFAULT_TIMEOUT),
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_env() -> Result<Self> {
        let key = std::env::var("OPENAI_API_KEY").map_err(|_| EnsembleError::AuthError {
            provider: PROVIDER.into(),
        })?;
        Ok(Self::new(key))
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

    fn build_request_body(&self, prompt: &Prompt) -> serde_json::Value {
        json!({
            "model": self.model,
            "input": prompt.flatten(),
        })
    }

    fn parse_response(&self, body: serde_json::Value) -> Result<LlmResponse> {
        let output = body["output"]
            .as_array()
            .ok_or_else(|| EnsembleError::MalformedResponse {
                provider: self.name.clone(),
                message: "Missing output in response".into(),
            })?;

        // Only `message` items carry user-visible text; reasoning items are skipped.
        let mut text_parts: Vec<&str> = Vec::new();
        for item in output.iter().filter(|item| item["type"] == "message") {
            if let Some(content) = item["content"].as_array() {
                for block in content {
                    if block["type"] == "output_text" {
                        if let Some(t) = block["text"].as_str() {
                            text_parts.push(t);
                        }
                    }
                }
            }
        }

        let usage_obj = &body["usage"];
        let usage = Usage::new(
            usage_obj["input_tokens"].as_u64().unwrap_or(0),
            usage_obj["output_tokens"].as_u64().unwrap_or(0),
        );

        let model = body["model"].as_str().unwrap_or(&self.model);
        let mut response = LlmResponse::new(text_parts.join(""), model).with_usage(usage);
        if let Some(id) = body["id"].as_str() {
            response.id = id.to_string();
        }
        Ok(response)
    }
}

// ---------------------------------------------------------------------------
// ProviderAdapter implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    async fn generate(&self, prompt: &Prompt) -> Result<LlmResponse> {
        let body = self.build_request_body(prompt);
        let request = self
            .client
            .post(format!("{}/v1/responses", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body);

        let json = send_json(&self.name, self.timeout, request).await?;
        self.parse_response(json)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        ensure_embeddable(text)?;

        let body = json!({
            "model": self.embedding_model,
            "input": text,
        });
        let request = self
            .client
            .post(format!("{}/v1/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body);

        let json = send_json(&self.name, self.timeout, request).await?;
        parse_embedding(&self.name, &json["data"][0]["embedding"])
    }

    async fn check_health(&self) -> bool {
        match self
            .client
            .get(format!("{}/v1/models/{}", self.base_url, self.model))
            .bearer_auth(&self.api_key)
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
            "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
            "text-embedding-3-large" => Some(3072),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
