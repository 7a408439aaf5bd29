//! CLI configuration file: orchestrator settings plus the provider list.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use serde::{Deserialize, Deserializer};

use ensemble_llm::{DynProvider, GeminiAdapter, OpenAiAdapter};
use ensemble_orchestrator::{parse_duration_str, OrchestratorConfig};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    #[serde(flatten)]
    pub orchestrator: OrchestratorConfig,
    pub providers: Vec<ProviderSpec>,
}

impl CliConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&data)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.orchestrator.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gemini,
    OpenAi,
}

impl ProviderKind {
    fn default_key_env(self) -> &'static str {
        match self {
            ProviderKind::Gemini => "GOOGLE_API_KEY",
            ProviderKind::OpenAi => "OPENAI_API_KEY",
        }
    }
}

/// One provider entry. Only `kind` is required.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSpec {
    pub kind: ProviderKind,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub embedding_model: Option<String>,
    /// Environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default, deserialize_with = "optional_duration")]
    pub timeout: Option<Duration>,
}

impl ProviderSpec {
    pub fn key_env(&self) -> &str {
        self.api_key_env
            .as_deref()
            .unwrap_or_else(|| self.kind.default_key_env())
    }

    pub fn build(&self) -> anyhow::Result<DynProvider> {
        let key_env = self.key_env();
        let key = std::env::var(key_env)
            .with_context(|| format!("{key_env} is not set ({:?} provider)", self.kind))?;

        let provider = match self.kind {
            ProviderKind::Gemini => {
                let mut a = GeminiAdapter::new(key);
                if let Some(name) = &self.name {
                    a = a.with_name(name.clone());
                }
                if let Some(model) = &self.model {
                    a = a.with_model(model.clone());
                }
                if let Some(model) = &self.embedding_model {
                    a = a.with_embedding_model(model.clone());
                }
                if let Some(url) = &self.base_url {
                    a = a.with_base_url(url.clone());
                }
                if let Some(timeout) = self.timeout {
                    a = a.with_timeout(timeout);
                }
                DynProvider::new(a)
            }
            ProviderKind::OpenAi => {
                let mut a = OpenAiAdapter::new(key);
                if let Some(name) = &self.name {
                    a = a.with_name(name.clone());
                }
                if let Some(model) = &self.model {
                    a = a.with_model(model.clone());
                }
                if let Some(model) = &self.embedding_model {
                    a = a.with_embedding_model(model.clone());
                }
                if let Some(url) = &self.base_url {
                    a = a.with_base_url(url.clone());
                }
                if let Some(timeout) = self.timeout {
                    a = a.with_timeout(timeout);
                }
                DynProvider::new(a)
            }
        };
        Ok(provider)
    }
}

fn optional_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|s| parse_duration_str(&s).map_err(serde::de::Error::custom))
        .transpose()
}

/// Providers whose API keys are present in the environment.
pub fn providers_from_env() -> anyhow::Result<Vec<DynProvider>> {
    let mut providers = Vec::new();
    if let Ok(adapter) = GeminiAdapter::from_env() {
        providers.push(DynProvider::new(adapter));
    }
    if let Ok(adapter) = OpenAiAdapter::from_env() {
        providers.push(DynProvider::new(adapter));
    }
    if providers.is_empty() {
        bail!("No LLM provider API keys found in environment (GOOGLE_API_KEY, GEMINI_API_KEY, OPENAI_API_KEY)");
    }
    Ok(providers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_flattened_orchestrator_settings_and_providers() {
        let config: CliConfig = serde_json::from_str(
            r#"{
                "rate_limit": { "requests_per_minute": 30 },
                "providers": [
                    { "kind": "gemini", "name": "fast", "timeout": "20s" },
                    { "kind": "openai", "model": "gpt-4o", "api_key_env": "WORK_OPENAI_KEY" }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(config.orchestrator.rate_limit.requests_per_minute, 30);
        assert_eq!(config.orchestrator.cache.max_entries, 1000);
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[0].kind, ProviderKind::Gemini);
        assert_eq!(config.providers[0].timeout, Some(Duration::from_secs(20)));
        assert_eq!(config.providers[0].key_env(), "GOOGLE_API_KEY");
        assert_eq!(config.providers[1].kind, ProviderKind::OpenAi);
        assert_eq!(config.providers[1].key_env(), "WORK_OPENAI_KEY");
        assert_eq!(config.providers[1].timeout, None);
    }

    #[test]
    fn empty_object_is_default() {
        let config: CliConfig = serde_json::from_str("{}").unwrap();
        assert!(config.providers.is_empty());
        assert_eq!(config.orchestrator, OrchestratorConfig::default());
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let result: Result<CliConfig, _> =
            serde_json::from_str(r#"{ "providers": [{ "kind": "llama" }] }"#);
        assert!(result.is_err());
    }

    #[test]
    fn missing_key_env_fails_build() {
        let spec = ProviderSpec {
            kind: ProviderKind::OpenAi,
            name: None,
            model: None,
            embedding_model: None,
            api_key_env: Some("ENSEMBLE_TEST_KEY_THAT_IS_NOT_SET".into()),
            base_url: None,
            timeout: None,
        };
        let err = spec.build().unwrap_err();
        assert!(err.to_string().contains("ENSEMBLE_TEST_KEY_THAT_IS_NOT_SET"));
    }

    #[test]
    fn load_validates_settings() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "cache": {{ "max_entries": 0 }} }}"#).unwrap();
        assert!(CliConfig::load(file.path()).is_err());
    }
}
