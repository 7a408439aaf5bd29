use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Prompt
// ---------------------------------------------------------------------------

/// An immutable prompt. Optional agent metadata is flattened into a single
/// content string before transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,
}

impl Prompt {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            goal: None,
            role: None,
            system_message: None,
        }
    }

    pub fn with_goal(mut self, goal: impl Into<String>) -> Self {
        self.goal = Some(goal.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_system_message(mut self, system_message: impl Into<String>) -> Self {
        self.system_message = Some(system_message.into());
        self
    }

    /// The single transport string: system message, role, goal, then content.
    pub fn flatten(&self) -> String {
        let mut sections: Vec<String> = Vec::new();
        if let Some(system) = non_blank(&self.system_message) {
            sections.push(system.to_string());
        }
        if let Some(role) = non_blank(&self.role) {
            sections.push(format!("Role: {role}"));
        }
        if let Some(goal) = non_blank(&self.goal) {
            sections.push(format!("Goal: {goal}"));
        }
        if !self.content.trim().is_empty() {
            sections.push(self.content.clone());
        }
        sections.join("\n\n")
    }

    pub fn is_empty(&self) -> bool {
        self.flatten().trim().is_empty()
    }

    /// Rough token estimate used for rate-limiter admission (4 chars/token).
    pub fn estimated_tokens(&self) -> u64 {
        let chars = self.flatten().chars().count() as u64;
        chars.div_ceil(4).max(1)
    }

    /// Stable cache key: hex SHA-256 of the whitespace-normalized content.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.flatten())
    }
}

impl From<&str> for Prompt {
    fn from(content: &str) -> Self {
        Prompt::new(content)
    }
}

impl From<String> for Prompt {
    fn from(content: String) -> Self {
        Prompt::new(content)
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Collapse runs of whitespace into single spaces and trim. Case is preserved.
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Hex SHA-256 over the normalized text.
pub fn fingerprint(text: &str) -> String {
    let digest = Sha256::digest(normalize(text).as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

// ---------------------------------------------------------------------------
// LlmResponse
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub id: String,
    pub text: String,
    pub model: String,
    pub usage: Usage,
}

impl LlmResponse {
    pub fn new(text: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            model: model.into(),
            usage: Usage::default(),
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }
}

// ---------------------------------------------------------------------------
// Usage
// ---------------------------------------------------------------------------

/// Token usage. Best-effort: zero when the backend does not report it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

// ---------------------------------------------------------------------------
// ProviderResponse
// ---------------------------------------------------------------------------

/// A response tagged with the provider that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub provider: String,
    /// Position of the provider in registration order; used for tie-breaking.
    pub registration_index: usize,
    pub response: LlmResponse,
}

impl ProviderResponse {
    pub fn text(&self) -> &str {
        &self.response.text
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_orders_sections() {
        let prompt = Prompt::new("Write a verse.")
            .with_goal("Open the battle")
            .with_role("You are a rapper")
            .with_system_message("Keep it under four lines.");
        assert_eq!(
            prompt.flatten(),
            "Keep it under four lines.\n\nRole: You are a rapper\n\nGoal: Open the battle\n\nWrite a verse."
        );
    }

    #[test]
    fn flatten_skips_blank_metadata() {
        let prompt = Prompt::new("hello").with_goal("   ");
        assert_eq!(prompt.flatten(), "hello");
    }

    #[test]
    fn fingerprint_is_whitespace_insensitive() {
        let a = Prompt::new("Hello   world\n");
        let b = Prompt::new("  Hello world");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn fingerprint_is_case_preserving() {
        assert_ne!(
            Prompt::new("Hello").fingerprint(),
            Prompt::new("hello").fingerprint()
        );
    }

    #[test]
    fn fingerprint_includes_metadata() {
        let plain = Prompt::new("hi");
        let with_goal = Prompt::new("hi").with_goal("greet");
        assert_ne!(plain.fingerprint(), with_goal.fingerprint());
    }

    #[test]
    fn estimated_tokens_rounds_up() {
        assert_eq!(Prompt::new("abcd").estimated_tokens(), 1);
        assert_eq!(Prompt::new("abcde").estimated_tokens(), 2);
        assert_eq!(Prompt::new("").estimated_tokens(), 1);
    }

    #[test]
    fn empty_prompt_detection() {
        assert!(Prompt::new(" \n ").is_empty());
        assert!(!Prompt::new("").with_goal("g").is_empty());
    }

    #[test]
    fn usage_new_sums_total() {
        let usage = Usage::new(10, 20);
        assert_eq!(usage.total_tokens, 30);
        assert_eq!(Usage::default().total_tokens, 0);
    }

    #[test]
    fn prompt_serde_omits_absent_metadata() {
        let json = serde_json::to_value(Prompt::new("hi")).unwrap();
        assert_eq!(json, serde_json::json!({ "content": "hi" }));
        let back: Prompt = serde_json::from_value(json).unwrap();
        assert_eq!(back, Prompt::new("hi"));
    }
}
