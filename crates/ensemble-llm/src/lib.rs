//! Prompt and response types plus provider adapters (Gemini, OpenAI).
//!
//! Provides the `ProviderAdapter` trait, the `DynProvider` wrapper and, behind
//! the `providers` feature, the HTTP adapters for each supported backend.

#[cfg(feature = "providers")]
mod gemini;
#[cfg(feature = "providers")]
mod http;
#[cfg(feature = "providers")]
mod openai;
mod provider;
mod types;

#[cfg(feature = "providers")]
pub use gemini::GeminiAdapter;
#[cfg(feature = "providers")]
pub use openai::OpenAiAdapter;
pub use provider::*;
pub use types::*;
