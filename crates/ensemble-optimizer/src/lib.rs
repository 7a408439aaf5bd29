//! Prompt optimization on top of the orchestrator.
//!
//! [`DefaultOptimizer`] asks a provider to rewrite a prompt and falls back to
//! the original prompt on any failure, so it can sit in front of an agent
//! pipeline without becoming a point of failure.

mod optimizer;

pub use optimizer::{
    build_optimization_prompt, parse_suggestions, DefaultOptimizer, OptimizationResult,
    PromptOptimizer, SuggestionPayload, FALLBACK_SUGGESTIONS,
};
