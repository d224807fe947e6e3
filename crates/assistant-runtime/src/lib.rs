//! # assistant-runtime
//!
//! Provider backends for the business assistant, one per family:
//!
//! - **Gemini**: native streaming, search grounding at call setup
//! - **OpenAI**: chat completions, standard and tool-capable variants
//! - **Perplexity**: single-shot, search-augmented
//!
//! All backends speak HTTP/JSON via `reqwest` and implement
//! `assistant_core::LlmProvider`.

mod sse;

pub mod gemini;
pub mod openai;
pub mod perplexity;

pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
pub use perplexity::PerplexityProvider;

// Re-export core types for convenience
pub use assistant_core::{
    AssistantError, CredentialStore, LlmProvider, Message, ProviderFamily, ProviderSet,
    ProviderVariant, Result, Role,
};
