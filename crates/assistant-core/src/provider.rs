//! Provider Capability Registry
//!
//! Defines the closed set of provider variants the router may target and a
//! common interface for the backends that serve them. Each variant carries a
//! total capability record; routing never falls back to string comparison at
//! call time.

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::{AssistantError, Result};
use crate::message::Message;

/// Provider family, one per backend service
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderFamily {
    Gemini,
    OpenAi,
    Perplexity,
}

impl std::fmt::Display for ProviderFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderFamily::Gemini => write!(f, "gemini"),
            ProviderFamily::OpenAi => write!(f, "openai"),
            ProviderFamily::Perplexity => write!(f, "perplexity"),
        }
    }
}

/// One concrete backend variant: a family member with a fixed calling
/// convention profile. The set is closed; the router can only produce
/// variants listed here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderVariant {
    GeminiFlash,
    GeminiPro,
    OpenAiStandard,
    OpenAiToolUse,
    PerplexitySonar,
}

/// Calling-convention capability record for a variant
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    /// Produces incremental output natively
    pub streaming: bool,
    /// Can drive the bounded tool-calling loop
    pub tool_calling: bool,
    /// Search/grounding is enabled at call setup
    pub built_in_search: bool,
    /// Environment variable holding the required credential
    pub credential: &'static str,
}

impl ProviderVariant {
    pub fn family(self) -> ProviderFamily {
        match self {
            ProviderVariant::GeminiFlash | ProviderVariant::GeminiPro => ProviderFamily::Gemini,
            ProviderVariant::OpenAiStandard | ProviderVariant::OpenAiToolUse => {
                ProviderFamily::OpenAi
            }
            ProviderVariant::PerplexitySonar => ProviderFamily::Perplexity,
        }
    }

    /// Total capability mapping. Every variant the mode selector can produce
    /// has an entry here.
    pub fn capabilities(self) -> Capabilities {
        match self {
            ProviderVariant::GeminiFlash => Capabilities {
                streaming: true,
                tool_calling: false,
                built_in_search: true,
                credential: "GEMINI_API_KEY",
            },
            ProviderVariant::GeminiPro => Capabilities {
                streaming: true,
                tool_calling: true,
                built_in_search: true,
                credential: "GEMINI_API_KEY",
            },
            ProviderVariant::OpenAiStandard => Capabilities {
                streaming: true,
                tool_calling: false,
                built_in_search: false,
                credential: "OPENAI_API_KEY",
            },
            ProviderVariant::OpenAiToolUse => Capabilities {
                streaming: true,
                tool_calling: true,
                built_in_search: false,
                credential: "OPENAI_API_KEY",
            },
            ProviderVariant::PerplexitySonar => Capabilities {
                streaming: false,
                tool_calling: false,
                built_in_search: true,
                credential: "PERPLEXITY_API_KEY",
            },
        }
    }

    /// Model identifier sent on the wire for this variant
    pub fn wire_model(self) -> &'static str {
        match self {
            ProviderVariant::GeminiFlash => "gemini-2.0-flash",
            ProviderVariant::GeminiPro => "gemini-1.5-pro",
            ProviderVariant::OpenAiStandard => "gpt-4o-mini",
            ProviderVariant::OpenAiToolUse => "gpt-4o",
            ProviderVariant::PerplexitySonar => "sonar-pro",
        }
    }

    /// The tool-capable variant the portfolio mode upgrades to within a
    /// family. Families without one cannot host the tool-calling loop.
    pub fn tool_upgrade(family: ProviderFamily) -> Option<ProviderVariant> {
        match family {
            ProviderFamily::Gemini => Some(ProviderVariant::GeminiPro),
            ProviderFamily::OpenAi => Some(ProviderVariant::OpenAiToolUse),
            ProviderFamily::Perplexity => None,
        }
    }
}

impl std::fmt::Display for ProviderVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.wire_model())
    }
}

/// Configuration for LLM generation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Model identifier on the wire
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// System instructions, passed separately where the provider supports it
    #[serde(default)]
    pub system: Option<String>,

    /// Enable the provider's built-in search/grounding at call setup
    #[serde(default)]
    pub enable_search: bool,
}

fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    2048
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: ProviderVariant::GeminiFlash.wire_model().into(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            system: None,
            enable_search: false,
        }
    }
}

/// Response from a completed (non-incremental) call
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Completion {
    pub content: String,
    pub model: String,
}

/// A chunk from a streaming completion
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamChunk {
    /// The text delta
    pub delta: String,

    /// Whether this is the final chunk
    pub done: bool,
}

/// Stream type for incremental completions
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// Common interface over all backends
///
/// The orchestration core works exclusively through this trait; the runtime
/// crate supplies one implementation per provider family.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Which family this backend serves
    fn family(&self) -> ProviderFamily;

    /// Single-shot completion: block until the provider returns a full answer
    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Completion>;

    /// Streaming completion: incremental text fragments as they arrive
    async fn complete_stream(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<CompletionStream>;
}

/// One backend per family, resolved by the invoker after routing
#[derive(Clone)]
pub struct ProviderSet {
    gemini: Arc<dyn LlmProvider>,
    openai: Arc<dyn LlmProvider>,
    perplexity: Arc<dyn LlmProvider>,
}

impl ProviderSet {
    pub fn new(
        gemini: Arc<dyn LlmProvider>,
        openai: Arc<dyn LlmProvider>,
        perplexity: Arc<dyn LlmProvider>,
    ) -> Self {
        Self {
            gemini,
            openai,
            perplexity,
        }
    }

    pub fn for_family(&self, family: ProviderFamily) -> &Arc<dyn LlmProvider> {
        match family {
            ProviderFamily::Gemini => &self.gemini,
            ProviderFamily::OpenAi => &self.openai,
            ProviderFamily::Perplexity => &self.perplexity,
        }
    }
}

/// Read-only process-wide credential configuration, loaded once at startup.
/// Never mutated after construction.
#[derive(Clone, Debug, Default)]
pub struct CredentialStore {
    keys: HashMap<String, String>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect the named environment variables that are present and non-empty
    pub fn from_env(names: &[&str]) -> Self {
        let mut keys = HashMap::new();
        for name in names {
            if let Ok(value) = std::env::var(name) {
                if !value.trim().is_empty() {
                    keys.insert((*name).to_string(), value);
                }
            }
        }
        Self { keys }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.keys.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.keys.get(name).map(|s| s.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.keys.contains_key(name)
    }

    /// Credential presence check for a variant. This runs before any external
    /// call is attempted; a miss is a configuration error, never a retry target.
    pub fn require(&self, variant: ProviderVariant) -> Result<&str> {
        let name = variant.capabilities().credential;
        self.get(name).ok_or_else(|| {
            AssistantError::Config(format!(
                "missing credential {} for provider variant {}",
                name, variant
            ))
        })
    }
}
