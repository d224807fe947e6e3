//! Error Types

use thiserror::Error;

/// Result type alias for orchestration operations
pub type Result<T> = std::result::Result<T, AssistantError>;

/// Orchestration error types
#[derive(Error, Debug)]
pub enum AssistantError {
    /// Missing credential or broken wiring for the selected provider variant.
    /// Detected before any external call is attempted.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Model selector string matched no provider family
    #[error("Unknown model selector: {0}")]
    UnknownModel(String),

    /// LLM provider call failed after configuration checks passed
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider unreachable or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Tool not found in registry
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Tool validation failed
    #[error("Tool validation error: {0}")]
    ToolValidation(String),

    /// Tool execution failed
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// A suspending operation ran past the request deadline
    #[error("Deadline exceeded during {0}")]
    DeadlineExceeded(&'static str),

    /// Parse error (e.g. tool call parsing, provider response shape)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AssistantError {
    /// True for errors that are the operator's problem, not the caller's:
    /// missing credentials and unroutable model selectors.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AssistantError::Config(_) | AssistantError::UnknownModel(_)
        )
    }

    /// Convert to a message safe to show the caller
    pub fn user_message(&self) -> String {
        match self {
            AssistantError::Config(_) | AssistantError::UnknownModel(_) => {
                "The assistant is not configured for the requested model.".into()
            }
            AssistantError::Provider(msg) => {
                format!("The AI service encountered an error: {}", msg)
            }
            AssistantError::ProviderUnavailable(_) => {
                "The AI service is currently unavailable. Please try again.".into()
            }
            AssistantError::ToolNotFound(name) => format!("The tool '{}' is not available.", name),
            AssistantError::ToolValidation(msg) => format!("Invalid tool input: {}", msg),
            AssistantError::ToolExecution(msg) => format!("Tool error: {}", msg),
            AssistantError::DeadlineExceeded(_) => {
                "The request took too long to process. Please try again.".into()
            }
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<anyhow::Error> for AssistantError {
    fn from(err: anyhow::Error) -> Self {
        AssistantError::Other(err.to_string())
    }
}
