//! Error Types for the Market Desk

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DeskError>;

#[derive(Error, Debug)]
pub enum DeskError {
    #[error("Quote source error: {0}")]
    QuoteSource(String),

    #[error("Symbol not covered: {0}")]
    UnknownSymbol(String),

    #[error("Invalid position: {0}")]
    InvalidPosition(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<DeskError> for assistant_core::AssistantError {
    fn from(err: DeskError) -> Self {
        match err {
            DeskError::UnknownSymbol(s) => {
                assistant_core::AssistantError::ToolExecution(format!("symbol not covered: {}", s))
            }
            other => assistant_core::AssistantError::Other(other.to_string()),
        }
    }
}
