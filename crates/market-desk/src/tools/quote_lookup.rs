//! Quote Lookup Tool
//!
//! Fetches last prices for one or more ticker symbols.

use async_trait::async_trait;
use std::sync::Arc;

use assistant_core::tool::{ParameterSchema, ToolSchema};
use assistant_core::{Result as CoreResult, Tool, ToolCall, ToolResult};

use crate::feed::QuoteSource;

/// Tool for looking up equity quotes
pub struct QuoteLookupTool {
    source: Arc<dyn QuoteSource>,
}

impl QuoteLookupTool {
    pub fn new(source: Arc<dyn QuoteSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Tool for QuoteLookupTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "quote_lookup".into(),
            description: "Get last prices for ticker symbols. Returns price and day change."
                .into(),
            parameters: vec![ParameterSchema {
                name: "symbols".into(),
                param_type: "string".into(),
                description: "Comma-separated list of symbols (e.g., 'AAPL,MSFT,SPY')".into(),
                required: true,
            }],
        }
    }

    async fn execute(&self, call: &ToolCall) -> CoreResult<ToolResult> {
        let symbols_str = call
            .arguments
            .get("symbols")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        let symbols: Vec<&str> = symbols_str
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();

        if symbols.is_empty() {
            return Ok(ToolResult::failure("quote_lookup", "No symbols given"));
        }

        let mut lines = Vec::new();
        let mut misses = Vec::new();

        for symbol in symbols {
            match self.source.quote(symbol).await {
                Ok(quote) => lines.push(quote.summary_line()),
                Err(e) => misses.push(format!("{}: {}", symbol, e)),
            }
        }

        let mut output = String::new();
        if !lines.is_empty() {
            output.push_str("Quotes:\n");
            for line in &lines {
                output.push_str(&format!("  {}\n", line));
            }
        }
        if !misses.is_empty() {
            output.push_str("Unavailable:\n");
            for miss in &misses {
                output.push_str(&format!("  {}\n", miss));
            }
        }

        if lines.is_empty() {
            Ok(ToolResult::failure("quote_lookup", output.trim()))
        } else {
            Ok(ToolResult::success("quote_lookup", output.trim()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::StaticQuoteSource;
    use std::collections::HashMap;

    fn call_with(symbols: &str) -> ToolCall {
        ToolCall {
            name: "quote_lookup".into(),
            arguments: HashMap::from([(
                "symbols".to_string(),
                serde_json::json!(symbols),
            )]),
            id: None,
        }
    }

    #[tokio::test]
    async fn test_lookup_mixed_symbols() {
        let tool = QuoteLookupTool::new(Arc::new(StaticQuoteSource::new()));

        let result = tool.execute(&call_with("AAPL, NOTREAL")).await.unwrap();
        assert!(result.success);
        assert!(result.output.contains("AAPL"));
        assert!(result.output.contains("Unavailable"));
    }

    #[tokio::test]
    async fn test_all_unknown_is_failure() {
        let tool = QuoteLookupTool::new(Arc::new(StaticQuoteSource::new()));

        let result = tool.execute(&call_with("NOTREAL")).await.unwrap();
        assert!(!result.success);
    }
}
