//! Quote Sources
//!
//! Abstraction over market data backends plus the static development
//! source, and the adapter that serves the context assembler's
//! `MarketDataFeed` collaborator interface.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

use crate::error::{DeskError, Result};
use crate::model::Quote;

/// Quote source trait (Strategy pattern)
///
/// Implement this for each data vendor: IEX, Polygon, an internal feed, etc.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Last quote for a symbol
    async fn quote(&self, symbol: &str) -> Result<Quote>;

    /// Quotes for multiple symbols; symbols that fail are skipped
    async fn quotes(&self, symbols: &[&str]) -> Result<Vec<Quote>> {
        let mut quotes = Vec::new();
        for symbol in symbols {
            if let Ok(quote) = self.quote(symbol).await {
                quotes.push(quote);
            }
        }
        Ok(quotes)
    }

    /// Source name
    fn name(&self) -> &str;
}

/// Static quote source with representative large-cap prices.
/// For development and tests; a production deployment plugs a real vendor
/// into `QuoteSource` instead.
pub struct StaticQuoteSource;

impl StaticQuoteSource {
    pub fn new() -> Self {
        Self
    }

    fn entry(&self, symbol: &str) -> Option<(Decimal, &'static str, Decimal)> {
        // (price, name, day change %)
        match symbol.to_uppercase().as_str() {
            "AAPL" => Some((dec!(232.50), "Apple Inc.", dec!(1.2))),
            "MSFT" => Some((dec!(441.80), "Microsoft Corp.", dec!(0.6))),
            "GOOGL" => Some((dec!(178.20), "Alphabet Inc.", dec!(-0.4))),
            "AMZN" => Some((dec!(205.10), "Amazon.com Inc.", dec!(0.9))),
            "NVDA" => Some((dec!(134.25), "NVIDIA Corp.", dec!(2.8))),
            "META" => Some((dec!(585.30), "Meta Platforms Inc.", dec!(1.1))),
            "TSLA" => Some((dec!(352.40), "Tesla Inc.", dec!(-2.1))),
            "JPM" => Some((dec!(244.75), "JPMorgan Chase & Co.", dec!(0.3))),
            "XOM" => Some((dec!(118.60), "Exxon Mobil Corp.", dec!(-0.7))),
            "JNJ" => Some((dec!(152.90), "Johnson & Johnson", dec!(0.2))),
            "SPY" => Some((dec!(602.40), "SPDR S&P 500 ETF", dec!(0.5))),
            "QQQ" => Some((dec!(521.70), "Invesco QQQ Trust", dec!(0.8))),
            _ => None,
        }
    }
}

impl Default for StaticQuoteSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QuoteSource for StaticQuoteSource {
    async fn quote(&self, symbol: &str) -> Result<Quote> {
        let (price, name, change_pct) = self
            .entry(symbol)
            .ok_or_else(|| DeskError::UnknownSymbol(symbol.to_string()))?;

        let mut quote = Quote::new(symbol, name, price);
        quote.change_pct = change_pct;
        quote.updated_at = Utc::now();
        Ok(quote)
    }

    fn name(&self) -> &str {
        "StaticQuotes"
    }
}

/// Adapter: serves `assistant_core`'s market-data collaborator interface
/// from any `QuoteSource`.
pub struct DeskMarketFeed {
    source: Arc<dyn QuoteSource>,
}

impl DeskMarketFeed {
    pub fn new(source: Arc<dyn QuoteSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl assistant_core::context::MarketDataFeed for DeskMarketFeed {
    async fn quote_block(
        &self,
        symbols: &[String],
    ) -> assistant_core::Result<Option<String>> {
        let refs: Vec<&str> = symbols.iter().map(|s| s.as_str()).collect();
        let quotes = self
            .source
            .quotes(&refs)
            .await
            .map_err(assistant_core::AssistantError::from)?;

        if quotes.is_empty() {
            tracing::debug!(?symbols, "no requested symbols resolved to quotes");
            return Ok(None);
        }

        let block = quotes
            .iter()
            .map(|q| q.summary_line())
            .collect::<Vec<_>>()
            .join("\n");
        Ok(Some(block))
    }
}
