//! Portfolio Review Tool
//!
//! Tracks positions, marks them against current quotes, and reports P&L
//! and allocations.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use assistant_core::tool::{ParameterSchema, ToolSchema};
use assistant_core::{AssistantError, Result as CoreResult, Tool, ToolCall, ToolResult};

use crate::feed::QuoteSource;
use crate::model::{Portfolio, Position};

/// Tool for reviewing and maintaining portfolio positions
pub struct PortfolioReviewTool {
    source: Arc<dyn QuoteSource>,
    portfolios: Arc<RwLock<HashMap<String, Portfolio>>>,
}

impl PortfolioReviewTool {
    pub fn new(source: Arc<dyn QuoteSource>) -> Self {
        Self {
            source,
            portfolios: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn with_portfolios(
        source: Arc<dyn QuoteSource>,
        portfolios: Arc<RwLock<HashMap<String, Portfolio>>>,
    ) -> Self {
        Self { source, portfolios }
    }
}

#[async_trait]
impl Tool for PortfolioReviewTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "portfolio_review".into(),
            description: "View portfolio positions, P&L, and allocations, or add and remove positions.".into(),
            parameters: vec![
                ParameterSchema {
                    name: "action".into(),
                    param_type: "string".into(),
                    description: "Action: 'view', 'add', or 'remove'".into(),
                    required: true,
                },
                ParameterSchema {
                    name: "portfolio_id".into(),
                    param_type: "string".into(),
                    description: "Portfolio identifier (default: 'default')".into(),
                    required: false,
                },
                ParameterSchema {
                    name: "symbol".into(),
                    param_type: "string".into(),
                    description: "Ticker symbol (for add/remove)".into(),
                    required: false,
                },
                ParameterSchema {
                    name: "shares".into(),
                    param_type: "number".into(),
                    description: "Share count (for add)".into(),
                    required: false,
                },
                ParameterSchema {
                    name: "cost_basis".into(),
                    param_type: "number".into(),
                    description: "Cost basis per share in USD (for add)".into(),
                    required: false,
                },
            ],
        }
    }

    async fn execute(&self, call: &ToolCall) -> CoreResult<ToolResult> {
        let action = call
            .arguments
            .get("action")
            .and_then(|v| v.as_str())
            .unwrap_or("view");

        let portfolio_id = call
            .arguments
            .get("portfolio_id")
            .and_then(|v| v.as_str())
            .unwrap_or("default")
            .to_string();

        match action {
            "view" => self.view(&portfolio_id).await,
            "add" => {
                let symbol = call
                    .arguments
                    .get("symbol")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        AssistantError::ToolValidation("Symbol required for add".into())
                    })?;

                let shares = decimal_arg(call, "shares");
                let cost_basis = decimal_arg(call, "cost_basis");
                self.add(&portfolio_id, symbol, shares, cost_basis).await
            }
            "remove" => {
                let symbol = call
                    .arguments
                    .get("symbol")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        AssistantError::ToolValidation("Symbol required for remove".into())
                    })?;

                self.remove(&portfolio_id, symbol).await
            }
            _ => Ok(ToolResult::failure("portfolio_review", "Invalid action")),
        }
    }
}

fn decimal_arg(call: &ToolCall, name: &str) -> Decimal {
    call.arguments
        .get(name)
        .and_then(|v| v.as_f64())
        .map(|f| Decimal::from_f64_retain(f).unwrap_or(Decimal::ZERO))
        .unwrap_or(Decimal::ZERO)
}

impl PortfolioReviewTool {
    async fn view(&self, portfolio_id: &str) -> CoreResult<ToolResult> {
        // Re-mark positions before reporting
        let mut portfolios = self.portfolios.write().await;

        let portfolio = match portfolios.get_mut(portfolio_id) {
            Some(p) => p,
            None => {
                return Ok(ToolResult::success(
                    "portfolio_review",
                    format!(
                        "Portfolio '{}' not found. Use 'add' to create positions.",
                        portfolio_id
                    ),
                ))
            }
        };

        if portfolio.positions.is_empty() {
            return Ok(ToolResult::success(
                "portfolio_review",
                format!("Portfolio '{}' is empty.", portfolio_id),
            ));
        }

        let symbols: Vec<String> = portfolio.positions.keys().cloned().collect();
        for symbol in symbols {
            if let Ok(quote) = self.source.quote(&symbol).await {
                if let Some(pos) = portfolio.positions.get_mut(&symbol) {
                    pos.update_price(quote.price_usd);
                }
            }
        }

        let mut output = format!("Portfolio: {}\n", portfolio.name);

        let mut total_cost = Decimal::ZERO;
        let mut total_value = Decimal::ZERO;
        let mut positions: Vec<_> = portfolio.positions.values().collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));

        for pos in &positions {
            let sign = if pos.unrealized_pnl >= Decimal::ZERO {
                "+"
            } else {
                ""
            };
            output.push_str(&format!(
                "{:<6} {:>10.2} sh @ ${:.2} = ${:.2} ({}${:.2} / {}{:.1}%)\n",
                pos.symbol,
                pos.shares,
                pos.cost_basis,
                pos.current_value,
                sign,
                pos.unrealized_pnl,
                sign,
                pos.unrealized_pnl_pct
            ));
            total_cost += pos.total_cost();
            total_value += pos.current_value;
        }

        let total_pnl = total_value - total_cost;
        let total_pnl_pct = if total_cost > Decimal::ZERO {
            (total_pnl / total_cost) * dec!(100)
        } else {
            Decimal::ZERO
        };
        let sign = if total_pnl >= Decimal::ZERO { "+" } else { "" };

        output.push_str(&format!("Total cost:  ${:.2}\n", total_cost));
        output.push_str(&format!("Total value: ${:.2}\n", total_value));
        output.push_str(&format!(
            "Total P&L:   {}${:.2} ({}{:.1}%)\n",
            sign, total_pnl, sign, total_pnl_pct
        ));

        output.push_str("\nAllocations:\n");
        let allocations = portfolio.allocations();
        let mut allocs: Vec<_> = allocations.iter().collect();
        allocs.sort_by(|a, b| b.1.cmp(a.1));
        for (symbol, percent) in allocs {
            output.push_str(&format!("  {:<6} {:>5.1}%\n", symbol, percent));
        }

        Ok(ToolResult::success("portfolio_review", output.trim()))
    }

    async fn add(
        &self,
        portfolio_id: &str,
        symbol: &str,
        shares: Decimal,
        cost_basis: Decimal,
    ) -> CoreResult<ToolResult> {
        if shares <= Decimal::ZERO || cost_basis <= Decimal::ZERO {
            return Ok(ToolResult::failure(
                "portfolio_review",
                "Shares and cost_basis must be positive",
            ));
        }

        let mut portfolios = self.portfolios.write().await;
        let portfolio = portfolios
            .entry(portfolio_id.to_string())
            .or_insert_with(|| Portfolio::new(portfolio_id));

        let current_price = match self.source.quote(symbol).await {
            Ok(quote) => quote.price_usd,
            Err(_) => cost_basis,
        };

        let mut position = Position::new(symbol, shares, cost_basis);
        position.update_price(current_price);
        portfolio.add_position(position);

        Ok(ToolResult::success(
            "portfolio_review",
            format!(
                "Added {} {} at ${:.2}/share to portfolio '{}'",
                shares,
                symbol.to_uppercase(),
                cost_basis,
                portfolio_id
            ),
        ))
    }

    async fn remove(&self, portfolio_id: &str, symbol: &str) -> CoreResult<ToolResult> {
        let mut portfolios = self.portfolios.write().await;

        if let Some(portfolio) = portfolios.get_mut(portfolio_id) {
            if portfolio.positions.remove(&symbol.to_uppercase()).is_some() {
                return Ok(ToolResult::success(
                    "portfolio_review",
                    format!(
                        "Removed {} from portfolio '{}'",
                        symbol.to_uppercase(),
                        portfolio_id
                    ),
                ));
            }
        }

        Ok(ToolResult::failure(
            "portfolio_review",
            format!(
                "Position {} not found in portfolio '{}'",
                symbol, portfolio_id
            ),
        ))
    }
}
