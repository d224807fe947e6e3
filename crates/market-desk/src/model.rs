//! Domain Models
//!
//! Core data types for equity quotes and portfolio tracking.
//! Uses `rust_decimal` for all monetary values - never use f64 for money!

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A quoted equity or fund
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Quote {
    /// Ticker symbol (e.g., "AAPL", "SPY")
    pub symbol: String,

    /// Company or fund name
    pub name: String,

    /// Last price in USD
    pub price_usd: Decimal,

    /// Day-over-day change percentage
    pub change_pct: Decimal,

    /// Last quote update
    pub updated_at: DateTime<Utc>,
}

impl Quote {
    pub fn new(symbol: impl Into<String>, name: impl Into<String>, price_usd: Decimal) -> Self {
        Self {
            symbol: symbol.into().to_uppercase(),
            name: name.into(),
            price_usd,
            change_pct: Decimal::ZERO,
            updated_at: Utc::now(),
        }
    }

    /// One-line rendering for prompt blocks and tool output
    pub fn summary_line(&self) -> String {
        format!(
            "{}: ${:.2} ({:+.2}% today) - {}",
            self.symbol, self.price_usd, self.change_pct, self.name
        )
    }
}

/// A position in a portfolio
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,

    /// Shares held
    pub shares: Decimal,

    /// Average cost basis per share
    pub cost_basis: Decimal,

    /// Current value (shares * last price)
    pub current_value: Decimal,

    pub unrealized_pnl: Decimal,
    pub unrealized_pnl_pct: Decimal,

    pub opened_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    pub fn new(symbol: impl Into<String>, shares: Decimal, cost_basis: Decimal) -> Self {
        let total_cost = shares * cost_basis;
        Self {
            symbol: symbol.into().to_uppercase(),
            shares,
            cost_basis,
            current_value: total_cost,
            unrealized_pnl: Decimal::ZERO,
            unrealized_pnl_pct: Decimal::ZERO,
            opened_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    /// Re-mark the position at the given price
    pub fn update_price(&mut self, price: Decimal) {
        self.current_value = self.shares * price;
        let total_cost = self.shares * self.cost_basis;
        self.unrealized_pnl = self.current_value - total_cost;

        if total_cost > Decimal::ZERO {
            self.unrealized_pnl_pct = (self.unrealized_pnl / total_cost) * Decimal::from(100);
        }

        self.updated_at = Utc::now();
    }

    pub fn total_cost(&self) -> Decimal {
        self.shares * self.cost_basis
    }
}

/// A named collection of positions
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Portfolio {
    pub name: String,
    pub positions: HashMap<String, Position>,
    pub created_at: DateTime<Utc>,
}

impl Portfolio {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            positions: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn add_position(&mut self, position: Position) {
        self.positions.insert(position.symbol.clone(), position);
    }

    pub fn total_value(&self) -> Decimal {
        self.positions.values().map(|p| p.current_value).sum()
    }

    /// Allocation percentage per symbol of current value
    pub fn allocations(&self) -> HashMap<String, Decimal> {
        let total = self.total_value();
        if total <= Decimal::ZERO {
            return HashMap::new();
        }

        self.positions
            .iter()
            .map(|(symbol, pos)| {
                (
                    symbol.clone(),
                    (pos.current_value / total) * Decimal::from(100),
                )
            })
            .collect()
    }
}
