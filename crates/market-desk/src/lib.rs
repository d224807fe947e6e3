//! # market-desk
//!
//! Domain crate for the business assistant: market data collaborators, the
//! user-history archive, per-user instructions, and the portfolio toolkit
//! registered into the tool-calling loop.

pub mod archive;
pub mod error;
pub mod feed;
pub mod model;
pub mod tools;

pub use archive::{HistoryEntry, InMemoryHistoryArchive, InMemoryInstructionStore};
pub use error::{DeskError, Result};
pub use feed::{DeskMarketFeed, QuoteSource, StaticQuoteSource};
pub use model::{Portfolio, Position, Quote};
pub use tools::{PortfolioReviewTool, QuoteLookupTool};
