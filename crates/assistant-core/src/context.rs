//! Context Assembler
//!
//! Builds the final system instructions for a request from independently
//! fetched fragments. The three external lookups (custom instructions,
//! market data, history search) run concurrently, each wrapped so a failure
//! or timeout degrades to an omitted fragment plus a log line. Fragment
//! order is fixed by `FragmentKind` declaration order, never by fetch
//! completion order, because later fragments may reference earlier ones.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::deadline::Deadline;
use crate::error::Result;

/// An uploaded file attached to the request
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileContext {
    pub name: String,

    /// MIME type or short label
    #[serde(rename = "type")]
    pub kind: String,

    /// Size in bytes
    pub size: u64,

    /// Extracted text content
    pub content: String,
}

/// Named fragment slots, in final assembly order
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum FragmentKind {
    Base,
    CurrentDate,
    CustomInstructions,
    ModeOverlay,
    MarketData,
    HistoryContext,
    FileContext,
}

/// One instruction fragment in its slot
#[derive(Clone, Debug)]
pub struct Fragment {
    pub kind: FragmentKind,
    pub text: String,
}

/// Ordered, immutable accumulation of instruction fragments.
/// Partial context is always valid context; absent fragments are skipped.
#[derive(Clone, Debug, Default)]
pub struct AssembledContext {
    fragments: Vec<Fragment>,
}

impl AssembledContext {
    fn from_slots(slots: Vec<(FragmentKind, Option<String>)>) -> Self {
        let fragments = slots
            .into_iter()
            .filter_map(|(kind, text)| text.map(|text| Fragment { kind, text }))
            .collect();
        Self { fragments }
    }

    /// Final instruction string handed to the provider call
    pub fn render(&self) -> String {
        self.fragments
            .iter()
            .map(|f| f.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn fragment(&self, kind: FragmentKind) -> Option<&str> {
        self.fragments
            .iter()
            .find(|f| f.kind == kind)
            .map(|f| f.text.as_str())
    }

    /// Present fragment kinds in assembly order
    pub fn kinds(&self) -> Vec<FragmentKind> {
        self.fragments.iter().map(|f| f.kind).collect()
    }
}

/// User-history lookup service: returns free-text context for a query,
/// `None` when the search finds nothing.
#[async_trait]
pub trait HistoryArchive: Send + Sync {
    async fn search(
        &self,
        user_id: &str,
        workspace: Option<&str>,
        query: &str,
    ) -> Result<Option<String>>;
}

/// Market/ticker-data lookup: returns a preformatted data block for the
/// given symbols, `None` when none of them resolve.
#[async_trait]
pub trait MarketDataFeed: Send + Sync {
    async fn quote_block(&self, symbols: &[String]) -> Result<Option<String>>;
}

/// Per-user custom-instructions store
#[async_trait]
pub trait InstructionStore: Send + Sync {
    async fn fetch(&self, user_id: &str) -> Result<Option<String>>;
}

/// Per-request assembly inputs
#[derive(Clone, Debug, Default)]
pub struct ContextRequest {
    /// Latest user turn, used as the history query and for ticker extraction
    pub user_text: String,
    pub user_id: Option<String>,
    pub workspace: Option<String>,
    pub search_history: bool,
    /// Free-text mode overlay from the request
    pub mode_overlay: Option<String>,
    pub files: Vec<FileContext>,
}

const BASE_INSTRUCTIONS: &str = "You are a business assistant for a financial advisory practice. \
You help with client communication, market questions, report drafting, and portfolio review. \
Be precise with numbers, cite the data you were given, and say so plainly when you do not know something.";

const GROUNDED_HISTORY_HEADER: &str = "## Client history context\n\
The following records were retrieved from the user's archive for this request. \
Ground every statement about clients, meetings, or past reports strictly in these records. \
If a detail is not present below, say it is not in the records rather than inventing it.";

const NO_HISTORY_BLOCK: &str = "## Client history context\n\
A history search was performed for this request and returned no matching records. \
State explicitly that no matching records were found; do not invent client facts.";

/// Assembles the system instructions for one request
pub struct ContextAssembler {
    history: Arc<dyn HistoryArchive>,
    market: Arc<dyn MarketDataFeed>,
    instructions: Arc<dyn InstructionStore>,
    /// Budget for each individual sub-fetch, capped by the request deadline
    subfetch_budget: Duration,
}

impl ContextAssembler {
    pub fn new(
        history: Arc<dyn HistoryArchive>,
        market: Arc<dyn MarketDataFeed>,
        instructions: Arc<dyn InstructionStore>,
    ) -> Self {
        Self {
            history,
            market,
            instructions,
            subfetch_budget: Duration::from_secs(10),
        }
    }

    pub fn with_subfetch_budget(mut self, budget: Duration) -> Self {
        self.subfetch_budget = budget;
        self
    }

    /// Build the assembled context. Infallible: every sub-fetch failure
    /// degrades to an omitted fragment (or the explicit no-records block)
    /// and a warning.
    pub async fn assemble(&self, request: &ContextRequest, deadline: Deadline) -> AssembledContext {
        let budget = deadline.capped(self.subfetch_budget);

        let instructions_fut = self.fetch_instructions(request, budget);
        let market_fut = self.fetch_market(request, budget);
        let history_fut = self.fetch_history(request, budget);

        // Concurrent fetches; results land in predetermined slots below.
        let (instructions, market, history) =
            tokio::join!(instructions_fut, market_fut, history_fut);

        let date_line = format!(
            "Current date: {}",
            Utc::now().format("%A, %B %e, %Y")
        );

        AssembledContext::from_slots(vec![
            (FragmentKind::Base, Some(BASE_INSTRUCTIONS.to_string())),
            (FragmentKind::CurrentDate, Some(date_line)),
            (FragmentKind::CustomInstructions, instructions),
            (
                FragmentKind::ModeOverlay,
                request.mode_overlay.clone().filter(|s| !s.trim().is_empty()),
            ),
            (FragmentKind::MarketData, market),
            (FragmentKind::HistoryContext, history),
            (FragmentKind::FileContext, render_files(&request.files)),
        ])
    }

    async fn fetch_instructions(
        &self,
        request: &ContextRequest,
        budget: Deadline,
    ) -> Option<String> {
        let user_id = request.user_id.as_deref()?;

        match budget
            .bound("custom instructions fetch", self.instructions.fetch(user_id))
            .await
        {
            Ok(Ok(found)) => found.map(|text| format!("## User instructions\n{}", text)),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "custom instructions fetch failed, omitting fragment");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "custom instructions fetch timed out, omitting fragment");
                None
            }
        }
    }

    async fn fetch_market(&self, request: &ContextRequest, budget: Deadline) -> Option<String> {
        let symbols = extract_tickers(&request.user_text);
        if symbols.is_empty() {
            return None;
        }

        match budget
            .bound("market data fetch", self.market.quote_block(&symbols))
            .await
        {
            Ok(Ok(found)) => found.map(|block| format!("## Market data\n{}", block)),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "market data fetch failed, omitting fragment");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "market data fetch timed out, omitting fragment");
                None
            }
        }
    }

    /// History fragment. When search is requested, exactly one of the two
    /// instruction blocks is always produced: the strict-grounding block
    /// with the returned records, or the explicit no-records block. A failed
    /// or timed-out lookup degrades to the no-records block so the pairing
    /// invariant holds.
    async fn fetch_history(&self, request: &ContextRequest, budget: Deadline) -> Option<String> {
        if !request.search_history {
            return None;
        }
        let Some(user_id) = request.user_id.as_deref() else {
            tracing::warn!("history search requested without a user id");
            return Some(NO_HISTORY_BLOCK.to_string());
        };

        let outcome = budget
            .bound(
                "history search",
                self.history
                    .search(user_id, request.workspace.as_deref(), &request.user_text),
            )
            .await;

        match outcome {
            Ok(Ok(Some(records))) => {
                Some(format!("{}\n\n{}", GROUNDED_HISTORY_HEADER, records))
            }
            Ok(Ok(None)) => Some(NO_HISTORY_BLOCK.to_string()),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "history search failed, degrading to no-records block");
                Some(NO_HISTORY_BLOCK.to_string())
            }
            Err(e) => {
                tracing::warn!(error = %e, "history search timed out, degrading to no-records block");
                Some(NO_HISTORY_BLOCK.to_string())
            }
        }
    }
}

/// Render attached files as delimited blocks. Multiple files are enumerated
/// and the model is invited to compare across them.
fn render_files(files: &[FileContext]) -> Option<String> {
    if files.is_empty() {
        return None;
    }

    let mut out = String::from("## Attached files\n");
    if files.len() > 1 {
        out.push_str(&format!(
            "The user attached {} files. Consider them together and compare across files where relevant.\n",
            files.len()
        ));
    }

    for (i, file) in files.iter().enumerate() {
        out.push_str(&format!(
            "\nFile {} of {}: {} ({}, {} bytes)\n---\n{}\n---\n",
            i + 1,
            files.len(),
            file.name,
            file.kind,
            file.size,
            file.content
        ));
    }

    Some(out)
}

/// Candidate ticker symbols mentioned in a user turn: `$AAPL` style always,
/// plus bare 2-5 letter uppercase tokens that are not common English words.
pub fn extract_tickers(text: &str) -> Vec<String> {
    const STOPWORDS: &[&str] = &[
        "A", "AI", "AM", "AN", "AND", "ARE", "AS", "AT", "BE", "BUT", "BY", "CAN", "CEO", "CFO",
        "DO", "EPS", "ETF", "FOR", "GDP", "HAS", "HOW", "I", "IF", "IN", "IPO", "IS", "IT", "ME",
        "MY", "NO", "NOT", "OF", "OK", "ON", "OR", "OUR", "PE", "PLC", "Q1", "Q2", "Q3", "Q4",
        "SO", "THE", "TO", "UP", "US", "USA", "USD", "WE", "YOY",
    ];

    let mut symbols = Vec::new();
    for raw in text.split(|c: char| c.is_whitespace() || ",.;:!?()\"'".contains(c)) {
        let (explicit, token) = match raw.strip_prefix('$') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };

        let len_ok = (1..=5).contains(&token.len());
        if !len_ok || !token.chars().all(|c| c.is_ascii_uppercase()) {
            continue;
        }
        if !explicit && (token.len() < 2 || STOPWORDS.contains(&token)) {
            continue;
        }

        let symbol = token.to_string();
        if !symbols.contains(&symbol) {
            symbols.push(symbol);
        }
    }

    symbols.truncate(8);
    symbols
}
