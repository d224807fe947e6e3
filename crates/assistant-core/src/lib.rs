//! # assistant-core
//!
//! Request orchestration core for the business-assistant chat endpoint.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Request                                  │
//! │  ┌───────────┐   ┌──────────┐   ┌─────────────────────────────┐  │
//! │  │  Context  │──▶│   Mode   │──▶│  Invoker ─ or ─ Fan-Out/    │  │
//! │  │ Assembler │   │ Selector │   │            Synthesis        │  │
//! │  └───────────┘   └──────────┘   └─────────────────────────────┘  │
//! │        │                                       │                  │
//! │   (concurrent sub-fetches)          ResponseEnvelope              │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every entity here is created fresh per request and discarded once the
//! response envelope is emitted; persistence belongs to external
//! collaborators. The `LlmProvider` trait is the seam for backends.

pub mod context;
pub mod deadline;
pub mod envelope;
pub mod error;
pub mod fanout;
pub mod invoke;
pub mod message;
pub mod provider;
pub mod route;
pub mod tool;

pub use context::{AssembledContext, ContextAssembler, ContextRequest, FileContext, FragmentKind};
pub use deadline::Deadline;
pub use envelope::ResponseEnvelope;
pub use error::{AssistantError, Result};
pub use fanout::{FanOutConfig, FanOutOrchestrator, FanOutResult};
pub use invoke::{Invoker, InvokerConfig, LoopOutcome};
pub use message::{Conversation, Message, Role};
pub use provider::{
    Capabilities, CredentialStore, LlmProvider, ProviderFamily, ProviderSet, ProviderVariant,
};
pub use route::{select_route, ActiveMode, Route};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
