//! Single-Provider Invoker
//!
//! Executes exactly one logical call against a provider variant using the
//! calling convention its capability record requires: native streaming,
//! single-shot, or the bounded tool-calling loop. Every convention yields a
//! `ResponseEnvelope`. The credential check runs before any network call.

use futures::StreamExt;
use std::sync::Arc;

use crate::context::AssembledContext;
use crate::deadline::{bound_stream, Deadline};
use crate::envelope::ResponseEnvelope;
use crate::error::{AssistantError, Result};
use crate::message::{Conversation, Message};
use crate::provider::{
    CredentialStore, GenerationOptions, ProviderSet, ProviderVariant, StreamChunk,
};
use crate::route::{ActiveMode, Route};
use crate::tool::{ToolCall, ToolRegistry, ToolResult};

/// Invoker configuration
#[derive(Clone, Debug)]
pub struct InvokerConfig {
    /// Round ceiling for the tool-calling loop. Exists to bound resource
    /// consumption from a misbehaving model; never unbounded.
    pub max_tool_rounds: usize,

    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: 6,
            temperature: 0.7,
            max_tokens: 2048,
        }
    }
}

/// Why the tool loop stopped
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopOutcome {
    /// The model produced a final answer
    Answered,
    /// The round ceiling was hit while the model was still requesting tools
    CeilingReached,
}

/// Result of one tool-loop run, including the termination reason
#[derive(Debug)]
pub struct ToolLoopRun {
    /// Final answer text
    pub text: String,
    /// Fragment granularity of the final round, for streaming forwarding
    pub deltas: Vec<String>,
    pub rounds: usize,
    pub outcome: LoopOutcome,
}

/// Executes single-provider calls
pub struct Invoker {
    providers: ProviderSet,
    credentials: CredentialStore,
    tools: Arc<ToolRegistry>,
    config: InvokerConfig,
}

impl Invoker {
    pub fn new(
        providers: ProviderSet,
        credentials: CredentialStore,
        tools: Arc<ToolRegistry>,
        config: InvokerConfig,
    ) -> Self {
        Self {
            providers,
            credentials,
            tools,
            config,
        }
    }

    fn options_for(&self, variant: ProviderVariant, system: String) -> GenerationOptions {
        GenerationOptions {
            model: variant.wire_model().into(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            system: Some(system),
            // Built-in search/grounding is a call-setup decision, not per-turn
            enable_search: variant.capabilities().built_in_search,
        }
    }

    /// Execute one call for a routed request. Combined-analysis routes are
    /// the fan-out orchestrator's job, not this invoker's.
    pub async fn invoke(
        &self,
        route: &Route,
        ctx: &AssembledContext,
        conversation: &Conversation,
        deadline: Deadline,
    ) -> Result<ResponseEnvelope> {
        self.credentials.require(route.variant)?;

        match route.mode {
            ActiveMode::CombinedAnalysis => Err(AssistantError::Config(
                "combined-analysis requests must go through the fan-out orchestrator".into(),
            )),
            ActiveMode::Portfolio => {
                self.tool_loop_stream(route.variant, ctx, conversation, deadline)
                    .await
            }
            ActiveMode::Default => {
                if route.variant.capabilities().streaming {
                    self.native_stream(route.variant, ctx, conversation, deadline)
                        .await
                } else {
                    let text = self
                        .single_shot(route.variant, &ctx.render(), conversation, deadline)
                        .await?;
                    Ok(ResponseEnvelope::Complete(text))
                }
            }
        }
    }

    /// Convention 1: persistent call, fragments forwarded as they arrive
    async fn native_stream(
        &self,
        variant: ProviderVariant,
        ctx: &AssembledContext,
        conversation: &Conversation,
        deadline: Deadline,
    ) -> Result<ResponseEnvelope> {
        let provider = self.providers.for_family(variant.family());
        let options = self.options_for(variant, ctx.render());

        let stream = deadline
            .bound(
                "stream setup",
                provider.complete_stream(conversation.messages(), &options),
            )
            .await??;

        Ok(ResponseEnvelope::Streaming(bound_stream(stream, deadline)))
    }

    /// Convention 2: one blocking call carrying the full payload. Also the
    /// building block for fan-out branches and synthesis.
    pub async fn single_shot(
        &self,
        variant: ProviderVariant,
        system: &str,
        conversation: &Conversation,
        deadline: Deadline,
    ) -> Result<String> {
        self.credentials.require(variant)?;

        let provider = self.providers.for_family(variant.family());
        let options = self.options_for(variant, system.to_string());

        let completion = deadline
            .bound(
                "single-shot call",
                provider.complete(conversation.messages(), &options),
            )
            .await??;

        Ok(completion.content)
    }

    /// Convention 3, streamed: run the loop, then forward the final round's
    /// fragments in arrival order.
    async fn tool_loop_stream(
        &self,
        variant: ProviderVariant,
        ctx: &AssembledContext,
        conversation: &Conversation,
        deadline: Deadline,
    ) -> Result<ResponseEnvelope> {
        let run = self
            .run_tool_loop(variant, ctx, conversation, deadline)
            .await?;

        tracing::info!(
            rounds = run.rounds,
            outcome = ?run.outcome,
            "tool loop finished"
        );

        let total = run.deltas.len();
        let chunks: Vec<crate::error::Result<StreamChunk>> = run
            .deltas
            .into_iter()
            .enumerate()
            .map(|(i, delta)| {
                Ok(StreamChunk {
                    delta,
                    done: i + 1 == total,
                })
            })
            .collect();

        Ok(ResponseEnvelope::Streaming(Box::pin(
            futures::stream::iter(chunks),
        )))
    }

    /// The bounded tool-calling loop. Each round the model output is
    /// buffered in full before anything is forwarded, so a tool request is
    /// never leaked to the caller. Tool failures go back to the model as
    /// structured error payloads; the loop never aborts on them.
    pub async fn run_tool_loop(
        &self,
        variant: ProviderVariant,
        ctx: &AssembledContext,
        conversation: &Conversation,
        deadline: Deadline,
    ) -> Result<ToolLoopRun> {
        self.credentials.require(variant)?;

        let provider = self.providers.for_family(variant.family());
        let system = format!("{}\n\n{}", ctx.render(), self.tools.prompt_section());
        let options = self.options_for(variant, system);

        let mut working: Vec<Message> = conversation.messages().to_vec();
        let mut last_content = String::new();

        for round in 1..=self.config.max_tool_rounds {
            let mut stream = deadline
                .bound(
                    "tool round setup",
                    provider.complete_stream(&working, &options),
                )
                .await??;

            let mut deltas = Vec::new();
            let mut content = String::new();
            while let Some(chunk) = deadline.bound("tool round fragment", stream.next()).await? {
                let chunk = chunk?;
                if !chunk.delta.is_empty() {
                    content.push_str(&chunk.delta);
                    deltas.push(chunk.delta);
                }
            }

            working.push(Message::assistant(&content));
            last_content = content.clone();

            match parse_tool_call(&content) {
                Some(call) => {
                    tracing::debug!(tool = %call.name, round, "executing tool");
                    let result = match self.tools.execute(&call).await {
                        Ok(r) => r.with_id(call.id.clone()),
                        Err(e) => {
                            ToolResult::failure(call.name.clone(), e.to_string())
                                .with_id(call.id.clone())
                        }
                    };
                    working.push(Message::tool(result.model_payload()));
                }
                None => {
                    return Ok(ToolLoopRun {
                        text: content,
                        deltas,
                        rounds: round,
                        outcome: LoopOutcome::Answered,
                    });
                }
            }
        }

        // Ceiling hit: the model requested tools on every round.
        let text = {
            let stripped = strip_tool_block(&last_content);
            if stripped.trim().is_empty() {
                "I could not finish the requested analysis within the allotted tool budget."
                    .to_string()
            } else {
                stripped
            }
        };

        Ok(ToolLoopRun {
            deltas: vec![text.clone()],
            text,
            rounds: self.config.max_tool_rounds,
            outcome: LoopOutcome::CeilingReached,
        })
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn config(&self) -> &InvokerConfig {
        &self.config
    }
}

const TOOL_FENCE_OPEN: &str = "```tool";
const TOOL_FENCE_CLOSE: &str = "```";

/// Parse a tool call from model output. Primary form is a fenced `tool`
/// code block; bare JSON with a `name`/`arguments` shape is accepted as a
/// fallback.
pub fn parse_tool_call(content: &str) -> Option<ToolCall> {
    if let Some(start) = content.find(TOOL_FENCE_OPEN) {
        let after = &content[start + TOOL_FENCE_OPEN.len()..];
        if let Some(end) = after.find(TOOL_FENCE_CLOSE) {
            let json_str = after[..end].trim();
            if let Ok(mut call) = serde_json::from_str::<ToolCall>(json_str) {
                if call.id.is_none() {
                    call.id = Some(uuid::Uuid::new_v4().to_string());
                }
                return Some(call);
            }
        }
    }

    parse_inline_tool_call(content)
}

fn parse_inline_tool_call(content: &str) -> Option<ToolCall> {
    if !content.contains(r#""arguments""#) {
        return None;
    }

    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end <= start {
        return None;
    }

    serde_json::from_str::<ToolCall>(&content[start..=end]).ok()
}

/// Remove the fenced tool block, keeping any surrounding prose
fn strip_tool_block(content: &str) -> String {
    match content.find(TOOL_FENCE_OPEN) {
        Some(start) => {
            let after = &content[start + TOOL_FENCE_OPEN.len()..];
            match after.find(TOOL_FENCE_CLOSE) {
                Some(end) => {
                    let tail = &after[end + TOOL_FENCE_CLOSE.len()..];
                    format!("{}{}", &content[..start], tail).trim().to_string()
                }
                None => content[..start].trim().to_string(),
            }
        }
        None => content.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fenced_tool_call() {
        let content = "Let me check.\n```tool\n{\"name\": \"quote_lookup\", \"arguments\": {\"symbols\": \"AAPL\"}}\n```";
        let call = parse_tool_call(content).unwrap();
        assert_eq!(call.name, "quote_lookup");
        assert!(call.id.is_some());
        assert_eq!(
            call.arguments.get("symbols").and_then(|v| v.as_str()),
            Some("AAPL")
        );
    }

    #[test]
    fn test_parse_inline_tool_call() {
        let content = r#"{"name": "portfolio_review", "arguments": {"action": "view"}}"#;
        let call = parse_tool_call(content).unwrap();
        assert_eq!(call.name, "portfolio_review");
    }

    #[test]
    fn test_plain_answer_is_not_a_tool_call() {
        assert!(parse_tool_call("AAPL closed at $232.50 today.").is_none());
    }

    #[test]
    fn test_strip_tool_block_keeps_prose() {
        let content = "Checking now.\n```tool\n{\"name\": \"x\", \"arguments\": {}}\n```\nDone soon.";
        assert_eq!(strip_tool_block(content), "Checking now.\n\nDone soon.");
    }
}
