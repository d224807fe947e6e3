//! End-to-end orchestration tests over deterministic stub providers:
//! credential prechecks, the tool-calling loop bounds, and the
//! fan-out/synthesis barrier semantics.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;

use assistant_core::invoke::LoopOutcome;
use assistant_core::provider::{Completion, CompletionStream, GenerationOptions, StreamChunk};
use assistant_core::tool::{ParameterSchema, ToolSchema};
use assistant_core::{
    ActiveMode, AssembledContext, AssistantError, Conversation, CredentialStore, Deadline,
    FanOutConfig, FanOutOrchestrator, Invoker, InvokerConfig, LlmProvider, Message,
    ProviderFamily, ProviderSet, ProviderVariant, Result, Route, Tool, ToolCall, ToolRegistry,
    ToolResult,
};

/// Deterministic stub backend: scripted replies, call counting, input capture
struct StubProvider {
    family: ProviderFamily,
    replies: Mutex<VecDeque<String>>,
    default_reply: String,
    fail: bool,
    calls: AtomicUsize,
    /// Serialized message payload of every call, for synthesis-input asserts
    inputs: Mutex<Vec<String>>,
}

impl StubProvider {
    fn new(family: ProviderFamily, default_reply: &str) -> Arc<Self> {
        Arc::new(Self {
            family,
            replies: Mutex::new(VecDeque::new()),
            default_reply: default_reply.to_string(),
            fail: false,
            calls: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
        })
    }

    fn failing(family: ProviderFamily) -> Arc<Self> {
        Arc::new(Self {
            family,
            replies: Mutex::new(VecDeque::new()),
            default_reply: String::new(),
            fail: true,
            calls: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
        })
    }

    fn scripted(family: ProviderFamily, replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            family,
            replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
            default_reply: replies.last().unwrap_or(&"").to_string(),
            fail: false,
            calls: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }

    fn record(&self, messages: &[Message]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let payload = messages
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");
        self.inputs.lock().unwrap().push(payload);

        if self.fail {
            return Err(AssistantError::Provider("stub backend down".into()));
        }

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default_reply.clone());
        Ok(reply)
    }
}

#[async_trait]
impl LlmProvider for StubProvider {
    fn family(&self) -> ProviderFamily {
        self.family
    }

    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        let content = self.record(messages)?;
        Ok(Completion {
            content,
            model: options.model.clone(),
        })
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        _options: &GenerationOptions,
    ) -> Result<CompletionStream> {
        let reply = self.record(messages)?;

        // Two fragments so chunk ordering is observable
        let mid = reply.len() / 2;
        let chunks = vec![
            Ok(StreamChunk {
                delta: reply[..mid].to_string(),
                done: false,
            }),
            Ok(StreamChunk {
                delta: reply[mid..].to_string(),
                done: true,
            }),
        ];
        Ok(Box::pin(stream::iter(chunks)))
    }
}

/// Tool that counts executions and echoes a fixed quote line
struct CountingQuoteTool {
    executions: Arc<AtomicUsize>,
}

#[async_trait]
impl Tool for CountingQuoteTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "quote_lookup".into(),
            description: "Look up a quote".into(),
            parameters: vec![ParameterSchema {
                name: "symbols".into(),
                param_type: "string".into(),
                description: "Symbols".into(),
                required: false,
            }],
        }
    }

    async fn execute(&self, _call: &ToolCall) -> Result<ToolResult> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        Ok(ToolResult::success("quote_lookup", "AAPL $232.50"))
    }
}

struct Harness {
    gemini: Arc<StubProvider>,
    openai: Arc<StubProvider>,
    perplexity: Arc<StubProvider>,
    invoker: Arc<Invoker>,
    tool_executions: Arc<AtomicUsize>,
}

fn all_credentials() -> CredentialStore {
    CredentialStore::new()
        .with("GEMINI_API_KEY", "k1")
        .with("OPENAI_API_KEY", "k2")
        .with("PERPLEXITY_API_KEY", "k3")
}

fn harness(
    gemini: Arc<StubProvider>,
    openai: Arc<StubProvider>,
    perplexity: Arc<StubProvider>,
    credentials: CredentialStore,
    max_tool_rounds: usize,
) -> Harness {
    let tool_executions = Arc::new(AtomicUsize::new(0));
    let mut tools = ToolRegistry::new();
    tools.register(CountingQuoteTool {
        executions: tool_executions.clone(),
    });

    let providers = ProviderSet::new(gemini.clone(), openai.clone(), perplexity.clone());
    let invoker = Arc::new(Invoker::new(
        providers,
        credentials,
        Arc::new(tools),
        InvokerConfig {
            max_tool_rounds,
            ..Default::default()
        },
    ));

    Harness {
        gemini,
        openai,
        perplexity,
        invoker,
        tool_executions,
    }
}

fn deadline() -> Deadline {
    Deadline::after(Duration::from_secs(30))
}

fn user_conversation(text: &str) -> Conversation {
    Conversation::from_messages(vec![Message::user(text)])
}

const TOOL_CALL_REPLY: &str =
    "```tool\n{\"name\": \"quote_lookup\", \"arguments\": {\"symbols\": \"AAPL\"}}\n```";

#[tokio::test]
async fn missing_credential_fails_before_any_provider_call() {
    let h = harness(
        StubProvider::new(ProviderFamily::Gemini, "hello"),
        StubProvider::new(ProviderFamily::OpenAi, "hello"),
        StubProvider::new(ProviderFamily::Perplexity, "hello"),
        CredentialStore::new().with("OPENAI_API_KEY", "k2"),
        6,
    );

    let route = Route {
        variant: ProviderVariant::GeminiFlash,
        mode: ActiveMode::Default,
    };
    let err = h
        .invoker
        .invoke(
            &route,
            &AssembledContext::default(),
            &user_conversation("hi"),
            deadline(),
        )
        .await
        .unwrap_err();

    assert!(err.is_configuration());
    assert_eq!(h.gemini.calls(), 0);
    assert_eq!(h.openai.calls(), 0);
    assert_eq!(h.perplexity.calls(), 0);
}

#[tokio::test]
async fn default_route_streams_in_order() {
    let h = harness(
        StubProvider::new(ProviderFamily::Gemini, "Hello world"),
        StubProvider::new(ProviderFamily::OpenAi, ""),
        StubProvider::new(ProviderFamily::Perplexity, ""),
        all_credentials(),
        6,
    );

    let route = Route {
        variant: ProviderVariant::GeminiFlash,
        mode: ActiveMode::Default,
    };
    let envelope = h
        .invoker
        .invoke(
            &route,
            &AssembledContext::default(),
            &user_conversation("hi"),
            deadline(),
        )
        .await
        .unwrap();

    assert!(envelope.is_streaming());
    assert_eq!(envelope.collect().await.unwrap(), "Hello world");
    assert_eq!(h.gemini.calls(), 1);
}

#[tokio::test]
async fn non_streaming_variant_yields_complete_envelope() {
    let h = harness(
        StubProvider::new(ProviderFamily::Gemini, ""),
        StubProvider::new(ProviderFamily::OpenAi, ""),
        StubProvider::new(ProviderFamily::Perplexity, "Search-grounded answer"),
        all_credentials(),
        6,
    );

    let route = Route {
        variant: ProviderVariant::PerplexitySonar,
        mode: ActiveMode::Default,
    };
    let envelope = h
        .invoker
        .invoke(
            &route,
            &AssembledContext::default(),
            &user_conversation("hi"),
            deadline(),
        )
        .await
        .unwrap();

    assert!(!envelope.is_streaming());
    assert_eq!(envelope.collect().await.unwrap(), "Search-grounded answer");
}

#[tokio::test]
async fn tool_loop_terminates_at_ceiling_when_model_always_requests_tools() {
    let h = harness(
        StubProvider::new(ProviderFamily::Gemini, TOOL_CALL_REPLY),
        StubProvider::new(ProviderFamily::OpenAi, ""),
        StubProvider::new(ProviderFamily::Perplexity, ""),
        all_credentials(),
        3,
    );

    let run = h
        .invoker
        .run_tool_loop(
            ProviderVariant::GeminiPro,
            &AssembledContext::default(),
            &user_conversation("review my portfolio"),
            deadline(),
        )
        .await
        .unwrap();

    assert_eq!(run.rounds, 3);
    assert_eq!(run.outcome, LoopOutcome::CeilingReached);
    assert_eq!(h.gemini.calls(), 3);
    assert_eq!(h.tool_executions.load(Ordering::SeqCst), 3);
    assert!(!run.text.is_empty());
}

#[tokio::test]
async fn tool_loop_feeds_result_back_and_answers() {
    let h = harness(
        StubProvider::scripted(
            ProviderFamily::Gemini,
            &[TOOL_CALL_REPLY, "AAPL trades at $232.50."],
        ),
        StubProvider::new(ProviderFamily::OpenAi, ""),
        StubProvider::new(ProviderFamily::Perplexity, ""),
        all_credentials(),
        6,
    );

    let run = h
        .invoker
        .run_tool_loop(
            ProviderVariant::GeminiPro,
            &AssembledContext::default(),
            &user_conversation("price my portfolio"),
            deadline(),
        )
        .await
        .unwrap();

    assert_eq!(run.rounds, 2);
    assert_eq!(run.outcome, LoopOutcome::Answered);
    assert_eq!(run.text, "AAPL trades at $232.50.");
    assert_eq!(h.tool_executions.load(Ordering::SeqCst), 1);

    // The second round saw the structured tool result
    let inputs = h.gemini.inputs();
    assert!(inputs[1].contains("\"ok\":true"));
    assert!(inputs[1].contains("AAPL $232.50"));
}

#[tokio::test]
async fn tool_failure_is_returned_to_model_not_raised() {
    struct BrokenTool;

    #[async_trait]
    impl Tool for BrokenTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "quote_lookup".into(),
                description: "Look up a quote".into(),
                parameters: vec![],
            }
        }

        async fn execute(&self, _call: &ToolCall) -> Result<ToolResult> {
            Err(AssistantError::ToolExecution("feed unreachable".into()))
        }
    }

    let gemini = StubProvider::scripted(
        ProviderFamily::Gemini,
        &[TOOL_CALL_REPLY, "The quote service is unavailable."],
    );
    let mut tools = ToolRegistry::new();
    tools.register(BrokenTool);

    let invoker = Invoker::new(
        ProviderSet::new(
            gemini.clone(),
            StubProvider::new(ProviderFamily::OpenAi, ""),
            StubProvider::new(ProviderFamily::Perplexity, ""),
        ),
        all_credentials(),
        Arc::new(tools),
        InvokerConfig::default(),
    );

    let run = invoker
        .run_tool_loop(
            ProviderVariant::GeminiPro,
            &AssembledContext::default(),
            &user_conversation("my portfolio"),
            deadline(),
        )
        .await
        .unwrap();

    // The loop survived the tool failure and the model saw a structured error
    assert_eq!(run.outcome, LoopOutcome::Answered);
    let inputs = gemini.inputs();
    assert!(inputs[1].contains("\"ok\":false"));
    assert!(inputs[1].contains("feed unreachable"));
}

#[tokio::test]
async fn combined_analysis_issues_exactly_four_calls_and_embeds_branches() {
    let h = harness(
        StubProvider::new(ProviderFamily::Gemini, "A"),
        StubProvider::scripted(ProviderFamily::OpenAi, &["B", "Synthesized outlook"]),
        StubProvider::new(ProviderFamily::Perplexity, "C"),
        all_credentials(),
        6,
    );

    let orchestrator = FanOutOrchestrator::new(h.invoker.clone(), FanOutConfig::default());
    let result = orchestrator
        .run_detailed(
            &AssembledContext::default(),
            &user_conversation("What is the Q3 outlook?"),
            deadline(),
        )
        .await
        .unwrap();

    assert_eq!(
        h.gemini.calls() + h.openai.calls() + h.perplexity.calls(),
        4
    );
    assert_eq!(result.synthesis, "Synthesized outlook");

    // The synthesis call (the openai stub's second input) embeds the
    // question and every branch output literally.
    let synthesis_input = h.openai.inputs().pop().unwrap();
    assert!(synthesis_input.contains("What is the Q3 outlook?"));
    assert!(synthesis_input.contains("A"));
    assert!(synthesis_input.contains("B"));
    assert!(synthesis_input.contains("C"));
}

#[tokio::test]
async fn failed_branch_degrades_without_aborting_fanout() {
    let h = harness(
        StubProvider::failing(ProviderFamily::Gemini),
        StubProvider::scripted(ProviderFamily::OpenAi, &["B", "Partial synthesis"]),
        StubProvider::new(ProviderFamily::Perplexity, "C"),
        all_credentials(),
        6,
    );

    let orchestrator = FanOutOrchestrator::new(h.invoker.clone(), FanOutConfig::default());
    let result = orchestrator
        .run_detailed(
            &AssembledContext::default(),
            &user_conversation("What is the Q3 outlook?"),
            deadline(),
        )
        .await
        .unwrap();

    let gemini_branch = result
        .branches
        .iter()
        .find(|b| b.family == ProviderFamily::Gemini)
        .unwrap();
    assert!(gemini_branch.failed);
    assert!(gemini_branch.text.is_empty());

    // Both surviving branches reached the synthesis input
    let synthesis_input = h.openai.inputs().pop().unwrap();
    assert!(synthesis_input.contains("B"));
    assert!(synthesis_input.contains("C"));
    assert!(synthesis_input.contains("returned no analysis"));
    assert_eq!(result.synthesis, "Partial synthesis");
}

#[tokio::test]
async fn missing_synthesis_credential_fails_before_branches_launch() {
    let h = harness(
        StubProvider::new(ProviderFamily::Gemini, "A"),
        StubProvider::new(ProviderFamily::OpenAi, "B"),
        StubProvider::new(ProviderFamily::Perplexity, "C"),
        CredentialStore::new()
            .with("GEMINI_API_KEY", "k1")
            .with("PERPLEXITY_API_KEY", "k3"),
        6,
    );

    let orchestrator = FanOutOrchestrator::new(h.invoker.clone(), FanOutConfig::default());
    let err = orchestrator
        .run_detailed(
            &AssembledContext::default(),
            &user_conversation("outlook?"),
            deadline(),
        )
        .await
        .unwrap_err();

    assert!(err.is_configuration());
    assert_eq!(
        h.gemini.calls() + h.openai.calls() + h.perplexity.calls(),
        0
    );
}

#[test]
fn routing_is_deterministic_for_identical_payloads() {
    let conversation = Conversation::from_messages(vec![
        Message::user("How is my portfolio doing?"),
        Message::assistant("Let me look."),
    ]);

    let a = assistant_core::select_route("gemini-2.0-flash", &conversation).unwrap();
    let b = assistant_core::select_route("gemini-2.0-flash", &conversation).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.mode, ActiveMode::Portfolio);
}
