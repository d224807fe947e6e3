//! Business Assistant HTTP Server
//!
//! Axum-based server exposing the chat orchestration core: per-request
//! context assembly, provider routing, streaming and fan-out invocation.

mod handlers;
mod state;
mod transport;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use assistant_core::{
    ContextAssembler, CredentialStore, FanOutConfig, FanOutOrchestrator, Invoker, InvokerConfig,
    ProviderSet, ToolRegistry,
};
use assistant_runtime::{GeminiProvider, OpenAiProvider, PerplexityProvider};
use market_desk::{
    DeskMarketFeed, InMemoryHistoryArchive, InMemoryInstructionStore, PortfolioReviewTool,
    QuoteLookupTool, StaticQuoteSource,
};

const CREDENTIAL_NAMES: [&str; 3] = ["GEMINI_API_KEY", "OPENAI_API_KEY", "PERPLEXITY_API_KEY"];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    // Credentials are read once at startup and never mutated. Backends are
    // constructed unconditionally; the invoker's credential precheck keeps
    // unconfigured ones from ever being called.
    let credentials = CredentialStore::from_env(&CREDENTIAL_NAMES);
    for name in CREDENTIAL_NAMES {
        if credentials.contains(name) {
            tracing::info!("✓ {} configured", name);
        } else {
            tracing::warn!("⚠ {} not set - that provider family is disabled", name);
        }
    }

    let providers = ProviderSet::new(
        Arc::new(GeminiProvider::new(
            credentials.get("GEMINI_API_KEY").unwrap_or_default(),
        )?),
        Arc::new(OpenAiProvider::new(
            credentials.get("OPENAI_API_KEY").unwrap_or_default(),
        )?),
        Arc::new(PerplexityProvider::new(
            credentials.get("PERPLEXITY_API_KEY").unwrap_or_default(),
        )?),
    );

    // Market desk: quote source, portfolio toolkit, collaborator stores
    let quotes = Arc::new(StaticQuoteSource::new());

    let mut tools = ToolRegistry::new();
    tools.register(QuoteLookupTool::new(quotes.clone()));
    tools.register(PortfolioReviewTool::new(quotes.clone()));

    tracing::info!("Registered {} tools:", tools.len());
    for name in tools.names() {
        tracing::info!("  • {}", name);
    }

    let assembler = ContextAssembler::new(
        Arc::new(InMemoryHistoryArchive::new()),
        Arc::new(DeskMarketFeed::new(quotes)),
        Arc::new(InMemoryInstructionStore::new()),
    )
    .with_subfetch_budget(subfetch_budget());

    let invoker = Arc::new(Invoker::new(
        providers,
        credentials.clone(),
        Arc::new(tools),
        InvokerConfig {
            max_tool_rounds: max_tool_rounds(),
            ..Default::default()
        },
    ));
    let fanout = Arc::new(FanOutOrchestrator::new(
        invoker.clone(),
        FanOutConfig::default(),
    ));

    let state = state::AppState {
        invoker,
        fanout,
        assembler: Arc::new(assembler),
        credentials,
        config: state::ServerConfig::from_env(),
    };

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router
    let app = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/chat", post(handlers::chat_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("assistant-server running on http://{}", addr);
    tracing::info!("  GET  /health   - health and configured providers");
    tracing::info!("  POST /api/chat - chat endpoint (chunked text response)");

    axum::serve(listener, app).await?;

    Ok(())
}

fn subfetch_budget() -> Duration {
    std::env::var("SUBFETCH_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(10))
}

fn max_tool_rounds() -> usize {
    std::env::var("MAX_TOOL_ROUNDS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(6)
}
