//! Application State

use std::sync::Arc;
use std::time::Duration;

use assistant_core::{ContextAssembler, CredentialStore, FanOutOrchestrator, Invoker};

/// Server timing configuration
#[derive(Clone, Copy, Debug)]
pub struct ServerConfig {
    /// Whole-request budget; the deadline threaded through every
    /// suspending operation
    pub request_budget: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            request_budget: Duration::from_secs(120),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let request_budget = std::env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Self::default().request_budget);

        Self { request_budget }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Single-provider invoker
    pub invoker: Arc<Invoker>,

    /// Combined-analysis orchestrator
    pub fanout: Arc<FanOutOrchestrator>,

    /// System-instruction assembler
    pub assembler: Arc<ContextAssembler>,

    /// Credential presence, for the health endpoint
    pub credentials: CredentialStore,

    pub config: ServerConfig,
}
