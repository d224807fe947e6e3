//! HTTP Handlers

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};

use assistant_core::context::{ContextRequest, FileContext};
use assistant_core::{select_route, ActiveMode, Conversation, Deadline, Message};

use crate::state::AppState;
use crate::transport;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncomingRole {
    User,
    Assistant,
}

#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    pub role: IncomingRole,
    pub content: String,
}

/// One value or an array of them; file context arrives both ways
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<IncomingMessage>,

    /// Model selector string; drives provider family and mode
    pub model: String,

    #[serde(default)]
    pub file_context: Option<OneOrMany<FileContext>>,

    #[serde(default)]
    pub search_my_history: bool,

    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default)]
    pub workspace_owner: Option<String>,

    #[serde(default)]
    pub mode_instructions: Option<String>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub gemini_configured: bool,
    pub openai_configured: bool,
    pub perplexity_configured: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        gemini_configured: state.credentials.contains("GEMINI_API_KEY"),
        openai_configured: state.credentials.contains("OPENAI_API_KEY"),
        perplexity_configured: state.credentials.contains("PERPLEXITY_API_KEY"),
    })
}

/// Main chat endpoint. Responds with a chunked `text/plain` body on
/// success, or `{"error": ...}` with 400 for malformed input and 500 for
/// configuration or provider failures.
pub async fn chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(json) => json,
        Err(rejection) => {
            return transport::error_response(StatusCode::BAD_REQUEST, rejection.body_text())
        }
    };

    if request.messages.is_empty() {
        return transport::error_response(
            StatusCode::BAD_REQUEST,
            "messages must not be empty",
        );
    }

    let conversation = to_conversation(request.messages);
    let Some(user_text) = conversation.last_user_text().map(str::to_string) else {
        return transport::error_response(
            StatusCode::BAD_REQUEST,
            "conversation contains no user message",
        );
    };

    let request_id = uuid::Uuid::new_v4();

    let route = match select_route(&request.model, &conversation) {
        Ok(route) => route,
        Err(e) => {
            tracing::error!(%request_id, error = %e, "routing failed");
            return transport::error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    };

    tracing::info!(
        %request_id,
        model = %request.model,
        mode = ?route.mode,
        variant = %route.variant,
        "chat request routed"
    );

    let deadline = Deadline::after(state.config.request_budget);

    let context_request = ContextRequest {
        user_text,
        user_id: request.user_id,
        workspace: request.workspace_owner,
        search_history: request.search_my_history,
        mode_overlay: request.mode_instructions,
        files: request
            .file_context
            .map(OneOrMany::into_vec)
            .unwrap_or_default(),
    };

    let ctx = state.assembler.assemble(&context_request, deadline).await;

    let result = match route.mode {
        ActiveMode::CombinedAnalysis => state.fanout.run(&ctx, &conversation, deadline).await,
        _ => {
            state
                .invoker
                .invoke(&route, &ctx, &conversation, deadline)
                .await
        }
    };

    match result {
        Ok(envelope) => transport::respond(envelope),
        Err(e) => {
            tracing::error!(%request_id, error = %e, "invocation failed");
            transport::error_response(StatusCode::INTERNAL_SERVER_ERROR, e.user_message())
        }
    }
}

fn to_conversation(messages: Vec<IncomingMessage>) -> Conversation {
    Conversation::from_messages(
        messages
            .into_iter()
            .map(|m| match m.role {
                IncomingRole::User => Message::user(m.content),
                IncomingRole::Assistant => Message::assistant(m.content),
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_context_accepts_one_or_many() {
        let one: ChatRequest = serde_json::from_value(serde_json::json!({
            "messages": [{"role": "user", "content": "hi"}],
            "model": "gemini-2.0-flash",
            "fileContext": {"name": "a.txt", "type": "text/plain", "size": 3, "content": "abc"}
        }))
        .unwrap();
        assert_eq!(one.file_context.unwrap().into_vec().len(), 1);

        let many: ChatRequest = serde_json::from_value(serde_json::json!({
            "messages": [{"role": "user", "content": "hi"}],
            "model": "gemini-2.0-flash",
            "fileContext": [
                {"name": "a.txt", "type": "text/plain", "size": 3, "content": "abc"},
                {"name": "b.txt", "type": "text/plain", "size": 3, "content": "def"}
            ]
        }))
        .unwrap();
        assert_eq!(many.file_context.unwrap().into_vec().len(), 2);
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let result = serde_json::from_value::<ChatRequest>(serde_json::json!({
            "messages": [{"role": "system", "content": "hi"}],
            "model": "gemini-2.0-flash"
        }));
        assert!(result.is_err());
    }
}
