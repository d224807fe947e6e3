//! OpenAI Provider
//!
//! Chat-completions backend serving both the standard variant and the
//! tool-capable variant the portfolio loop runs on.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use assistant_core::error::{AssistantError, Result};
use assistant_core::message::{Message, Role};
use assistant_core::provider::{
    Completion, CompletionStream, GenerationOptions, LlmProvider, ProviderFamily, StreamChunk,
};

use crate::sse;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI backend over the chat-completions API
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| AssistantError::Config(e.to_string()))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.into(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn wire_messages(messages: &[Message], options: &GenerationOptions) -> Vec<Value> {
        let mut wire = Vec::new();

        if let Some(system) = &options.system {
            if !system.is_empty() {
                wire.push(json!({ "role": "system", "content": system }));
            }
        }

        for message in messages {
            let role = match message.role {
                Role::System => "system",
                Role::Assistant => "assistant",
                // Tool results go back as user context; the loop formats them
                Role::User | Role::Tool => "user",
            };
            wire.push(json!({ "role": role, "content": message.content }));
        }

        wire
    }

    fn build_payload(
        messages: &[Message],
        options: &GenerationOptions,
        stream: bool,
    ) -> Value {
        let mut payload = json!({
            "model": options.model,
            "messages": Self::wire_messages(messages, options),
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
        });
        if stream {
            payload["stream"] = json!(true);
        }
        payload
    }

    async fn post(&self, payload: &Value) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .await
            .map_err(|e| AssistantError::ProviderUnavailable(e.to_string()))?;

        match response.status() {
            StatusCode::OK => Ok(response),
            status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 => {
                Err(AssistantError::ProviderUnavailable(format!(
                    "openai returned {}",
                    status
                )))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(AssistantError::Provider(format!(
                    "openai request failed: {} - {}",
                    status, body
                )))
            }
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::OpenAi
    }

    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        let payload = Self::build_payload(messages, options, false);
        let response = self.post(&payload).await?;

        let data: Value = response
            .json()
            .await
            .map_err(|e| AssistantError::Parse(e.to_string()))?;

        let content = data
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| {
                AssistantError::Parse("openai response contained no message content".into())
            })?
            .to_string();

        Ok(Completion {
            content,
            model: options.model.clone(),
        })
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<CompletionStream> {
        let payload = Self::build_payload(messages, options, true);
        let response = self.post(&payload).await?;

        let chunks = sse::data_events(response)
            .take_while(|item| {
                let continue_ = !matches!(item, Ok(payload) if payload == "[DONE]");
                async move { continue_ }
            })
            .filter_map(|item| async move {
                match item {
                    Ok(payload) => match serde_json::from_str::<Value>(&payload) {
                        Ok(value) => value
                            .get("choices")
                            .and_then(|c| c.as_array())
                            .and_then(|arr| arr.first())
                            .and_then(|choice| choice.get("delta"))
                            .and_then(|d| d.get("content"))
                            .and_then(|c| c.as_str())
                            .filter(|delta| !delta.is_empty())
                            .map(|delta| {
                                Ok(StreamChunk {
                                    delta: delta.to_string(),
                                    done: false,
                                })
                            }),
                        Err(e) => Some(Err(AssistantError::Parse(format!(
                            "bad openai stream event: {}",
                            e
                        )))),
                    },
                    Err(e) => Some(Err(e)),
                }
            });

        Ok(Box::pin(chunks))
    }
}
