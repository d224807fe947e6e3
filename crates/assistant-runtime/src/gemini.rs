//! Gemini Provider
//!
//! Native streaming backend. Search grounding is enabled at call setup by
//! attaching the `google_search` tool; Gemini then grounds the whole call,
//! not individual turns.

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

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini backend over the generativelanguage REST API
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiProvider {
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

    /// Convert conversation messages to Gemini `contents`. Tool results
    /// appear as user context, matching how the loop feeds them back.
    fn contents(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                let role = match m.role {
                    Role::Assistant => "model",
                    _ => "user",
                };
                json!({ "role": role, "parts": [{ "text": m.content }] })
            })
            .collect()
    }

    fn build_payload(messages: &[Message], options: &GenerationOptions) -> Value {
        let mut payload = json!({
            "contents": Self::contents(messages),
            "generationConfig": {
                "temperature": options.temperature,
                "maxOutputTokens": options.max_tokens,
            },
        });

        if let Some(system) = &options.system {
            payload["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }
        if options.enable_search {
            payload["tools"] = json!([{ "google_search": {} }]);
        }

        payload
    }

    async fn post(&self, endpoint: &str, stream: bool, payload: &Value) -> Result<reqwest::Response> {
        let mut url = format!(
            "{}/models/{}?key={}",
            self.base_url.trim_end_matches('/'),
            endpoint,
            self.api_key
        );
        if stream {
            url.push_str("&alt=sse");
        }

        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| AssistantError::ProviderUnavailable(e.to_string()))?;

        match response.status() {
            StatusCode::OK => Ok(response),
            status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 => {
                Err(AssistantError::ProviderUnavailable(format!(
                    "gemini returned {}",
                    status
                )))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(AssistantError::Provider(format!(
                    "gemini request failed: {} - {}",
                    status, body
                )))
            }
        }
    }

    fn extract_text(value: &Value) -> Option<String> {
        let parts = value
            .get("candidates")?
            .as_array()?
            .first()?
            .get("content")?
            .get("parts")?
            .as_array()?;

        let text: String = parts
            .iter()
            .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
            .collect();

        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::Gemini
    }

    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        let payload = Self::build_payload(messages, options);
        let endpoint = format!("{}:generateContent", options.model);

        let response = self.post(&endpoint, false, &payload).await?;
        let data: Value = response
            .json()
            .await
            .map_err(|e| AssistantError::Parse(e.to_string()))?;

        let content = Self::extract_text(&data).ok_or_else(|| {
            AssistantError::Parse("gemini response contained no text candidates".into())
        })?;

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
        let payload = Self::build_payload(messages, options);
        let endpoint = format!("{}:streamGenerateContent", options.model);

        let response = self.post(&endpoint, true, &payload).await?;

        let chunks = sse::data_events(response).filter_map(|item| async move {
            match item {
                Ok(payload) => match serde_json::from_str::<Value>(&payload) {
                    Ok(value) => Self::extract_text(&value).map(|delta| {
                        Ok(StreamChunk {
                            delta,
                            done: false,
                        })
                    }),
                    Err(e) => Some(Err(AssistantError::Parse(format!(
                        "bad gemini stream event: {}",
                        e
                    )))),
                },
                Err(e) => Some(Err(e)),
            }
        });

        Ok(Box::pin(chunks))
    }
}
