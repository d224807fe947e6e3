//! Perplexity Provider
//!
//! Single-shot, search-augmented backend. The API is OpenAI-compatible but
//! search happens server-side on every call and there is no incremental
//! output in the convention this assistant uses, so `complete_stream`
//! buffers a full completion into one final chunk.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use assistant_core::error::{AssistantError, Result};
use assistant_core::message::{Message, Role};
use assistant_core::provider::{
    Completion, CompletionStream, GenerationOptions, LlmProvider, ProviderFamily, StreamChunk,
};

const DEFAULT_BASE_URL: &str = "https://api.perplexity.ai";

/// Perplexity backend
pub struct PerplexityProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl PerplexityProvider {
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
                Role::User | Role::Tool => "user",
            };
            wire.push(json!({ "role": role, "content": message.content }));
        }

        wire
    }
}

#[async_trait]
impl LlmProvider for PerplexityProvider {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::Perplexity
    }

    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        let payload = json!({
            "model": options.model,
            "messages": Self::wire_messages(messages, options),
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
        });

        let url = format!(
            "{}/chat/completions",
            self.base_url.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AssistantError::ProviderUnavailable(e.to_string()))?;

        let data: Value = match response.status() {
            StatusCode::OK => response
                .json()
                .await
                .map_err(|e| AssistantError::Parse(e.to_string()))?,
            status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 => {
                return Err(AssistantError::ProviderUnavailable(format!(
                    "perplexity returned {}",
                    status
                )))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                return Err(AssistantError::Provider(format!(
                    "perplexity request failed: {} - {}",
                    status, body
                )));
            }
        };

        let content = data
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| {
                AssistantError::Parse("perplexity response contained no message content".into())
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
        // No incremental convention here; buffer the full answer into a
        // single final chunk.
        let completion = self.complete(messages, options).await?;

        Ok(Box::pin(futures::stream::iter([Ok(StreamChunk {
            delta: completion.content,
            done: true,
        })])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_complete_parses_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": { "role": "assistant", "content": "Search-grounded answer" }
                }]
            })))
            .mount(&server)
            .await;

        let provider = PerplexityProvider::new("test-key")
            .unwrap()
            .with_base_url(server.uri());

        let completion = provider
            .complete(
                &[Message::user("hi")],
                &GenerationOptions {
                    model: "sonar-pro".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(completion.content, "Search-grounded answer");
    }
}
