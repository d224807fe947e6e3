//! Response Envelope
//!
//! The single outward result shape every calling convention is normalized
//! into. A request produces exactly one envelope; once chosen, its shape is
//! used consistently to the caller. The transport turns a `Complete`
//! envelope into a one-chunk stream, so the wire shape is uniform.

use futures::StreamExt;

use crate::error::Result;
use crate::provider::{CompletionStream, StreamChunk};

/// Either a live fragment sequence or one finished text body
pub enum ResponseEnvelope {
    /// Order-preserving, single-consumer fragment stream
    Streaming(CompletionStream),
    /// Fully materialized text
    Complete(String),
}

impl std::fmt::Debug for ResponseEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseEnvelope::Streaming(_) => f.debug_tuple("Streaming").field(&"..").finish(),
            ResponseEnvelope::Complete(text) => f.debug_tuple("Complete").field(text).finish(),
        }
    }
}

impl ResponseEnvelope {
    /// Normalize to a fragment stream. A complete body becomes a single
    /// final chunk.
    pub fn into_stream(self) -> CompletionStream {
        match self {
            ResponseEnvelope::Streaming(stream) => stream,
            ResponseEnvelope::Complete(text) => Box::pin(futures::stream::iter([Ok(
                StreamChunk {
                    delta: text,
                    done: true,
                },
            )])),
        }
    }

    /// Drain to a complete text body, propagating the first stream error
    pub async fn collect(self) -> Result<String> {
        match self {
            ResponseEnvelope::Complete(text) => Ok(text),
            ResponseEnvelope::Streaming(mut stream) => {
                let mut text = String::new();
                while let Some(chunk) = stream.next().await {
                    text.push_str(&chunk?.delta);
                }
                Ok(text)
            }
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, ResponseEnvelope::Streaming(_))
    }
}

impl From<String> for ResponseEnvelope {
    fn from(text: String) -> Self {
        ResponseEnvelope::Complete(text)
    }
}
