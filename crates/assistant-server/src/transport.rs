//! Response Transport
//!
//! Shape adapter between response envelopes and the wire. Every envelope is
//! emitted as a chunked `text/plain` body; a complete body is a one-chunk
//! stream, so the caller contract is uniform regardless of which invocation
//! convention produced the data. This is also the single place where the
//! stream lifecycle (open, fragments, close-or-error) is enforced: a
//! mid-stream error aborts the body rather than truncating it silently.

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use futures::StreamExt;
use serde_json::json;

use assistant_core::ResponseEnvelope;

const CONTENT_TYPE_TEXT: &str = "text/plain; charset=utf-8";
const CONTENT_TYPE_JSON: &str = "application/json";

/// Emit an envelope as the HTTP response body
pub fn respond(envelope: ResponseEnvelope) -> Response {
    let stream = envelope.into_stream().filter_map(|item| async move {
        match item {
            Ok(chunk) if chunk.delta.is_empty() => None,
            Ok(chunk) => Some(Ok::<Bytes, std::io::Error>(Bytes::from(chunk.delta))),
            Err(e) => {
                tracing::error!(error = %e, "response stream failed mid-body");
                Some(Err(std::io::Error::other(e.to_string())))
            }
        }
    });

    let mut response = Response::new(Body::from_stream(stream));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(CONTENT_TYPE_TEXT),
    );
    response
}

/// JSON error body: `{"error": "..."}`
pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let body = json!({ "error": message.into() }).to_string();

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(CONTENT_TYPE_JSON),
    );
    response
}
