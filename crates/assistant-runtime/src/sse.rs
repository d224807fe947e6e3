//! Server-Sent Events plumbing
//!
//! Minimal SSE reader over a `reqwest` byte stream: buffers partial lines
//! across chunks and yields each `data:` payload as a string. Comment lines
//! and blank event separators are skipped.

use std::collections::VecDeque;
use std::pin::Pin;

use futures::stream::BoxStream;
use futures::{Stream, StreamExt};

use assistant_core::error::{AssistantError, Result};

struct EventReader {
    bytes: BoxStream<'static, reqwest::Result<bytes::Bytes>>,
    buffer: String,
    queue: VecDeque<String>,
    done: bool,
}

impl EventReader {
    fn new(response: reqwest::Response) -> Self {
        Self {
            bytes: response.bytes_stream().boxed(),
            buffer: String::new(),
            queue: VecDeque::new(),
            done: false,
        }
    }

    fn drain_lines(&mut self) {
        while let Some(pos) = self.buffer.find('\n') {
            let line = self.buffer[..pos].trim_end_matches('\r').to_string();
            self.buffer.drain(..=pos);
            Self::enqueue_line(&mut self.queue, &line);
        }
    }

    fn enqueue_line(queue: &mut VecDeque<String>, line: &str) {
        if line.is_empty() || line.starts_with(':') {
            return;
        }
        if let Some(data) = line.strip_prefix("data:") {
            queue.push_back(data.trim_start().to_string());
        }
    }

    async fn next_event(&mut self) -> Option<Result<String>> {
        loop {
            if let Some(event) = self.queue.pop_front() {
                return Some(Ok(event));
            }
            if self.done {
                return None;
            }

            match self.bytes.next().await {
                Some(Ok(chunk)) => {
                    self.buffer.push_str(&String::from_utf8_lossy(&chunk));
                    self.drain_lines();
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(AssistantError::Provider(format!(
                        "stream read error: {}",
                        e
                    ))));
                }
                None => {
                    self.done = true;
                    // Trailing line without a newline still counts
                    let line = std::mem::take(&mut self.buffer);
                    Self::enqueue_line(&mut self.queue, line.trim_end_matches('\r'));
                }
            }
        }
    }
}

/// Stream of `data:` payloads from an SSE response body
pub(crate) fn data_events(
    response: reqwest::Response,
) -> Pin<Box<dyn Stream<Item = Result<String>> + Send>> {
    Box::pin(futures::stream::unfold(
        EventReader::new(response),
        |mut reader| async move {
            reader.next_event().await.map(|item| (item, reader))
        },
    ))
}
