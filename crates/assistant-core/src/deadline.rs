//! Request Deadlines
//!
//! A single deadline is created per request and threaded through every
//! suspending operation: context sub-fetches, provider calls, tool-loop
//! rounds, fan-out branches, and synthesis. A slow or hung call therefore
//! cannot hold a request open indefinitely.

use std::future::Future;
use std::time::Duration;

use tokio::time::{timeout_at, Instant};

use crate::error::{AssistantError, Result};
use crate::provider::CompletionStream;

/// Monotonic point in time after which a request's suspending operations fail
#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// Deadline `budget` from now
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
        }
    }

    pub fn instant(&self) -> Instant {
        self.at
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// A tighter deadline: whichever comes first, this deadline or `cap`
    /// from now. Used to give sub-fetches a smaller budget than the request.
    pub fn capped(&self, cap: Duration) -> Self {
        let capped = Instant::now() + cap;
        Self {
            at: self.at.min(capped),
        }
    }

    /// Run a future against this deadline. `stage` names the operation for
    /// the error and the logs.
    pub async fn bound<F, T>(&self, stage: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        timeout_at(self.at, fut)
            .await
            .map_err(|_| AssistantError::DeadlineExceeded(stage))
    }
}

/// Wrap a completion stream so that waiting on the next fragment is also
/// bounded. On expiry the stream yields one deadline error and ends.
pub fn bound_stream(stream: CompletionStream, deadline: Deadline) -> CompletionStream {
    struct State {
        inner: CompletionStream,
        deadline: Deadline,
        finished: bool,
    }

    let state = State {
        inner: stream,
        deadline,
        finished: false,
    };

    Box::pin(futures::stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }
        use futures::StreamExt;
        match timeout_at(state.deadline.instant(), state.inner.next()).await {
            Ok(Some(item)) => Some((item, state)),
            Ok(None) => None,
            Err(_) => {
                state.finished = true;
                Some((
                    Err(AssistantError::DeadlineExceeded("stream fragment")),
                    state,
                ))
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::StreamChunk;
    use futures::StreamExt;

    #[tokio::test(start_paused = true)]
    async fn test_bound_expires() {
        let deadline = Deadline::after(Duration::from_millis(50));
        let result = deadline
            .bound("test sleep", tokio::time::sleep(Duration::from_secs(10)))
            .await;
        assert!(matches!(result, Err(AssistantError::DeadlineExceeded(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_capped_takes_minimum() {
        let deadline = Deadline::after(Duration::from_secs(60));
        let capped = deadline.capped(Duration::from_millis(10));
        assert!(capped.remaining() <= Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bound_stream_yields_error_then_ends() {
        let stalled: CompletionStream = Box::pin(futures::stream::unfold((), |()| async {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Some((
                Ok(StreamChunk {
                    delta: "late".into(),
                    done: false,
                }),
                (),
            ))
        }));

        let deadline = Deadline::after(Duration::from_millis(10));
        let mut bounded = bound_stream(stalled, deadline);

        let first = bounded.next().await.unwrap();
        assert!(matches!(first, Err(AssistantError::DeadlineExceeded(_))));
        assert!(bounded.next().await.is_none());
    }
}
