use crate::error::GenerationError;
use crate::types::{FinishReason, GenerationResponse, StreamChunk};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::warn;

/// Finite, non-restartable stream of one generation's chunks.
///
/// Yields text chunks in generation order, then exactly one terminal item:
/// a chunk with `is_complete = true`, or the error that ended the call.
/// Dropping the stream cancels the generation.
pub struct GenerationStream {
    receiver: ReceiverStream<Result<StreamChunk, GenerationError>>,
    cancel: CancellationToken,
    _cancel_on_drop: DropGuard,
    finished: bool,
}

impl GenerationStream {
    pub(crate) fn new(
        receiver: mpsc::Receiver<Result<StreamChunk, GenerationError>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            receiver: ReceiverStream::new(receiver),
            _cancel_on_drop: cancel.clone().drop_guard(),
            cancel,
            finished: false,
        }
    }

    /// Ask the generation to stop. The stream still ends with a completion
    /// chunk whose reason is [`FinishReason::Cancelled`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Drain the stream into a single response.
    ///
    /// The response carries the worker's measured generation time.
    pub async fn aggregate(mut self) -> Result<GenerationResponse, GenerationError> {
        let mut text = String::new();

        while let Some(item) = self.next().await {
            let chunk = item?;
            text.push_str(&chunk.text);
            if chunk.is_complete {
                return Ok(GenerationResponse {
                    text,
                    tokens_generated: chunk.token_count,
                    generation_time: chunk.generation_time.unwrap_or_default(),
                    finish_reason: chunk.finish_reason.unwrap_or(FinishReason::EndOfGeneration),
                });
            }
        }

        Err(GenerationError::Worker(
            "stream ended without a completion chunk".to_string(),
        ))
    }
}

impl Stream for GenerationStream {
    type Item = Result<StreamChunk, GenerationError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }

        match Pin::new(&mut self.receiver).poll_next(cx) {
            Poll::Ready(Some(item)) => {
                self.finished = match &item {
                    Ok(chunk) => chunk.is_complete,
                    Err(_) => true,
                };
                Poll::Ready(Some(item))
            }
            Poll::Ready(None) => {
                // The worker hung up without a terminal item, which only
                // happens when it panicked.
                warn!("Generation worker exited without a terminal item");
                self.finished = true;
                Poll::Ready(Some(Err(GenerationError::Worker(
                    "generation worker exited unexpectedly".to_string(),
                ))))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl std::fmt::Debug for GenerationStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationStream")
            .field("finished", &self.finished)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
