//! Generation outcome and streaming chunk types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lifecycle of one generation call.
///
/// `Idle → Started → Streaming` and then exactly one terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenerationState {
    Idle,
    Started,
    Streaming,
    /// The source ended or the token budget ran out before any stop match.
    Finished,
    /// A stop sequence matched.
    Stopped,
    /// The caller cancelled or dropped the stream.
    Cancelled,
    /// The initial decode or a decode step failed.
    Failed,
}

impl GenerationState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GenerationState::Finished
                | GenerationState::Stopped
                | GenerationState::Cancelled
                | GenerationState::Failed
        )
    }
}

/// Reason why text generation stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinishReason {
    /// The token source signalled a natural end of generation.
    EndOfGeneration,
    /// `max_token_count` tokens were generated.
    MaxTokens,
    /// The contained stop sequence matched; it was not emitted.
    StopSequence(String),
    /// The caller cancelled the generation.
    Cancelled,
}

impl FinishReason {
    /// Terminal state a generation ending for this reason lands in.
    pub fn terminal_state(&self) -> GenerationState {
        match self {
            FinishReason::EndOfGeneration | FinishReason::MaxTokens => GenerationState::Finished,
            FinishReason::StopSequence(_) => GenerationState::Stopped,
            FinishReason::Cancelled => GenerationState::Cancelled,
        }
    }
}

/// A chunk of streaming text response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamChunk {
    pub text: String,
    pub is_complete: bool,
    /// Tokens pulled from the source so far in this call.
    pub token_count: u32,
    /// Finish reason, only present when is_complete is true
    pub finish_reason: Option<FinishReason>,
    /// Time the worker spent generating, only present when is_complete is true
    #[serde(default)]
    pub generation_time: Option<Duration>,
}

impl StreamChunk {
    pub fn text(text: impl Into<String>, token_count: u32) -> Self {
        Self {
            text: text.into(),
            is_complete: false,
            token_count,
            finish_reason: None,
            generation_time: None,
        }
    }

    pub fn complete(
        token_count: u32,
        finish_reason: FinishReason,
        generation_time: Duration,
    ) -> Self {
        Self {
            text: String::new(),
            is_complete: true,
            token_count,
            finish_reason: Some(finish_reason),
            generation_time: Some(generation_time),
        }
    }
}

/// Aggregated result of a whole generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub text: String,
    pub tokens_generated: u32,
    pub generation_time: Duration,
    pub finish_reason: FinishReason,
}

impl GenerationResponse {
    pub fn state(&self) -> GenerationState {
        self.finish_reason.terminal_state()
    }
}
