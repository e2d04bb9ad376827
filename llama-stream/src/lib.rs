//! # Llama Stream
//!
//! Streaming generation core for token-at-a-time language model backends.
//! Raw token fragments from a [`TokenSource`] are reassembled into text,
//! stripped of leading whitespace, screened for stop sequences and delivered
//! to the caller as a finite stream, while an optional session carries the
//! conversation from one call to the next.

pub mod config;
pub mod decoder;
pub mod error;
pub mod gate;
pub mod generation;
pub mod prompt;
pub mod session;
pub mod source;
pub mod stopper;
pub mod types;

// Re-export main types for convenience
pub use config::{ContextParams, GenerationConfig};
pub use decoder::IncrementalDecoder;
pub use error::GenerationError;
pub use gate::LeadingWhitespaceGate;
pub use generation::{run_generation, GenerationStream, GenerationSummary, Generator};
pub use prompt::{ChatMlFormat, EffectivePrompt, PlainFormat, Prompt, PromptFormat, Role, Turn};
pub use session::{Session, SessionSlot};
pub use source::{RecordedExchange, RecordedSource, RecordedTokenSource, TokenId, TokenSource};
pub use stopper::{BufferOutput, MaxTokensStopper, StopSequenceBuffer};
pub use types::{FinishReason, GenerationResponse, GenerationState, SessionId, StreamChunk};
