//! # Generation Stoppers Module
//!
//! Two independent conditions end a generation early:
//!
//! - **Stop sequences**: [`StopSequenceBuffer`] withholds a short tail of the
//!   generated text so a configured sequence that arrives split over several
//!   deltas is recognised before any part of it reaches the caller.
//! - **Token budget**: [`MaxTokensStopper`] counts tokens pulled from the
//!   source and ends the loop when `max_token_count` is reached.
//!
//! ```rust
//! use llama_stream::stopper::{BufferOutput, MaxTokensStopper, StopSequenceBuffer};
//!
//! let mut buffer = StopSequenceBuffer::new(vec!["STOP".to_string()]);
//! let mut out = String::new();
//! for delta in ["Hello wor", "ST", "OP and more"] {
//!     match buffer.absorb(delta) {
//!         BufferOutput::Pending => {}
//!         BufferOutput::Emit(text) => out.push_str(&text),
//!         BufferOutput::Stop { emit, .. } => {
//!             out.push_str(&emit);
//!             break;
//!         }
//!     }
//! }
//! assert_eq!(out, "Hello wor");
//!
//! let mut budget = MaxTokensStopper::new(2);
//! budget.record_token();
//! assert!(budget.should_stop().is_none());
//! budget.record_token();
//! assert!(budget.should_stop().is_some());
//! ```
//!
//! Both stoppers are plain per-call state: a fresh pair is created at the
//! start of every generation and dropped at its end.

pub mod max_tokens;
pub mod stop_sequence;

pub use max_tokens::MaxTokensStopper;
pub use stop_sequence::{BufferOutput, StopSequenceBuffer};
