//! Contract between the generation loop and an inference backend.
//!
//! The backend owns the tokenizer, sampler and decode context. The loop only
//! needs to start a generation, pull raw token fragments one at a time, and
//! clear the decode context afterwards.

use crate::error::GenerationError;

pub mod recorded;

pub use recorded::{RecordedExchange, RecordedFragment, RecordedSource, RecordedTokenSource};

/// Token identifier as produced by the backend's tokenizer.
pub type TokenId = i32;

/// An inference backend driven one token at a time.
///
/// Implementations hold mutable decode state and are used by one generation at
/// a time; the generator enforces that by owning the source behind a lock.
pub trait TokenSource: Send {
    /// Tokenize and decode the prompt. Must precede any [`TokenSource::continue_step`].
    fn start(&mut self, prompt: &str) -> Result<(), GenerationError>;

    /// Sample and decode the next token, returning its raw text bytes.
    ///
    /// The bytes may begin or end in the middle of a multi-byte character.
    fn continue_step(&mut self) -> Result<Vec<u8>, GenerationError>;

    /// `true` while the backend is under its token budget and has not reached
    /// a natural end of generation.
    fn should_continue(&self) -> bool;

    /// Release per-call decode context. Must be safe to call after a failure
    /// and more than once.
    fn clear(&mut self);

    /// Tokenize text without generating.
    fn tokenize(&self, text: &str, add_begin_marker: bool) -> Result<Vec<TokenId>, GenerationError>;

    /// Context length the model was trained with, when known.
    fn trained_context_length(&self) -> Option<u32> {
        None
    }
}

impl<S: TokenSource + ?Sized> TokenSource for Box<S> {
    fn start(&mut self, prompt: &str) -> Result<(), GenerationError> {
        (**self).start(prompt)
    }

    fn continue_step(&mut self) -> Result<Vec<u8>, GenerationError> {
        (**self).continue_step()
    }

    fn should_continue(&self) -> bool {
        (**self).should_continue()
    }

    fn clear(&mut self) {
        (**self).clear()
    }

    fn tokenize(&self, text: &str, add_begin_marker: bool) -> Result<Vec<TokenId>, GenerationError> {
        (**self).tokenize(text, add_begin_marker)
    }

    fn trained_context_length(&self) -> Option<u32> {
        (**self).trained_context_length()
    }
}
