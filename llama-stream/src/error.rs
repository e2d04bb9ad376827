//! Error types for the generation core.

use llama_common::{ConfigError, ErrorCategory, LlamaError};
use thiserror::Error;

/// Errors that can occur while constructing a generator or running a generation.
///
/// Construction-time failures (`ModelLoad`, `ContextSize`, `InvalidConfig`) are
/// fatal for the generator. `Decode` is per call: any text that was already safe
/// to emit is delivered before the error, and the token source is always cleared
/// so the next call starts from a clean context.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    /// The token source could not be created or loaded.
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    /// The configured context exceeds what the model was trained on.
    #[error("Requested context of {requested} tokens exceeds the trained context of {trained} tokens")]
    ContextSize { requested: u32, trained: u32 },

    /// Configuration validation failed.
    #[error("Invalid generation configuration: {0}")]
    InvalidConfig(String),

    /// The initial decode or a per-token decode step failed.
    #[error("Token decoding failed: {0}")]
    Decode(String),

    /// Failed to tokenize text.
    #[error("Failed to tokenize text: {0}")]
    Tokenization(String),

    /// Another generation currently owns the token source.
    #[error("A generation is already in progress on this generator")]
    Busy,

    /// The background generation task ended without reporting a result.
    #[error("Generation worker failed: {0}")]
    Worker(String),
}

impl GenerationError {
    /// Create a new decoding error from a source error.
    pub fn decoding<E: std::error::Error>(err: E) -> Self {
        Self::Decode(err.to_string())
    }

    /// Create a new tokenization error from a source error.
    pub fn tokenization<E: std::error::Error>(err: E) -> Self {
        Self::Tokenization(err.to_string())
    }

    /// Create a new model load error from a source error.
    pub fn model_load<E: std::error::Error>(err: E) -> Self {
        Self::ModelLoad(err.to_string())
    }
}

impl From<ConfigError> for GenerationError {
    fn from(err: ConfigError) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}

impl LlamaError for GenerationError {
    fn category(&self) -> ErrorCategory {
        match self {
            GenerationError::ModelLoad(_) => ErrorCategory::System,
            GenerationError::ContextSize { .. } => ErrorCategory::User,
            GenerationError::InvalidConfig(_) => ErrorCategory::User,
            GenerationError::Decode(_) => ErrorCategory::External,
            GenerationError::Tokenization(_) => ErrorCategory::External,
            GenerationError::Busy => ErrorCategory::System,
            GenerationError::Worker(_) => ErrorCategory::Internal,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            GenerationError::ModelLoad(_) => "GENERATION_MODEL_LOAD",
            GenerationError::ContextSize { .. } => "GENERATION_CONTEXT_SIZE",
            GenerationError::InvalidConfig(_) => "GENERATION_INVALID_CONFIG",
            GenerationError::Decode(_) => "GENERATION_DECODE",
            GenerationError::Tokenization(_) => "GENERATION_TOKENIZATION",
            GenerationError::Busy => "GENERATION_BUSY",
            GenerationError::Worker(_) => "GENERATION_WORKER",
        }
    }
}
