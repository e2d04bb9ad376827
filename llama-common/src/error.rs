//! Shared error categorisation for consistent handling across crates

use std::fmt::Debug;

/// Category of error for consistent handling and routing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// User input or configuration error - can be fixed by user
    User,
    /// System resource or environmental error - may be temporary
    System,
    /// Internal logic error - indicates a bug
    Internal,
    /// Failure reported by an external collaborator such as an inference backend
    External,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::User => "user",
            ErrorCategory::System => "system",
            ErrorCategory::Internal => "internal",
            ErrorCategory::External => "external",
        }
    }
}

/// Trait for all errors in the llama-stream workspace
///
/// Callers can route on [`LlamaError::category`] without matching on every
/// concrete variant, and log the stable [`LlamaError::error_code`].
pub trait LlamaError: std::error::Error + Send + Sync + Debug {
    /// Get the error category for proper handling
    fn category(&self) -> ErrorCategory;

    /// Get a unique error code for this error type
    fn error_code(&self) -> &'static str;

    /// Check if this is a user-correctable error
    fn is_user_error(&self) -> bool {
        matches!(self.category(), ErrorCategory::User)
    }

    /// Check if repeating the same call can succeed
    fn is_retriable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::System | ErrorCategory::External
        )
    }

    /// Message with the category prefix, suitable for surfacing to end users
    fn user_friendly_message(&self) -> String {
        format!("[{}] {}", self.error_code(), self)
    }
}
