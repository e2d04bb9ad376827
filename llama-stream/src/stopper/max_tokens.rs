use crate::types::FinishReason;
use tracing::{debug, warn};

/// Stopper that limits generation to a maximum number of tokens.
///
/// `MaxTokensStopper` tracks the number of tokens pulled from the token source
/// during one call and reports [`FinishReason::MaxTokens`] once the configured
/// limit is reached. It uses constant memory and is not shared between calls.
///
/// # Examples
///
/// ```rust
/// use llama_stream::stopper::MaxTokensStopper;
///
/// let mut stopper = MaxTokensStopper::new(3);
/// for _ in 0..3 {
///     assert!(stopper.should_stop().is_none());
///     stopper.record_token();
/// }
/// assert!(stopper.should_stop().is_some());
/// assert_eq!(stopper.tokens_generated(), 3);
/// ```
#[derive(Debug)]
pub struct MaxTokensStopper {
    /// Maximum number of tokens allowed before stopping generation.
    max_tokens: u32,

    /// Running count of tokens generated so far.
    tokens_generated: u32,
}

impl MaxTokensStopper {
    /// Create a new max tokens stopper with the specified limit.
    ///
    /// A limit of 0 stops before the first token is requested.
    pub fn new(max_tokens: u32) -> Self {
        debug!(
            "Creating MaxTokensStopper with limit: {} tokens",
            max_tokens
        );

        if max_tokens == 0 {
            warn!("MaxTokensStopper created with 0 token limit - will stop immediately");
        } else if max_tokens > 50_000 {
            warn!(
                "MaxTokensStopper created with very high token limit ({}), consider if this is intentional",
                max_tokens
            );
        }

        Self {
            max_tokens,
            tokens_generated: 0,
        }
    }

    /// Count one token pulled from the source.
    pub fn record_token(&mut self) {
        self.tokens_generated = self.tokens_generated.saturating_add(1);
    }

    /// `Some(FinishReason::MaxTokens)` once the budget is spent.
    pub fn should_stop(&self) -> Option<FinishReason> {
        if self.tokens_generated >= self.max_tokens {
            debug!(
                "MaxTokensStopper triggered: {} >= {} tokens",
                self.tokens_generated, self.max_tokens
            );
            Some(FinishReason::MaxTokens)
        } else {
            None
        }
    }

    pub fn tokens_generated(&self) -> u32 {
        self.tokens_generated
    }

    pub fn remaining(&self) -> u32 {
        self.max_tokens.saturating_sub(self.tokens_generated)
    }
}
