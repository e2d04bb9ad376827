//! Suppression of whitespace some engines emit before the first real token.

/// Withholds output until the first non-whitespace character appears.
///
/// Leading whitespace and newlines are trimmed from the first contentful
/// delta; every delta after that passes through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct LeadingWhitespaceGate {
    started: bool,
}

impl LeadingWhitespaceGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the part of `delta` that may be emitted, possibly empty.
    pub fn pass<'a>(&mut self, delta: &'a str) -> &'a str {
        if self.started {
            return delta;
        }

        let trimmed = delta.trim_start();
        if !trimmed.is_empty() {
            self.started = true;
        }
        trimmed
    }

    /// Whether contentful output has begun.
    pub fn started(&self) -> bool {
        self.started
    }
}
