use tracing::{debug, trace};

/// What the buffer allows the orchestrator to do after absorbing a delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferOutput {
    /// Not enough lookahead yet; nothing may be emitted.
    Pending,
    /// Text that can no longer be part of a stop sequence.
    Emit(String),
    /// A stop sequence matched. `emit` is the text before it and is the last
    /// output of the call.
    Stop { emit: String, sequence: String },
}

/// Stop-sequence detector with bounded lookahead.
///
/// Let `max_len` be the character length of the longest stop sequence. The
/// buffer withholds text until it holds at least `2 × max_len` characters,
/// then either finds a stop sequence (searching sequences in configuration
/// order, first listed wins) or releases its oldest `max_len`-character
/// blocks. Any match still in progress lies entirely in the retained tail, so
/// a sequence split across deltas is never partially emitted, and the cache
/// stays under `2 × max_len` characters between calls.
#[derive(Debug)]
pub struct StopSequenceBuffer {
    stop_sequences: Vec<String>,
    max_len: usize,
    cache: String,
    cache_chars: usize,
}

impl StopSequenceBuffer {
    pub fn new(stop_sequences: Vec<String>) -> Self {
        let max_len = stop_sequences
            .iter()
            .map(|s| s.chars().count())
            .max()
            .unwrap_or(0);

        debug!(
            "Creating StopSequenceBuffer with {} sequence(s), lookahead {} chars",
            stop_sequences.len(),
            max_len * 2
        );

        Self {
            stop_sequences,
            max_len,
            cache: String::new(),
            cache_chars: 0,
        }
    }

    /// Feed one delta of generated text.
    pub fn absorb(&mut self, delta: &str) -> BufferOutput {
        if self.max_len == 0 {
            return if delta.is_empty() {
                BufferOutput::Pending
            } else {
                BufferOutput::Emit(delta.to_string())
            };
        }

        self.cache.push_str(delta);
        self.cache_chars += delta.chars().count();

        if self.cache_chars < self.threshold() {
            return BufferOutput::Pending;
        }

        if let Some(stop) = self.take_through_first_match() {
            return stop;
        }

        let mut keep = self.cache_chars;
        while keep >= self.threshold() {
            keep -= self.max_len;
        }
        let release = self.cache_chars - keep;
        let split = self
            .cache
            .char_indices()
            .nth(release)
            .map(|(idx, _)| idx)
            .unwrap_or(self.cache.len());

        let emitted: String = self.cache.drain(..split).collect();
        self.cache_chars = keep;
        trace!(
            "Released {} chars, holding {} chars",
            release,
            self.cache_chars
        );

        BufferOutput::Emit(emitted)
    }

    /// Flush the withheld tail at the end of a generation.
    ///
    /// A stop sequence found in the tail still ends the output before it.
    pub fn finalize(&mut self) -> BufferOutput {
        if self.cache.is_empty() {
            return BufferOutput::Pending;
        }

        if let Some(stop) = self.take_through_first_match() {
            return stop;
        }

        self.cache_chars = 0;
        BufferOutput::Emit(std::mem::take(&mut self.cache))
    }

    /// Characters currently withheld.
    pub fn pending_chars(&self) -> usize {
        self.cache_chars
    }

    /// Length of the longest configured stop sequence in characters.
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    fn threshold(&self) -> usize {
        self.max_len * 2
    }

    fn take_through_first_match(&mut self) -> Option<BufferOutput> {
        let (sequence, idx) = self
            .stop_sequences
            .iter()
            .find_map(|seq| self.cache.find(seq.as_str()).map(|idx| (seq, idx)))?;

        debug!("Stop sequence {:?} matched at byte {}", sequence, idx);

        let sequence = sequence.clone();
        self.cache.truncate(idx);
        let emit = std::mem::take(&mut self.cache);
        self.cache_chars = 0;

        Some(BufferOutput::Stop { emit, sequence })
    }
}
