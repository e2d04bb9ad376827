use crate::decoder::IncrementalDecoder;
use crate::gate::LeadingWhitespaceGate;
use crate::stopper::{BufferOutput, StopSequenceBuffer};

/// Per-call text pipeline: decoder, then whitespace gate, then stop buffer.
///
/// Owned by one generation and dropped with it; nothing here is shared.
#[derive(Debug)]
pub struct TextPipeline {
    decoder: IncrementalDecoder,
    gate: LeadingWhitespaceGate,
    buffer: StopSequenceBuffer,
}

impl TextPipeline {
    pub fn new(stop_sequences: Vec<String>) -> Self {
        Self {
            decoder: IncrementalDecoder::new(),
            gate: LeadingWhitespaceGate::new(),
            buffer: StopSequenceBuffer::new(stop_sequences),
        }
    }

    /// Push one token's raw bytes through every stage.
    pub fn push(&mut self, token_bytes: &[u8]) -> BufferOutput {
        let text = self.decoder.feed(token_bytes);
        let delta = self.gate.pass(&text);
        self.buffer.absorb(delta)
    }

    /// Drop any incomplete character and flush the withheld tail.
    pub fn finish(&mut self) -> BufferOutput {
        self.decoder.finish();
        self.buffer.finalize()
    }

    pub fn dropped_bytes(&self) -> usize {
        self.decoder.dropped_bytes()
    }
}
