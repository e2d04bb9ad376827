//! Incremental reassembly of token byte fragments into text.
//!
//! Byte-level BPE vocabularies routinely split one UTF-8 character across two
//! or more tokens, so a single token's bytes are not guaranteed to be valid
//! text. [`IncrementalDecoder`] keeps the undecodable tail between calls and
//! only hands out complete characters.

use tracing::{debug, trace, warn};

/// Widest UTF-8 encoding of a single character, in bytes.
pub const MAX_CHAR_WIDTH: usize = 4;

/// Reassembles raw token fragments into valid UTF-8 text.
///
/// Output is associative across split points: feeding a byte sequence in any
/// number of pieces yields the same concatenated text as feeding it whole.
#[derive(Debug, Default)]
pub struct IncrementalDecoder {
    /// Bytes of a character whose encoding has not finished yet.
    pending: Vec<u8>,
    /// Bytes dropped because they can never decode.
    dropped_bytes: usize,
}

impl IncrementalDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one token's bytes and return whatever text is now complete.
    ///
    /// Never fails. Bytes that can never form valid UTF-8 are dropped; an
    /// incomplete trailing sequence is retained for the next call.
    pub fn feed(&mut self, token_bytes: &[u8]) -> String {
        self.pending.extend_from_slice(token_bytes);

        let mut produced = String::with_capacity(self.pending.len());
        let mut offset = 0;

        while offset < self.pending.len() {
            match std::str::from_utf8(&self.pending[offset..]) {
                Ok(text) => {
                    produced.push_str(text);
                    offset = self.pending.len();
                }
                Err(e) => {
                    let valid_up_to = offset + e.valid_up_to();
                    if let Ok(text) = std::str::from_utf8(&self.pending[offset..valid_up_to]) {
                        produced.push_str(text);
                    }

                    match e.error_len() {
                        Some(invalid_len) => {
                            warn!(
                                "Dropping {} byte(s) that are not valid UTF-8: {:02x?}",
                                invalid_len,
                                &self.pending[valid_up_to..valid_up_to + invalid_len]
                            );
                            self.dropped_bytes += invalid_len;
                            offset = valid_up_to + invalid_len;
                        }
                        None => {
                            // Incomplete sequence at the end; wait for more bytes.
                            offset = valid_up_to;
                            break;
                        }
                    }
                }
            }
        }

        self.pending.drain(..offset);
        debug_assert!(self.pending.len() < MAX_CHAR_WIDTH);

        if !self.pending.is_empty() {
            trace!(
                "Holding {} byte(s) of an incomplete character",
                self.pending.len()
            );
        }

        produced
    }

    /// Discard any incomplete trailing bytes at the end of a generation.
    ///
    /// Returns the number of bytes discarded.
    pub fn finish(&mut self) -> usize {
        let discarded = self.pending.len();
        if discarded > 0 {
            debug!(
                "Generation ended with {} byte(s) of an incomplete character, discarding",
                discarded
            );
            self.dropped_bytes += discarded;
            self.pending.clear();
        }
        discarded
    }

    /// Number of bytes currently held back.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Total bytes dropped as undecodable since creation.
    pub fn dropped_bytes(&self) -> usize {
        self.dropped_bytes
    }
}
