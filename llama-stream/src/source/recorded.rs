//! Token source that plays back recorded fragments from a fixture.
//!
//! Real inference is slow and needs model files; a recorded source replays the
//! exact fragment boundaries a backend produced (including characters split
//! across tokens and decode failures) so the generation loop can be exercised
//! deterministically.

use super::{TokenId, TokenSource};
use crate::error::GenerationError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

const BEGIN_MARKER: TokenId = 1;

/// One recorded token fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordedFragment {
    Text(String),
    /// Raw bytes, for fragments that are not valid UTF-8 on their own.
    Bytes { bytes: Vec<u8> },
}

impl RecordedFragment {
    fn to_bytes(&self) -> Vec<u8> {
        match self {
            RecordedFragment::Text(text) => text.as_bytes().to_vec(),
            RecordedFragment::Bytes { bytes } => bytes.clone(),
        }
    }
}

impl From<&str> for RecordedFragment {
    fn from(text: &str) -> Self {
        RecordedFragment::Text(text.to_string())
    }
}

/// Fragments produced for one generation call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedExchange {
    /// Prompt the fragments were recorded for, checked when present.
    #[serde(default)]
    pub prompt: Option<String>,
    pub fragments: Vec<RecordedFragment>,
    /// Fail with a decode error after this many fragments.
    #[serde(default)]
    pub failure_after: Option<usize>,
    /// Fail the initial decode with this message.
    #[serde(default)]
    pub start_failure: Option<String>,
}

impl RecordedExchange {
    pub fn new<I, F>(fragments: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<RecordedFragment>,
    {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn failing_after(mut self, fragments: usize) -> Self {
        self.failure_after = Some(fragments);
        self
    }
}

/// Recorded fixture: sequential exchanges, one per call to `start`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedSource {
    #[serde(default)]
    pub context_length: Option<u32>,
    pub exchanges: Vec<RecordedExchange>,
}

#[derive(Debug)]
struct Playback {
    exchange: RecordedExchange,
    position: usize,
}

/// [`TokenSource`] replaying a [`RecordedSource`].
#[derive(Debug)]
pub struct RecordedTokenSource {
    recording: RecordedSource,
    next_exchange: usize,
    playback: Option<Playback>,
    started_prompts: Vec<String>,
    clear_count: usize,
}

impl RecordedTokenSource {
    pub fn new(recording: RecordedSource) -> Self {
        Self {
            recording,
            next_exchange: 0,
            playback: None,
            started_prompts: Vec::new(),
            clear_count: 0,
        }
    }

    /// Single-exchange source from text fragments.
    pub fn from_fragments<I, F>(fragments: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<RecordedFragment>,
    {
        Self::from_exchanges(vec![RecordedExchange::new(fragments)])
    }

    pub fn from_exchanges(exchanges: Vec<RecordedExchange>) -> Self {
        Self::new(RecordedSource {
            context_length: None,
            exchanges,
        })
    }

    /// Load a recorded fixture from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, GenerationError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GenerationError::ModelLoad(format!("Failed to read fixture at {:?}: {}", path, e))
        })?;
        let recording: RecordedSource = serde_json::from_str(&content).map_err(|e| {
            GenerationError::ModelLoad(format!(
                "Failed to parse fixture JSON at {:?}: {}",
                path, e
            ))
        })?;
        debug!(
            "Loaded recorded source with {} exchange(s) from {:?}",
            recording.exchanges.len(),
            path
        );
        Ok(Self::new(recording))
    }

    pub fn with_context_length(mut self, context_length: u32) -> Self {
        self.recording.context_length = Some(context_length);
        self
    }

    /// Rendered prompts passed to `start`, oldest first.
    pub fn started_prompts(&self) -> &[String] {
        &self.started_prompts
    }

    /// Number of times `clear` has been called.
    pub fn clear_count(&self) -> usize {
        self.clear_count
    }

    /// Exchanges not yet played.
    pub fn remaining_exchanges(&self) -> usize {
        self.recording.exchanges.len() - self.next_exchange
    }
}

impl TokenSource for RecordedTokenSource {
    fn start(&mut self, prompt: &str) -> Result<(), GenerationError> {
        self.started_prompts.push(prompt.to_string());

        let exchange = self
            .recording
            .exchanges
            .get(self.next_exchange)
            .cloned()
            .ok_or_else(|| {
                GenerationError::Decode(format!(
                    "Recorded source exhausted: attempted exchange {} but only {} recorded",
                    self.next_exchange + 1,
                    self.recording.exchanges.len()
                ))
            })?;
        self.next_exchange += 1;

        if let Some(expected) = &exchange.prompt {
            if expected != prompt {
                warn!(
                    "Recorded exchange {} was captured for a different prompt",
                    self.next_exchange
                );
            }
        }

        if let Some(message) = &exchange.start_failure {
            return Err(GenerationError::Decode(message.clone()));
        }

        self.playback = Some(Playback {
            exchange,
            position: 0,
        });
        Ok(())
    }

    fn continue_step(&mut self) -> Result<Vec<u8>, GenerationError> {
        let playback = self.playback.as_mut().ok_or_else(|| {
            GenerationError::Decode("continue_step called before start".to_string())
        })?;

        if playback.exchange.failure_after == Some(playback.position) {
            return Err(GenerationError::Decode(format!(
                "Recorded decode failure after {} fragment(s)",
                playback.position
            )));
        }

        let fragment = playback
            .exchange
            .fragments
            .get(playback.position)
            .ok_or_else(|| GenerationError::Decode("No recorded fragments remain".to_string()))?;
        playback.position += 1;
        Ok(fragment.to_bytes())
    }

    fn should_continue(&self) -> bool {
        self.playback.as_ref().is_some_and(|p| {
            p.position < p.exchange.fragments.len()
                || p.exchange.failure_after == Some(p.position)
        })
    }

    fn clear(&mut self) {
        self.playback = None;
        self.clear_count += 1;
    }

    fn tokenize(&self, text: &str, add_begin_marker: bool) -> Result<Vec<TokenId>, GenerationError> {
        let mut tokens = Vec::new();
        if add_begin_marker {
            tokens.push(BEGIN_MARKER);
        }
        tokens.extend(text.split_whitespace().map(word_id));
        Ok(tokens)
    }

    fn trained_context_length(&self) -> Option<u32> {
        self.recording.context_length
    }
}

/// Stable FNV-1a based id; ids below 256 are reserved for markers.
fn word_id(word: &str) -> TokenId {
    let hash = word
        .bytes()
        .fold(0x811c_9dc5_u32, |acc, b| (acc ^ b as u32).wrapping_mul(0x0100_0193));
    (hash % (i32::MAX as u32 - 256)) as TokenId + 256
}
