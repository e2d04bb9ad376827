//! Generation configuration.

use llama_common::{ConfigError, ValidatedConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

const MAX_TOKEN_LIMIT: u32 = 100_000;
const MAX_STOP_SEQUENCES: usize = 16;

/// Engine context parameters forwarded to the token source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextParams {
    /// Context window to allocate. `None` uses the model's trained context.
    #[serde(default)]
    pub context_length: Option<u32>,

    /// Threads used for decoding. `None` lets the backend decide.
    #[serde(default)]
    pub threads: Option<u32>,
}

/// Configuration for a generator instance.
///
/// Created once per model instance and never mutated afterwards. Every field
/// has a serde default so partial YAML documents load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Maximum number of tokens to generate per call.
    #[serde(default = "default_max_token_count")]
    pub max_token_count: u32,

    /// Stop sequences; the first listed sequence found wins ties.
    #[serde(default)]
    pub stop_sequences: Vec<String>,

    /// Temperature for sampling randomness (0.0 = deterministic, higher = more random).
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Top-k sampling cutoff.
    #[serde(default = "default_top_k")]
    pub top_k: u32,

    /// Top-p (nucleus) sampling threshold.
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Prompt tokens decoded per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Seed for the sampling chain.
    #[serde(default = "default_seed")]
    pub seed: u32,

    #[serde(default)]
    pub context: ContextParams,
}

fn default_max_token_count() -> u32 {
    512
}

fn default_temperature() -> f32 {
    0.8
}

fn default_top_k() -> u32 {
    40
}

fn default_top_p() -> f32 {
    0.9
}

fn default_batch_size() -> u32 {
    512
}

fn default_seed() -> u32 {
    1234
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_token_count: default_max_token_count(),
            stop_sequences: Vec::new(),
            temperature: default_temperature(),
            top_k: default_top_k(),
            top_p: default_top_p(),
            batch_size: default_batch_size(),
            seed: default_seed(),
            context: ContextParams::default(),
        }
    }
}

impl GenerationConfig {
    /// Set stop sequences using builder pattern
    pub fn with_stop_sequences<I, S>(mut self, stop_sequences: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stop_sequences = stop_sequences.into_iter().map(Into::into).collect();
        self
    }

    /// Set max_token_count using builder pattern
    pub fn with_max_token_count(mut self, max_token_count: u32) -> Self {
        self.max_token_count = max_token_count;
        self
    }

    /// Set the requested context length using builder pattern
    pub fn with_context_length(mut self, context_length: u32) -> Self {
        self.context.context_length = Some(context_length);
        self
    }

    /// Length in characters of the longest stop sequence, 0 when none are configured.
    pub fn max_stop_sequence_len(&self) -> usize {
        self.stop_sequences
            .iter()
            .map(|s| s.chars().count())
            .max()
            .unwrap_or(0)
    }

    /// Load and validate a YAML configuration document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        <Self as ValidatedConfig>::from_yaml_str(yaml)
    }

    /// Load and validate a YAML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        <Self as ValidatedConfig>::from_yaml_file(path)
    }

    /// Validate the configuration parameters.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_token_count == 0 {
            return Err("max_token_count must be greater than 0".to_string());
        }

        if self.max_token_count > MAX_TOKEN_LIMIT {
            return Err(format!(
                "max_token_count cannot exceed {}",
                MAX_TOKEN_LIMIT
            ));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err("temperature must be between 0.0 and 2.0".to_string());
        }

        if !(0.0..=1.0).contains(&self.top_p) {
            return Err("top_p must be between 0.0 and 1.0".to_string());
        }

        if self.top_k == 0 {
            return Err("top_k must be greater than 0".to_string());
        }

        if self.batch_size == 0 {
            return Err("batch_size must be greater than 0".to_string());
        }

        if self.stop_sequences.len() > MAX_STOP_SEQUENCES {
            return Err(format!(
                "Cannot specify more than {} stop sequences",
                MAX_STOP_SEQUENCES
            ));
        }

        if self.stop_sequences.iter().any(|s| s.is_empty()) {
            return Err("Stop sequences cannot be empty".to_string());
        }

        if self.context.context_length == Some(0) {
            return Err("context_length must be greater than 0".to_string());
        }

        Ok(())
    }
}

impl ValidatedConfig for GenerationConfig {
    type Error = ConfigError;

    fn validate(&self) -> Result<(), Self::Error> {
        GenerationConfig::validate(self).map_err(ConfigError::Invalid)
    }

    fn description() -> &'static str {
        "Sampling, stop sequence and context settings for one model instance"
    }
}
