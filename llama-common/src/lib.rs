//! # Llama Common
//!
//! Shared types, traits, and utilities for the llama-stream workspace.
//! Error categorisation, validated configuration and logging helpers live
//! here so every crate reports and configures itself the same way.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{ConfigError, DefaultConfig, ValidatedConfig};
pub use error::{ErrorCategory, LlamaError};
pub use logging::{init_tracing, Pretty};
