//! Shared value types for the generation core.

pub mod generation;
pub mod ids;

pub use generation::{FinishReason, GenerationResponse, GenerationState, StreamChunk};
pub use ids::SessionId;
