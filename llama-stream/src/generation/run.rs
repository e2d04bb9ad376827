//! The generation loop shared by every caller-facing adapter.

use super::pipeline::TextPipeline;
use crate::config::GenerationConfig;
use crate::error::GenerationError;
use crate::source::TokenSource;
use crate::stopper::{BufferOutput, MaxTokensStopper};
use crate::types::{FinishReason, GenerationState, StreamChunk};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

/// How one run of [`run_generation`] ended.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSummary {
    pub tokens_generated: u32,
    pub generation_time: Duration,
    /// Finish reason on success, the decode failure otherwise.
    pub outcome: Result<FinishReason, GenerationError>,
}

impl GenerationSummary {
    pub fn state(&self) -> GenerationState {
        match &self.outcome {
            Ok(reason) => reason.terminal_state(),
            Err(_) => GenerationState::Failed,
        }
    }

    /// The last stream item: a completion chunk, or the failure.
    pub fn into_terminal_item(self) -> Result<StreamChunk, GenerationError> {
        self.outcome.map(|reason| {
            StreamChunk::complete(self.tokens_generated, reason, self.generation_time)
        })
    }
}

fn transition(state: &mut GenerationState, next: GenerationState) {
    trace!("Generation state {:?} -> {:?}", state, next);
    *state = next;
}

/// Run one generation to completion on the calling thread.
///
/// `prompt` is the fully rendered text for the token source. Each chunk of
/// text that becomes safe to emit is handed to `sink` before the next token
/// is requested; `sink` returns `false` once nobody is listening, which ends
/// the run as cancelled.
///
/// The token source is cleared exactly once on every exit path, including a
/// failed initial decode, a failed decode step, cancellation and unwinding.
/// Whatever text was already withheld is flushed before a failure is
/// reported.
pub fn run_generation<S, F>(
    source: &mut S,
    prompt: &str,
    config: &GenerationConfig,
    cancel: &CancellationToken,
    mut sink: F,
) -> GenerationSummary
where
    S: TokenSource + ?Sized,
    F: FnMut(StreamChunk) -> bool,
{
    let start_time = Instant::now();
    let mut state = GenerationState::Idle;
    let mut source = scopeguard::guard(source, |source| {
        trace!("Clearing token source decode context");
        source.clear();
    });

    let mut pipeline = TextPipeline::new(config.stop_sequences.clone());
    let mut budget = MaxTokensStopper::new(config.max_token_count);

    transition(&mut state, GenerationState::Started);
    debug!("Starting generation for prompt of {} bytes", prompt.len());

    if let Err(e) = source.start(prompt) {
        error!("Initial decode failed: {}", e);
        transition(&mut state, GenerationState::Failed);
        return GenerationSummary {
            tokens_generated: 0,
            generation_time: start_time.elapsed(),
            outcome: Err(e),
        };
    }

    transition(&mut state, GenerationState::Streaming);

    let mut listening = true;
    let mut emit = |text: String, tokens: u32, listening: &mut bool| {
        if *listening && !text.is_empty() && !sink(StreamChunk::text(text, tokens)) {
            warn!("Stream receiver disconnected, stopping generation");
            *listening = false;
        }
    };

    let ended: Result<FinishReason, GenerationError> = loop {
        if cancel.is_cancelled() {
            debug!("Generation cancelled after {} tokens", budget.tokens_generated());
            break Ok(FinishReason::Cancelled);
        }
        if !listening {
            break Ok(FinishReason::Cancelled);
        }
        if !source.should_continue() {
            debug!("Token source reached end of generation");
            break Ok(FinishReason::EndOfGeneration);
        }
        if let Some(reason) = budget.should_stop() {
            break Ok(reason);
        }

        let token_bytes = match source.continue_step() {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(
                    "Decode step failed after {} tokens: {}",
                    budget.tokens_generated(),
                    e
                );
                break Err(e);
            }
        };
        budget.record_token();
        trace!(
            "Token {}: {} byte(s)",
            budget.tokens_generated(),
            token_bytes.len()
        );

        match pipeline.push(&token_bytes) {
            BufferOutput::Pending => {}
            BufferOutput::Emit(text) => emit(text, budget.tokens_generated(), &mut listening),
            BufferOutput::Stop { emit: text, sequence } => {
                debug!("Stop sequence {:?} matched", sequence);
                emit(text, budget.tokens_generated(), &mut listening);
                // Nothing after the match may leave the loop.
                let summary = GenerationSummary {
                    tokens_generated: budget.tokens_generated(),
                    generation_time: start_time.elapsed(),
                    outcome: Ok(FinishReason::StopSequence(sequence)),
                };
                transition(&mut state, GenerationState::Stopped);
                return summary;
            }
        }
    };

    let tokens_generated = budget.tokens_generated();
    let outcome = match pipeline.finish() {
        BufferOutput::Pending => ended,
        BufferOutput::Emit(text) => {
            emit(text, tokens_generated, &mut listening);
            ended
        }
        BufferOutput::Stop { emit: text, sequence } => {
            debug!("Stop sequence {:?} found while flushing", sequence);
            emit(text, tokens_generated, &mut listening);
            match ended {
                Ok(FinishReason::EndOfGeneration) | Ok(FinishReason::MaxTokens) => {
                    Ok(FinishReason::StopSequence(sequence))
                }
                other => other,
            }
        }
    };

    if pipeline.dropped_bytes() > 0 {
        warn!(
            "Dropped {} undecodable byte(s) during generation",
            pipeline.dropped_bytes()
        );
    }

    let summary = GenerationSummary {
        tokens_generated,
        generation_time: start_time.elapsed(),
        outcome,
    };
    transition(&mut state, summary.state());
    debug!(
        "Generation ended in {:?} after {} tokens ({:?})",
        summary.generation_time,
        summary.tokens_generated,
        summary.state()
    );
    summary
}
