//! # Generation Orchestrator
//!
//! One synchronous loop, [`run_generation`], drives a [`TokenSource`] token by
//! token through the text pipeline (incremental decoder, leading-whitespace
//! gate, stop-sequence buffer). [`Generator`] wraps it with the pieces a caller
//! needs:
//!
//! - exclusive ownership of the token source, enforced by a lock that makes a
//!   concurrent second call fail with [`GenerationError::Busy`];
//! - session continuation, recording every delivered chunk before the next
//!   token is requested;
//! - a streaming adapter ([`GenerationStream`]) fed from a blocking worker, and
//!   an aggregate adapter built on top of it.
//!
//! ```rust
//! use llama_stream::{GenerationConfig, Generator, PlainFormat, RecordedTokenSource};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), llama_stream::GenerationError> {
//! let source = RecordedTokenSource::from_fragments(["Hel", "lo ", "wor", "STO", "P", "ld"]);
//! let config = GenerationConfig::default().with_stop_sequences(["STOP"]);
//! let generator = Generator::new(source, config, PlainFormat)?;
//!
//! let response = generator.generate("Say hello", false).await?;
//! assert_eq!(response.text, "Hello wor");
//! # Ok(())
//! # }
//! ```

pub mod pipeline;
pub mod run;
pub mod stream;

pub use pipeline::TextPipeline;
pub use run::{run_generation, GenerationSummary};
pub use stream::GenerationStream;

use crate::config::GenerationConfig;
use crate::error::GenerationError;
use crate::prompt::{Prompt, PromptFormat};
use crate::session::{Session, SessionSlot};
use crate::source::TokenSource;
use crate::types::GenerationResponse;
use llama_common::Pretty;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Capacity of the chunk channel between the worker and the stream.
const STREAM_CHANNEL_CAPACITY: usize = 100;

/// State only one generation may touch at a time.
#[derive(Debug)]
struct Exclusive<S> {
    source: S,
    sessions: SessionSlot,
}

/// Generation orchestrator for one model instance.
///
/// Cloning is cheap and clones share the token source, so the one-generation
/// rule holds across all of them.
pub struct Generator<S> {
    exclusive: Arc<Mutex<Exclusive<S>>>,
    config: Arc<GenerationConfig>,
    format: Arc<dyn PromptFormat>,
}

impl<S> Clone for Generator<S> {
    fn clone(&self) -> Self {
        Self {
            exclusive: Arc::clone(&self.exclusive),
            config: Arc::clone(&self.config),
            format: Arc::clone(&self.format),
        }
    }
}

impl<S: TokenSource + 'static> Generator<S> {
    /// Validate the configuration and take ownership of the token source.
    pub fn new(
        source: S,
        config: GenerationConfig,
        format: impl PromptFormat + 'static,
    ) -> Result<Self, GenerationError> {
        config.validate().map_err(GenerationError::InvalidConfig)?;

        if let (Some(requested), Some(trained)) = (
            config.context.context_length,
            source.trained_context_length(),
        ) {
            if requested > trained {
                return Err(GenerationError::ContextSize { requested, trained });
            }
        }

        info!("Generator ready");
        debug!("Generation config:{}", Pretty(&config));

        Ok(Self {
            exclusive: Arc::new(Mutex::new(Exclusive {
                source,
                sessions: SessionSlot::new(),
            })),
            config: Arc::new(config),
            format: Arc::new(format),
        })
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Start a generation and stream its output.
    ///
    /// Fails with [`GenerationError::Busy`] while another generation on this
    /// generator has not finished. Cancelling `cancel` or dropping the
    /// returned stream ends the generation early; either way the token source
    /// is cleared and the session turn is closed before the lock is released.
    pub fn generate_stream(
        &self,
        prompt: impl Into<Prompt>,
        session_enabled: bool,
        cancel: CancellationToken,
    ) -> Result<GenerationStream, GenerationError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| GenerationError::Worker(e.to_string()))?;
        let mut exclusive = Arc::clone(&self.exclusive)
            .try_lock_owned()
            .map_err(|_| GenerationError::Busy)?;

        let prompt = prompt.into();
        let config = Arc::clone(&self.config);
        let format = Arc::clone(&self.format);
        let cancel = cancel.child_token();
        let worker_cancel = cancel.clone();
        let (sender, receiver) = mpsc::channel(STREAM_CHANNEL_CAPACITY);

        runtime.spawn_blocking(move || {
            let Exclusive { source, sessions } = &mut *exclusive;

            let effective = sessions.prepare(prompt, session_enabled);
            let rendered = effective.render(&*format);

            // Only text the caller received becomes part of the session.
            let summary = run_generation(source, &rendered, &config, &worker_cancel, |chunk| {
                let text = chunk.text.clone();
                if sender.blocking_send(Ok(chunk)).is_err() {
                    return false;
                }
                sessions.record_delta(&text);
                true
            });
            sessions.end_turn();

            // Release the source before the terminal item so a caller that
            // has seen it can start the next generation immediately.
            drop(exclusive);
            let _ = sender.blocking_send(summary.into_terminal_item());
        });

        Ok(GenerationStream::new(receiver, cancel))
    }

    /// Run a generation and collect its whole output.
    pub async fn generate(
        &self,
        prompt: impl Into<Prompt>,
        session_enabled: bool,
    ) -> Result<GenerationResponse, GenerationError> {
        self.generate_stream(prompt, session_enabled, CancellationToken::new())?
            .aggregate()
            .await
    }

    /// Number of tokens `text` encodes to, without a begin marker.
    pub fn token_count(&self, text: &str) -> Result<usize, GenerationError> {
        let exclusive = self
            .exclusive
            .try_lock()
            .map_err(|_| GenerationError::Busy)?;
        Ok(exclusive.source.tokenize(text, false)?.len())
    }

    /// Discard the session. Returns whether one existed.
    pub fn reset_session(&self) -> Result<bool, GenerationError> {
        let mut exclusive = self
            .exclusive
            .try_lock()
            .map_err(|_| GenerationError::Busy)?;
        Ok(exclusive.sessions.reset_session())
    }

    /// Copy of the current session, if any.
    pub fn session_snapshot(&self) -> Result<Option<Session>, GenerationError> {
        let exclusive = self
            .exclusive
            .try_lock()
            .map_err(|_| GenerationError::Busy)?;
        Ok(exclusive.sessions.session().cloned())
    }

    /// Inspect the token source while no generation is running.
    pub fn with_source<R>(&self, f: impl FnOnce(&S) -> R) -> Result<R, GenerationError> {
        let exclusive = self
            .exclusive
            .try_lock()
            .map_err(|_| GenerationError::Busy)?;
        Ok(f(&exclusive.source))
    }
}

impl<S> std::fmt::Debug for Generator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("config", &self.config)
            .field("busy", &self.exclusive.try_lock().is_err())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::{ChatMlFormat, PlainFormat, Role};
    use crate::source::{RecordedExchange, RecordedTokenSource};
    use crate::types::{FinishReason, GenerationState, StreamChunk};
    use futures::StreamExt;

    fn generator(exchanges: Vec<RecordedExchange>) -> Generator<RecordedTokenSource> {
        Generator::new(
            RecordedTokenSource::from_exchanges(exchanges),
            GenerationConfig::default().with_stop_sequences(["STOP"]),
            PlainFormat,
        )
        .unwrap()
    }

    async fn drain(stream: GenerationStream) -> Vec<Result<StreamChunk, GenerationError>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn test_end_to_end_stop_sequence() {
        let generator = generator(vec![RecordedExchange::new([
            "Hel", "lo ", "wor", "STO", "P", "ld",
        ])]);

        let response = generator.generate("prompt", false).await.unwrap();

        assert_eq!(response.text, "Hello wor");
        assert_eq!(response.state(), GenerationState::Stopped);
        // The match is only certain once the source has ended.
        assert_eq!(response.tokens_generated, 6);
        assert_eq!(generator.with_source(|s| s.clear_count()).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failure_after_partial_output() {
        let generator = generator(vec![
            RecordedExchange::new(["He", "llo"]).failing_after(2)
        ]);

        let items = drain(
            generator
                .generate_stream("prompt", false, CancellationToken::new())
                .unwrap(),
        )
        .await;

        let (last, chunks) = items.split_last().unwrap();
        let text: String = chunks
            .iter()
            .map(|c| c.as_ref().unwrap().text.clone())
            .collect();
        assert_eq!(text, "Hello");
        assert!(matches!(last, Err(GenerationError::Decode(_))));
        assert_eq!(generator.with_source(|s| s.clear_count()).unwrap(), 1);
    }

    /// Recorded source whose decode steps wait for the test to open a gate.
    ///
    /// Each step first signals `waiting`, so the test knows the worker is
    /// parked inside that step.
    struct GatedSource {
        inner: RecordedTokenSource,
        gate: std::sync::mpsc::Receiver<()>,
        waiting: std::sync::mpsc::Sender<()>,
    }

    fn gated_generator(
        exchanges: Vec<RecordedExchange>,
        config: GenerationConfig,
    ) -> (
        Generator<GatedSource>,
        std::sync::mpsc::Sender<()>,
        std::sync::mpsc::Receiver<()>,
    ) {
        let (open, gate) = std::sync::mpsc::channel();
        let (waiting, parked) = std::sync::mpsc::channel();
        let source = GatedSource {
            inner: RecordedTokenSource::from_exchanges(exchanges),
            gate,
            waiting,
        };
        let generator = Generator::new(source, config, PlainFormat).unwrap();
        (generator, open, parked)
    }

    async fn wait_until_idle<S: TokenSource + 'static>(generator: &Generator<S>) {
        for _ in 0..500 {
            if generator.with_source(|_| ()).is_ok() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("generation never released the token source");
    }

    impl TokenSource for GatedSource {
        fn start(&mut self, prompt: &str) -> Result<(), GenerationError> {
            self.inner.start(prompt)
        }

        fn continue_step(&mut self) -> Result<Vec<u8>, GenerationError> {
            // A closed gate lets every step through.
            let _ = self.waiting.send(());
            let _ = self.gate.recv();
            self.inner.continue_step()
        }

        fn should_continue(&self) -> bool {
            self.inner.should_continue()
        }

        fn clear(&mut self) {
            self.inner.clear()
        }

        fn tokenize(
            &self,
            text: &str,
            add_begin_marker: bool,
        ) -> Result<Vec<crate::source::TokenId>, GenerationError> {
            self.inner.tokenize(text, add_begin_marker)
        }
    }

    #[tokio::test]
    async fn test_second_generation_is_busy() {
        let (generator, open, _parked) = gated_generator(
            vec![RecordedExchange::new(["one"]), RecordedExchange::new(["two"])],
            GenerationConfig::default(),
        );

        let first = generator
            .generate_stream("a", false, CancellationToken::new())
            .unwrap();
        assert_eq!(
            generator
                .generate_stream("b", false, CancellationToken::new())
                .unwrap_err(),
            GenerationError::Busy
        );
        assert_eq!(generator.token_count("x y").unwrap_err(), GenerationError::Busy);
        assert_eq!(generator.reset_session().unwrap_err(), GenerationError::Busy);

        drop(open);
        let response = first.aggregate().await.unwrap();
        assert_eq!(response.text, "one");

        let second = generator.generate("b", false).await.unwrap();
        assert_eq!(second.text, "two");
        assert_eq!(generator.with_source(|s| s.inner.clear_count()).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_cancel_mid_stream_flushes_and_finishes_cancelled() {
        let (generator, open, parked) = gated_generator(
            vec![RecordedExchange::new(["Hel", "lo", "never"])],
            GenerationConfig::default().with_stop_sequences(["STOP"]),
        );
        let cancel = CancellationToken::new();
        let stream = generator
            .generate_stream("p", true, cancel.clone())
            .unwrap();

        parked.recv().unwrap();
        open.send(()).unwrap();
        // Second step: "Hel" is already withheld by the stop buffer.
        parked.recv().unwrap();
        cancel.cancel();
        open.send(()).unwrap();

        let items = drain(stream).await;
        let (last, chunks) = items.split_last().unwrap();
        let text: String = chunks
            .iter()
            .map(|c| c.as_ref().unwrap().text.clone())
            .collect();
        let last = last.as_ref().unwrap();

        assert_eq!(text, "Hello");
        assert!(last.is_complete);
        assert_eq!(last.finish_reason, Some(FinishReason::Cancelled));
        assert_eq!(last.token_count, 2);
        assert_eq!(generator.with_source(|s| s.inner.clear_count()).unwrap(), 1);

        let session = generator.session_snapshot().unwrap().unwrap();
        let turns: Vec<_> = session
            .transcript()
            .iter()
            .map(|t| (t.role, t.text.clone()))
            .collect();
        assert_eq!(
            turns,
            vec![
                (Role::User, "p".to_string()),
                (Role::Assistant, "Hello".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_undelivered_text_is_not_recorded_in_session() {
        let (generator, open, parked) = gated_generator(
            vec![RecordedExchange::new(["one ", "two "])],
            GenerationConfig::default(),
        );
        let mut stream = generator
            .generate_stream("p", true, CancellationToken::new())
            .unwrap();

        parked.recv().unwrap();
        open.send(()).unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap().text, "one ");

        // The worker is parked in the second step; nobody will read "two ".
        parked.recv().unwrap();
        drop(stream);
        open.send(()).unwrap();

        wait_until_idle(&generator).await;
        let session = generator.session_snapshot().unwrap().unwrap();
        let turns: Vec<_> = session
            .transcript()
            .iter()
            .map(|t| (t.role, t.text.clone()))
            .collect();
        assert_eq!(
            turns,
            vec![
                (Role::User, "p".to_string()),
                (Role::Assistant, "one ".to_string())
            ]
        );
        assert_eq!(generator.with_source(|s| s.inner.clear_count()).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_session_continuity_through_generator() {
        let generator = Generator::new(
            RecordedTokenSource::from_exchanges(vec![
                RecordedExchange::new(["R1"]),
                RecordedExchange::new(["R2"]),
                RecordedExchange::new(["R3"]),
            ]),
            GenerationConfig::default(),
            PlainFormat,
        )
        .unwrap();

        generator.generate("P1", true).await.unwrap();
        generator.generate("P2", true).await.unwrap();
        generator.generate("P3", false).await.unwrap();

        let prompts = generator
            .with_source(|s| s.started_prompts().to_vec())
            .unwrap();
        assert_eq!(prompts, vec!["P1", "P1\nR1\nP2", "P3"]);
        assert!(generator.session_snapshot().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_session_transcript_after_generation() {
        let generator = Generator::new(
            RecordedTokenSource::from_fragments(["  Hi", " there"]),
            GenerationConfig::default(),
            ChatMlFormat::default(),
        )
        .unwrap();

        generator.generate("Hello", true).await.unwrap();

        let session = generator.session_snapshot().unwrap().unwrap();
        let turns: Vec<_> = session
            .transcript()
            .iter()
            .map(|t| (t.role, t.text.clone()))
            .collect();
        assert_eq!(
            turns,
            vec![
                (Role::User, "Hello".to_string()),
                (Role::Assistant, "Hi there".to_string())
            ]
        );
        assert!(generator.reset_session().unwrap());
        assert!(!generator.reset_session().unwrap());
    }

    #[tokio::test]
    async fn test_cancelled_token_finishes_as_cancelled() {
        let generator = generator(vec![RecordedExchange::new(["never"])]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let response = generator
            .generate_stream("p", true, cancel)
            .unwrap()
            .aggregate()
            .await
            .unwrap();

        assert_eq!(response.finish_reason, FinishReason::Cancelled);
        assert!(response.text.is_empty());
        assert_eq!(generator.with_source(|s| s.clear_count()).unwrap(), 1);
        let session = generator.session_snapshot().unwrap().unwrap();
        assert_eq!(session.transcript().len(), 2);
    }

    #[test]
    fn test_context_size_checked_at_construction() {
        let source = RecordedTokenSource::from_fragments(["x"]).with_context_length(2048);
        let config = GenerationConfig::default().with_context_length(4096);

        let err = Generator::new(source, config, PlainFormat).unwrap_err();
        assert_eq!(
            err,
            GenerationError::ContextSize {
                requested: 4096,
                trained: 2048
            }
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = GenerationConfig::default().with_max_token_count(0);
        let err = Generator::new(RecordedTokenSource::from_fragments(["x"]), config, PlainFormat)
            .unwrap_err();
        assert!(matches!(err, GenerationError::InvalidConfig(_)));
    }

    #[test]
    fn test_generate_stream_requires_runtime() {
        let generator = generator(vec![RecordedExchange::new(["x"])]);
        let err = generator
            .generate_stream("p", false, CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, GenerationError::Worker(_)));
    }

    #[test]
    fn test_token_count_delegates_to_tokenizer() {
        let generator = generator(Vec::new());
        assert_eq!(generator.token_count("one two three").unwrap(), 3);
        assert_eq!(generator.token_count("").unwrap(), 0);
    }
}
