//! Streaming generation against recorded token sources.
//!
//! Fixtures under `tests/fixtures/` capture real fragment boundaries,
//! including characters split across tokens and mid-stream decode failures.

use futures::StreamExt;
use llama_stream::{
    FinishReason, GenerationConfig, GenerationError, GenerationState, Generator, PlainFormat,
    RecordedTokenSource, StreamChunk,
};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn recorded(name: &str) -> RecordedTokenSource {
    RecordedTokenSource::from_file(fixture(name)).unwrap()
}

fn init_logging() {
    llama_common::init_tracing(tracing::Level::DEBUG);
}

fn stop_config() -> GenerationConfig {
    GenerationConfig::default().with_stop_sequences(["STOP"])
}

async fn collect(
    generator: &Generator<RecordedTokenSource>,
    prompt: &str,
) -> Vec<Result<StreamChunk, GenerationError>> {
    generator
        .generate_stream(prompt, false, CancellationToken::new())
        .unwrap()
        .collect()
        .await
}

fn text_of(items: &[Result<StreamChunk, GenerationError>]) -> String {
    items
        .iter()
        .filter_map(|item| item.as_ref().ok())
        .map(|chunk| chunk.text.as_str())
        .collect()
}

#[tokio::test]
async fn test_stop_sequence_split_across_tokens() {
    let generator = Generator::new(recorded("stop_sequence.json"), stop_config(), PlainFormat).unwrap();

    let items = collect(&generator, "Say hello").await;

    assert_eq!(text_of(&items), "Hello wor");
    let last = items.last().unwrap().as_ref().unwrap();
    assert!(last.is_complete);
    assert_eq!(
        last.finish_reason,
        Some(FinishReason::StopSequence("STOP".to_string()))
    );
    for item in &items[..items.len() - 1] {
        let chunk = item.as_ref().unwrap();
        assert!(!chunk.is_complete);
        assert!(!chunk.text.contains("STOP"));
        assert!(!chunk.text.contains("ld"));
    }
}

#[tokio::test]
async fn test_leading_whitespace_dropped_and_finished() {
    let generator = Generator::new(recorded("stop_sequence.json"), stop_config(), PlainFormat).unwrap();
    generator.generate("Say hello", false).await.unwrap();

    let response = generator.generate("Greet again", false).await.unwrap();

    assert_eq!(response.text, "Hi there");
    assert_eq!(response.finish_reason, FinishReason::EndOfGeneration);
    assert_eq!(response.state(), GenerationState::Finished);
    assert_eq!(generator.with_source(|s| s.clear_count()).unwrap(), 2);
}

#[tokio::test]
async fn test_characters_split_across_tokens() {
    init_logging();
    let generator = Generator::new(
        recorded("split_characters.json"),
        GenerationConfig::default(),
        PlainFormat,
    )
    .unwrap();

    let response = generator.generate("anything", false).await.unwrap();

    assert_eq!(response.text, "café ☕ ok!");
    assert_eq!(response.tokens_generated, 9);
}

#[tokio::test]
async fn test_decode_failure_surfaces_after_partial_output() {
    init_logging();
    let generator = Generator::new(recorded("decode_failure.json"), stop_config(), PlainFormat).unwrap();

    let items = collect(&generator, "first").await;

    assert_eq!(text_of(&items), "Hello");
    assert!(matches!(
        items.last(),
        Some(Err(GenerationError::Decode(_)))
    ));
    assert_eq!(generator.with_source(|s| s.clear_count()).unwrap(), 1);

    // The failed call leaves no decode state behind.
    let response = generator.generate("second", false).await.unwrap();
    assert_eq!(response.text, "Recovered");
    assert_eq!(generator.with_source(|s| s.clear_count()).unwrap(), 2);
}

#[tokio::test]
async fn test_aggregate_reports_decode_failure() {
    let generator = Generator::new(recorded("decode_failure.json"), stop_config(), PlainFormat).unwrap();

    let err = generator.generate("first", false).await.unwrap_err();

    assert!(matches!(err, GenerationError::Decode(_)));
}

#[tokio::test]
async fn test_dropping_stream_releases_generator() {
    init_logging();
    let generator = Generator::new(
        RecordedTokenSource::from_fragments(["word "; 500]),
        GenerationConfig::default(),
        PlainFormat,
    )
    .unwrap();

    let mut stream = generator
        .generate_stream("p", false, CancellationToken::new())
        .unwrap();
    stream.next().await.unwrap().unwrap();
    drop(stream);

    let mut cleared = None;
    for _ in 0..200 {
        if let Ok(count) = generator.with_source(|s| s.clear_count()) {
            cleared = Some(count);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(cleared, Some(1));
}

#[tokio::test]
async fn test_token_budget_limits_output() {
    let generator = Generator::new(
        RecordedTokenSource::from_fragments(["one ", "two ", "three ", "four "]),
        GenerationConfig::default().with_max_token_count(3),
        PlainFormat,
    )
    .unwrap();

    let response = generator.generate("count", false).await.unwrap();

    assert_eq!(response.text, "one two three ");
    assert_eq!(response.tokens_generated, 3);
    assert_eq!(response.finish_reason, FinishReason::MaxTokens);
}

#[tokio::test]
async fn test_config_loaded_from_yaml_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("generation.yaml");
    std::fs::write(
        &path,
        "max_token_count: 16\nstop_sequences:\n  - STOP\ncontext:\n  context_length: 2048\n",
    )
    .unwrap();

    let config = GenerationConfig::from_file(&path).unwrap();
    let generator = Generator::new(recorded("stop_sequence.json"), config, PlainFormat).unwrap();

    let response = generator.generate("Say hello", false).await.unwrap();
    assert_eq!(response.text, "Hello wor");
}

#[test]
fn test_context_larger_than_trained_is_rejected() {
    let config = GenerationConfig::default().with_context_length(16_384);

    let err = Generator::new(recorded("stop_sequence.json"), config, PlainFormat).unwrap_err();

    assert_eq!(
        err,
        GenerationError::ContextSize {
            requested: 16_384,
            trained: 4096
        }
    );
}

#[test]
fn test_missing_fixture_is_model_load_error() {
    let err = RecordedTokenSource::from_file(fixture("missing.json")).unwrap_err();
    assert!(matches!(err, GenerationError::ModelLoad(_)));
}
