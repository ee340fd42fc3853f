//! Pipeline tests against real Hugging Face checkpoints
//!
//! Downloads models on first run. Enable with `PIPESERVE_RUN_MODEL_TESTS=1`.

use pipeserve_core::{InferenceInput, Mapping};
use pipeserve_pipelines::{build_pipeline, PipelineArgs};
use serde_json::{json, Value};

fn model_tests_enabled() -> bool {
    std::env::var("PIPESERVE_RUN_MODEL_TESTS")
        .ok()
        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

#[tokio::test]
async fn test_default_sentiment_model() {
    if !model_tests_enabled() {
        return;
    }

    let args = PipelineArgs::parse(r#"{"task": "sentiment-analysis"}"#).unwrap();
    let pipeline = build_pipeline(&args).await.unwrap();

    let output = pipeline
        .run(
            &InferenceInput::from("I love this movie, it's absolutely fantastic!"),
            &Mapping::new(),
        )
        .await
        .unwrap();
    let map = output.into_mapping().unwrap();

    let top = &map["output"][0];
    assert_eq!(top["label"], json!("POSITIVE"));
    assert!(top["score"].as_f64().unwrap() > 0.9);
}

#[tokio::test]
async fn test_sentiment_structured_input() {
    if !model_tests_enabled() {
        return;
    }

    let args = PipelineArgs::parse(r#"{"task": "text-classification"}"#).unwrap();
    let pipeline = build_pipeline(&args).await.unwrap();

    let input = InferenceInput::Structured(
        json!({"text": "This was a terrible waste of time."})
            .as_object()
            .cloned()
            .unwrap(),
    );
    let map = pipeline
        .run(&input, &Mapping::new())
        .await
        .unwrap()
        .into_mapping()
        .unwrap();

    assert_eq!(map["label"], json!("NEGATIVE"));
}

#[tokio::test]
async fn test_feature_extraction_mean_pooling() {
    if !model_tests_enabled() {
        return;
    }

    let args = PipelineArgs::parse(
        r#"{"task": "feature-extraction", "model": "sentence-transformers/all-MiniLM-L6-v2"}"#,
    )
    .unwrap();
    let pipeline = build_pipeline(&args).await.unwrap();

    let call = json!({"pooling": "mean", "normalize": true})
        .as_object()
        .cloned()
        .unwrap();
    let map = pipeline
        .run(&InferenceInput::from("hello world"), &call)
        .await
        .unwrap()
        .into_mapping()
        .unwrap();

    let embedding = match &map["output"][0] {
        Value::Array(values) => values.clone(),
        other => panic!("expected embedding array, got {}", other),
    };
    assert_eq!(embedding.len(), 384);
}
