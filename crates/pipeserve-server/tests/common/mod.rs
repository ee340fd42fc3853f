//! Mock pipelines and factories shared by the service tests
//!
//! Configurable implementations of the Pipeline and PipelineFactory traits
//! covering every output shape, plus failing variants for error paths.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use pipeserve_core::{Error, InferenceInput, IntoMapping, Mapping, PipelineOutput, Result};
use pipeserve_pipelines::{Pipeline, PipelineArgs, PipelineFactory, Task};
use pipeserve_server::{create_router, AppState, ServiceConfig};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

/// Which output variant a mock produces
#[derive(Debug, Clone, Copy)]
pub enum Shape {
    /// `{"label": "POSITIVE", "score": 0.99}` as a mapping
    Mapping,
    /// A serialized answer struct
    Record,
    /// An object converting itself to `{"summary_text": <input>}`
    Convertible,
    /// A bare list of predictions
    List,
    /// A record that is not an object
    ScalarRecord,
    /// `{"input": <input>, "args": <args>}`
    Echo,
}

#[derive(Serialize)]
struct Answer {
    answer: &'static str,
    start: usize,
    end: usize,
}

#[derive(Debug)]
struct Summary {
    text: String,
}

impl IntoMapping for Summary {
    fn to_mapping(&self) -> Result<Mapping> {
        let mut map = Mapping::new();
        map.insert("summary_text".to_string(), json!(self.text));
        Ok(map)
    }
}

/// A configurable mock pipeline
pub struct MockPipeline {
    name: String,
    shape: Shape,
    simulated_latency: Option<Duration>,
    call_count: AtomicU32,
}

impl MockPipeline {
    pub fn new(name: &str, shape: Shape) -> Self {
        Self {
            name: name.to_string(),
            shape,
            simulated_latency: None,
            call_count: AtomicU32::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.simulated_latency = Some(latency);
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Pipeline for MockPipeline {
    async fn run(&self, input: &InferenceInput, args: &Mapping) -> Result<PipelineOutput> {
        self.call_count.fetch_add(1, Ordering::Relaxed);

        if let Some(latency) = self.simulated_latency {
            tokio::time::sleep(latency).await;
        }

        let output = match self.shape {
            Shape::Mapping => {
                let mut map = Mapping::new();
                map.insert("label".to_string(), json!("POSITIVE"));
                map.insert("score".to_string(), json!(0.99));
                PipelineOutput::Mapping(map)
            }
            Shape::Record => PipelineOutput::record(&Answer {
                answer: "Paris",
                start: 0,
                end: 5,
            })?,
            Shape::Convertible => PipelineOutput::convertible(Summary {
                text: input.to_string(),
            }),
            Shape::List => PipelineOutput::Other(json!([{"label": "NEGATIVE", "score": 0.1}])),
            Shape::ScalarRecord => PipelineOutput::record(&42)?,
            Shape::Echo => {
                let mut map = Mapping::new();
                map.insert("input".to_string(), serde_json::to_value(input)?);
                map.insert("args".to_string(), Value::Object(args.clone()));
                PipelineOutput::Mapping(map)
            }
        };
        Ok(output)
    }

    fn task(&self) -> Task {
        Task::TextClassification
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A pipeline that always fails - for testing error paths
pub struct FailingPipeline {
    error: fn(String) -> Error,
    message: String,
}

impl FailingPipeline {
    pub fn new(message: &str) -> Self {
        Self {
            error: Error::Pipeline,
            message: message.to_string(),
        }
    }

    pub fn invalid_input(message: &str) -> Self {
        Self {
            error: Error::InvalidInput,
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl Pipeline for FailingPipeline {
    async fn run(&self, _input: &InferenceInput, _args: &Mapping) -> Result<PipelineOutput> {
        Err((self.error)(self.message.clone()))
    }

    fn task(&self) -> Task {
        Task::TextClassification
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Records the arguments it is asked to build with
#[derive(Default)]
pub struct RecordingFactory {
    pub seen: Mutex<Vec<PipelineArgs>>,
}

#[async_trait]
impl PipelineFactory for RecordingFactory {
    async fn build(&self, args: &PipelineArgs) -> Result<Arc<dyn Pipeline>> {
        self.seen.lock().unwrap().push(args.clone());
        Ok(Arc::new(MockPipeline::new("recorded", Shape::Mapping)))
    }
}

/// A factory whose construction always fails
pub struct BrokenFactory;

#[async_trait]
impl PipelineFactory for BrokenFactory {
    async fn build(&self, _args: &PipelineArgs) -> Result<Arc<dyn Pipeline>> {
        Err(Error::config("model weights not found"))
    }
}

pub fn config() -> ServiceConfig {
    ServiceConfig::new(PipelineArgs::new(Task::TextClassification))
}

pub fn router_with(pipeline: impl Pipeline + 'static, config: ServiceConfig) -> Router {
    create_router(AppState::from_pipeline(Arc::new(pipeline), config))
}

pub fn mock_router(shape: Shape) -> Router {
    router_with(MockPipeline::new("mock", shape), config())
}

pub async fn post_inference(app: Router, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/inference")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

pub async fn get(app: Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}
