//! Shared test helpers: scripted providers and mock tools.

use async_trait::async_trait;
use opsclaw_core::error::{ProviderError, ToolError};
use opsclaw_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use opsclaw_core::tool::{Tool, ToolInput, ToolRegistry};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// A mock provider that returns a sequence of scripted replies.
///
/// Each call to `complete` returns the next reply in the queue. Once the
/// script is exhausted every call fails, which the loop reports as
/// `ModelUnavailable`.
pub struct SequentialMockProvider {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(replies: &[&str]) -> Self {
        Self::with_results(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn with_results(replies: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// The same reply, `times` times.
    pub fn repeating(reply: &str, times: usize) -> Self {
        Self::new(&vec![reply; times])
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.prompt.clone())
            .collect()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(Ok(text)) => Ok(make_response(&text, &model)),
            Some(Err(e)) => Err(e),
            None => Err(ProviderError::ApiError {
                status_code: 500,
                message: "mock script exhausted".into(),
            }),
        }
    }
}

pub fn make_response(text: &str, model: &str) -> ProviderResponse {
    ProviderResponse {
        text: text.to_string(),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: model.to_string(),
    }
}

/// A provider that never answers.
pub struct HangingProvider;

#[async_trait]
impl Provider for HangingProvider {
    fn name(&self) -> &str {
        "hanging_mock"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        std::future::pending().await
    }
}

/// A tool with a fixed reply that counts its invocations.
pub struct ScriptedTool {
    name: &'static str,
    reply: Result<String, ToolError>,
    calls: AtomicUsize,
    inputs: Mutex<Vec<String>>,
}

impl ScriptedTool {
    pub fn ok(name: &'static str, reply: &str) -> Self {
        Self::new(name, Ok(reply.to_string()))
    }

    pub fn failing(name: &'static str, error: ToolError) -> Self {
        Self::new(name, Err(error))
    }

    fn new(name: &'static str, reply: Result<String, ToolError>) -> Self {
        Self {
            name,
            reply,
            calls: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Tool for ScriptedTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "Scripted tool for tests"
    }

    async fn invoke(&self, input: ToolInput) -> Result<String, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().unwrap().push(input.as_str().to_string());
        self.reply.clone()
    }
}

/// A tool that signals when it starts and then takes `delay` (forever when `None`).
pub struct SlowTool {
    name: &'static str,
    delay: Option<Duration>,
    pub started: Arc<Notify>,
}

impl SlowTool {
    pub fn new(name: &'static str, delay: Duration) -> Self {
        Self {
            name,
            delay: Some(delay),
            started: Arc::new(Notify::new()),
        }
    }

    pub fn blocking(name: &'static str) -> Self {
        Self {
            name,
            delay: None,
            started: Arc::new(Notify::new()),
        }
    }
}

#[async_trait]
impl Tool for SlowTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "Takes its time"
    }

    async fn invoke(&self, _input: ToolInput) -> Result<String, ToolError> {
        self.started.notify_one();
        match self.delay {
            Some(delay) => {
                tokio::time::sleep(delay).await;
                Ok("finally done".into())
            }
            None => std::future::pending().await,
        }
    }
}

pub fn registry(tools: Vec<Arc<dyn Tool>>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for tool in tools {
        registry.register(tool).unwrap();
    }
    registry
}
