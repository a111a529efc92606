//! The agent reasoning loop.
//!
//! One [`AgentLoop::run`] executes one task: it builds the ReAct prompt,
//! asks the model what to do, runs the chosen tool and feeds the
//! observation back, until the model gives a final answer or the task
//! fails. Every step goes to the task's [`StepEmitter`] and into the
//! returned trace.
//!
//! Recoverable problems (tool errors, unknown tools, tool timeouts,
//! unparsable replies up to the retry limit) become observations the
//! model can react to. Fatal problems end the task with a
//! [`FailureKind`]; they are reported inside [`TaskOutcome`], never as an
//! `Err`.

use opsclaw_config::{AgentConfig, AppConfig};
use opsclaw_core::error::{ToolError, ToolErrorKind};
use opsclaw_core::event::{FailureKind, StepEvent};
use opsclaw_core::memory::{ConversationTurn, MemoryStore};
use opsclaw_core::provider::{Provider, ProviderRequest};
use opsclaw_core::session::{SessionId, TaskId};
use opsclaw_core::tool::{ToolCall, ToolInput};
use opsclaw_security::Redactor;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::emitter::{StepEmitter, TaskEvent};
use crate::parser::{self, ParsedOutput};
use crate::prompt::{self, DEFAULT_SYSTEM_PROMPT, OBSERVATION_STOP, PromptParts};
use crate::scratchpad::Scratchpad;
use crate::toolset::TaskTools;

/// How a task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Terminal {
    Answered,
    Failed,
}

/// The result of one task, answered or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub task_id: TaskId,
    pub session_id: SessionId,
    pub terminal: Terminal,

    /// The answer; on `StepBudgetExceeded` the last thought, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_answer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,

    /// `final_answer` is a best effort, not a real answer
    #[serde(default)]
    pub partial: bool,

    /// Action/observation cycles executed
    pub steps: usize,

    /// Every emitted step, in order
    pub trace: Vec<StepEvent>,
}

impl TaskOutcome {
    pub fn is_answered(&self) -> bool {
        self.terminal == Terminal::Answered
    }

    /// The message of the terminal `Error` event, for failed tasks.
    pub fn error_message(&self) -> Option<&str> {
        match self.trace.last() {
            Some(StepEvent::Error { message, .. }) => Some(message),
            _ => None,
        }
    }
}

/// Everything one task runs with.
pub struct TaskContext {
    pub task_id: TaskId,
    pub session_id: SessionId,
    pub input: String,
    pub tools: TaskTools,
    pub memory: Arc<dyn MemoryStore>,
    pub emitter: StepEmitter,
    pub cancel: CancellationToken,
}

impl TaskContext {
    pub fn new(
        session_id: SessionId,
        input: impl Into<String>,
        tools: TaskTools,
        memory: Arc<dyn MemoryStore>,
    ) -> Self {
        Self::with_id(TaskId::new(), session_id, input, tools, memory)
    }

    pub fn with_id(
        task_id: TaskId,
        session_id: SessionId,
        input: impl Into<String>,
        tools: TaskTools,
        memory: Arc<dyn MemoryStore>,
    ) -> Self {
        Self {
            task_id,
            emitter: StepEmitter::new(task_id, session_id.clone()),
            session_id,
            input: input.into(),
            tools,
            memory,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_emitter(mut self, f: impl FnOnce(StepEmitter) -> StepEmitter) -> Self {
        self.emitter = f(self.emitter);
        self
    }

    /// Attach a bounded observer queue to this task.
    pub fn subscribe(&mut self, capacity: usize) -> tokio::sync::mpsc::Receiver<TaskEvent> {
        self.emitter.subscribe(capacity)
    }
}

/// The ReAct loop. Stateless between tasks; share it behind an `Arc`.
pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    limits: AgentConfig,
    memory_window: Option<usize>,
}

impl AgentLoop {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.0,
            max_tokens: None,
            limits: AgentConfig::default(),
            memory_window: None,
        }
    }

    pub fn from_config(config: &AppConfig, provider: Arc<dyn Provider>) -> Self {
        Self::new(provider, config.default_model.clone())
            .with_temperature(config.default_temperature)
            .with_max_tokens(config.default_max_tokens)
            .with_limits(config.agent.clone())
            .with_memory_window(config.memory.window)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_limits(mut self, limits: AgentConfig) -> Self {
        self.limits = limits;
        self
    }

    /// Only the last `window` turns of history go into the prompt.
    pub fn with_memory_window(mut self, window: Option<usize>) -> Self {
        self.memory_window = window;
        self
    }

    pub fn limits(&self) -> &AgentConfig {
        &self.limits
    }

    /// Run one task to completion.
    pub async fn run(&self, ctx: TaskContext) -> TaskOutcome {
        info!(
            task = %ctx.task_id,
            session = %ctx.session_id,
            tools = ctx.tools.registry.len(),
            "Task started"
        );

        let mut run = TaskRun::new(&ctx);
        let history = self.load_history(ctx.memory.as_ref()).await;
        let system = self
            .limits
            .system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT);
        let catalogue = ctx.tools.registry.describe_all();
        let mut scratchpad = Scratchpad::new();
        let mut parse_failures = 0usize;
        let mut last_thought: Option<String> = None;

        loop {
            let prompt = prompt::render(&PromptParts {
                system,
                tools: &catalogue,
                history: &history,
                input: &ctx.input,
                scratchpad: &scratchpad,
            });

            let output = match self.think(prompt, &ctx.cancel).await {
                Ok(text) => text,
                Err(Interrupt::Cancelled) => {
                    return run.fail(FailureKind::Cancelled, "task cancelled", None);
                }
                Err(Interrupt::Model(message)) => {
                    return run.fail(FailureKind::ModelUnavailable, message, None);
                }
            };

            let parsed = match parser::parse(&output) {
                Ok(parsed) => {
                    parse_failures = 0;
                    parsed
                }
                Err(err) => {
                    parse_failures += 1;
                    if parse_failures > self.limits.parse_retry_limit {
                        return run.fail(
                            FailureKind::UnparsableOutput,
                            format!("{parse_failures} consecutive unparsable replies; last: {err}"),
                            None,
                        );
                    }
                    let observation = err.observation();
                    run.emit(StepEvent::failed_observation(&observation, None));
                    scratchpad.record_invalid(&output, &observation);
                    continue;
                }
            };

            match parsed {
                ParsedOutput::FinalAnswer { thought, answer } => {
                    run.emit(StepEvent::thought(&thought));
                    run.emit(StepEvent::final_answer(&answer));
                    self.remember(ctx.memory.as_ref(), &ctx.input, &answer).await;
                    return run.answered(answer);
                }
                ParsedOutput::Action { thought, call } => {
                    run.emit(StepEvent::thought(&thought));
                    if !thought.is_empty() {
                        last_thought = Some(thought.clone());
                    }

                    if run.steps >= self.limits.max_steps {
                        let message = format!("step budget of {} exhausted", self.limits.max_steps);
                        return run.fail(FailureKind::StepBudgetExceeded, message, Some(last_thought));
                    }

                    run.emit(StepEvent::action(&call.tool_name, &call.raw_input));
                    run.steps += 1;

                    let Some(observation) = self.act(&ctx, &call).await else {
                        return run.fail(FailureKind::Cancelled, "task cancelled", None);
                    };
                    run.emit(observation.to_event());
                    scratchpad.record(&thought, call, &observation.text);
                }
            }
        }
    }

    async fn load_history(&self, memory: &dyn MemoryStore) -> Vec<ConversationTurn> {
        let history = match self.memory_window {
            Some(k) => memory.recent(k).await,
            None => memory.history().await,
        };
        history.unwrap_or_else(|e| {
            warn!(error = %e, "Conversation memory unreadable, continuing without history");
            Vec::new()
        })
    }

    async fn remember(&self, memory: &dyn MemoryStore, input: &str, answer: &str) {
        let turns = vec![ConversationTurn::user(input), ConversationTurn::assistant(answer)];
        if let Err(e) = memory.append_all(turns).await {
            warn!(error = %e, "Failed to save turn to conversation memory");
        }
    }

    /// Ask the model for its next step.
    async fn think(&self, prompt: String, cancel: &CancellationToken) -> Result<String, Interrupt> {
        let request = ProviderRequest {
            model: self.model.clone(),
            prompt,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stop: vec![OBSERVATION_STOP.to_string()],
        };
        let limit = Duration::from_millis(self.limits.model_timeout_ms);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Interrupt::Cancelled),
            result = tokio::time::timeout(limit, self.provider.complete(request)) => match result {
                Ok(Ok(response)) => {
                    debug!(model = %response.model, chars = response.text.len(), "Model replied");
                    Ok(response.text)
                }
                Ok(Err(e)) => Err(Interrupt::Model(e.to_string())),
                Err(_) => Err(Interrupt::Model(format!(
                    "model did not answer within {}ms",
                    self.limits.model_timeout_ms
                ))),
            },
        }
    }

    /// Run the chosen tool. `None` means the task was cancelled meanwhile.
    async fn act(&self, ctx: &TaskContext, call: &ToolCall) -> Option<Observation> {
        let tool = match ctx.tools.registry.resolve(&call.tool_name) {
            Ok(tool) => tool,
            Err(e) => {
                let observation = Observation::failed(e.to_string(), ToolErrorKind::UnknownTool);
                return Some(self.sanitize(observation, &ctx.tools.redactor));
            }
        };

        let limit = Duration::from_millis(self.limits.tool_timeout_ms);
        let invocation = tokio::time::timeout(limit, tool.invoke(ToolInput::new(call.raw_input.clone())));
        let result = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return None,
            result = invocation => result,
        };

        let observation = match result {
            Ok(Ok(text)) => Observation::ok(text),
            Ok(Err(err)) => Observation::from_error(&err),
            Err(_) => Observation::from_error(&ToolError::timeout(
                &call.tool_name,
                self.limits.tool_timeout_ms,
            )),
        };
        Some(self.sanitize(observation, &ctx.tools.redactor))
    }

    fn sanitize(&self, mut observation: Observation, redactor: &Redactor) -> Observation {
        observation.text = truncate(redactor.redact(&observation.text), self.limits.max_observation_chars);
        observation
    }
}

enum Interrupt {
    Cancelled,
    Model(String),
}

struct Observation {
    text: String,
    error_kind: Option<ToolErrorKind>,
}

impl Observation {
    fn ok(text: String) -> Self {
        Self {
            text,
            error_kind: None,
        }
    }

    fn failed(text: String, kind: ToolErrorKind) -> Self {
        Self {
            text,
            error_kind: Some(kind),
        }
    }

    fn from_error(err: &ToolError) -> Self {
        Self::failed(format!("Error: {err}"), err.kind)
    }

    fn to_event(&self) -> StepEvent {
        match self.error_kind {
            Some(kind) => StepEvent::failed_observation(&self.text, Some(kind)),
            None => StepEvent::observation(&self.text),
        }
    }
}

fn truncate(text: String, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text;
    }
    let kept: String = text.chars().take(max_chars).collect();
    format!("{kept}\n... [truncated {} of {total} characters]", total - max_chars)
}

/// Collects the trace of one task while forwarding it to observers.
struct TaskRun<'a> {
    ctx: &'a TaskContext,
    trace: Vec<StepEvent>,
    steps: usize,
}

impl<'a> TaskRun<'a> {
    fn new(ctx: &'a TaskContext) -> Self {
        Self {
            ctx,
            trace: Vec::new(),
            steps: 0,
        }
    }

    fn emit(&mut self, step: StepEvent) {
        self.ctx.emitter.emit(&step);
        self.trace.push(step);
    }

    fn answered(self, answer: String) -> TaskOutcome {
        info!(task = %self.ctx.task_id, steps = self.steps, "Task answered");
        TaskOutcome {
            task_id: self.ctx.task_id,
            session_id: self.ctx.session_id.clone(),
            terminal: Terminal::Answered,
            final_answer: Some(answer),
            failure: None,
            partial: false,
            steps: self.steps,
            trace: self.trace,
        }
    }

    /// `partial` is `Some` when the failure still yields a best-effort answer.
    fn fail(
        mut self,
        kind: FailureKind,
        message: impl Into<String>,
        partial: Option<Option<String>>,
    ) -> TaskOutcome {
        let message = message.into();
        self.emit(StepEvent::error(kind, &message));
        info!(task = %self.ctx.task_id, steps = self.steps, failure = %kind, "Task failed");

        TaskOutcome {
            task_id: self.ctx.task_id,
            session_id: self.ctx.session_id.clone(),
            terminal: Terminal::Failed,
            partial: partial.is_some(),
            final_answer: partial.flatten(),
            failure: Some(kind),
            steps: self.steps,
            trace: self.trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{
        HangingProvider, ScriptedTool, SequentialMockProvider, SlowTool, registry,
    };
    use async_trait::async_trait;
    use opsclaw_core::error::ProviderError;
    use opsclaw_core::tool::ToolRegistry;
    use opsclaw_memory::InMemoryStore;
    use opsclaw_tools::s3::{self, BucketAcl, ObjectStorage, ObjectSummary};

    const TICKETS: &str = "1. {\"id\":1,\"subject\":\"Printer jam\"}\n\
                           2. {\"id\":2,\"subject\":\"VPN down\"}\n\
                           3. {\"id\":3,\"subject\":\"New laptop\"}";

    fn agent(provider: Arc<dyn Provider>) -> AgentLoop {
        AgentLoop::new(provider, "mock-model")
    }

    fn limits(f: impl FnOnce(&mut AgentConfig)) -> AgentConfig {
        let mut limits = AgentConfig::default();
        f(&mut limits);
        limits
    }

    fn task(input: &str, tools: ToolRegistry, memory: Arc<dyn MemoryStore>) -> TaskContext {
        TaskContext::new(SessionId::from("test"), input, TaskTools::new(tools), memory)
    }

    fn kinds(outcome: &TaskOutcome) -> Vec<&'static str> {
        outcome.trace.iter().map(|e| e.event_type()).collect()
    }

    #[tokio::test]
    async fn list_all_tickets_scenario() {
        let provider = Arc::new(SequentialMockProvider::new(&[
            "Thought: I need to look up the tickets\nAction: list-all-tickets\nAction Input: \"\"",
            "Thought: I now know the final answer\nFinal Answer: There are 3 tickets: Printer jam, VPN down and New laptop.",
        ]));
        let tickets = Arc::new(ScriptedTool::ok("list-all-tickets", TICKETS));
        let memory: Arc<dyn MemoryStore> = Arc::new(InMemoryStore::new());

        let outcome = agent(provider.clone())
            .run(task("list all tickets", registry(vec![tickets.clone()]), memory.clone()))
            .await;

        assert!(outcome.is_answered());
        assert_eq!(
            kinds(&outcome),
            vec!["thought", "action", "observation", "thought", "final_answer"]
        );
        assert_eq!(outcome.trace[1], StepEvent::action("list-all-tickets", ""));
        assert_eq!(outcome.trace[2], StepEvent::observation(TICKETS));
        assert!(outcome.final_answer.as_deref().unwrap().contains("3 tickets"));
        assert_eq!(outcome.steps, 1);
        assert_eq!(tickets.calls(), 1);

        // The observation reached the model on the second call
        assert!(provider.prompts()[1].contains("Observation: 1. {\"id\":1"));

        let history = memory.history().await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "list all tickets");
        assert!(history[1].content.contains("3 tickets"));
    }

    /// Buckets can be listed but deleting is forbidden.
    struct ReadOnlyStorage;

    #[async_trait]
    impl ObjectStorage for ReadOnlyStorage {
        async fn create_bucket(&self, _: &str) -> Result<Option<String>, ToolError> {
            Err(ToolError::remote("AccessDenied"))
        }
        async fn delete_bucket(&self, _: &str) -> Result<(), ToolError> {
            Err(ToolError::remote("AccessDenied"))
        }
        async fn list_buckets(&self) -> Result<Vec<String>, ToolError> {
            Ok(vec!["test-bucket".into()])
        }
        async fn list_objects(&self, _: &str) -> Result<Vec<ObjectSummary>, ToolError> {
            Ok(vec![])
        }
        async fn delete_object(&self, _: &str, _: &str) -> Result<(), ToolError> {
            Err(ToolError::remote("AccessDenied"))
        }
        async fn bucket_policy(&self, _: &str) -> Result<Option<String>, ToolError> {
            Ok(None)
        }
        async fn bucket_acl(&self, _: &str) -> Result<BucketAcl, ToolError> {
            Ok(BucketAcl::default())
        }
        async fn get_object(&self, _: &str, _: &str) -> Result<Vec<u8>, ToolError> {
            Err(ToolError::remote("NoSuchKey"))
        }
    }

    #[tokio::test]
    async fn access_denied_becomes_an_observation() {
        let provider = Arc::new(SequentialMockProvider::new(&[
            "Thought: delete it\nAction: delete-bucket\nAction Input: test-bucket",
            "Thought: I am not allowed to delete it\nFinal Answer: I could not delete test-bucket: access denied.",
        ]));
        let tools = s3::toolkit(Arc::new(ReadOnlyStorage)).unwrap();

        let outcome = agent(provider)
            .run(task("delete test-bucket", tools, Arc::new(InMemoryStore::new())))
            .await;

        assert_eq!(
            outcome.trace[2],
            StepEvent::failed_observation("Error: AccessDenied", Some(ToolErrorKind::Remote))
        );
        assert_eq!(outcome.trace[3].event_type(), "thought");
        assert!(outcome.is_answered());
    }

    #[tokio::test]
    async fn tool_errors_never_abort_the_loop() {
        let provider = Arc::new(SequentialMockProvider::new(&[
            "Action: view-ticket\nAction Input: seven",
            "Action: list-all-tickets\nAction Input: ",
            "Action: view-ticket\nAction Input: 7",
            "Final Answer: gave up politely",
        ]));
        let tools = registry(vec![
            Arc::new(ScriptedTool::failing(
                "view-ticket",
                ToolError::invalid_input("expected a numeric id, got 'seven'"),
            )),
            Arc::new(ScriptedTool::failing(
                "list-all-tickets",
                ToolError::transport("connection refused"),
            )),
        ]);

        let outcome = agent(provider)
            .run(task("show ticket 7", tools, Arc::new(InMemoryStore::new())))
            .await;

        assert!(outcome.is_answered());
        assert_eq!(outcome.steps, 3);
        // Every action is directly followed by an observation
        for (i, event) in outcome.trace.iter().enumerate() {
            if event.event_type() == "action" {
                assert_eq!(outcome.trace[i + 1].event_type(), "observation");
            }
        }
        assert!(matches!(
            &outcome.trace[5],
            StepEvent::Observation { text, error_kind: Some(ToolErrorKind::Transport), .. }
                if text == "Error: connection refused"
        ));
    }

    #[tokio::test]
    async fn unknown_tool_is_an_observation() {
        let provider = Arc::new(SequentialMockProvider::new(&[
            "Thought: drop it all\nAction: drop-table\nAction Input: tickets",
            "Thought: that tool does not exist\nFinal Answer: I can only list tickets.",
        ]));
        let tools = registry(vec![Arc::new(ScriptedTool::ok("list-all-tickets", TICKETS))]);

        let outcome = agent(provider)
            .run(task("drop the tickets table", tools, Arc::new(InMemoryStore::new())))
            .await;

        assert_eq!(
            outcome.trace[2],
            StepEvent::failed_observation(
                "drop-table is not a valid tool, try one of [list-all-tickets].",
                Some(ToolErrorKind::UnknownTool)
            )
        );
        assert!(outcome.is_answered());
    }

    #[tokio::test]
    async fn step_budget_limits_cycles() {
        let provider = Arc::new(SequentialMockProvider::repeating(
            "Thought: maybe one more look\nAction: list-all-tickets\nAction Input: ",
            10,
        ));
        let tickets = Arc::new(ScriptedTool::ok("list-all-tickets", TICKETS));
        let memory: Arc<dyn MemoryStore> = Arc::new(InMemoryStore::new());

        let outcome = agent(provider)
            .with_limits(limits(|l| l.max_steps = 2))
            .run(task("loop forever", registry(vec![tickets.clone()]), memory.clone()))
            .await;

        assert_eq!(outcome.terminal, Terminal::Failed);
        assert_eq!(outcome.failure, Some(FailureKind::StepBudgetExceeded));
        assert!(outcome.partial);
        assert_eq!(outcome.final_answer.as_deref(), Some("maybe one more look"));
        assert_eq!(outcome.steps, 2);
        assert_eq!(tickets.calls(), 2);
        assert_eq!(kinds(&outcome).iter().filter(|k| **k == "action").count(), 2);
        assert!(matches!(
            outcome.trace.last(),
            Some(StepEvent::Error { kind: FailureKind::StepBudgetExceeded, .. })
        ));
        // Failed tasks leave memory untouched
        assert_eq!(memory.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn parse_error_is_fed_back_and_recovered() {
        let provider = Arc::new(SequentialMockProvider::new(&[
            "I think there are some tickets.",
            "Final Answer: 3 tickets",
        ]));

        let outcome = agent(provider.clone())
            .run(task("count tickets", ToolRegistry::new(), Arc::new(InMemoryStore::new())))
            .await;

        assert!(outcome.is_answered());
        assert!(matches!(
            &outcome.trace[0],
            StepEvent::Observation { is_error: true, error_kind: None, text } if text.starts_with("Invalid Format")
        ));
        let second_prompt = &provider.prompts()[1];
        assert!(second_prompt.contains("I think there are some tickets.\nObservation: Invalid Format"));
    }

    #[tokio::test]
    async fn repeated_parse_errors_fail_the_task() {
        let provider = Arc::new(SequentialMockProvider::repeating("no idea", 5));

        let outcome = agent(provider.clone())
            .with_limits(limits(|l| l.parse_retry_limit = 3))
            .run(task("count tickets", ToolRegistry::new(), Arc::new(InMemoryStore::new())))
            .await;

        assert_eq!(outcome.failure, Some(FailureKind::UnparsableOutput));
        assert!(!outcome.partial);
        assert_eq!(
            kinds(&outcome),
            vec!["observation", "observation", "observation", "error"]
        );
        assert_eq!(provider.call_count(), 4);
    }

    #[tokio::test]
    async fn single_parse_retry_still_reprompts_the_model() {
        let provider = Arc::new(SequentialMockProvider::new(&["no idea", "Final Answer: ok"]));

        let outcome = agent(provider.clone())
            .with_limits(limits(|l| l.parse_retry_limit = 1))
            .run(task("count tickets", ToolRegistry::new(), Arc::new(InMemoryStore::new())))
            .await;

        assert!(outcome.is_answered());
        assert_eq!(outcome.final_answer.as_deref(), Some("ok"));
        assert_eq!(provider.call_count(), 2);
        assert_eq!(kinds(&outcome), vec!["observation", "thought", "final_answer"]);
    }

    #[tokio::test]
    async fn model_failure_is_fatal() {
        let provider = Arc::new(SequentialMockProvider::with_results(vec![Err(
            ProviderError::Network("connection reset".into()),
        )]));
        let memory: Arc<dyn MemoryStore> = Arc::new(InMemoryStore::new());

        let outcome = agent(provider)
            .run(task("hello", ToolRegistry::new(), memory.clone()))
            .await;

        assert_eq!(outcome.failure, Some(FailureKind::ModelUnavailable));
        assert_eq!(kinds(&outcome), vec!["error"]);
        assert!(outcome.error_message().unwrap().contains("connection reset"));
        assert_eq!(memory.len().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn model_timeout_is_fatal() {
        let outcome = agent(Arc::new(HangingProvider))
            .with_limits(limits(|l| l.model_timeout_ms = 1_000))
            .run(task("hello", ToolRegistry::new(), Arc::new(InMemoryStore::new())))
            .await;

        assert_eq!(outcome.failure, Some(FailureKind::ModelUnavailable));
        assert!(outcome.error_message().unwrap().contains("1000ms"));
    }

    #[tokio::test(start_paused = true)]
    async fn tool_timeout_is_an_observation() {
        let provider = Arc::new(SequentialMockProvider::new(&[
            "Action: get-bucket-size\nAction Input: huge",
            "Final Answer: the bucket is too big to measure",
        ]));
        let tools = registry(vec![Arc::new(SlowTool::new(
            "get-bucket-size",
            Duration::from_secs(600),
        ))]);

        let outcome = agent(provider)
            .with_limits(limits(|l| l.tool_timeout_ms = 100))
            .run(task("size of huge", tools, Arc::new(InMemoryStore::new())))
            .await;

        assert_eq!(
            outcome.trace[2],
            StepEvent::failed_observation(
                "Error: get-bucket-size timed out after 100ms",
                Some(ToolErrorKind::Timeout)
            )
        );
        assert!(outcome.is_answered());
    }

    #[tokio::test]
    async fn cancellation_stops_an_in_flight_tool() {
        let provider = Arc::new(SequentialMockProvider::new(&[
            "Thought: list them\nAction: list-objects\nAction Input: archive",
            "Final Answer: never reached",
        ]));
        let slow = Arc::new(SlowTool::blocking("list-objects"));
        let started = slow.started.clone();
        let memory: Arc<dyn MemoryStore> = Arc::new(InMemoryStore::new());
        let cancel = CancellationToken::new();

        let ctx = task("list archive", registry(vec![slow]), memory.clone()).with_cancel(cancel.clone());
        let agent = Arc::new(agent(provider));
        let handle = tokio::spawn(async move { agent.run(ctx).await });

        started.notified().await;
        cancel.cancel();
        let outcome = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("cancelled task must finish promptly")
            .unwrap();

        assert_eq!(outcome.failure, Some(FailureKind::Cancelled));
        assert_eq!(kinds(&outcome), vec!["thought", "action", "error"]);
        assert_eq!(memory.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn cancelled_before_start_never_calls_the_model() {
        let provider = Arc::new(SequentialMockProvider::new(&["Final Answer: hi"]));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = agent(provider.clone())
            .run(task("hello", ToolRegistry::new(), Arc::new(InMemoryStore::new())).with_cancel(cancel))
            .await;

        assert_eq!(outcome.failure, Some(FailureKind::Cancelled));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn memory_round_trip_across_tasks() {
        let memory: Arc<dyn MemoryStore> = Arc::new(InMemoryStore::new());
        let provider = Arc::new(SequentialMockProvider::new(&[
            "Final Answer: answer 0",
            "Final Answer: answer 1",
            "Final Answer: answer 2",
        ]));
        let agent = agent(provider.clone());

        for i in 0..3 {
            let outcome = agent
                .run(task(&format!("question {i}"), ToolRegistry::new(), memory.clone()))
                .await;
            assert!(outcome.is_answered());
        }

        let history: Vec<_> = memory
            .history()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.content)
            .collect();
        assert_eq!(
            history,
            vec!["question 0", "answer 0", "question 1", "answer 1", "question 2", "answer 2"]
        );
        assert!(provider.prompts()[2].contains("Human: question 1\nAI: answer 1"));
    }

    #[tokio::test]
    async fn memory_window_limits_prompt_history() {
        let memory: Arc<dyn MemoryStore> = Arc::new(InMemoryStore::new());
        for i in 0..3 {
            memory
                .append_all(vec![
                    ConversationTurn::user(format!("old question {i}")),
                    ConversationTurn::assistant(format!("old answer {i}")),
                ])
                .await
                .unwrap();
        }
        let provider = Arc::new(SequentialMockProvider::new(&["Final Answer: ok"]));

        agent(provider.clone())
            .with_memory_window(Some(2))
            .run(task("new question", ToolRegistry::new(), memory))
            .await;

        let prompt = &provider.prompts()[0];
        assert!(prompt.contains("Human: old question 2\nAI: old answer 2"));
        assert!(!prompt.contains("old question 1"));
    }

    #[tokio::test]
    async fn observations_are_redacted_and_truncated() {
        let leaky = format!("auth failed for key fd-secret-key {}", "x".repeat(200));
        let provider = Arc::new(SequentialMockProvider::new(&[
            "Action: list-all-tickets\nAction Input: ",
            "Final Answer: auth problem",
        ]));
        let tools = TaskTools::new(registry(vec![Arc::new(ScriptedTool::ok("list-all-tickets", &leaky))]))
            .with_redactor(Redactor::new(["fd-secret-key".to_string()]));
        let ctx = TaskContext::new(SessionId::from("s"), "list", tools, Arc::new(InMemoryStore::new()));

        let outcome = agent(provider.clone())
            .with_limits(limits(|l| l.max_observation_chars = 60))
            .run(ctx)
            .await;

        let StepEvent::Observation { text, .. } = &outcome.trace[2] else {
            panic!("expected observation");
        };
        assert!(text.contains("[REDACTED]"));
        assert!(!text.contains("fd-secret-key"));
        assert!(text.contains("truncated"));
        assert!(!provider.prompts()[1].contains("fd-secret-key"));
    }

    #[tokio::test]
    async fn observers_see_the_trace_in_order() {
        let provider = Arc::new(SequentialMockProvider::new(&[
            "Thought: look\nAction: list-all-tickets\nAction Input: ",
            "Final Answer: 3 tickets",
        ]));
        let mut ctx = task(
            "list",
            registry(vec![Arc::new(ScriptedTool::ok("list-all-tickets", TICKETS))]),
            Arc::new(InMemoryStore::new()),
        );
        let mut events = ctx.subscribe(32);
        let task_id = ctx.task_id;

        let outcome = agent(provider).run(ctx).await;

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            assert_eq!(event.task_id, task_id);
            seen.push(event.step);
        }
        assert_eq!(seen, outcome.trace);
    }

    #[tokio::test]
    async fn requests_stop_before_observations() {
        let provider = Arc::new(SequentialMockProvider::new(&["Final Answer: ok"]));
        agent(provider.clone())
            .with_temperature(0.2)
            .with_max_tokens(256)
            .run(task("hi", ToolRegistry::new(), Arc::new(InMemoryStore::new())))
            .await;

        let request = &provider.requests()[0];
        assert_eq!(request.model, "mock-model");
        assert_eq!(request.stop, vec!["\nObservation:".to_string()]);
        assert_eq!(request.max_tokens, Some(256));
    }

    #[test]
    fn truncate_counts_characters() {
        assert_eq!(truncate("héllo".into(), 10), "héllo");
        let cut = truncate("ééééé".into(), 2);
        assert!(cut.starts_with("éé\n... [truncated 3 of 5 characters]"));
    }
}
