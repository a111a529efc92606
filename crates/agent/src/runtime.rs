//! Agent runtime: runs tasks against sessions.
//!
//! The [`AgentLoop`] knows nothing about sessions or concurrency. The
//! runtime owns everything around it:
//! - conversation memory per session ([`SessionStore`])
//! - live observers per session ([`SessionHub`])
//! - the cancellation token of every running task
//! - acquiring the task's tools (and their credentials) before it starts
//!
//! Tasks of different sessions run fully in parallel; nothing here holds
//! a lock across an `await`.

use opsclaw_config::AppConfig;
use opsclaw_core::error::MemoryError;
use opsclaw_core::memory::ConversationTurn;
use opsclaw_core::provider::Provider;
use opsclaw_core::session::{SessionId, TaskId};
use opsclaw_core::tool::{ToolDescription, ToolRegistry};
use opsclaw_memory::SessionStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::emitter::{SessionHub, StepEmitter, TaskEvent};
use crate::loop_runner::{AgentLoop, TaskContext, TaskOutcome};
use crate::toolset::{TaskTools, ToolSource, ToolSourceError};

/// Errors that keep a task from starting at all.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Tools(#[from] ToolSourceError),

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),
}

/// Per-call options for [`AgentRuntime::run_with`].
#[derive(Default)]
pub struct RunOptions {
    pub task_id: Option<TaskId>,
    pub cancel: Option<CancellationToken>,
    pub observers: Vec<mpsc::Sender<TaskEvent>>,
}

impl RunOptions {
    pub fn with_observer(mut self, observer: mpsc::Sender<TaskEvent>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// A task running in the background.
pub struct StartedTask {
    pub task_id: TaskId,
    pub events: mpsc::Receiver<TaskEvent>,
    pub handle: JoinHandle<Result<TaskOutcome, AgentError>>,
}

type RunningTasks = Arc<Mutex<HashMap<TaskId, CancellationToken>>>;

/// Removes a task from the running set when it ends, however it ends.
struct RunningGuard {
    task_id: TaskId,
    running: RunningTasks,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.task_id);
    }
}

pub struct AgentRuntime {
    engine: Arc<AgentLoop>,
    tools: Arc<dyn ToolSource>,
    sessions: SessionStore,
    hub: SessionHub,
    running: RunningTasks,
    log_steps: bool,
}

impl AgentRuntime {
    pub fn new(engine: AgentLoop, tools: Arc<dyn ToolSource>) -> Self {
        Self {
            engine: Arc::new(engine),
            tools,
            sessions: SessionStore::default(),
            hub: SessionHub::default(),
            running: Arc::new(Mutex::new(HashMap::new())),
            log_steps: true,
        }
    }

    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        tools: Arc<dyn ToolSource>,
    ) -> Self {
        Self::new(AgentLoop::from_config(config, provider), tools)
            .with_sessions(SessionStore::new(config.memory.max_sessions))
            .with_hub(SessionHub::new(config.gateway.event_buffer))
    }

    pub fn with_sessions(mut self, sessions: SessionStore) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn with_hub(mut self, hub: SessionHub) -> Self {
        self.hub = hub;
        self
    }

    /// Write every step to the process log (on by default).
    pub fn with_step_logging(mut self, enabled: bool) -> Self {
        self.log_steps = enabled;
        self
    }

    pub fn engine(&self) -> &AgentLoop {
        &self.engine
    }

    /// Run one task in `session` and wait for its outcome.
    pub async fn run(&self, session: &SessionId, input: &str) -> Result<TaskOutcome, AgentError> {
        self.run_with(session, input, RunOptions::default()).await
    }

    pub async fn run_with(
        &self,
        session: &SessionId,
        input: &str,
        options: RunOptions,
    ) -> Result<TaskOutcome, AgentError> {
        let task_id = options.task_id.unwrap_or_default();
        let cancel = options.cancel.unwrap_or_default();
        let guard = self.register(task_id, cancel.clone());
        self.execute(session, input, task_id, cancel, options.observers, guard)
            .await
    }

    /// Start a task in the background and stream its events.
    ///
    /// The task is cancellable through [`AgentRuntime::cancel`] as soon as
    /// this returns.
    pub fn start(self: &Arc<Self>, session: SessionId, input: String) -> StartedTask {
        self.start_with(session, input, RunOptions::default())
    }

    /// [`AgentRuntime::start`] with a caller-chosen task id, token and
    /// extra observers.
    ///
    /// The task lives on its own tokio task: dropping the [`StartedTask`]
    /// (or its receiver) detaches from it without stopping it.
    pub fn start_with(
        self: &Arc<Self>,
        session: SessionId,
        input: String,
        options: RunOptions,
    ) -> StartedTask {
        let task_id = options.task_id.unwrap_or_default();
        let cancel = options.cancel.unwrap_or_default();
        let guard = self.register(task_id, cancel.clone());
        let (tx, events) = mpsc::channel(128);
        let mut observers = options.observers;
        observers.push(tx);

        let runtime = Arc::clone(self);
        let handle = tokio::spawn(async move {
            runtime
                .execute(&session, &input, task_id, cancel, observers, guard)
                .await
        });

        StartedTask {
            task_id,
            events,
            handle,
        }
    }

    /// Cancel a running task. Returns `false` if no such task is running.
    pub fn cancel(&self, task_id: &TaskId) -> bool {
        let running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        match running.get(task_id) {
            Some(token) => {
                info!(task = %task_id, "Cancelling task");
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn running_tasks(&self) -> Vec<TaskId> {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .copied()
            .collect()
    }

    /// The conversation of `session`; empty for unknown sessions.
    pub async fn history(&self, session: &SessionId) -> Result<Vec<ConversationTurn>, MemoryError> {
        match self.sessions.get(session).await {
            Some(memory) => memory.history().await,
            None => Ok(Vec::new()),
        }
    }

    /// Forget a session and its conversation.
    pub async fn end_session(&self, session: &SessionId) -> bool {
        self.sessions.remove(session).await
    }

    /// Live events of every task run in `session` from now on.
    pub fn subscribe(&self, session: &SessionId) -> broadcast::Receiver<TaskEvent> {
        self.hub.subscribe(session)
    }

    /// Drop live-event channels of sessions nobody watches.
    pub fn prune_observers(&self) -> usize {
        self.hub.prune()
    }

    pub fn catalogue(&self) -> Vec<ToolDescription> {
        self.tools.describe()
    }

    fn register(&self, task_id: TaskId, cancel: CancellationToken) -> RunningGuard {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(task_id, cancel);
        RunningGuard {
            task_id,
            running: Arc::clone(&self.running),
        }
    }

    async fn execute(
        &self,
        session: &SessionId,
        input: &str,
        task_id: TaskId,
        cancel: CancellationToken,
        observers: Vec<mpsc::Sender<TaskEvent>>,
        _guard: RunningGuard,
    ) -> Result<TaskOutcome, AgentError> {
        // A cancel during setup still ends in a Cancelled outcome: the loop
        // checks the token before its first model call.
        let tools = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(task = %task_id, "Cancelled while acquiring tools");
                TaskTools::new(ToolRegistry::new())
            }
            acquired = self.tools.acquire() => acquired?,
        };
        let memory = self.sessions.get_or_create(session).await;
        debug!(task = %task_id, session = %session, "Tools acquired");

        let mut emitter = StepEmitter::new(task_id, session.clone()).with_broadcast(self.hub.sender(session));
        if self.log_steps {
            emitter = emitter.with_logging();
        }
        for observer in observers {
            emitter = emitter.with_observer(observer);
        }

        let ctx = TaskContext::with_id(task_id, session.clone(), input, tools, memory)
            .with_cancel(cancel)
            .with_emitter(|_| emitter);

        Ok(self.engine.run(ctx).await)
    }
}
