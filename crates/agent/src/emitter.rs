//! Step emitter: delivers step events to observers without ever waiting
//! on them.
//!
//! Observers attach in two ways:
//! - a bounded `mpsc` queue per observer (`try_send`; a full queue drops
//!   the event for that observer only)
//! - a per-session `broadcast` channel from the [`SessionHub`], used for
//!   live clients that subscribe by session id
//!
//! The emitter can also write every step to the process log via `tracing`.

use opsclaw_core::event::StepEvent;
use opsclaw_core::session::{SessionId, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// A step event tagged with the task that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub task_id: TaskId,
    pub session_id: SessionId,
    #[serde(flatten)]
    pub step: StepEvent,
}

enum Sink {
    Queue(mpsc::Sender<TaskEvent>),
    Broadcast(broadcast::Sender<TaskEvent>),
}

/// Fans out the events of one task.
pub struct StepEmitter {
    task_id: TaskId,
    session_id: SessionId,
    sinks: Vec<Sink>,
    log: bool,
}

impl StepEmitter {
    pub fn new(task_id: TaskId, session_id: SessionId) -> Self {
        Self {
            task_id,
            session_id,
            sinks: Vec::new(),
            log: false,
        }
    }

    /// Also write every step to the process log.
    pub fn with_logging(mut self) -> Self {
        self.log = true;
        self
    }

    pub fn with_observer(mut self, observer: mpsc::Sender<TaskEvent>) -> Self {
        self.sinks.push(Sink::Queue(observer));
        self
    }

    /// Attach a new bounded queue and return its receiving end.
    pub fn subscribe(&mut self, capacity: usize) -> mpsc::Receiver<TaskEvent> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.sinks.push(Sink::Queue(tx));
        rx
    }

    pub fn with_broadcast(mut self, sender: broadcast::Sender<TaskEvent>) -> Self {
        self.sinks.push(Sink::Broadcast(sender));
        self
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn observer_count(&self) -> usize {
        self.sinks.len()
    }

    /// Deliver `step` to every observer. Never blocks, never fails.
    pub fn emit(&self, step: &StepEvent) {
        if self.log {
            self.log_step(step);
        }
        if self.sinks.is_empty() {
            return;
        }

        let event = TaskEvent {
            task_id: self.task_id,
            session_id: self.session_id.clone(),
            step: step.clone(),
        };
        for sink in &self.sinks {
            match sink {
                Sink::Queue(tx) => match tx.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(task = %self.task_id, event = step.event_type(), "Observer queue full, dropping step event");
                    }
                    // The observer went away; nothing to deliver to
                    Err(mpsc::error::TrySendError::Closed(_)) => {}
                },
                Sink::Broadcast(tx) => {
                    // Err only means nobody is subscribed right now
                    let _ = tx.send(event.clone());
                }
            }
        }
    }

    fn log_step(&self, step: &StepEvent) {
        let task = &self.task_id;
        match step {
            StepEvent::Thought { text } => debug!(%task, thought = %text, "Thought"),
            StepEvent::Action { tool, input } => debug!(%task, %tool, %input, "Action"),
            StepEvent::Observation {
                text,
                is_error: true,
                error_kind,
            } => {
                let kind = error_kind.map(|k| k.as_str()).unwrap_or("parse");
                warn!(%task, kind, observation = %text, "Recoverable failure");
            }
            StepEvent::Observation { text, .. } => {
                debug!(%task, chars = text.len(), "Observation")
            }
            StepEvent::FinalAnswer { text } => {
                info!(%task, chars = text.len(), "Final answer")
            }
            StepEvent::Error { kind, message } => {
                warn!(%task, %kind, %message, "Task failed")
            }
        }
    }
}

/// Per-session broadcast channels for live observers.
///
/// Subscribing does not require a running task; a client may attach to a
/// session first and then see the events of every task started in it.
pub struct SessionHub {
    channels: Mutex<HashMap<SessionId, broadcast::Sender<TaskEvent>>>,
    capacity: usize,
}

impl SessionHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// The sending side for `session`, created on first use.
    pub fn sender(&self, session: &SessionId) -> broadcast::Sender<TaskEvent> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels
            .entry(session.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    pub fn subscribe(&self, session: &SessionId) -> broadcast::Receiver<TaskEvent> {
        self.sender(session).subscribe()
    }

    /// Drop channels nobody listens to. A task still running in such a
    /// session keeps its own sender, so its events are simply not seen.
    pub fn prune(&self) -> usize {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        let before = channels.len();
        channels.retain(|_, tx| tx.receiver_count() > 0);
        before - channels.len()
    }

    pub fn len(&self) -> usize {
        self.channels.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionHub {
    fn default() -> Self {
        Self::new(256)
    }
}
