//! HTTP API v1: sessions, tasks and their live steps.
//!
//! Endpoints:
//!
//! - `GET  /v1/tools`                   - Tool catalogue, in prompt order
//! - `POST /v1/sessions/{id}/tasks`     - Run a task, get its outcome
//! - `GET  /v1/sessions/{id}/history`   - Conversation of a session
//! - `GET  /v1/sessions/{id}/events`    - SSE stream of the session's steps
//! - `GET  /v1/sessions/{id}/ws`        - WebSocket: start tasks, stream steps
//! - `POST /v1/tasks/{task_id}/cancel`  - Cancel a running task

use axum::{
    Router,
    extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    response::{IntoResponse, Json},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use opsclaw_agent::{AgentError, AgentRuntime, RunOptions, TaskEvent, TaskOutcome};
use opsclaw_core::memory::ConversationTurn;
use opsclaw_core::session::{SessionId, TaskId};

// ── State ─────────────────────────────────────────────────────────────────

/// Shared state for the v1 API.
pub struct ApiV1State {
    pub runtime: Arc<AgentRuntime>,
    /// Accepted bearer tokens. Empty = no authentication.
    pub bearer_tokens: Vec<String>,
}

pub type SharedApiState = Arc<ApiV1State>;

// ── Router ────────────────────────────────────────────────────────────────

/// Build the v1 API router. Nest this under "/v1" in the main router.
pub fn v1_router(state: SharedApiState) -> Router {
    Router::new()
        .route("/tools", get(list_tools_handler))
        .route("/sessions/{id}/tasks", post(run_task_handler))
        .route("/sessions/{id}/history", get(history_handler))
        .route("/sessions/{id}/events", get(events_handler))
        .route("/sessions/{id}/ws", get(ws_handler))
        .route("/tasks/{task_id}/cancel", post(cancel_handler))
        .with_state(state)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Deserialize)]
struct TaskRequest {
    input: String,
    /// Lets the caller cancel the task before the outcome arrives.
    #[serde(default)]
    task_id: Option<TaskId>,
}

#[derive(Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize, Deserialize)]
struct ToolDto {
    name: String,
    description: String,
}

#[derive(Serialize, Deserialize)]
struct ToolListResponse {
    tools: Vec<ToolDto>,
    count: usize,
}

#[derive(Serialize, Deserialize)]
struct HistoryResponse {
    session_id: SessionId,
    turns: Vec<ConversationTurn>,
}

#[derive(Serialize, Deserialize)]
struct CancelResponse {
    task_id: TaskId,
    cancelled: bool,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

fn agent_error(e: AgentError) -> ApiError {
    match e {
        AgentError::Tools(e) => api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
        AgentError::Memory(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn list_tools_handler(State(state): State<SharedApiState>) -> Json<ToolListResponse> {
    let tools: Vec<ToolDto> = state
        .runtime
        .catalogue()
        .into_iter()
        .map(|d| ToolDto {
            name: d.name,
            description: d.description,
        })
        .collect();

    Json(ToolListResponse {
        count: tools.len(),
        tools,
    })
}

/// `POST /v1/sessions/{id}/tasks`: run one task and wait for its outcome.
///
/// A failed task is still `200 OK`; the outcome says how it failed. Only
/// tasks that could not start at all get an error status.
async fn run_task_handler(
    State(state): State<SharedApiState>,
    Path(session): Path<String>,
    Json(payload): Json<TaskRequest>,
) -> Result<Json<TaskOutcome>, ApiError> {
    if payload.input.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "input must not be empty"));
    }

    let session = SessionId::from(session);
    info!(session = %session, input_len = payload.input.len(), "v1 task request");

    let options = RunOptions {
        task_id: payload.task_id,
        ..Default::default()
    };
    // The task runs on its own tokio task, so a client that hangs up only
    // loses the response: the task still finishes, emits and remembers.
    let started = state.runtime.start_with(session, payload.input, options);
    let outcome = started
        .handle
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("task aborted: {e}")))?
        .map_err(agent_error)?;

    Ok(Json(outcome))
}

async fn history_handler(
    State(state): State<SharedApiState>,
    Path(session): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let session = SessionId::from(session);
    let turns = state
        .runtime
        .history(&session)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(HistoryResponse {
        session_id: session,
        turns,
    }))
}

/// `GET /v1/sessions/{id}/events`: SSE stream of every step of every task
/// run in the session while the client is connected.
async fn events_handler(
    State(state): State<SharedApiState>,
    Path(session): Path<String>,
) -> Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>> {
    let session = SessionId::from(session);
    info!(session = %session, "SSE observer attached");

    let stream = BroadcastStream::new(state.runtime.subscribe(&session))
        .filter_map(|result| match result {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(error = %e, "SSE observer lagged, steps dropped");
                None
            }
        })
        .map(|event: TaskEvent| {
            let data = serde_json::to_string(&event).unwrap_or_default();
            Ok(SseEvent::default().event(event.step.event_type()).data(data))
        });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn cancel_handler(
    State(state): State<SharedApiState>,
    Path(task_id): Path<String>,
) -> Result<(StatusCode, Json<CancelResponse>), ApiError> {
    let task_id: TaskId = task_id
        .parse()
        .map_err(|_| api_error(StatusCode::BAD_REQUEST, format!("invalid task id: {task_id}")))?;

    if state.runtime.cancel(&task_id) {
        Ok((
            StatusCode::ACCEPTED,
            Json(CancelResponse {
                task_id,
                cancelled: true,
            }),
        ))
    } else {
        Err(api_error(StatusCode::NOT_FOUND, format!("no running task {task_id}")))
    }
}

// ── WebSocket ─────────────────────────────────────────────────────────────

/// `GET /v1/sessions/{id}/ws`: bidirectional task channel for one session.
///
/// Protocol:
/// - Client → Server: `{"type": "task", "input": "..."}` or `{"type": "cancel"}`
/// - Server → Client: one frame per step (the `TaskEvent` JSON), then
///   `{"type": "outcome", ...}` when the task ends; `{"type": "rejected",
///   "message": ...}` for frames the server cannot act on
///
/// Closing the socket detaches from a running task; only a `cancel` frame
/// or `POST /v1/tasks/{task_id}/cancel` stops it.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedApiState>,
    Path(session): Path<String>,
) -> impl IntoResponse {
    let session = SessionId::from(session);
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state, session))
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsClientMessage {
    Task { input: String },
    Cancel,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsServerFrame<'a> {
    Outcome(&'a TaskOutcome),
    Rejected { message: String },
}

async fn send_frame(socket: &mut WebSocket, frame: &impl Serialize) -> bool {
    let json = serde_json::to_string(frame).unwrap_or_default();
    socket.send(WsMessage::Text(json.into())).await.is_ok()
}

async fn reject(socket: &mut WebSocket, message: String) -> bool {
    send_frame(socket, &WsServerFrame::Rejected { message }).await
}

async fn handle_ws_connection(mut socket: WebSocket, state: SharedApiState, session: SessionId) {
    info!(session = %session, "WebSocket connection established");

    while let Some(msg) = socket.recv().await {
        let text = match msg {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue, // ignore binary, ping, pong
            Err(_) => break,
        };

        let input = match serde_json::from_str::<WsClientMessage>(&text) {
            Ok(WsClientMessage::Task { input }) => input,
            Ok(WsClientMessage::Cancel) => {
                if !reject(&mut socket, "no task is running".into()).await {
                    return;
                }
                continue;
            }
            Err(e) => {
                if !reject(&mut socket, format!("Invalid message: {e}")).await {
                    return;
                }
                continue;
            }
        };

        let mut task = state.runtime.start(session.clone(), input);
        loop {
            tokio::select! {
                event = task.events.recv() => match event {
                    Some(event) => {
                        if !send_frame(&mut socket, &event).await {
                            info!(task = %task.task_id, "WebSocket gone, task continues detached");
                            return;
                        }
                    }
                    None => break,
                },
                msg = socket.recv() => match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        if matches!(serde_json::from_str::<WsClientMessage>(&text), Ok(WsClientMessage::Cancel)) {
                            state.runtime.cancel(&task.task_id);
                        } else if !reject(&mut socket, "a task is already running".into()).await {
                            info!(task = %task.task_id, "WebSocket gone, task continues detached");
                            return;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => {
                        info!(task = %task.task_id, "WebSocket closed, task continues detached");
                        return;
                    }
                    Some(Ok(_)) => {}
                },
            }
        }

        let sent = match task.handle.await {
            Ok(Ok(outcome)) => send_frame(&mut socket, &WsServerFrame::Outcome(&outcome)).await,
            Ok(Err(e)) => reject(&mut socket, e.to_string()).await,
            Err(e) => reject(&mut socket, format!("task aborted: {e}")).await,
        };
        if !sent {
            return;
        }
    }

    info!(session = %session, "WebSocket connection closed");
}
