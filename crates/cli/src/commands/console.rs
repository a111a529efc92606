//! Console observer: prints a task's steps to stderr as they happen.

use opsclaw_agent::{AgentError, AgentRuntime, RunOptions, TaskEvent, TaskOutcome};
use opsclaw_core::event::StepEvent;
use opsclaw_core::session::SessionId;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One display line for a step.
pub fn format_step(step: &StepEvent) -> Option<String> {
    match step {
        StepEvent::Thought { text } if text.is_empty() => None,
        StepEvent::Thought { text } => Some(format!("  💭 {text}")),
        StepEvent::Action { tool, input } if input.is_empty() => Some(format!("  🔧 {tool}")),
        StepEvent::Action { tool, input } => Some(format!("  🔧 {tool} ← {input}")),
        StepEvent::Observation {
            text,
            is_error: true,
            ..
        } => Some(format!("  ⚠️  {}", first_line(text))),
        StepEvent::Observation { text, .. } => Some(format!("  👀 {}", first_line(text))),
        // The caller prints the answer itself
        StepEvent::FinalAnswer { .. } => None,
        StepEvent::Error { kind, message } => Some(format!("  ❌ {kind}: {message}")),
    }
}

fn first_line(text: &str) -> String {
    let mut lines = text.lines();
    let first = lines.next().unwrap_or_default();
    match lines.count() {
        0 => first.to_string(),
        more => format!("{first} … (+{more} lines)"),
    }
}

/// Run one task with the console observer attached.
///
/// Ctrl+C cancels the task instead of killing the process.
pub async fn run_task(
    runtime: &AgentRuntime,
    session: &SessionId,
    input: &str,
) -> Result<TaskOutcome, AgentError> {
    let (tx, mut rx) = mpsc::channel::<TaskEvent>(128);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Some(line) = format_step(&event.step) {
                eprintln!("{line}");
            }
        }
    });

    let cancel = CancellationToken::new();
    let options = RunOptions::default().with_observer(tx).with_cancel(cancel.clone());
    let task = runtime.run_with(session, input, options);
    tokio::pin!(task);

    let outcome = tokio::select! {
        outcome = &mut task => outcome,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("  ⏹  Cancelling…");
            cancel.cancel();
            task.await
        }
    };

    // The sender is gone with the task, so the printer drains and stops
    let _ = printer.await;
    outcome
}

/// Print the outcome; the answer goes to stdout, everything else to stderr.
pub fn report(outcome: &TaskOutcome) {
    match (&outcome.final_answer, outcome.failure) {
        (Some(answer), None) => println!("{answer}"),
        (Some(partial), Some(kind)) => {
            eprintln!("  Task ended early ({kind}); best effort so far:");
            println!("{partial}");
        }
        (None, Some(kind)) => {
            let message = outcome.error_message().unwrap_or("no details");
            eprintln!("  Task failed ({kind}): {message}");
        }
        (None, None) => {}
    }
}
