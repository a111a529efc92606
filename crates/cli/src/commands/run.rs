//! `opsclaw run`: Run one task and print its answer.

use opsclaw_core::session::SessionId;
use opsclaw_tools::Toolkit;

use super::console;

pub async fn run(
    session: Option<String>,
    toolkits: Vec<Toolkit>,
    message: String,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let runtime = super::build_runtime(&config, toolkits, verbose)?;
    let session = session.map(SessionId::from).unwrap_or_default();

    let outcome = console::run_task(&runtime, &session, &message).await?;
    console::report(&outcome);

    match outcome.failure {
        None => Ok(()),
        Some(kind) => Err(format!("task {} failed: {kind}", outcome.task_id).into()),
    }
}
