//! `opsclaw chat`: Interactive session; every line is one task.

use opsclaw_core::session::SessionId;
use opsclaw_tools::Toolkit;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::console;

pub async fn run(
    session: Option<String>,
    toolkits: Vec<Toolkit>,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let names: Vec<&str> = toolkits.iter().map(|t| t.as_str()).collect();
    let runtime = super::build_runtime(&config, toolkits.clone(), verbose)?;
    let session = session.map(SessionId::from).unwrap_or_default();

    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║        OpsClaw Agent — Interactive Mode      ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Provider:  {}", config.default_provider);
    println!("  Model:     {}", config.default_model);
    println!("  Toolkits:  {}", names.join(", "));
    println!("  Session:   {session}");
    println!();
    println!("  Type your task and press Enter.");
    println!("  Ctrl+C cancels a running task; 'exit' quits.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input, "exit" | "quit") {
            break;
        }

        match console::run_task(&runtime, &session, input).await {
            Ok(outcome) => {
                println!();
                console::report(&outcome);
                println!();
            }
            // Credentials may be fixed between tasks, so keep the session
            Err(e) => eprintln!("  [Error] {e}"),
        }
    }

    println!();
    println!("  Goodbye! 👋");
    println!();

    Ok(())
}
