//! OpsClaw CLI: the main entry point.
//!
//! Commands:
//! - `onboard`  - Initialize config
//! - `run`      - Run one task against the chosen toolkits
//! - `chat`     - Interactive session, one task per line
//! - `gateway`  - Start the HTTP API server
//! - `tools`    - Show the tool catalogue of toolkits

use clap::{Parser, Subcommand};
use opsclaw_tools::Toolkit;

mod commands;

#[derive(Parser)]
#[command(
    name = "opsclaw",
    about = "OpsClaw — tool-using agent for helpdesk and cloud operations",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration
    Onboard,

    /// Run a single task and print the answer
    Run {
        /// Session to run in; its history is kept for the life of the process
        #[arg(short, long)]
        session: Option<String>,

        /// Toolkits the agent may use (freshdesk, s3)
        #[arg(short, long, required = true, value_delimiter = ',')]
        toolkit: Vec<Toolkit>,

        /// The task for the agent
        #[arg(short, long)]
        message: String,
    },

    /// Chat with the agent; every line is a task in the same session
    Chat {
        #[arg(short, long)]
        session: Option<String>,

        #[arg(short, long, required = true, value_delimiter = ',')]
        toolkit: Vec<Toolkit>,
    },

    /// Start the HTTP gateway server
    Gateway {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,

        /// Toolkits offered to every task
        #[arg(short, long, value_delimiter = ',')]
        toolkit: Vec<Toolkit>,
    },

    /// List the tools of the given toolkits (all when omitted)
    Tools {
        #[arg(short, long, value_delimiter = ',')]
        toolkit: Vec<Toolkit>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so answers on stdout stay pipeable
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Run {
            session,
            toolkit,
            message,
        } => commands::run::run(session, toolkit, message, cli.verbose).await?,
        Commands::Chat { session, toolkit } => {
            commands::chat::run(session, toolkit, cli.verbose).await?
        }
        Commands::Gateway { port, toolkit } => commands::gateway::run(port, toolkit).await?,
        Commands::Tools { toolkit } => commands::tools::run(toolkit),
    }

    Ok(())
}
