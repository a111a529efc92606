pub mod chat;
pub mod console;
pub mod gateway;
pub mod onboard;
pub mod run;
pub mod tools;

use opsclaw_agent::{AgentRuntime, ToolkitSource};
use opsclaw_config::AppConfig;
use opsclaw_security::ChainCredentialResolver;
use opsclaw_tools::Toolkit;
use std::sync::Arc;

pub fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Check for API key early: give a clear error
    if !config.has_api_key() && config.default_provider != "ollama" {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    OPENROUTER_API_KEY = 'sk-or-v1-...'   (recommended)");
        eprintln!("    OPENAI_API_KEY     = 'sk-...'         (for OpenAI direct)");
        eprintln!("    OPSCLAW_API_KEY    = 'sk-...'         (generic)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    Ok(config)
}

/// Provider, toolkits and sessions wired from config.
pub fn build_runtime(
    config: &AppConfig,
    toolkits: Vec<Toolkit>,
    verbose: bool,
) -> Result<Arc<AgentRuntime>, Box<dyn std::error::Error>> {
    let provider = opsclaw_providers::router::build_from_config(config)
        .default()
        .ok_or("No default provider configured")?;

    let resolver = Arc::new(ChainCredentialResolver::from_config(config));
    let tools = Arc::new(ToolkitSource::new(toolkits, config.toolkits.clone(), resolver));

    // The console observer already prints every step
    let runtime = AgentRuntime::from_config(config, provider, tools).with_step_logging(verbose);
    Ok(Arc::new(runtime))
}
