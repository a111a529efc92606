//! `opsclaw gateway`: Start the HTTP API server.

use opsclaw_config::AppConfig;
use opsclaw_tools::Toolkit;

pub async fn run(
    port_override: Option<u16>,
    toolkits: Vec<Toolkit>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    let names: Vec<&str> = toolkits.iter().map(|t| t.as_str()).collect();
    println!("🦀 OpsClaw Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Toolkits:  {}", if names.is_empty() { "none".to_string() } else { names.join(", ") });
    println!("   Auth:      {}", if config.gateway.bearer_tokens.is_empty() { "off" } else { "bearer token" });

    opsclaw_gateway::start(config, toolkits).await?;

    Ok(())
}
