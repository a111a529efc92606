//! `opsclaw onboard`: First-time setup wizard.

use opsclaw_config::AppConfig;

const CREDENTIALS_TEMPLATE: &str = concat!(
    "\n",
    "# Toolkit credentials. Each parameter can instead come from the\n",
    "# environment as OPSCLAW_<CREDENTIAL>_<PARAM>, e.g. OPSCLAW_FRESHDESK_FRESHDESK_API_KEY.\n",
    "#\n",
    "# [credentials.freshdesk]\n",
    "# freshdeskApiKey = \"...\"\n",
    "# helpdeskDomainName = \"yourcompany\"\n",
    "#\n",
    "# [credentials.aws]\n",
    "# awsKey = \"AKIA...\"\n",
    "# awsSecret = \"...\"\n",
);

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("🦀 OpsClaw — First-Time Setup");
    println!("=============================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
        return Ok(());
    }

    let mut contents = AppConfig::default_toml();
    contents.push_str(CREDENTIALS_TEMPLATE);
    std::fs::write(&config_path, &contents)?;
    println!("✅ Created config.toml at: {}", config_path.display());

    println!("\n📝 Next steps:");
    println!("   1. Add your model API key (or set OPENROUTER_API_KEY)");
    println!("   2. Fill in [credentials.freshdesk] and/or [credentials.aws]");
    println!("   3. Run: opsclaw run --toolkit freshdesk -m \"list all tickets\"\n");

    Ok(())
}
