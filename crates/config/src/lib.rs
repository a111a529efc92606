//! Configuration loading, validation, and management for OpsClaw.
//!
//! Loads configuration from `~/.opsclaw/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use opsclaw_core::Credentials;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.opsclaw/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Sampling temperature for the reasoning model
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Max tokens per model completion
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Agent loop limits
    #[serde(default)]
    pub agent: AgentConfig,

    /// Conversation memory configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Which toolkits are available and which credentials they use
    #[serde(default)]
    pub toolkits: ToolkitsConfig,

    /// Inline credentials: `[credentials.<name>] <param> = "<value>"`
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub credentials: HashMap<String, BTreeMap<String, String>>,
}

fn default_provider() -> String {
    "openrouter".into()
}
fn default_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.0
}
fn default_max_tokens() -> u32 {
    1024
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let credential_names: Vec<_> = self.credentials.keys().collect();
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("agent", &self.agent)
            .field("memory", &self.memory)
            .field("gateway", &self.gateway)
            .field("providers", &self.providers)
            .field("toolkits", &self.toolkits)
            .field("credentials", &credential_names)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// Limits of one agent loop run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum action/observation cycles per task
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Time allowed for one model call; exceeding it fails the task
    #[serde(default = "default_model_timeout_ms")]
    pub model_timeout_ms: u64,

    /// Time allowed for one tool call; exceeding it becomes an observation
    #[serde(default = "default_tool_timeout_ms")]
    pub tool_timeout_ms: u64,

    /// Consecutive unparsable model outputs fed back for another try; one more fails the task
    #[serde(default = "default_parse_retry_limit")]
    pub parse_retry_limit: usize,

    /// Observations longer than this are truncated before the model sees them
    #[serde(default = "default_max_observation_chars")]
    pub max_observation_chars: usize,

    /// Replaces the built-in prompt prefix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_max_steps() -> usize {
    15
}
fn default_model_timeout_ms() -> u64 {
    60_000
}
fn default_tool_timeout_ms() -> u64 {
    30_000
}
fn default_parse_retry_limit() -> usize {
    3
}
fn default_max_observation_chars() -> usize {
    4000
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            model_timeout_ms: default_model_timeout_ms(),
            tool_timeout_ms: default_tool_timeout_ms(),
            parse_retry_limit: default_parse_retry_limit(),
            max_observation_chars: default_max_observation_chars(),
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Only the last `window` turns go into the prompt (all when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<usize>,

    /// Maximum number of live sessions; the least recently used is evicted
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

fn default_max_sessions() -> usize {
    1024
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            window: None,
            max_sessions: default_max_sessions(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Accepted bearer tokens for `/v1`. Empty = no auth.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bearer_tokens: Vec<String>,

    /// Per-session broadcast buffer for live observers
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_port() -> u16 {
    42618
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_event_buffer() -> usize {
    256
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            bearer_tokens: vec![],
            event_buffer: default_event_buffer(),
        }
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("port", &self.port)
            .field("host", &self.host)
            .field("bearer_tokens", &self.bearer_tokens.len())
            .field("event_buffer", &self.event_buffer)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolkitsConfig {
    #[serde(default)]
    pub freshdesk: FreshdeskToolkitConfig,

    #[serde(default)]
    pub s3: S3ToolkitConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreshdeskToolkitConfig {
    /// Name of the credential holding `freshdeskApiKey` and `helpdeskDomainName`
    #[serde(default = "default_freshdesk_credential")]
    pub credential: String,
}

fn default_freshdesk_credential() -> String {
    "freshdesk".into()
}

impl Default for FreshdeskToolkitConfig {
    fn default() -> Self {
        Self {
            credential: default_freshdesk_credential(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3ToolkitConfig {
    /// Name of the credential holding `awsKey` and `awsSecret`
    #[serde(default = "default_s3_credential")]
    pub credential: String,

    #[serde(default = "default_region")]
    pub region: String,
}

fn default_s3_credential() -> String {
    "aws".into()
}
fn default_region() -> String {
    "us-east-1".into()
}

impl Default for S3ToolkitConfig {
    fn default() -> Self {
        Self {
            credential: default_s3_credential(),
            region: default_region(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.opsclaw/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `OPSCLAW_API_KEY` (highest priority)
    /// - `OPENROUTER_API_KEY`
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("OPSCLAW_API_KEY") {
            self.api_key = Some(key);
        } else if self.api_key.is_none() {
            self.api_key = lookup("OPENROUTER_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(provider) = lookup("OPSCLAW_PROVIDER") {
            self.default_provider = provider;
        }

        if let Some(model) = lookup("OPSCLAW_MODEL") {
            self.default_model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".opsclaw")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_steps == 0 {
            return Err(ConfigError::ValidationError("agent.max_steps must be >= 1".into()));
        }

        if self.agent.model_timeout_ms == 0 || self.agent.tool_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "agent.model_timeout_ms and agent.tool_timeout_ms must be > 0".into(),
            ));
        }

        if self.agent.parse_retry_limit == 0 {
            return Err(ConfigError::ValidationError(
                "agent.parse_retry_limit must be >= 1".into(),
            ));
        }

        if self.agent.max_observation_chars == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_observation_chars must be > 0".into(),
            ));
        }

        if self.memory.max_sessions == 0 || self.memory.window == Some(0) {
            return Err(ConfigError::ValidationError(
                "memory.max_sessions and memory.window must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// The inline credential `name`, if the config file defines one.
    pub fn credential(&self, name: &str) -> Option<Credentials> {
        self.credentials.get(name).map(|params| {
            params
                .iter()
                .fold(Credentials::new(name), |creds, (k, v)| creds.with(k, v))
        })
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            agent: AgentConfig::default(),
            memory: MemoryConfig::default(),
            gateway: GatewayConfig::default(),
            providers: HashMap::new(),
            toolkits: ToolkitsConfig::default(),
            credentials: HashMap::new(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.default_provider, "openrouter");
        assert_eq!(config.agent.max_steps, 15);
        assert_eq!(config.agent.model_timeout_ms, 60_000);
        assert_eq!(config.agent.tool_timeout_ms, 30_000);
        assert_eq!(config.agent.parse_retry_limit, 3);
        assert_eq!(config.agent.max_observation_chars, 4000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_provider, config.default_provider);
        assert_eq!(parsed.gateway.port, config.gateway.port);
        assert_eq!(parsed.toolkits.s3.region, "us-east-1");
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            default_temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_step_budget_rejected() {
        let mut config = AppConfig::default();
        config.agent.max_steps = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_timeouts_rejected() {
        let mut config = AppConfig::default();
        config.agent.tool_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        let config = result.unwrap();
        assert_eq!(config.default_provider, "openrouter");
    }

    #[test]
    fn load_from_file_with_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
default_provider = "ollama"
default_model = "llama3"

[agent]
max_steps = 5
tool_timeout_ms = 1500

[memory]
window = 10

[gateway]
bearer_tokens = ["tok-1"]

[toolkits.s3]
region = "eu-west-1"

[credentials.freshdesk]
freshdeskApiKey = "fd-key"
helpdeskDomainName = "acme"
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.default_provider, "ollama");
        assert_eq!(config.agent.max_steps, 5);
        assert_eq!(config.agent.tool_timeout_ms, 1500);
        assert_eq!(config.agent.model_timeout_ms, 60_000);
        assert_eq!(config.memory.window, Some(10));
        assert_eq!(config.gateway.bearer_tokens, vec!["tok-1".to_string()]);
        assert_eq!(config.toolkits.s3.region, "eu-west-1");
        assert_eq!(config.toolkits.freshdesk.credential, "freshdesk");

        let creds = config.credential("freshdesk").unwrap();
        assert_eq!(creds.get("helpdeskDomainName").unwrap(), "acme");
        assert!(config.credential("aws").is_none());
    }

    #[test]
    fn invalid_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[agent\nmax_steps = ").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_overrides() {
        let env: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-openai"),
            ("OPSCLAW_MODEL", "gpt-4o"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.api_key.as_deref(), Some("sk-openai"));
        assert_eq!(config.default_model, "gpt-4o");
        assert_eq!(config.default_provider, "openrouter");
    }

    #[test]
    fn opsclaw_api_key_beats_file_key() {
        let mut config = AppConfig {
            api_key: Some("from-file".into()),
            ..AppConfig::default()
        };
        config.apply_env(|k| (k == "OPSCLAW_API_KEY").then(|| "from-env".to_string()));
        assert_eq!(config.api_key.as_deref(), Some("from-env"));

        config.apply_env(|k| (k == "OPENAI_API_KEY").then(|| "ignored".to_string()));
        assert_eq!(config.api_key.as_deref(), Some("from-env"));
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut config = AppConfig {
            api_key: Some("sk-very-secret".into()),
            ..AppConfig::default()
        };
        config.credentials.insert(
            "aws".into(),
            [("awsSecret".to_string(), "aws-very-secret".to_string())].into(),
        );
        config.gateway.bearer_tokens.push("bearer-very-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-very-secret"));
        assert!(!debug.contains("aws-very-secret"));
        assert!(!debug.contains("bearer-very-secret"));
        assert!(debug.contains("aws"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("openrouter"));
        assert!(toml_str.contains("max_steps = 15"));
        assert!(toml_str.contains("42618"));
    }
}
