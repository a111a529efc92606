//! Credential resolvers.
//!
//! - [`ConfigCredentialResolver`] reads `[credentials.<name>]` tables
//! - [`EnvCredentialResolver`] reads `OPSCLAW_<NAME>_<PARAM>` variables
//! - [`ChainCredentialResolver`] merges several, earlier resolvers winning

use async_trait::async_trait;
use opsclaw_core::credential::{CredentialResolver, Credentials};
use opsclaw_core::error::CredentialError;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Serves credentials defined inline in the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigCredentialResolver {
    credentials: HashMap<String, Credentials>,
}

impl ConfigCredentialResolver {
    pub fn from_config(config: &opsclaw_config::AppConfig) -> Self {
        Self::from_credentials(
            config
                .credentials
                .keys()
                .filter_map(|name| config.credential(name)),
        )
    }

    pub fn from_credentials(credentials: impl IntoIterator<Item = Credentials>) -> Self {
        Self {
            credentials: credentials
                .into_iter()
                .map(|c| (c.name().to_string(), c))
                .collect(),
        }
    }
}

#[async_trait]
impl CredentialResolver for ConfigCredentialResolver {
    async fn resolve(&self, credential_name: &str) -> Result<Credentials, CredentialError> {
        self.credentials
            .get(credential_name)
            .cloned()
            .ok_or_else(|| CredentialError::NotFound(credential_name.to_string()))
    }
}

/// Serves credentials from environment variables.
///
/// Parameter `helpdeskDomainName` of credential `freshdesk` is read from
/// `OPSCLAW_FRESHDESK_HELPDESK_DOMAIN_NAME`.
#[derive(Debug, Clone, Default)]
pub struct EnvCredentialResolver {
    vars: Option<Vec<(String, String)>>,
}

impl EnvCredentialResolver {
    /// Reads the process environment at resolve time.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a fixed set of variables instead of the process environment.
    pub fn from_vars<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect()),
        }
    }

    fn snapshot(&self) -> Vec<(String, String)> {
        match &self.vars {
            Some(vars) => vars.clone(),
            None => std::env::vars().collect(),
        }
    }
}

#[async_trait]
impl CredentialResolver for EnvCredentialResolver {
    async fn resolve(&self, credential_name: &str) -> Result<Credentials, CredentialError> {
        let prefix = format!("OPSCLAW_{}_", screaming_snake(credential_name));
        let mut credentials = Credentials::new(credential_name);

        for (key, value) in self.snapshot() {
            if let Some(param) = key.strip_prefix(&prefix) {
                credentials.insert(camel_case(param), value);
            }
        }

        if credentials.is_empty() {
            return Err(CredentialError::NotFound(credential_name.to_string()));
        }
        debug!(credential = credential_name, "Resolved credential from environment");
        Ok(credentials)
    }
}

/// Asks each resolver in turn; parameters found earlier take precedence.
#[derive(Clone, Default)]
pub struct ChainCredentialResolver {
    resolvers: Vec<Arc<dyn CredentialResolver>>,
}

impl ChainCredentialResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, resolver: Arc<dyn CredentialResolver>) -> Self {
        self.resolvers.push(resolver);
        self
    }

    /// Config file first, then the environment.
    pub fn from_config(config: &opsclaw_config::AppConfig) -> Self {
        Self::new()
            .with(Arc::new(ConfigCredentialResolver::from_config(config)))
            .with(Arc::new(EnvCredentialResolver::new()))
    }
}

#[async_trait]
impl CredentialResolver for ChainCredentialResolver {
    async fn resolve(&self, credential_name: &str) -> Result<Credentials, CredentialError> {
        let mut merged: Option<Credentials> = None;

        for resolver in &self.resolvers {
            match resolver.resolve(credential_name).await {
                Ok(found) => match merged.as_mut() {
                    Some(existing) => existing.merge_missing(found),
                    None => merged = Some(found),
                },
                Err(CredentialError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        merged.ok_or_else(|| CredentialError::NotFound(credential_name.to_string()))
    }
}

/// `helpdeskDomainName` → `HELPDESK_DOMAIN_NAME`.
fn screaming_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_uppercase() && i > 0 {
            out.push('_');
        }
        if ch == '-' {
            out.push('_');
        } else {
            out.extend(ch.to_uppercase());
        }
    }
    out
}

/// `HELPDESK_DOMAIN_NAME` → `helpdeskDomainName`.
fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (i, word) in name.split('_').filter(|w| !w.is_empty()).enumerate() {
        let lower = word.to_lowercase();
        if i == 0 {
            out.push_str(&lower);
        } else {
            let mut chars = lower.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(chars.as_str());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_conversions() {
        assert_eq!(screaming_snake("helpdeskDomainName"), "HELPDESK_DOMAIN_NAME");
        assert_eq!(screaming_snake("aws"), "AWS");
        assert_eq!(camel_case("FRESHDESK_API_KEY"), "freshdeskApiKey");
        assert_eq!(camel_case("AWS_SECRET"), "awsSecret");
    }

    #[tokio::test]
    async fn env_resolver_maps_variables_to_params() {
        let resolver = EnvCredentialResolver::from_vars([
            ("OPSCLAW_FRESHDESK_FRESHDESK_API_KEY", "fd-key"),
            ("OPSCLAW_FRESHDESK_HELPDESK_DOMAIN_NAME", "acme"),
            ("OPSCLAW_AWS_AWS_KEY", "unrelated"),
            ("PATH", "/usr/bin"),
        ]);
        let creds = resolver.resolve("freshdesk").await.unwrap();
        assert_eq!(creds.get("freshdeskApiKey").unwrap(), "fd-key");
        assert_eq!(creds.get("helpdeskDomainName").unwrap(), "acme");
        assert!(creds.optional("awsKey").is_none());
    }

    #[tokio::test]
    async fn env_resolver_not_found() {
        let resolver = EnvCredentialResolver::from_vars(Vec::<(String, String)>::new());
        assert!(matches!(
            resolver.resolve("aws").await,
            Err(CredentialError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn config_resolver_reads_inline_tables() {
        let mut config = opsclaw_config::AppConfig::default();
        config.credentials.insert(
            "aws".into(),
            [
                ("awsKey".to_string(), "AKIA".to_string()),
                ("awsSecret".to_string(), "shh".to_string()),
            ]
            .into(),
        );
        let resolver = ConfigCredentialResolver::from_config(&config);
        let creds = resolver.resolve("aws").await.unwrap();
        assert_eq!(creds.get("awsKey").unwrap(), "AKIA");
        assert!(resolver.resolve("freshdesk").await.is_err());
    }

    #[tokio::test]
    async fn chain_prefers_earlier_resolvers_and_fills_gaps() {
        let config = ConfigCredentialResolver::from_credentials([
            Credentials::new("aws").with("awsKey", "from-config")
        ]);
        let env = EnvCredentialResolver::from_vars([
            ("OPSCLAW_AWS_AWS_KEY", "from-env"),
            ("OPSCLAW_AWS_AWS_SECRET", "env-secret"),
        ]);
        let chain = ChainCredentialResolver::new()
            .with(Arc::new(config))
            .with(Arc::new(env));

        let creds = chain.resolve("aws").await.unwrap();
        assert_eq!(creds.get("awsKey").unwrap(), "from-config");
        assert_eq!(creds.get("awsSecret").unwrap(), "env-secret");
        assert!(matches!(
            chain.resolve("freshdesk").await,
            Err(CredentialError::NotFound(_))
        ));
    }
}
