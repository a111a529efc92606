//! Where a task gets its tools from.
//!
//! Toolkits need credentials, and credentials are resolved once per task,
//! so the agent asks a [`ToolSource`] for a fresh [`TaskTools`] at the
//! start of every task.

use async_trait::async_trait;
use opsclaw_config::ToolkitsConfig;
use opsclaw_core::credential::CredentialResolver;
use opsclaw_core::error::RegistryError;
use opsclaw_core::tool::{ToolDescription, ToolRegistry};
use opsclaw_security::Redactor;
use opsclaw_tools::{Toolkit, ToolkitError};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ToolSourceError {
    #[error("Toolkit setup failed: {0}")]
    Toolkit(#[from] ToolkitError),

    #[error("Toolkits conflict: {0}")]
    Registry(#[from] RegistryError),
}

/// The tools of one task and the redactor for what they return.
#[derive(Debug, Clone, Default)]
pub struct TaskTools {
    pub registry: Arc<ToolRegistry>,
    pub redactor: Redactor,
}

impl TaskTools {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            redactor: Redactor::default(),
        }
    }

    pub fn with_redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = redactor;
        self
    }
}

#[async_trait]
pub trait ToolSource: Send + Sync {
    /// The catalogue, without resolving credentials.
    fn describe(&self) -> Vec<ToolDescription>;

    /// Tools ready for one task.
    async fn acquire(&self) -> Result<TaskTools, ToolSourceError>;
}

/// A fixed set of tools shared by every task.
pub struct StaticTools {
    tools: TaskTools,
}

impl StaticTools {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            tools: TaskTools::new(registry),
        }
    }

    pub fn with_redactor(mut self, redactor: Redactor) -> Self {
        self.tools.redactor = redactor;
        self
    }
}

#[async_trait]
impl ToolSource for StaticTools {
    fn describe(&self) -> Vec<ToolDescription> {
        self.tools.registry.describe_all()
    }

    async fn acquire(&self) -> Result<TaskTools, ToolSourceError> {
        Ok(self.tools.clone())
    }
}

/// Builds the configured toolkits from freshly resolved credentials.
pub struct ToolkitSource {
    toolkits: Vec<Toolkit>,
    config: ToolkitsConfig,
    resolver: Arc<dyn CredentialResolver>,
}

impl ToolkitSource {
    pub fn new(
        toolkits: Vec<Toolkit>,
        config: ToolkitsConfig,
        resolver: Arc<dyn CredentialResolver>,
    ) -> Self {
        Self {
            toolkits,
            config,
            resolver,
        }
    }

    pub fn toolkits(&self) -> &[Toolkit] {
        &self.toolkits
    }
}

#[async_trait]
impl ToolSource for ToolkitSource {
    fn describe(&self) -> Vec<ToolDescription> {
        self.toolkits.iter().flat_map(|t| t.describe()).collect()
    }

    async fn acquire(&self) -> Result<TaskTools, ToolSourceError> {
        let mut registry = ToolRegistry::new();
        let mut credentials = Vec::with_capacity(self.toolkits.len());

        for toolkit in &self.toolkits {
            let built = opsclaw_tools::build(*toolkit, &self.config, self.resolver.as_ref()).await?;
            registry.extend(built.registry)?;
            credentials.push(built.credentials);
        }

        Ok(TaskTools::new(registry).with_redactor(Redactor::from_credentials(&credentials)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsclaw_core::credential::Credentials;
    use opsclaw_core::error::CredentialError;

    struct OneCredential(Credentials);

    #[async_trait]
    impl CredentialResolver for OneCredential {
        async fn resolve(&self, name: &str) -> Result<Credentials, CredentialError> {
            if name == self.0.name() {
                Ok(self.0.clone())
            } else {
                Err(CredentialError::NotFound(name.to_string()))
            }
        }
    }

    fn freshdesk_source() -> ToolkitSource {
        let creds = Credentials::new("freshdesk")
            .with("freshdeskApiKey", "fd-secret-key")
            .with("helpdeskDomainName", "acme");
        ToolkitSource::new(
            vec![Toolkit::Freshdesk],
            ToolkitsConfig::default(),
            Arc::new(OneCredential(creds)),
        )
    }

    #[tokio::test]
    async fn toolkit_source_builds_tools_and_redactor() {
        let source = freshdesk_source();
        assert_eq!(source.describe().len(), 13);

        let tools = source.acquire().await.unwrap();
        assert!(tools.registry.resolve("view-ticket").is_ok());
        assert_eq!(tools.redactor.redact("key=fd-secret-key"), "key=[REDACTED]");
    }

    #[tokio::test]
    async fn missing_credentials_fail_acquire() {
        let source = ToolkitSource::new(
            vec![Toolkit::Freshdesk, Toolkit::S3],
            ToolkitsConfig::default(),
            Arc::new(OneCredential(Credentials::new("other"))),
        );
        assert!(matches!(
            source.acquire().await,
            Err(ToolSourceError::Toolkit(ToolkitError::Credential(_)))
        ));
    }
}
