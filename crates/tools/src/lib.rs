//! Toolkits for OpsClaw.
//!
//! A toolkit is a family of tools sharing one external service and one
//! credential:
//! - `freshdesk`: helpdesk tickets, conversations, notes and watchers
//! - `s3`: buckets and objects (the AWS implementation needs the `s3` feature)
//!
//! Toolkits are built per task from freshly resolved credentials.

pub mod freshdesk;
pub mod input;
pub mod render;
pub mod s3;

use opsclaw_config::ToolkitsConfig;
use opsclaw_core::credential::{CredentialResolver, Credentials};
use opsclaw_core::error::{CredentialError, RegistryError};
use opsclaw_core::tool::{ToolDescription, ToolRegistry};
use std::sync::Arc;
use tracing::debug;

pub use freshdesk::{FreshdeskClient, FreshdeskOp, FreshdeskTool};
pub use s3::{ObjectStorage, S3Op, S3Tool};

#[cfg(feature = "s3")]
pub use s3::AwsObjectStorage;

#[derive(Debug, thiserror::Error)]
pub enum ToolkitError {
    #[error("Unknown toolkit '{0}', expected one of: freshdesk, s3")]
    Unknown(String),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Toolkit '{0}' was not compiled in (enable the '{0}' feature)")]
    FeatureDisabled(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Toolkit {
    Freshdesk,
    S3,
}

impl Toolkit {
    pub const ALL: [Toolkit; 2] = [Toolkit::Freshdesk, Toolkit::S3];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Freshdesk => "freshdesk",
            Self::S3 => "s3",
        }
    }

    /// Name of the credential this toolkit needs, per configuration.
    pub fn credential_name<'a>(&self, config: &'a ToolkitsConfig) -> &'a str {
        match self {
            Self::Freshdesk => &config.freshdesk.credential,
            Self::S3 => &config.s3.credential,
        }
    }

    /// The tool catalogue, without connecting to anything.
    pub fn describe(&self) -> Vec<ToolDescription> {
        match self {
            Self::Freshdesk => FreshdeskOp::ALL
                .iter()
                .map(|op| ToolDescription {
                    name: op.name().into(),
                    description: op.description().into(),
                })
                .collect(),
            Self::S3 => S3Op::ALL
                .iter()
                .map(|op| ToolDescription {
                    name: op.name().into(),
                    description: op.description().into(),
                })
                .collect(),
        }
    }
}

impl std::fmt::Display for Toolkit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Toolkit {
    type Err = ToolkitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "freshdesk" => Ok(Self::Freshdesk),
            "s3" | "aws" => Ok(Self::S3),
            other => Err(ToolkitError::Unknown(other.to_string())),
        }
    }
}

/// A toolkit's registry together with the credentials it was built from.
///
/// The credentials are kept so the caller can redact their values from
/// anything the tools return.
#[derive(Debug)]
pub struct BuiltToolkit {
    pub registry: ToolRegistry,
    pub credentials: Credentials,
}

/// Resolve the toolkit's credential and build its tools.
pub async fn build(
    toolkit: Toolkit,
    config: &ToolkitsConfig,
    resolver: &dyn CredentialResolver,
) -> Result<BuiltToolkit, ToolkitError> {
    let credentials = resolver.resolve(toolkit.credential_name(config)).await?;
    debug!(%toolkit, credential = credentials.name(), "Building toolkit");

    let registry = match toolkit {
        Toolkit::Freshdesk => {
            let client = FreshdeskClient::from_credentials(&credentials)?;
            freshdesk::toolkit(Arc::new(client))?
        }
        Toolkit::S3 => s3_registry(&credentials, &config.s3.region).await?,
    };

    Ok(BuiltToolkit {
        registry,
        credentials,
    })
}

#[cfg(feature = "s3")]
async fn s3_registry(credentials: &Credentials, region: &str) -> Result<ToolRegistry, ToolkitError> {
    let storage = AwsObjectStorage::connect(credentials, region).await?;
    Ok(s3::toolkit(Arc::new(storage))?)
}

#[cfg(not(feature = "s3"))]
async fn s3_registry(_credentials: &Credentials, _region: &str) -> Result<ToolRegistry, ToolkitError> {
    Err(ToolkitError::FeatureDisabled("s3".into()))
}
