//! Security module for OpsClaw: credentials and secret hygiene.
//!
//! Provides:
//! - **Credentials**: resolvers backed by the config file and the environment
//! - **Redaction**: scrubbing resolved secrets out of tool observations

pub mod credentials;
pub mod redact;

pub use credentials::{ChainCredentialResolver, ConfigCredentialResolver, EnvCredentialResolver};
pub use redact::Redactor;
