//! Credential lookup: secrets for the external services tools talk to.
//!
//! A credential is a named bag of parameters (`freshdesk` →
//! `freshdeskApiKey`, `helpdeskDomainName`). Toolkits are configured from
//! a resolved credential once per task; nothing caches it across sessions.

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::error::CredentialError;

/// The resolved parameters of one credential.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    name: String,
    params: BTreeMap<String, String>,
}

impl Credentials {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with(mut self, param: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(param, value);
        self
    }

    pub fn insert(&mut self, param: impl Into<String>, value: impl Into<String>) {
        self.params.insert(param.into(), value.into());
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// A required parameter; missing or empty values are an error.
    pub fn get(&self, param: &str) -> Result<&str, CredentialError> {
        match self.params.get(param) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(CredentialError::MissingParam {
                credential: self.name.clone(),
                param: param.to_string(),
            }),
        }
    }

    pub fn optional(&self, param: &str) -> Option<&str> {
        self.params.get(param).map(String::as_str).filter(|v| !v.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Every secret value, for redaction.
    pub fn secret_values(&self) -> impl Iterator<Item = &str> {
        self.params.values().map(String::as_str)
    }

    /// Fill in parameters this set lacks from `other`.
    pub fn merge_missing(&mut self, other: Credentials) {
        for (param, value) in other.params {
            self.params.entry(param).or_insert(value);
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("name", &self.name)
            .field("params", &self.params.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Looks up credentials by name.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// Resolve every known parameter of `credential_name`.
    ///
    /// Returns [`CredentialError::NotFound`] when the resolver knows
    /// nothing about the credential.
    async fn resolve(&self, credential_name: &str) -> Result<Credentials, CredentialError>;
}
