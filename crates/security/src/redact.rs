//! Secret redaction for text that leaves a tool.
//!
//! Tools talk to services with real credentials, and a remote error
//! message may echo them back. Every observation passes through a
//! [`Redactor`] built from the credentials resolved for the task before
//! the model or any observer sees it.

use opsclaw_core::credential::Credentials;

const MASK: &str = "[REDACTED]";

/// Values shorter than this are not treated as secrets.
const MIN_SECRET_LEN: usize = 4;

/// Replaces known secret values with `[REDACTED]`.
#[derive(Clone, Default)]
pub struct Redactor {
    secrets: Vec<String>,
}

impl Redactor {
    pub fn new(secrets: impl IntoIterator<Item = String>) -> Self {
        let mut secrets: Vec<String> = secrets
            .into_iter()
            .filter(|s| s.len() >= MIN_SECRET_LEN)
            .collect();
        // Longest first, so a secret containing another is masked whole
        secrets.sort_by(|a, b| b.len().cmp(&a.len()));
        secrets.dedup();
        Self { secrets }
    }

    pub fn from_credentials<'a>(credentials: impl IntoIterator<Item = &'a Credentials>) -> Self {
        Self::new(
            credentials
                .into_iter()
                .flat_map(|c| c.secret_values().map(str::to_string).collect::<Vec<_>>()),
        )
    }

    /// Check if `output` contains any known secret.
    pub fn contains_secret(&self, output: &str) -> bool {
        self.secrets.iter().any(|s| output.contains(s.as_str()))
    }

    pub fn redact(&self, text: &str) -> String {
        if !self.contains_secret(text) {
            return text.to_string();
        }
        let mut out = text.to_string();
        for secret in &self.secrets {
            out = out.replace(secret.as_str(), MASK);
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

impl std::fmt::Debug for Redactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Redactor")
            .field("secret_count", &self.secrets.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_every_occurrence() {
        let redactor = Redactor::new(["sk-abc123".to_string()]);
        assert_eq!(
            redactor.redact("key sk-abc123 and again sk-abc123"),
            "key [REDACTED] and again [REDACTED]"
        );
    }

    #[test]
    fn no_false_positives() {
        let redactor = Redactor::new(["sk-abc123".to_string()]);
        let text = "No secrets here, just normal output";
        assert!(!redactor.contains_secret(text));
        assert_eq!(redactor.redact(text), text);
    }

    #[test]
    fn short_and_empty_values_are_ignored() {
        let redactor = Redactor::new(["".to_string(), "X".to_string(), "us".to_string()]);
        assert!(redactor.is_empty());
        assert_eq!(redactor.redact("X marks us"), "X marks us");
    }

    #[test]
    fn longer_secret_wins_over_its_prefix() {
        let redactor = Redactor::new(["token".to_string(), "token-xyz-long".to_string()]);
        assert_eq!(redactor.redact("auth token-xyz-long"), "auth [REDACTED]");
    }

    #[test]
    fn built_from_credentials() {
        let creds = Credentials::new("aws")
            .with("awsKey", "AKIAEXAMPLE")
            .with("awsSecret", "wJalrXUtnFEMI");
        let redactor = Redactor::from_credentials([&creds]);
        let out = redactor.redact("SignatureDoesNotMatch for AKIAEXAMPLE");
        assert!(!out.contains("AKIAEXAMPLE"));
        assert!(format!("{redactor:?}").contains("secret_count"));
    }
}
