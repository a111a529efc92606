//! Tool trait: the abstraction over external side-effecting operations.
//!
//! Tools are what give the agent the ability to act in the world:
//! create a helpdesk ticket, list the objects of a bucket, and so on.
//! Each tool receives the raw text the model wrote as its input and
//! returns either observation text or a [`ToolError`].

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{RegistryError, ToolError};

/// A request to execute a tool, as parsed from model output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Name of the tool to execute
    pub tool_name: String,

    /// The input text exactly as the model produced it (after trimming)
    pub raw_input: String,
}

impl ToolCall {
    pub fn new(tool_name: impl Into<String>, raw_input: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            raw_input: raw_input.into(),
        }
    }
}

/// The input handed to [`Tool::invoke`].
///
/// Inputs always arrive as text; the tool decides how to interpret it.
/// The helpers below turn malformed input into
/// [`ToolErrorKind::InvalidInput`](crate::error::ToolErrorKind::InvalidInput)
/// errors instead of panics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolInput(String);

impl ToolInput {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The raw text, trimmed.
    pub fn as_str(&self) -> &str {
        self.0.trim()
    }

    pub fn is_empty(&self) -> bool {
        self.as_str().is_empty()
    }

    /// The input as a non-empty plain string (e.g. a bucket name).
    pub fn required_text(&self, what: &str) -> Result<&str, ToolError> {
        let text = self.as_str().trim_matches('"');
        if text.is_empty() {
            return Err(ToolError::invalid_input(format!("expected {what}, got empty input")));
        }
        Ok(text)
    }

    /// Deserialize the input as JSON into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ToolError> {
        serde_json::from_str(self.as_str())
            .map_err(|e| ToolError::invalid_input(format!("input is not valid JSON for this tool: {e}")))
    }

    /// The input as a single unsigned integer (e.g. a ticket id).
    pub fn integer(&self) -> Result<u64, ToolError> {
        let text = self.as_str().trim_matches('"');
        text.parse::<u64>()
            .map_err(|_| ToolError::invalid_input(format!("expected a numeric id, got '{text}'")))
    }

    /// The input as a list of unsigned integers.
    ///
    /// A JSON array (`[1, 2, 3]`) is the supported contract. A bare or
    /// bracketed comma list (`1, 2, 3`) is still accepted for models that
    /// were prompted with the older free-text format.
    pub fn id_list(&self) -> Result<Vec<u64>, ToolError> {
        if let Ok(ids) = serde_json::from_str::<Vec<u64>>(self.as_str()) {
            return Ok(ids);
        }

        let inner = self
            .as_str()
            .trim_start_matches('[')
            .trim_end_matches(']');
        let ids = inner
            .split(',')
            .map(|part| part.trim().trim_matches('"'))
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<u64>()
                    .map_err(|_| ToolError::invalid_input(format!("'{part}' is not a numeric id")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if ids.is_empty() {
            return Err(ToolError::invalid_input("expected a list of ids like [1, 2, 3]"));
        }
        Ok(ids)
    }
}

impl From<&str> for ToolInput {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for ToolInput {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

/// Name and description of a tool, as listed in the prompt catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescription {
    pub name: String,
    pub description: String,
}

/// The core Tool trait.
///
/// Implementations must never panic on bad input or remote failures:
/// every failure is reported as a [`ToolError`] so the agent loop can
/// show it to the model as an observation.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "list-all-tickets").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM verbatim).
    fn description(&self) -> &str;

    /// Execute the tool with the given input.
    async fn invoke(&self, input: ToolInput) -> Result<String, ToolError>;

    fn describe(&self) -> ToolDescription {
        ToolDescription {
            name: self.name().to_string(),
            description: self.description().to_string(),
        }
    }
}

/// An ordered registry of available tools.
///
/// The agent loop uses this to:
/// 1. Build the tool catalogue for the prompt (registration order)
/// 2. Resolve the tool the model asked for
///
/// The registry is built once and then shared read-only (behind an `Arc`)
/// by every task.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Fails if a tool with the same name exists.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let name = tool.name().to_string();
        if self.index.contains_key(&name) {
            return Err(RegistryError::DuplicateTool(name));
        }
        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    /// Move every tool of `other` into this registry, keeping order.
    pub fn extend(&mut self, other: ToolRegistry) -> Result<(), RegistryError> {
        for tool in other.tools {
            self.register(tool)?;
        }
        Ok(())
    }

    /// Look up a tool by name.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Tool>, RegistryError> {
        self.index
            .get(name)
            .map(|&i| self.tools[i].clone())
            .ok_or_else(|| RegistryError::UnknownTool {
                name: name.to_string(),
                available: self.names().join(", "),
            })
    }

    /// Name and description of every tool, in registration order.
    pub fn describe_all(&self) -> Vec<ToolDescription> {
        self.tools.iter().map(|t| t.describe()).collect()
    }

    /// All registered tool names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolErrorKind;

    /// A simple test tool for unit tests.
    struct EchoTool(&'static str);

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        async fn invoke(&self, input: ToolInput) -> Result<String, ToolError> {
            Ok(input.as_str().to_string())
        }
    }

    #[test]
    fn registry_register_and_resolve() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool("echo"))).unwrap();
        assert!(registry.resolve("echo").is_ok());
        assert!(matches!(
            registry.resolve("nonexistent"),
            Err(RegistryError::UnknownTool { .. })
        ));
    }

    #[test]
    fn registry_rejects_duplicates() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool("echo"))).unwrap();
        let err = registry.register(Arc::new(EchoTool("echo"))).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateTool("echo".into()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn describe_all_keeps_registration_order() {
        let mut registry = ToolRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry.register(Arc::new(EchoTool(name))).unwrap();
        }
        let first = registry.describe_all();
        let second = registry.describe_all();
        assert_eq!(first, second);
        let names: Vec<_> = first.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn extend_fails_on_name_clash() {
        let mut a = ToolRegistry::new();
        a.register(Arc::new(EchoTool("echo"))).unwrap();
        let mut b = ToolRegistry::new();
        b.register(Arc::new(EchoTool("other"))).unwrap();
        b.register(Arc::new(EchoTool("echo"))).unwrap();
        assert!(a.extend(b).is_err());
    }

    #[tokio::test]
    async fn resolved_tool_invokes() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool("echo"))).unwrap();
        let tool = registry.resolve("echo").unwrap();
        let out = tool.invoke(ToolInput::new("  hello world \n")).await.unwrap();
        assert_eq!(out, "hello world");
    }

    #[test]
    fn id_list_accepts_json_and_legacy_forms() {
        assert_eq!(ToolInput::new("[1,2,3]").id_list().unwrap(), vec![1, 2, 3]);
        assert_eq!(ToolInput::new("[4, 5]").id_list().unwrap(), vec![4, 5]);
        assert_eq!(ToolInput::new("7, 8 ,9").id_list().unwrap(), vec![7, 8, 9]);
        assert_eq!(ToolInput::new(r#"["10", "11"]"#).id_list().unwrap(), vec![10, 11]);
    }

    #[test]
    fn id_list_rejects_garbage() {
        let err = ToolInput::new("[1, two]").id_list().unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::InvalidInput);
        assert!(ToolInput::new("[]").id_list().is_err());
    }

    #[test]
    fn integer_and_text_inputs() {
        assert_eq!(ToolInput::new(" 42 ").integer().unwrap(), 42);
        assert_eq!(ToolInput::new("\"42\"").integer().unwrap(), 42);
        assert!(ToolInput::new("forty-two").integer().is_err());
        assert_eq!(
            ToolInput::new("\"test-bucket\"").required_text("a bucket name").unwrap(),
            "test-bucket"
        );
        assert!(ToolInput::new("   ").required_text("a bucket name").is_err());
    }

    #[test]
    fn json_input_errors_are_invalid_input() {
        #[derive(Debug, Deserialize)]
        struct Args {
            #[allow(dead_code)]
            subject: String,
        }
        let err = ToolInput::new("{not json").json::<Args>().unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::InvalidInput);
    }
}
