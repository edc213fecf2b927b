//! Tool-invocation interface and registry.
//!
//! Tools are the external data collaborators of the data-gathering step.
//! The trait is object-safe (boxed futures, same pattern as
//! `llm::box_provider`) so the registry can hold heterogeneous backends.
//!
//! Error discipline: a `ToolError` means the invocation itself was
//! malformed or the tool is broken; a backend that answers with "rate
//! limited" or "not found" returns that as text, which the gathering loop
//! classifies as a soft error and keeps iterating past.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use flowchat_types::error::ToolError;

/// An external data lookup invocable by name with JSON arguments.
pub trait Tool: Send + Sync {
    /// Registry name (e.g. "market_data").
    fn name(&self) -> &str;

    /// One-line description shown to the planning model.
    fn description(&self) -> &str;

    /// Invoke with JSON arguments, returning a textual result.
    fn invoke<'a>(
        &'a self,
        args: &'a Value,
    ) -> Pin<Box<dyn Future<Output = Result<String, ToolError>> + Send + 'a>>;
}

/// Name-keyed collection of tools for one pipeline.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its own name. Later registrations replace
    /// earlier ones with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Invoke a registered tool by name.
    pub async fn invoke(&self, name: &str, args: &Value) -> Result<String, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        tool.invoke(args).await
    }

    /// `name: description` lines for the planning prompt.
    pub fn describe_all(&self) -> String {
        let mut lines: Vec<String> = self
            .tools
            .values()
            .map(|t| format!("{}: {}", t.name(), t.description()))
            .collect();
        lines.sort();
        lines.join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
