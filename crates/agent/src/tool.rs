//! Tool trait: what the model can ask an agent to do.
//!
//! A tool runs a three-step lifecycle per invocation: `before_execution`,
//! `execute`, `after_execution`. Only the `break_loop` flag of the response
//! decides whether the agent's turn ends.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use monologue_core::LogKind;
use serde_json::Value;
use tracing::info;

use crate::agent::Agent;
use crate::signal::Interrupt;
use crate::tools::{CallSubordinateTool, ResponseTool, UnknownTool};

/// A parsed tool invocation.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Requested tool name
    pub name: String,

    /// Arguments from `tool_args`
    pub args: serde_json::Map<String, Value>,

    /// The full model reply the call was parsed from
    pub message: String,
}

impl ToolCall {
    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(Value::as_str)
    }

    /// Booleans also accept the strings "true"/"false".
    pub fn arg_bool(&self, key: &str) -> Option<bool> {
        match self.args.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Outcome of `execute`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResponse {
    pub message: String,
    pub break_loop: bool,
}

impl ToolResponse {
    /// Feed `message` back to the model and keep looping.
    pub fn reply(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            break_loop: false,
        }
    }

    /// End the turn with `message` as its result.
    pub fn finish(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            break_loop: true,
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name the model uses to call this tool.
    fn name(&self) -> &str;

    /// One line shown to the model in the tool list.
    fn description(&self) -> &str;

    async fn before_execution(&self, agent: &Arc<Agent>, call: &ToolCall) -> Result<(), Interrupt> {
        info!(agent = %agent.name(), tool = %call.name, "Using tool");
        agent.log().log(
            LogKind::Tool,
            format!("{}: Using tool '{}'", agent.name(), call.name),
            "",
            call.args.clone(),
        );
        Ok(())
    }

    async fn execute(&self, agent: &Arc<Agent>, call: &ToolCall) -> Result<ToolResponse, Interrupt>;

    /// Records the response in history so the model sees it next iteration.
    async fn after_execution(
        &self,
        agent: &Arc<Agent>,
        call: &ToolCall,
        response: &ToolResponse,
    ) -> Result<(), Interrupt> {
        agent.hist_add_tool_result(&call.name, &response.message)?;
        agent.log().log(
            LogKind::Tool,
            format!("{}: Response from tool '{}'", agent.name(), call.name),
            response.message.clone(),
            serde_json::Map::new(),
        );
        Ok(())
    }
}

/// Tools by name. Unknown names resolve to a fallback that tells the model
/// which tools exist.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `response` and `call_subordinate`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ResponseTool));
        registry.register(Arc::new(CallSubordinateTool));
        registry
    }

    /// Register a tool, replacing any tool of the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Look up `name`, falling back to the unknown-tool handler.
    pub fn resolve(&self, name: &str) -> Arc<dyn Tool> {
        self.get(name).unwrap_or_else(|| Arc::new(UnknownTool))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// `- name: description` lines for the system prompt, sorted by name.
    pub fn describe(&self) -> String {
        self.names()
            .into_iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| format!("- {}: {}", tool.name(), tool.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_registered() {
        let registry = ToolRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["call_subordinate", "response"]);
        assert!(registry.describe().contains("- response:"));
    }

    #[test]
    fn unknown_names_fall_back() {
        let registry = ToolRegistry::with_builtins();
        assert_eq!(registry.resolve("response").name(), "response");
        assert_eq!(registry.resolve("teleport").name(), "unknown");
        assert!(registry.get("teleport").is_none());
    }

    #[test]
    fn call_argument_helpers() {
        let mut args = serde_json::Map::new();
        args.insert("text".into(), "hi".into());
        args.insert("reset".into(), "true".into());
        args.insert("flag".into(), Value::Bool(false));
        let call = ToolCall {
            name: "x".into(),
            args,
            message: String::new(),
        };
        assert_eq!(call.arg_str("text"), Some("hi"));
        assert_eq!(call.arg_bool("reset"), Some(true));
        assert_eq!(call.arg_bool("flag"), Some(false));
        assert_eq!(call.arg_bool("missing"), None);
    }
}
