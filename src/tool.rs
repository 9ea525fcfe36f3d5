//! Tool system for agents
//!
//! Tools are the capabilities an agent can invoke during a completion. The
//! message-routing tools in [`crate::routing`] are built on the same trait
//! as ordinary function tools; the [`ToolContext`] passed to every
//! invocation is what lets a tool start nested completions, forward their
//! messages into the enclosing stream, and read the shared blackboard.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;

use crate::error::Result;
use crate::state::SharedState;
use crate::stream::StreamSender;
use crate::tracking::ChainId;

/// Result from a tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The output from the tool
    pub output: Value,
    /// Optional error message if the tool failed in a recoverable way
    pub error: Option<String>,
}

impl ToolResult {
    /// Create a successful tool result
    pub fn success(output: Value) -> Self {
        Self {
            output,
            error: None,
        }
    }

    /// Create a recoverable error result, surfaced back to the invoking agent
    pub fn error(message: String) -> Self {
        Self {
            output: Value::Null,
            error: Some(message),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Execution context handed to every tool invocation.
///
/// Carries the invoking completion's chain id (so nested work can record its
/// parentage), a forward sink into the enclosing completion stream, and a
/// handle to the agency-wide shared state.
#[derive(Clone)]
pub struct ToolContext {
    /// Chain id of the completion this tool is running inside.
    pub chain_id: Option<ChainId>,
    /// Producer half of the enclosing completion stream, for forwarding
    /// intermediate messages from nested runs.
    pub forward: Option<StreamSender>,
    /// Agency-wide blackboard.
    pub state: SharedState,
}

impl ToolContext {
    pub fn new(chain_id: Option<ChainId>, forward: Option<StreamSender>, state: SharedState) -> Self {
        Self {
            chain_id,
            forward,
            state,
        }
    }

    /// A context with no enclosing completion, for direct tool invocation.
    pub fn detached(state: SharedState) -> Self {
        Self {
            chain_id: None,
            forward: None,
            state,
        }
    }

    /// Forwards a message into the enclosing completion stream, if any.
    pub async fn forward_message(&self, message: crate::messages::MessageOutput) {
        if let Some(forward) = &self.forward {
            forward.send_message(message).await;
        }
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("chain_id", &self.chain_id)
            .field("has_forward", &self.forward.is_some())
            .finish()
    }
}

/// Trait for all tools that can be used by agents
#[async_trait]
pub trait Tool: Send + Sync + Debug {
    /// Get the name of the tool
    fn name(&self) -> &str;

    /// Get the description of the tool
    fn description(&self) -> &str;

    /// Get the JSON schema for the tool's parameters
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with the given arguments
    async fn execute(&self, arguments: Value, ctx: &ToolContext) -> Result<ToolResult>;
}

/// A function-based tool
#[derive(Clone)]
pub struct FunctionTool {
    name: String,
    description: String,
    parameters_schema: Value,
    function: Arc<dyn Fn(Value) -> Result<Value> + Send + Sync>,
}

impl std::fmt::Debug for FunctionTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters_schema", &self.parameters_schema)
            .finish()
    }
}

impl FunctionTool {
    /// Create a new function tool
    pub fn new<F>(name: String, description: String, parameters_schema: Value, function: F) -> Self
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name,
            description,
            parameters_schema,
            function: Arc::new(function),
        }
    }

    /// Create a function tool with a simple string-to-string function
    pub fn simple<F>(name: &str, description: &str, function: F) -> Self
    where
        F: Fn(String) -> String + Send + Sync + 'static,
    {
        let wrapped = move |args: Value| {
            let input = args
                .get("input")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            let output = function(input);
            Ok(Value::String(output))
        };

        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "input": {
                        "type": "string",
                        "description": "Input to the function"
                    }
                },
                "required": ["input"]
            }),
            function: Arc::new(wrapped),
        }
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.parameters_schema.clone()
    }

    async fn execute(&self, arguments: Value, _ctx: &ToolContext) -> Result<ToolResult> {
        match (self.function)(arguments) {
            Ok(output) => Ok(ToolResult::success(output)),
            Err(e) => Ok(ToolResult::error(e.to_string())),
        }
    }
}

/// Macro to create a function tool from a Rust function
#[macro_export]
macro_rules! function_tool {
    ($name:expr, $description:expr, $func:expr) => {
        $crate::tool::FunctionTool::simple($name, $description, $func)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ctx() -> ToolContext {
        ToolContext::detached(SharedState::new())
    }

    #[test]
    fn test_tool_result_creation() {
        let result = ToolResult::success(serde_json::json!({"data": "test"}));
        assert!(!result.is_error());
        assert_eq!(result.output, serde_json::json!({"data": "test"}));

        let error_result = ToolResult::error("Something went wrong".to_string());
        assert!(error_result.is_error());
        assert_eq!(error_result.error, Some("Something went wrong".to_string()));
        assert_eq!(error_result.output, Value::Null);
    }

    #[test]
    fn test_function_tool_simple() {
        let tool = FunctionTool::simple("uppercase", "Converts text to uppercase", |s: String| {
            s.to_uppercase()
        });

        assert_eq!(tool.name(), "uppercase");
        assert_eq!(tool.description(), "Converts text to uppercase");

        let schema = tool.parameters_schema();
        assert!(schema.is_object());
        assert_eq!(schema["type"], "object");
    }

    #[tokio::test]
    async fn test_function_tool_execution() {
        let tool = FunctionTool::simple("reverse", "Reverses a string", |s: String| {
            s.chars().rev().collect()
        });

        let args = serde_json::json!({"input": "hello"});
        let result = tool.execute(args, &ctx()).await.unwrap();

        assert_eq!(result.output, Value::String("olleh".to_string()));
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_function_tool_error_handling() {
        let tool = FunctionTool::new(
            "failing_tool".to_string(),
            "A tool that fails".to_string(),
            serde_json::json!({}),
            |_| {
                Err(crate::error::AgencyError::InvalidArgument(
                    "intentional failure".to_string(),
                ))
            },
        );

        let result = tool.execute(serde_json::json!({}), &ctx()).await.unwrap();
        assert!(result.error.is_some());
        assert!(result.error.unwrap().contains("intentional failure"));
    }

    #[tokio::test]
    async fn test_context_state_is_shared() {
        let state = SharedState::new();
        let context = ToolContext::detached(state.clone());

        context.state.set("seen", serde_json::json!(true));
        assert_eq!(state.get("seen"), Some(serde_json::json!(true)));
    }

    #[test]
    fn test_function_tool_macro() {
        let tool = function_tool!("echo", "Echoes the input", |s: String| format!(
            "Echo: {}",
            s
        ));

        assert_eq!(tool.name(), "echo");
        assert_eq!(tool.description(), "Echoes the input");
    }
}
