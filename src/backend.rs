//! Backend collaborator trait
//!
//! The agency core is backend-agnostic: agent registration, thread creation,
//! and completion execution all go through [`AgencyBackend`]. A backend
//! receives a fully-resolved [`CompletionRequest`] and returns the consumer
//! half of a completion stream; how the run is produced (remote API, local
//! model, scripted mock) is its own business.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::agent::Agent;
use crate::error::Result;
use crate::state::SharedState;
use crate::stream::CompletionStream;
use crate::tracking::ChainId;

/// Everything a backend needs to run one completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// The message that starts the run.
    pub message: String,
    /// Name of the sending agent, `None` when the user is the sender.
    pub sender: Option<String>,
    /// The agent that produces the completion, tools attached.
    pub recipient: Arc<Agent>,
    /// External id of the conversation thread for this pair.
    pub thread_id: String,
    /// Chain span this run is recorded under.
    pub chain_id: Option<ChainId>,
    /// Extra instructions appended to the recipient's own for this run only.
    pub additional_instructions: Option<String>,
    /// Backend-specific tool choice directive.
    pub tool_choice: Option<Value>,
    /// Per-request structured-output schema, overriding the agent's.
    pub response_format: Option<Value>,
    /// Whether the backend may fan out tool invocations concurrently.
    pub parallel_tools: bool,
    /// Agency-wide blackboard, handed to every tool invocation.
    pub state: SharedState,
}

impl CompletionRequest {
    pub fn new(
        message: impl Into<String>,
        recipient: Arc<Agent>,
        thread_id: impl Into<String>,
        state: SharedState,
    ) -> Self {
        Self {
            message: message.into(),
            sender: None,
            recipient,
            thread_id: thread_id.into(),
            chain_id: None,
            additional_instructions: None,
            tool_choice: None,
            response_format: None,
            parallel_tools: false,
            state,
        }
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn with_chain_id(mut self, chain_id: ChainId) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    pub fn with_additional_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.additional_instructions = Some(instructions.into());
        self
    }

    pub fn with_tool_choice(mut self, tool_choice: Value) -> Self {
        self.tool_choice = Some(tool_choice);
        self
    }

    pub fn with_response_format(mut self, response_format: Value) -> Self {
        self.response_format = Some(response_format);
        self
    }

    pub fn with_parallel_tools(mut self, parallel_tools: bool) -> Self {
        self.parallel_tools = parallel_tools;
        self
    }

    /// Display label for this run, conventionally `"sender -> recipient"`.
    pub fn label(&self) -> String {
        format!(
            "{} -> {}",
            self.sender.as_deref().unwrap_or("user"),
            self.recipient.name()
        )
    }
}

/// External collaborator that owns agents, threads, and completions.
#[async_trait]
pub trait AgencyBackend: Send + Sync {
    /// Registers an agent with the backend, returning its external id.
    async fn register_agent(&self, agent: &Agent) -> Result<String>;

    /// Creates a conversation thread for the given pair, returning its
    /// external id. A `None` sender is the end user.
    async fn create_thread(&self, sender: Option<&str>, recipient: &str) -> Result<String>;

    /// Starts one completion and returns the consumer half of its stream.
    /// The backend must deliver exactly one terminal event.
    async fn get_completion(&self, request: CompletionRequest) -> Result<CompletionStream>;
}
