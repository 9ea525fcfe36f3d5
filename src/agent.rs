//! # Agent (orientation)
//!
//! An `Agent` is a configured participant in an agency: a name, a
//! description shown to agents that can message it, instructions, tools,
//! and optional per-agent sampling overrides. Agents are declared by the
//! caller, placed into a communication chart, and registered during agency
//! construction, which is when identities and routing capabilities are
//! attached. This module defines the `Agent` API and its configuration
//! surface.

use std::sync::Arc;

use crate::tool::Tool;

/// Defines the complete configuration for an [`Agent`].
#[derive(Clone)]
pub struct AgentConfig {
    /// The name of the agent, used for identification, routing, and in logs.
    pub name: String,

    /// External identity of the agent. `None` until registration, when a
    /// temporary id is assigned and later replaced by the backend-issued id.
    pub id: Option<String>,

    /// A description of the agent's capabilities, surfaced to other agents
    /// that can send messages to this one.
    pub description: Option<String>,

    /// The system instructions that guide the agent's behavior.
    pub instructions: String,

    /// Tools the agent can invoke, including any routing capabilities
    /// attached during agency construction.
    pub tools: Vec<Arc<dyn Tool>>,

    /// The model to request from the backend, if this agent overrides the
    /// backend default.
    pub model: Option<String>,

    /// Sampling temperature override for this agent.
    pub temperature: Option<f32>,

    /// Nucleus sampling override for this agent.
    pub top_p: Option<f32>,

    /// Cap on prompt tokens per run.
    pub max_prompt_tokens: Option<u32>,

    /// Cap on completion tokens per run.
    pub max_completion_tokens: Option<u32>,

    /// An optional JSON schema to enforce structured output from the agent.
    pub response_format: Option<serde_json::Value>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "Assistant".to_string(),
            id: None,
            description: None,
            instructions: "You are a helpful assistant.".to_string(),
            tools: vec![],
            model: None,
            temperature: None,
            top_p: None,
            max_prompt_tokens: None,
            max_completion_tokens: None,
            response_format: None,
        }
    }
}

/// A participant in an agency.
///
/// Agents are built with a fluent interface and are cheap to clone; the
/// registry holds the authoritative copy once the agency is constructed.
///
/// ## Example
///
/// ```rust
/// use agency_rs::Agent;
///
/// let developer = Agent::simple("Developer", "You implement what the CEO asks for.")
///     .with_description("Writes and ships code.")
///     .with_temperature(0.2);
///
/// assert_eq!(developer.name(), "Developer");
/// assert_eq!(developer.config.temperature, Some(0.2));
/// ```
#[derive(Clone)]
pub struct Agent {
    /// The configuration that defines the agent's behavior and capabilities.
    pub config: AgentConfig,
}

impl Agent {
    /// Creates a new agent with the given configuration.
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }

    /// Creates a simple agent with just a name and instructions. The other
    /// settings use their default values.
    pub fn simple(name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self::new(AgentConfig {
            name: name.into(),
            instructions: instructions.into(),
            ..Default::default()
        })
    }

    /// Sets the description surfaced to agents that can message this one.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.config.description = Some(description.into());
        self
    }

    /// Sets an explicit external id, bypassing backend registration.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.config.id = Some(id.into());
        self
    }

    /// Sets the model for the agent.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    /// Adds a tool to the agent.
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.config.tools.push(tool);
        self
    }

    /// Adds multiple tools to the agent.
    pub fn with_tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.config.tools.extend(tools);
        self
    }

    /// Sets the sampling temperature for this agent.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = Some(temperature);
        self
    }

    /// Sets the nucleus sampling parameter for this agent.
    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.config.top_p = Some(top_p);
        self
    }

    /// Caps prompt tokens per run.
    pub fn with_max_prompt_tokens(mut self, max_prompt_tokens: u32) -> Self {
        self.config.max_prompt_tokens = Some(max_prompt_tokens);
        self
    }

    /// Caps completion tokens per run.
    pub fn with_max_completion_tokens(mut self, max_completion_tokens: u32) -> Self {
        self.config.max_completion_tokens = Some(max_completion_tokens);
        self
    }

    /// Sets the response format schema to enforce structured output.
    pub fn with_response_format(mut self, schema: serde_json::Value) -> Self {
        self.config.response_format = Some(schema);
        self
    }

    /// Returns the agent's name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Returns the agent's external id, if assigned.
    pub fn id(&self) -> Option<&str> {
        self.config.id.as_deref()
    }

    /// Returns the agent's description, if any.
    pub fn description(&self) -> Option<&str> {
        self.config.description.as_deref()
    }

    /// Returns the agent's instructions.
    pub fn instructions(&self) -> &str {
        &self.config.instructions
    }

    /// Returns a slice of the tools available to the agent.
    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.config.tools
    }

    /// Looks up one of the agent's tools by name.
    pub fn tool(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.config.tools.iter().find(|t| t.name() == name)
    }

    /// Checks if the agent has any tools.
    pub fn has_tools(&self) -> bool {
        !self.config.tools.is_empty()
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.config.name)
            .field("id", &self.config.id)
            .field("tools_count", &self.config.tools.len())
            .finish()
    }
}
