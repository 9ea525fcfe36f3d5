//! Agency configuration
//!
//! Agency-level defaults and the communication mode. Per-agent settings on
//! [`crate::agent::AgentConfig`] override these defaults; per-request
//! settings on [`CompletionOptions`] override both.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How nested agent-to-agent completions are executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationMode {
    /// Fully cooperative: every nested completion runs inline, paced by the
    /// consumer of the top stream.
    #[default]
    Sequential,
    /// `send_message` dispatches nested completions onto independent tasks
    /// and returns immediately; senders poll with `check_status`.
    ParallelAgents,
    /// The backend fans out tool invocations concurrently; nested
    /// completions stay inline.
    ParallelTools,
}

impl CommunicationMode {
    pub fn label(&self) -> &'static str {
        match self {
            CommunicationMode::Sequential => "sequential",
            CommunicationMode::ParallelAgents => "parallel_agents",
            CommunicationMode::ParallelTools => "parallel_tools",
        }
    }
}

/// Agency-wide configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgencyConfig {
    /// Instructions prepended to every agent's own instructions.
    pub shared_instructions: Option<String>,

    /// Model requested for agents that do not set their own.
    pub default_model: Option<String>,

    /// Sampling temperature for agents that do not set their own.
    pub default_temperature: Option<f32>,

    /// Nucleus sampling for agents that do not set their own.
    pub default_top_p: Option<f32>,

    /// Prompt-token cap for agents that do not set their own.
    pub default_max_prompt_tokens: Option<u32>,

    /// Completion-token cap for agents that do not set their own.
    pub default_max_completion_tokens: Option<u32>,

    /// How nested completions are executed.
    pub mode: CommunicationMode,
}

/// Builder for [`AgencyConfig`].
pub struct ConfigBuilder {
    config: AgencyConfig,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AgencyConfig::default(),
        }
    }

    pub fn shared_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.config.shared_instructions = Some(instructions.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.default_model = Some(model.into());
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.default_temperature = Some(temperature);
        self
    }

    pub fn top_p(mut self, top_p: f32) -> Self {
        self.config.default_top_p = Some(top_p);
        self
    }

    pub fn max_prompt_tokens(mut self, tokens: u32) -> Self {
        self.config.default_max_prompt_tokens = Some(tokens);
        self
    }

    pub fn max_completion_tokens(mut self, tokens: u32) -> Self {
        self.config.default_max_completion_tokens = Some(tokens);
        self
    }

    pub fn mode(mut self, mode: CommunicationMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn build(self) -> AgencyConfig {
        self.config
    }
}

/// Loads configuration overrides from environment variables. Unset or
/// unparsable variables leave the defaults in place.
pub fn from_env() -> AgencyConfig {
    let mut config = AgencyConfig::default();

    if let Ok(model) = std::env::var("AGENCY_MODEL") {
        config.default_model = Some(model);
    }

    if let Ok(temp) = std::env::var("AGENCY_TEMPERATURE") {
        if let Ok(temp_f) = temp.parse::<f32>() {
            config.default_temperature = Some(temp_f);
        }
    }

    if let Ok(instructions) = std::env::var("AGENCY_SHARED_INSTRUCTIONS") {
        config.shared_instructions = Some(instructions);
    }

    if let Ok(mode) = std::env::var("AGENCY_COMMUNICATION_MODE") {
        match mode.as_str() {
            "sequential" => config.mode = CommunicationMode::Sequential,
            "parallel_agents" => config.mode = CommunicationMode::ParallelAgents,
            "parallel_tools" => config.mode = CommunicationMode::ParallelTools,
            _ => {}
        }
    }

    config
}

/// Per-request options for the completion protocols.
#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    /// The user-facing agent to address. Defaults to the entry point; must
    /// be one of the chart's standalone agents.
    pub recipient: Option<String>,

    /// Extra instructions appended for this run only.
    pub additional_instructions: Option<String>,

    /// Backend-specific tool choice directive.
    pub tool_choice: Option<Value>,

    /// Structured-output schema for this run, overriding the agent's.
    pub response_format: Option<Value>,

    /// Log every intermediate message. Only valid for blocking protocols.
    pub verbose: bool,
}

impl CompletionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
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

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}
