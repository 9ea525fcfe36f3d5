//! # agency-rs
//!
//! An orchestration layer for agencies of collaborating agents. Callers
//! declare agents and a communication chart; the agency parses the chart,
//! registers every agent with a pluggable backend, wires a channel per
//! permitted pair, and hands each sender a `send_message` capability scoped
//! to exactly the recipients the chart allows.
//!
//! ## Core Concepts
//!
//! - **Agent**: a named participant with instructions, tools, and optional
//!   sampling overrides, built with a fluent API
//! - **Communication chart**: standalone agents are user-facing; chains
//!   declare directed agent-to-agent messaging permissions
//! - **Channels**: one per pair, owning the pair's external thread id and
//!   serializing concurrent completions on that pair
//! - **Completion protocols**: blocking, lazy stream, event-handler driven,
//!   and structured-output parsing, all bracketed by chain spans
//!
//! ## Getting Started
//!
//! ```rust
//! use agency_rs::{Agent, ChartNode, OrgChart};
//!
//! let ceo = Agent::simple("CEO", "You coordinate the team.")
//!     .with_description("Entry point for all requests.");
//! let developer = Agent::simple("Developer", "You implement features.")
//!     .with_description("Writes and ships code.");
//!
//! let chart = OrgChart::new(vec![
//!     ChartNode::Single(ceo.clone()),
//!     ChartNode::pair(ceo, developer),
//! ]);
//!
//! // Agency::builder(chart).build(backend) parses the chart, registers the
//! // agents, and attaches routing capabilities.
//! assert_eq!(chart.len(), 2);
//! ```

pub mod agency;
pub mod agent;
pub mod backend;
pub mod channel;
pub mod chart;
pub mod config;
pub mod error;
pub mod events;
pub mod messages;
pub mod persist;
pub mod registry;
pub mod routing;
pub mod state;
pub mod stream;
pub mod tool;
pub mod tracking;

pub use agency::{Agency, AgencyBuilder};
pub use agent::{Agent, AgentConfig};
pub use backend::{AgencyBackend, CompletionRequest};
pub use channel::{Channel, ChannelManager, DispatchStatus};
pub use chart::{ChartNode, CommunicationEdge, OrgChart, ParsedChart};
pub use config::{AgencyConfig, CommunicationMode, CompletionOptions, ConfigBuilder};
pub use error::{AgencyError, Result};
pub use events::{EventHandler, LoggingHandler};
pub use messages::{MessageKind, MessageOutput};
pub use persist::{SettingsCallbacks, ThreadCallbacks, ThreadIds};
pub use registry::AgentRegistry;
pub use routing::{attach_routing, CheckStatusTool, RecipientInfo, SendMessageTool};
pub use state::SharedState;
pub use stream::{CompletionStream, StreamSender};
pub use tool::{FunctionTool, Tool, ToolContext, ToolResult};
pub use tracking::{Chain, ChainId, ChainStatus, ChainTracker};
