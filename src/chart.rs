//! Communication chart parsing
//!
//! The chart is the caller's declaration of who exists and who may message
//! whom. Standalone entries are user-facing: the first one is the entry
//! point, and every standalone agent can be addressed from outside the
//! agency. Chains declare directed messaging permissions between adjacent
//! agents; they grant capability, not obligation.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::agent::Agent;
use crate::error::{AgencyError, Result};
use crate::registry::AgentRegistry;

/// One entry in a communication chart.
#[derive(Clone)]
pub enum ChartNode {
    /// A user-facing agent. The first standalone agent in the chart is the
    /// entry point for messages with no explicit recipient.
    Single(Agent),
    /// A directed permission chain: each agent may message the next one.
    Chain(Vec<Agent>),
}

impl ChartNode {
    /// A chain of exactly two agents, the most common chart entry.
    pub fn pair(sender: Agent, recipient: Agent) -> Self {
        ChartNode::Chain(vec![sender, recipient])
    }
}

impl std::fmt::Debug for ChartNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChartNode::Single(agent) => f.debug_tuple("Single").field(&agent.name()).finish(),
            ChartNode::Chain(agents) => {
                let names: Vec<&str> = agents.iter().map(|a| a.name()).collect();
                f.debug_tuple("Chain").field(&names).finish()
            }
        }
    }
}

/// A directed messaging permission between two registered agents.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommunicationEdge {
    pub sender: String,
    pub recipient: String,
}

/// The validated result of parsing an [`OrgChart`].
#[derive(Debug, Clone)]
pub struct ParsedChart {
    /// Name of the entry-point agent.
    pub ceo: String,
    /// Names of all user-facing agents, entry point first.
    pub main_recipients: Vec<String>,
    /// Every directed agent-to-agent messaging permission, in chart order.
    pub edges: Vec<CommunicationEdge>,
}

impl ParsedChart {
    /// Names of the agents the given sender may message, in chart order.
    pub fn recipients_of(&self, sender: &str) -> Vec<String> {
        self.edges
            .iter()
            .filter(|e| e.sender == sender)
            .map(|e| e.recipient.clone())
            .collect()
    }

    /// Whether the chart grants `sender` permission to message `recipient`.
    pub fn has_edge(&self, sender: &str, recipient: &str) -> bool {
        self.edges
            .iter()
            .any(|e| e.sender == sender && e.recipient == recipient)
    }

    /// Senders that have at least one outgoing edge, in chart order.
    pub fn senders(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.edges
            .iter()
            .filter(|e| seen.insert(e.sender.clone()))
            .map(|e| e.sender.clone())
            .collect()
    }

    /// Whether the named agent can be addressed from outside the agency.
    pub fn is_main_recipient(&self, name: &str) -> bool {
        self.main_recipients.iter().any(|n| n == name)
    }
}

/// The communication chart declared by the caller.
///
/// ## Example
///
/// ```rust
/// use agency_rs::{Agent, ChartNode, OrgChart};
///
/// let ceo = Agent::simple("CEO", "Coordinate the team.");
/// let dev = Agent::simple("Developer", "Implement what the CEO asks for.");
///
/// let chart = OrgChart::new(vec![
///     ChartNode::Single(ceo.clone()),
///     ChartNode::pair(ceo, dev),
/// ]);
/// assert_eq!(chart.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct OrgChart {
    nodes: Vec<ChartNode>,
}

impl OrgChart {
    pub fn new(nodes: Vec<ChartNode>) -> Self {
        Self { nodes }
    }

    /// Appends a standalone, user-facing agent.
    pub fn with_agent(mut self, agent: Agent) -> Self {
        self.nodes.push(ChartNode::Single(agent));
        self
    }

    /// Appends a permission chain.
    pub fn with_chain(mut self, agents: Vec<Agent>) -> Self {
        self.nodes.push(ChartNode::Chain(agents));
        self
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Registers every agent in the chart and extracts the entry point,
    /// user-facing recipients, and messaging edges.
    ///
    /// Agents appearing in several positions are registered once; the
    /// registry's identity rules decide whether a repeated name is the same
    /// agent or a conflict. Self-links are dropped with a warning, repeated
    /// edges collapse to one.
    pub fn parse(self, registry: &AgentRegistry) -> Result<ParsedChart> {
        if self.nodes.is_empty() {
            return Err(AgencyError::InvalidChart(
                "agency chart must not be empty".to_string(),
            ));
        }

        let mut ceo: Option<String> = None;
        let mut main_recipients: Vec<String> = Vec::new();
        let mut main_ids: HashSet<String> = HashSet::new();
        let mut edges: Vec<CommunicationEdge> = Vec::new();
        let mut seen_edges: HashSet<CommunicationEdge> = HashSet::new();

        for node in self.nodes {
            match node {
                ChartNode::Single(agent) => {
                    let registered = registry.register(agent)?;
                    if ceo.is_none() {
                        ceo = Some(registered.name().to_string());
                    }
                    let id = registered
                        .id()
                        .map(str::to_string)
                        .unwrap_or_else(|| registered.name().to_string());
                    if main_ids.insert(id) {
                        main_recipients.push(registered.name().to_string());
                    }
                }
                ChartNode::Chain(agents) => {
                    if agents.is_empty() {
                        return Err(AgencyError::InvalidChart(
                            "communication chain must not be empty".to_string(),
                        ));
                    }
                    let mut names = Vec::with_capacity(agents.len());
                    for agent in agents {
                        names.push(registry.register(agent)?.name().to_string());
                    }
                    for pair in names.windows(2) {
                        if pair[0] == pair[1] {
                            warn!(agent = %pair[0], "Ignoring self-link in communication chart");
                            continue;
                        }
                        let edge = CommunicationEdge {
                            sender: pair[0].clone(),
                            recipient: pair[1].clone(),
                        };
                        if seen_edges.insert(edge.clone()) {
                            edges.push(edge);
                        }
                    }
                }
            }
        }

        let ceo = ceo.ok_or_else(|| {
            AgencyError::InvalidChart(
                "agency chart must contain at least one standalone agent".to_string(),
            )
        })?;

        info!(
            ceo = %ceo,
            agents = registry.len(),
            edges = edges.len(),
            "Parsed communication chart"
        );

        Ok(ParsedChart {
            ceo,
            main_recipients,
            edges,
        })
    }
}
