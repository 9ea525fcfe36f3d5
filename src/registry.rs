//! Agent registry
//!
//! Holds every agent declared in the communication chart, keyed by name.
//! Registration assigns a temporary identity (`temp_id_<uuid>`) that is
//! replaced by the backend-issued id during construction, and routing
//! capabilities are attached here once the chart has been parsed.

use std::sync::{Arc, RwLock};

use tracing::debug;
use uuid::Uuid;

use crate::agent::{Agent, AgentConfig};
use crate::error::{AgencyError, Result};
use crate::tool::Tool;

/// Registry of all agents in an agency, keyed by name.
#[derive(Default)]
pub struct AgentRegistry {
    agents: RwLock<Vec<Arc<Agent>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an agent, assigning a temporary id when it has none.
    ///
    /// Re-registering the same agent (same explicit id, or the same
    /// name/instructions when no id is set, as when one agent appears in
    /// several chart positions) is a no-op returning the stored handle. A
    /// *different* agent under a taken name is rejected.
    pub fn register(&self, mut agent: Agent) -> Result<Arc<Agent>> {
        let mut agents = self.agents.write().unwrap();

        if let Some(existing) = agents.iter().find(|a| a.name() == agent.name()) {
            let same_identity = match &agent.config.id {
                Some(id) => existing.id() == Some(id.as_str()),
                None => existing.instructions() == agent.instructions(),
            };
            if same_identity {
                return Ok(Arc::clone(existing));
            }
            return Err(AgencyError::DuplicateAgentName(agent.name().to_string()));
        }

        if agent.config.id.is_none() {
            agent.config.id = Some(format!("temp_id_{}", Uuid::new_v4()));
        }

        debug!(agent = %agent.name(), id = ?agent.id(), "Registered agent");
        let handle = Arc::new(agent);
        agents.push(Arc::clone(&handle));
        Ok(handle)
    }

    /// Looks up an agent by name.
    pub fn get(&self, name: &str) -> Result<Arc<Agent>> {
        self.agents
            .read()
            .unwrap()
            .iter()
            .find(|a| a.name() == name)
            .cloned()
            .ok_or_else(|| AgencyError::AgentNotFound(name.to_string()))
    }

    /// All registered agents, in registration order.
    pub fn agents(&self) -> Vec<Arc<Agent>> {
        self.agents.read().unwrap().clone()
    }

    /// Names of all registered agents, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.agents
            .read()
            .unwrap()
            .iter()
            .map(|a| a.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.agents.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.read().unwrap().is_empty()
    }

    /// Rebuilds the named agent's configuration in place.
    pub fn update<F>(&self, name: &str, f: F) -> Result<()>
    where
        F: FnOnce(AgentConfig) -> AgentConfig,
    {
        let mut agents = self.agents.write().unwrap();
        let slot = agents
            .iter_mut()
            .find(|a| a.name() == name)
            .ok_or_else(|| AgencyError::AgentNotFound(name.to_string()))?;
        let config = f(slot.config.clone());
        *slot = Arc::new(Agent::new(config));
        Ok(())
    }

    /// Attaches additional tools to the named agent.
    pub fn attach_tools(&self, name: &str, tools: Vec<Arc<dyn Tool>>) -> Result<()> {
        self.update(name, |mut config| {
            config.tools.extend(tools);
            config
        })
    }

    /// Replaces the named agent's external id.
    pub fn assign_id(&self, name: &str, id: String) -> Result<()> {
        self.update(name, |mut config| {
            config.id = Some(id);
            config
        })
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::FunctionTool;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_register_assigns_temp_id() {
        let registry = AgentRegistry::new();
        let agent = registry
            .register(Agent::simple("CEO", "Coordinate"))
            .unwrap();

        assert!(agent.id().unwrap().starts_with("temp_id_"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reregistering_same_agent_is_noop() {
        let registry = AgentRegistry::new();
        let ceo = Agent::simple("CEO", "Coordinate");

        let first = registry.register(ceo.clone()).unwrap();
        let second = registry.register(ceo).unwrap();

        assert_eq!(first.id(), second.id());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_distinct_agent_with_taken_name_fails() {
        let registry = AgentRegistry::new();
        registry
            .register(Agent::simple("CEO", "Coordinate"))
            .unwrap();

        let err = registry
            .register(Agent::simple("CEO", "Entirely different instructions"))
            .unwrap_err();
        assert!(matches!(err, AgencyError::DuplicateAgentName(_)));
    }

    #[test]
    fn test_explicit_id_identity() {
        let registry = AgentRegistry::new();
        registry
            .register(Agent::simple("CEO", "Coordinate").with_id("asst_1"))
            .unwrap();

        // Same id: idempotent even with changed instructions.
        let again = registry
            .register(Agent::simple("CEO", "Updated instructions").with_id("asst_1"))
            .unwrap();
        assert_eq!(again.id(), Some("asst_1"));

        // Different id under the same name: rejected.
        let err = registry
            .register(Agent::simple("CEO", "Coordinate").with_id("asst_2"))
            .unwrap_err();
        assert!(matches!(err, AgencyError::DuplicateAgentName(_)));
    }

    #[test]
    fn test_get_unknown_agent() {
        let registry = AgentRegistry::new();
        let err = registry.get("Nobody").unwrap_err();
        assert!(matches!(err, AgencyError::AgentNotFound(_)));
    }

    #[test]
    fn test_attach_tools() {
        let registry = AgentRegistry::new();
        registry
            .register(Agent::simple("CEO", "Coordinate"))
            .unwrap();

        let tool = Arc::new(FunctionTool::simple("noop", "Does nothing", |s: String| s));
        registry.attach_tools("CEO", vec![tool]).unwrap();

        let agent = registry.get("CEO").unwrap();
        assert_eq!(agent.tools().len(), 1);
        assert!(agent.tool("noop").is_some());
    }

    #[test]
    fn test_assign_id() {
        let registry = AgentRegistry::new();
        registry
            .register(Agent::simple("CEO", "Coordinate"))
            .unwrap();

        registry.assign_id("CEO", "asst_real".to_string()).unwrap();
        assert_eq!(registry.get("CEO").unwrap().id(), Some("asst_real"));
    }

    #[test]
    fn test_names_preserve_order() {
        let registry = AgentRegistry::new();
        registry.register(Agent::simple("B", "b")).unwrap();
        registry.register(Agent::simple("A", "a")).unwrap();

        assert_eq!(registry.names(), vec!["B".to_string(), "A".to_string()]);
    }
}
