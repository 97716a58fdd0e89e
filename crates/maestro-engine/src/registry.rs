//! The agent registry: name → factory dispatch.
//!
//! Workflow definitions reference agents by stable name strings; the
//! registry maps each name to a factory producing a boxed `Agent`. The
//! core never branches on agent identity — registration is the only
//! coupling point between a workflow file and the code behind it.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use maestro_contracts::{
    agent::AgentId,
    error::{MaestroError, MaestroResult},
};

use crate::traits::Agent;

type AgentFactory = Box<dyn Fn() -> Arc<dyn Agent> + Send + Sync>;

/// Maps stable agent names to factories implementing the agent contract.
///
/// Built once at startup, then shared read-only with the orchestrator.
#[derive(Default)]
pub struct AgentRegistry {
    factories: HashMap<AgentId, AgentFactory>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `name`. Re-registering a name replaces the
    /// previous factory.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn Agent> + Send + Sync + 'static,
    {
        let id = AgentId::new(name);
        debug!(agent = %id, "agent registered");
        self.factories.insert(id, Box::new(factory));
    }

    /// Convenience for agents that are a single shared instance.
    pub fn register_instance(&mut self, name: impl Into<String>, agent: Arc<dyn Agent>) {
        self.register(name, move || Arc::clone(&agent));
    }

    /// Instantiate the agent registered under `id`.
    pub fn build(&self, id: &AgentId) -> MaestroResult<Arc<dyn Agent>> {
        self.factories
            .get(id)
            .map(|factory| factory())
            .ok_or_else(|| MaestroError::UnknownAgent(id.to_string()))
    }

    pub fn contains(&self, id: &AgentId) -> bool {
        self.factories.contains_key(id)
    }

    /// All registered names, sorted.
    pub fn names(&self) -> Vec<AgentId> {
        let mut names: Vec<AgentId> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}
