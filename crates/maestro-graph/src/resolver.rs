//! Topological batch resolution for one phase.
//!
//! The resolver turns a phase's `depends_on` declarations into an ordered
//! sequence of batches (Kahn's algorithm): each batch is a maximal set of
//! agents with no dependency among the remaining unscheduled set. Agents
//! within a batch may run concurrently; batches run strictly in order.
//!
//! Structural defects — unknown dependency names, duplicate agents, and
//! cycles — are raised here, before any agent executes. A malformed phase
//! is never partially run.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;

use maestro_contracts::{
    agent::{AgentId, ExecutionMode, Phase},
    error::{MaestroError, MaestroResult},
};

/// Resolve the execution batches for a phase.
///
/// Rules:
/// - Only enabled agents are scheduled. A disabled agent still satisfies
///   its dependents' edges — the engine decides how they cope with the
///   missing output.
/// - Within each dependency layer, all `Parallel` agents form one batch
///   (sorted by name for determinism), then each `Sequential` agent gets a
///   singleton batch, in name order.
/// - `depends_on` names must exist in the same phase
///   (`UnknownDependency`), agent names must be unique (`DuplicateAgent`),
///   and the graph must be acyclic (`CyclicDependency`, naming the agents
///   left on the cycle).
pub fn resolve_batches(phase: &Phase) -> MaestroResult<Vec<Vec<AgentId>>> {
    let mut known: HashSet<&AgentId> = HashSet::with_capacity(phase.agents.len());
    for desc in &phase.agents {
        if !known.insert(&desc.name) {
            return Err(MaestroError::DuplicateAgent {
                phase: phase.name.clone(),
                agent: desc.name.to_string(),
            });
        }
    }

    for desc in &phase.agents {
        for dep in &desc.depends_on {
            if !known.contains(dep) {
                return Err(MaestroError::UnknownDependency {
                    phase: phase.name.clone(),
                    agent: desc.name.to_string(),
                    dependency: dep.to_string(),
                });
            }
        }
    }

    let enabled: HashSet<&AgentId> = phase
        .agents
        .iter()
        .filter(|d| d.enabled)
        .map(|d| &d.name)
        .collect();

    let modes: HashMap<&AgentId, ExecutionMode> = phase
        .agents
        .iter()
        .map(|d| (&d.name, d.execution_mode))
        .collect();

    // Edge B -> A for "A depends on B", restricted to enabled agents.
    // Dependencies are deduplicated so a repeated entry cannot skew the
    // in-degree bookkeeping.
    let mut indegree: HashMap<AgentId, usize> = HashMap::new();
    let mut dependents: HashMap<AgentId, Vec<AgentId>> = HashMap::new();

    for desc in phase.agents.iter().filter(|d| d.enabled) {
        let deps: BTreeSet<&AgentId> = desc
            .depends_on
            .iter()
            .filter(|dep| enabled.contains(dep))
            .collect();

        indegree.insert(desc.name.clone(), deps.len());
        for dep in deps {
            dependents
                .entry((*dep).clone())
                .or_default()
                .push(desc.name.clone());
        }
    }

    let mut batches: Vec<Vec<AgentId>> = Vec::new();

    loop {
        let mut ready: Vec<AgentId> = indegree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(name, _)| name.clone())
            .collect();
        if ready.is_empty() {
            break;
        }
        ready.sort();

        let (parallel, sequential): (Vec<AgentId>, Vec<AgentId>) = ready
            .into_iter()
            .partition(|name| modes.get(name) == Some(&ExecutionMode::Parallel));

        let mut layer_batches: Vec<Vec<AgentId>> = Vec::new();
        if !parallel.is_empty() {
            layer_batches.push(parallel);
        }
        for name in sequential {
            layer_batches.push(vec![name]);
        }

        for batch in &layer_batches {
            for name in batch {
                indegree.remove(name);
                if let Some(deps) = dependents.get(name) {
                    for dependent in deps {
                        if let Some(deg) = indegree.get_mut(dependent) {
                            *deg = deg.saturating_sub(1);
                        }
                    }
                }
            }
        }

        batches.extend(layer_batches);
    }

    if !indegree.is_empty() {
        // Whatever could not be scheduled sits on (or behind) a cycle.
        let mut cycle: Vec<String> = indegree.keys().map(|n| n.to_string()).collect();
        cycle.sort();
        return Err(MaestroError::CyclicDependency {
            phase: phase.name.clone(),
            cycle,
        });
    }

    debug!(
        phase = %phase.name,
        batch_count = batches.len(),
        "resolved phase into batches"
    );

    Ok(batches)
}
