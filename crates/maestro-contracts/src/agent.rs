//! Agent identity and workflow definition types.
//!
//! These types define the data flowing through the MAESTRO scheduling
//! pipeline. They are intentionally minimal — MAESTRO does not prescribe
//! agent internals, only the shape of a phase-ordered workflow.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Stable, human-readable identifier for an agent.
///
/// Used across workflow definitions, dependency edges, run results, and
/// transition events. Example: AgentId("incident-detector")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    /// Construct an agent id from any string-like value.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a single workflow run.
///
/// Every call to `Orchestrator::run_workflow()` operates within a run
/// identified by this UUID, which appears in every result and log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub uuid::Uuid);

impl RunId {
    /// Create a new, unique run ID.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// How an agent is scheduled relative to its batch siblings.
///
/// `Parallel` agents in the same dependency layer share one concurrent
/// batch. A `Sequential` agent always runs in a batch of its own, after
/// the parallel members of its layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Parallel,
    Sequential,
}

/// The declared shape of one unit of work within a phase.
///
/// Descriptors are immutable once a run starts: the orchestrator snapshots
/// the workflow definition up front and never re-reads it mid-run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDescriptor {
    /// The agent this descriptor schedules. Must be registered.
    pub name: AgentId,
    /// Agents in the same phase that must terminate successfully before
    /// this one is invoked.
    pub depends_on: Vec<AgentId>,
    /// Disabled agents are never invoked; they appear in results as skipped.
    pub enabled: bool,
    /// Deadline for a single invocation attempt.
    pub timeout: Duration,
    /// Additional attempts allowed after a transient failure.
    pub max_retries: u32,
    /// Scheduling mode relative to batch siblings.
    pub execution_mode: ExecutionMode,
}

impl AgentDescriptor {
    /// A descriptor with no dependencies, enabled, a 60s timeout, no
    /// retries, and parallel scheduling.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: AgentId::new(name),
            depends_on: Vec::new(),
            enabled: true,
            timeout: Duration::from_secs(60),
            max_retries: 0,
            execution_mode: ExecutionMode::Parallel,
        }
    }

    pub fn depends_on(mut self, deps: &[&str]) -> Self {
        self.depends_on = deps.iter().map(|d| AgentId::new(*d)).collect();
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn sequential(mut self) -> Self {
        self.execution_mode = ExecutionMode::Sequential;
        self
    }
}

/// An ordered stage of a run.
///
/// Phases execute strictly in declaration order; a phase does not start
/// until every agent of the previous phase has a terminal result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase {
    /// Phase name, used in summaries and log lines.
    pub name: String,
    /// The agents scheduled within this phase.
    pub agents: Vec<AgentDescriptor>,
    /// When true, a failed or timed-out agent aborts the rest of the run.
    pub require_all_succeed: bool,
}

impl Phase {
    pub fn new(name: impl Into<String>, agents: Vec<AgentDescriptor>) -> Self {
        Self {
            name: name.into(),
            agents,
            require_all_succeed: true,
        }
    }

    pub fn tolerate_failures(mut self) -> Self {
        self.require_all_succeed = false;
        self
    }
}

/// A complete workflow: an ordered list of phases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,
    pub phases: Vec<Phase>,
}

impl Workflow {
    pub fn new(name: impl Into<String>, phases: Vec<Phase>) -> Self {
        Self {
            name: name.into(),
            phases,
        }
    }
}
