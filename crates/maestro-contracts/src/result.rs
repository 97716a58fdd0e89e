//! Run-level and agent-level execution results.
//!
//! `AgentResult` is what the execution engine produces for every scheduled
//! agent. `RunResult` is what the orchestrator returns to the caller —
//! it always enumerates every agent of every executed phase, so a failed
//! run is diagnosable without separate log correlation.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::{AgentId, RunId};

/// The terminal status of a single agent invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// The agent completed and produced an output.
    Success,
    /// The agent failed, after exhausting any retry budget.
    Failed,
    /// The agent was never invoked (circuit open, dependency failure,
    /// disabled, phase aborted, run canceled). The reason is in
    /// `AgentResult::error`.
    Skipped,
    /// The agent exceeded its deadline. The invocation was asked to cancel
    /// cooperatively and left to drain in the background.
    Timeout,
}

impl AgentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentStatus::Success => "success",
            AgentStatus::Failed => "failed",
            AgentStatus::Skipped => "skipped",
            AgentStatus::Timeout => "timeout",
        }
    }
}

/// The outcome of one agent invocation within a run.
///
/// Produced exactly once per scheduled agent per run and never mutated
/// after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    /// The agent this result belongs to.
    pub agent: AgentId,
    /// Terminal status.
    pub status: AgentStatus,
    /// The output payload on success; absent otherwise.
    pub output: Option<Value>,
    /// Error detail on failure/timeout, or the skip reason.
    pub error: Option<String>,
    /// Wall-clock duration of the invocation, including backoff delays.
    pub duration: Duration,
    /// Number of attempts made (0 for skipped agents).
    pub attempts: u32,
}

impl AgentResult {
    /// A skipped result with the given reason. Duration is zero and no
    /// attempt was made.
    pub fn skipped(agent: AgentId, reason: impl Into<String>) -> Self {
        Self {
            agent,
            status: AgentStatus::Skipped,
            output: None,
            error: Some(reason.into()),
            duration: Duration::ZERO,
            attempts: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == AgentStatus::Success
    }
}

/// The overall outcome of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed,
    Canceled,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Canceled => "canceled",
        }
    }
}

/// Per-phase outcome: one `AgentResult` per scheduled agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseSummary {
    /// The phase name from the workflow definition.
    pub phase: String,
    /// Terminal results, one per agent of the phase.
    pub results: Vec<AgentResult>,
}

impl PhaseSummary {
    /// True when no agent of the phase ended `Failed` or `Timeout`.
    pub fn all_succeeded_or_skipped(&self) -> bool {
        self.results
            .iter()
            .all(|r| matches!(r.status, AgentStatus::Success | AgentStatus::Skipped))
    }

    /// The first failed or timed-out result, if any.
    pub fn first_failure(&self) -> Option<&AgentResult> {
        self.results
            .iter()
            .find(|r| matches!(r.status, AgentStatus::Failed | AgentStatus::Timeout))
    }
}

/// What `Orchestrator::run_workflow()` returns to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// The run this result describes.
    pub run_id: RunId,
    /// Overall status of the run.
    pub status: RunStatus,
    /// Summaries for every phase that was started, in execution order.
    pub phases: Vec<PhaseSummary>,
    /// Total wall-clock duration of the run.
    pub duration: Duration,
    /// The first fatal error, when `status` is not `Succeeded`.
    pub first_error: Option<String>,
}

impl RunResult {
    /// Look up the terminal result for an agent anywhere in the run.
    pub fn result_for(&self, agent: &AgentId) -> Option<&AgentResult> {
        self.phases
            .iter()
            .flat_map(|p| p.results.iter())
            .find(|r| &r.agent == agent)
    }
}
