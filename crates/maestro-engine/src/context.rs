//! Per-run mutable context and the read-only snapshots handed to agents.
//!
//! `RunContext` is owned exclusively by the execution engine for the
//! duration of one run — the single writer. Agents never see it directly:
//! before each batch the engine takes a `RunSnapshot`, an immutable,
//! cheaply-clonable view in which every earlier batch's results are fully
//! materialized. This gives dependency-respecting visibility without
//! agents synchronizing among themselves.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use maestro_contracts::{
    agent::{AgentId, RunId},
    result::AgentResult,
};
use maestro_state::StateStore;

/// The engine-owned mutable state of one workflow run.
pub struct RunContext {
    pub run_id: RunId,
    /// Workflow name, for log lines and summaries.
    pub workflow: String,
    pub started_at: DateTime<Utc>,
    /// Monotonic start instant, used for duration accounting.
    pub started_instant: Instant,
    /// Terminal results accumulated so far, one per scheduled agent.
    results: HashMap<AgentId, AgentResult>,
    store: Arc<StateStore>,
    /// Run-level cancellation: set by `Orchestrator::cancel()`, observed
    /// at batch boundaries and before each retry attempt.
    cancel: CancellationToken,
}

impl RunContext {
    pub fn new(run_id: RunId, workflow: impl Into<String>, store: Arc<StateStore>) -> Self {
        Self {
            run_id,
            workflow: workflow.into(),
            started_at: Utc::now(),
            started_instant: Instant::now(),
            results: HashMap::new(),
            store,
            cancel: CancellationToken::new(),
        }
    }

    /// The run-level cancellation token.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Append one terminal result. Each agent gets exactly one result per
    /// run; a second append for the same agent replaces nothing and is a
    /// programming error upstream, so the first write wins.
    pub fn record(&mut self, result: AgentResult) {
        self.results.entry(result.agent.clone()).or_insert(result);
    }

    pub fn result_of(&self, agent: &AgentId) -> Option<&AgentResult> {
        self.results.get(agent)
    }

    /// True when the agent has a terminal result with status `Success`.
    pub fn succeeded(&self, agent: &AgentId) -> bool {
        self.result_of(agent).map(|r| r.is_success()).unwrap_or(false)
    }

    pub fn store(&self) -> Arc<StateStore> {
        Arc::clone(&self.store)
    }

    /// Freeze the current results into a read-only snapshot for the next
    /// batch. The snapshot's cancellation token is the run-level token;
    /// the engine swaps in a per-invocation child before each attempt.
    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            run_id: self.run_id,
            started_at: self.started_at,
            results: Arc::new(self.results.clone()),
            store: Arc::clone(&self.store),
            cancel: self.cancel.clone(),
        }
    }
}

/// A read-only view of the run, as agents see it.
///
/// All heavy fields sit behind `Arc`, so cloning one per invocation is
/// cheap. The `cancel` token is cooperative: the engine cancels it when
/// the invocation's deadline passes or the run is canceled, and agents
/// check it at their own checkpoints.
#[derive(Clone)]
pub struct RunSnapshot {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    results: Arc<HashMap<AgentId, AgentResult>>,
    store: Arc<StateStore>,
    cancel: CancellationToken,
}

impl RunSnapshot {
    /// The successful output of an earlier agent, if it produced one.
    ///
    /// Returns `None` for agents not yet terminal (batch siblings), for
    /// agents that did not succeed, and for unknown names.
    pub fn output_of(&self, agent: &AgentId) -> Option<&Value> {
        self.results
            .get(agent)
            .filter(|r| r.is_success())
            .and_then(|r| r.output.as_ref())
    }

    /// The terminal result of an earlier agent.
    pub fn result_of(&self, agent: &AgentId) -> Option<&AgentResult> {
        self.results.get(agent)
    }

    /// The state store handle — the only sanctioned path for reading or
    /// mutating tracked entity lifecycle.
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// True once cancellation has been requested for this invocation,
    /// either by deadline expiry or run-level cancel.
    pub fn is_canceled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The cooperative cancellation token for this invocation, for agents
    /// that want to `select!` on it during long waits.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// A copy of this snapshot bound to a per-invocation token.
    pub(crate) fn for_invocation(&self, cancel: CancellationToken) -> RunSnapshot {
        RunSnapshot {
            cancel,
            ..self.clone()
        }
    }
}
