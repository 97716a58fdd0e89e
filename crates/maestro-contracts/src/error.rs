//! Runtime error types for the MAESTRO orchestration pipeline.
//!
//! Two layers of errors exist. `AgentError` is what an agent itself
//! returns from `run()` — the engine converts it into an `AgentResult`
//! status and it never escapes the execution boundary. `MaestroError` is
//! the unified error type for everything structural: malformed workflows,
//! rejected state transitions, configuration defects. Structural errors
//! are never retried.

use thiserror::Error;

use crate::agent::AgentId;

/// A failure reported by an agent's own logic.
///
/// The distinction drives retry policy: `Transient` failures are retried
/// up to the descriptor's `max_retries` with exponential backoff, `Fatal`
/// failures are not. Both count toward the agent's circuit breaker.
#[derive(Debug, Error)]
pub enum AgentError {
    /// A failure that may resolve on retry (network blip, busy upstream).
    #[error("transient agent failure: {0}")]
    Transient(String),

    /// A failure retrying cannot fix (bad input, broken invariant).
    #[error("fatal agent failure: {0}")]
    Fatal(String),
}

impl AgentError {
    pub fn is_transient(&self) -> bool {
        matches!(self, AgentError::Transient(_))
    }
}

/// The unified error type for the MAESTRO runtime.
#[derive(Debug, Error)]
pub enum MaestroError {
    /// A phase's dependency graph admits no topological order.
    ///
    /// Raised before any agent executes — a malformed phase is never
    /// partially run.
    #[error("cyclic dependency in phase '{phase}': cycle through {cycle:?}")]
    CyclicDependency { phase: String, cycle: Vec<String> },

    /// An agent declares a dependency on a name not present in its phase.
    #[error("agent '{agent}' in phase '{phase}' depends on unknown agent '{dependency}'")]
    UnknownDependency {
        phase: String,
        agent: String,
        dependency: String,
    },

    /// The same agent name appears twice within one phase.
    #[error("agent '{agent}' appears more than once in phase '{phase}'")]
    DuplicateAgent { phase: String, agent: String },

    /// A workflow references an agent name the registry cannot build.
    #[error("no agent registered under name '{0}'")]
    UnknownAgent(String),

    /// A requested transition is not legal from the entity's current state.
    ///
    /// Nothing is appended to the event log; the materialized view is
    /// untouched. Surfaced to the calling agent, which decides whether
    /// this is fatal for its own work.
    #[error("invalid transition for entity type '{entity_type}': {from} -> {to}")]
    InvalidTransition {
        entity_type: String,
        from: String,
        to: String,
    },

    /// No transition table is defined for the entity type.
    #[error("unknown entity type '{0}'")]
    UnknownEntityType(String),

    /// A state name does not appear in the entity type's transition table.
    #[error("unknown state '{state}' for entity type '{entity_type}'")]
    UnknownState {
        entity_type: String,
        state: String,
    },

    /// The circuit for this agent is open; the invocation was skipped.
    ///
    /// Recorded as a skipped result, never as a run failure.
    #[error("circuit open for agent '{0}'")]
    CircuitOpen(AgentId),

    /// The state store could not append an accepted event.
    #[error("state store write failed: {reason}")]
    StoreWriteFailed { reason: String },

    /// The engine itself failed in a way no retry policy covers, e.g. a
    /// poisoned lock or a worker task that could not be joined.
    #[error("internal engine failure: {reason}")]
    Internal { reason: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },
}

/// Convenience alias used throughout the MAESTRO crates.
pub type MaestroResult<T> = Result<T, MaestroError>;
