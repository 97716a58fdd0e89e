//! The agent contract: the seam between the MAESTRO core and the
//! collaborator agents it schedules.
//!
//! The core never branches on agent identity. Everything it asks of an
//! agent is expressed here — run, name, healthy — and everything an agent
//! may observe of a run arrives through the read-only `RunSnapshot`.

use async_trait::async_trait;
use serde_json::Value;

use maestro_contracts::error::AgentError;

use crate::context::RunSnapshot;

/// One unit of schedulable work.
///
/// Implementations are external collaborators — vision inference, REST
/// calls to a context broker, graph-store inserts. The engine does not
/// know or care what an agent does internally; it only requires this
/// contract, and that side effects tolerate retries (an invocation that
/// fails transiently may be re-run per its descriptor's retry budget).
#[async_trait]
pub trait Agent: Send + Sync {
    /// Execute the agent's work for one invocation attempt.
    ///
    /// `ctx` is a read-only snapshot of the run taken when this agent's
    /// batch started: earlier batches' outputs are fully visible, batch
    /// siblings' outputs never are. The snapshot also carries the state
    /// store handle — the only sanctioned path for reading or mutating
    /// tracked entity lifecycle — and a cancellation token the agent
    /// should check at its own checkpoints.
    ///
    /// Return `AgentError::Transient` for failures that may resolve on
    /// retry and `AgentError::Fatal` for failures that will not. Both
    /// count toward this agent's circuit breaker.
    async fn run(&self, ctx: &RunSnapshot) -> Result<Value, AgentError>;

    /// The stable name this agent registers and is scheduled under.
    fn name(&self) -> &str;

    /// Liveness self-check, polled before each invocation.
    ///
    /// Returning false marks the attempt as a transient failure without
    /// calling `run()` — an unhealthy upstream may recover, so the retry
    /// budget and circuit breaker apply normally.
    fn healthy(&self) -> bool {
        true
    }
}
