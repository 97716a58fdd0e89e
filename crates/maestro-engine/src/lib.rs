//! # maestro-engine
//!
//! The MAESTRO execution core: the agent contract and registry, the
//! per-run context, the circuit breaker, the batch execution engine, and
//! the orchestrator that drives whole workflows.
//!
//! The pipeline for one run:
//!
//!   Workflow → per-phase dependency batches → bounded concurrent
//!   invocation (deadline, retry, breaker) → RunResult
//!
//! Agents are external collaborators behind the [`traits::Agent`] seam;
//! the engine only ever observes their terminal outcomes and hands them
//! read-only run snapshots and the state store.

pub mod breaker;
pub mod config;
pub mod context;
pub mod executor;
pub mod orchestrator;
pub mod registry;
pub mod traits;

pub use breaker::{Admission, BreakerConfig, CircuitBreaker};
pub use config::WorkflowConfig;
pub use context::{RunContext, RunSnapshot};
pub use executor::{EngineConfig, ExecutionEngine};
pub use orchestrator::Orchestrator;
pub use registry::AgentRegistry;
pub use traits::Agent;
