//! # maestro-state
//!
//! Entity lifecycle tracking for the MAESTRO orchestration pipeline: a
//! per-type transition-table validator (`StateMachine`) and an
//! event-sourced, hash-chained store (`StateStore`).
//!
//! The store is the single mutation path for tracked entities.  Writes
//! are validated before appending, the log holds accepted changes only,
//! and each entity id carries its own SHA-256 hash chain so tampering is
//! detectable after the fact.

pub mod chain;
pub mod event;
pub mod machine;
pub mod store;

pub use chain::{hash_event, verify_chain};
pub use event::{ChainedEvent, EntityHistory};
pub use machine::{StateMachine, TransitionTable};
pub use store::StateStore;
