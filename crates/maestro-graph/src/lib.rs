//! # maestro-graph
//!
//! Dependency graph resolution for MAESTRO phase scheduling.
//!
//! This crate provides [`resolve_batches`], which turns one phase's agent
//! list and `depends_on` edges into a topologically ordered sequence of
//! concurrent batches, failing fast on cycles and unknown names.

pub mod resolver;

pub use resolver::resolve_batches;
