//! # maestro-contracts
//!
//! Shared types, schemas, and contracts for the MAESTRO orchestration
//! runtime.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate — only data definitions and error types.

pub mod agent;
pub mod entity;
pub mod error;
pub mod result;
