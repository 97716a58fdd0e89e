//! Tracked entity lifecycle types.
//!
//! A `StateEntity` is the materialized current state of one tracked domain
//! object (a sensor device, a detected incident, a congestion zone). The
//! ordered sequence of `TransitionRecord`s for its id is the source of
//! truth; the entity is a fold over that sequence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::AgentId;

/// The kind of tracked entity, e.g. "device", "incident", "zone".
///
/// Each entity type has its own transition table in the state machine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityType(pub String);

impl EntityType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one entity instance within its type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The materialized current state of one tracked entity.
///
/// Created on the first accepted event for an id, updated on every
/// subsequent accepted transition, never physically deleted — a terminal
/// status simply admits no further transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateEntity {
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    /// Current status, drawn from the type's finite state set.
    pub status: String,
    /// Monotonic version: equals the count of accepted events for this id.
    pub version: u64,
    /// Wall-clock time (UTC) of the last accepted transition.
    pub updated_at: DateTime<Utc>,
}

/// One accepted lifecycle transition, as appended to the event log.
///
/// The log contains only accepted changes — rejected attempts are never
/// recorded. For the creation event of an entity, `from_state` equals
/// `to_state` (the type's declared initial state).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub from_state: String,
    pub to_state: String,
    /// The agent that recorded this transition.
    pub causing_agent: AgentId,
    /// Arbitrary JSON carried alongside the transition. Never inspected
    /// by the store.
    pub metadata: Value,
    /// Wall-clock time (UTC) the transition was accepted.
    pub timestamp: DateTime<Utc>,
}
