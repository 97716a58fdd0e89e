//! Chained event and history types.
//!
//! `ChainedEvent` is a single entry in the per-entity hash chain — it wraps
//! a `TransitionRecord` with sequence numbering and the SHA-256 hashes that
//! make tampering detectable.  `EntityHistory` is the exported snapshot of
//! one entity's full chain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use maestro_contracts::entity::{EntityId, EntityType, TransitionRecord};

/// A single entry in the SHA-256 hash chain for one tracked entity.
///
/// Each event commits to the previous event via `prev_hash`, forming an
/// append-only chain per entity id.  Modifying any field — including those
/// of the embedded `record` — invalidates `this_hash` and every subsequent
/// `prev_hash`, which `verify_chain` detects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainedEvent {
    /// Monotonically increasing position in this entity's chain, starting
    /// at 0.  The entity's version is `sequence + 1`.
    pub sequence: u64,

    /// The accepted transition this event records.
    pub record: TransitionRecord,

    /// SHA-256 hash (hex) of the previous event, or `GENESIS_HASH` for the
    /// first event of the entity.
    pub prev_hash: String,

    /// SHA-256 hash (hex) of this event's canonical content.
    ///
    /// Computed by `hash_event()` over (entity_type, entity_id, sequence,
    /// prev_hash, canonical JSON of record).
    pub this_hash: String,
}

impl ChainedEvent {
    /// The sentinel `prev_hash` used for the first event in every chain.
    ///
    /// 64 hex zeros — a value that can never be the SHA-256 of real data,
    /// making genesis detection unambiguous.
    pub const GENESIS_HASH: &'static str =
        "0000000000000000000000000000000000000000000000000000000000000000";
}

/// An exported snapshot of one entity's full event chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityHistory {
    pub entity_type: EntityType,
    pub entity_id: EntityId,

    /// All events in chain order (sequence 0 first).
    pub events: Vec<ChainedEvent>,

    /// Wall-clock time (UTC) the snapshot was taken.
    pub exported_at: DateTime<Utc>,

    /// The `this_hash` of the last event.  Empty string if the chain is
    /// empty.
    pub terminal_hash: String,
}
