//! The event-sourced state store.
//!
//! `StateStore` is the only path through which agents read or mutate
//! tracked entity lifecycle.  Every write is validated against the
//! `StateMachine` before anything is appended — the event log records
//! accepted changes only, never attempts.  Each entity id carries its own
//! SHA-256 hash chain, and the materialized `StateEntity` is maintained
//! incrementally so `current_state()` is an O(1) lookup rather than a
//! fold over the log.
//!
//! # Concurrency
//!
//! Writes for one entity id are serialized by a per-id mutex, so events
//! for a single id are totally ordered.  Distinct ids take distinct locks
//! and append fully concurrently.  When two agents race on the same id,
//! the first to acquire the lock wins; the loser revalidates against the
//! advanced current state and is rejected if its transition no longer
//! applies (last-validator-wins, not last-writer-wins).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use maestro_contracts::{
    agent::AgentId,
    entity::{EntityId, EntityType, StateEntity, TransitionRecord},
    error::{MaestroError, MaestroResult},
};

use crate::{
    chain::{hash_event, verify_chain},
    event::{ChainedEvent, EntityHistory},
    machine::StateMachine,
};

// ── Per-entity chain state ────────────────────────────────────────────────────

/// The mutable interior for one entity id: its event chain and the
/// materialized view folded over it.
struct EntityChain {
    /// Materialized current state.  `None` until the first event is
    /// accepted — a shell created by a rejected write counts as absent.
    entity: Option<StateEntity>,

    /// All accepted events, in append order.
    events: Vec<ChainedEvent>,

    /// The `this_hash` of the last event, or `GENESIS_HASH` before any
    /// event has been appended.
    last_hash: String,
}

impl EntityChain {
    fn empty() -> Self {
        Self {
            entity: None,
            events: Vec::new(),
            last_hash: ChainedEvent::GENESIS_HASH.to_string(),
        }
    }
}

type ChainKey = (EntityType, EntityId);

// ── Public store ──────────────────────────────────────────────────────────────

/// An in-memory, append-only entity state store with per-id hash chains.
///
/// Shared across agents via `Arc`; all methods take `&self`.
pub struct StateStore {
    machine: Arc<StateMachine>,
    chains: RwLock<HashMap<ChainKey, Arc<Mutex<EntityChain>>>>,
}

impl StateStore {
    pub fn new(machine: Arc<StateMachine>) -> Self {
        Self {
            machine,
            chains: RwLock::new(HashMap::new()),
        }
    }

    /// Get or create the per-id chain handle.
    ///
    /// The outer map lock is held only long enough to clone the `Arc`;
    /// validation and appending happen under the per-id mutex so distinct
    /// ids never contend.
    fn chain_handle(
        &self,
        entity_type: &EntityType,
        entity_id: &EntityId,
    ) -> MaestroResult<Arc<Mutex<EntityChain>>> {
        let key = (entity_type.clone(), entity_id.clone());

        {
            let chains = self.chains.read().map_err(lock_poisoned)?;
            if let Some(chain) = chains.get(&key) {
                return Ok(Arc::clone(chain));
            }
        }

        let mut chains = self.chains.write().map_err(lock_poisoned)?;
        let chain = chains
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(EntityChain::empty())));
        Ok(Arc::clone(chain))
    }

    /// Record a lifecycle transition for an entity.
    ///
    /// For an id with no accepted events yet, `to_state` must equal the
    /// entity type's declared initial state; the creation event is
    /// recorded with `from_state == to_state` and yields version 1.  For
    /// an existing entity, the transition is validated from its *current*
    /// status — a stale writer that raced another agent is rejected with
    /// `InvalidTransition`.
    ///
    /// On rejection nothing is appended and the materialized view is
    /// untouched.
    pub fn record_transition(
        &self,
        entity_type: &EntityType,
        entity_id: &EntityId,
        to_state: &str,
        causing_agent: &AgentId,
        metadata: Value,
    ) -> MaestroResult<StateEntity> {
        // Fail before taking any per-id lock if the type is untracked.
        let initial = self.machine.initial_state(entity_type)?.to_string();

        let handle = self.chain_handle(entity_type, entity_id)?;
        let mut chain = handle.lock().map_err(lock_poisoned)?;

        let from_state = match &chain.entity {
            Some(entity) => entity.status.clone(),
            None => initial.clone(),
        };

        if chain.entity.is_none() {
            // Creation: the first accepted event must land the entity in
            // its declared initial state.
            if to_state != initial {
                warn!(
                    entity_type = %entity_type,
                    entity_id = %entity_id,
                    to_state = %to_state,
                    initial = %initial,
                    "rejected creation event targeting non-initial state"
                );
                return Err(MaestroError::InvalidTransition {
                    entity_type: entity_type.to_string(),
                    from: initial,
                    to: to_state.to_string(),
                });
            }
        } else {
            self.machine.validate(entity_type, &from_state, to_state)?;
        }

        let now = Utc::now();
        let record = TransitionRecord {
            entity_type: entity_type.clone(),
            entity_id: entity_id.clone(),
            from_state,
            to_state: to_state.to_string(),
            causing_agent: causing_agent.clone(),
            metadata,
            timestamp: now,
        };

        let sequence = chain.events.len() as u64;
        let prev_hash = chain.last_hash.clone();
        let this_hash = hash_event(entity_type, entity_id, sequence, &record, &prev_hash);

        chain.events.push(ChainedEvent {
            sequence,
            record,
            prev_hash,
            this_hash: this_hash.clone(),
        });
        chain.last_hash = this_hash;

        let entity = StateEntity {
            entity_type: entity_type.clone(),
            entity_id: entity_id.clone(),
            status: to_state.to_string(),
            version: sequence + 1,
            updated_at: now,
        };
        chain.entity = Some(entity.clone());

        debug!(
            entity_type = %entity_type,
            entity_id = %entity_id,
            status = %entity.status,
            version = entity.version,
            causing_agent = %causing_agent,
            "transition recorded"
        );

        Ok(entity)
    }

    /// The materialized current state of an entity, or `None` if no event
    /// has ever been accepted for this id.
    pub fn current_state(
        &self,
        entity_type: &EntityType,
        entity_id: &EntityId,
    ) -> Option<StateEntity> {
        let chains = self.chains.read().ok()?;
        let handle = chains.get(&(entity_type.clone(), entity_id.clone()))?;
        let chain = handle.lock().ok()?;
        chain.entity.clone()
    }

    /// True when the entity exists and its current status is one of the
    /// type's terminal states.
    pub fn is_terminal(&self, entity_type: &EntityType, entity_id: &EntityId) -> bool {
        self.current_state(entity_type, entity_id)
            .map(|e| self.machine.is_terminal(entity_type, &e.status))
            .unwrap_or(false)
    }

    /// The ordered event slice for one entity id.  Empty if the id has no
    /// accepted events.
    pub fn history(&self, entity_type: &EntityType, entity_id: &EntityId) -> Vec<ChainedEvent> {
        let Ok(chains) = self.chains.read() else {
            return Vec::new();
        };
        let Some(handle) = chains.get(&(entity_type.clone(), entity_id.clone())) else {
            return Vec::new();
        };
        let Ok(chain) = handle.lock() else {
            return Vec::new();
        };
        chain.events.clone()
    }

    /// Export one entity's full chain as a sealed snapshot.
    pub fn export_history(
        &self,
        entity_type: &EntityType,
        entity_id: &EntityId,
    ) -> EntityHistory {
        let events = self.history(entity_type, entity_id);
        let terminal_hash = events
            .last()
            .map(|e| e.this_hash.clone())
            .unwrap_or_default();

        EntityHistory {
            entity_type: entity_type.clone(),
            entity_id: entity_id.clone(),
            events,
            exported_at: Utc::now(),
            terminal_hash,
        }
    }

    /// Rebuild an entity's state purely by folding its event slice,
    /// ignoring the materialized view.
    ///
    /// Exists to make the replay property checkable: for every id,
    /// `replay()` must equal `current_state()`.
    pub fn replay(&self, entity_type: &EntityType, entity_id: &EntityId) -> Option<StateEntity> {
        let events = self.history(entity_type, entity_id);
        let last = events.last()?;

        Some(StateEntity {
            entity_type: entity_type.clone(),
            entity_id: entity_id.clone(),
            status: last.record.to_state.clone(),
            version: events.len() as u64,
            updated_at: last.record.timestamp,
        })
    }

    /// Verify the hash chain for one entity id.  An id with no events is
    /// trivially valid.
    pub fn verify_integrity(&self, entity_type: &EntityType, entity_id: &EntityId) -> bool {
        let events = self.history(entity_type, entity_id);
        verify_chain(entity_type, entity_id, &events)
    }

    /// All ids of a given type with at least one accepted event, sorted.
    pub fn entity_ids(&self, entity_type: &EntityType) -> Vec<EntityId> {
        let Ok(chains) = self.chains.read() else {
            return Vec::new();
        };
        let mut ids: Vec<EntityId> = chains
            .iter()
            .filter(|((t, _), handle)| {
                t == entity_type
                    && handle
                        .lock()
                        .map(|chain| chain.entity.is_some())
                        .unwrap_or(false)
            })
            .map(|((_, id), _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}

fn lock_poisoned<T>(e: std::sync::PoisonError<T>) -> MaestroError {
    MaestroError::StoreWriteFailed {
        reason: format!("state store lock poisoned: {}", e),
    }
}
