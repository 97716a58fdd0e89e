//! Per-entity-type transition tables and the validation engine.
//!
//! Each entity type has a finite state set, a declared initial state, a
//! set of terminal states, and a map from state to its legal successors.
//! `validate()` is a pure function: unknown entity types and unknown
//! states are rejected, never silently allowed, and re-entrant transitions
//! (`from == to`) are legal only when explicitly listed.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use maestro_contracts::{
    entity::EntityType,
    error::{MaestroError, MaestroResult},
};

/// The transition table for one entity type.
#[derive(Debug, Clone)]
pub struct TransitionTable {
    /// The state every entity of this type is created in.
    pub initial: String,
    /// State → set of legal next states. A state with no entry (or an
    /// empty set) admits no outgoing transitions.
    pub transitions: HashMap<String, BTreeSet<String>>,
    /// Terminal states: reachable, but with no outgoing transitions.
    pub terminal: BTreeSet<String>,
}

impl TransitionTable {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            initial: initial.into(),
            transitions: HashMap::new(),
            terminal: BTreeSet::new(),
        }
    }

    /// Declare the legal successors of `from`. Replaces prior entries.
    pub fn allow(mut self, from: impl Into<String>, to: &[&str]) -> Self {
        self.transitions.insert(
            from.into(),
            to.iter().map(|s| (*s).to_string()).collect(),
        );
        self
    }

    /// Mark states as terminal.
    pub fn terminal(mut self, states: &[&str]) -> Self {
        self.terminal
            .extend(states.iter().map(|s| (*s).to_string()));
        self
    }

    /// All states this table knows about: the initial state, every source
    /// state, every target state, and every terminal state.
    fn known_states(&self) -> BTreeSet<&str> {
        let mut states: BTreeSet<&str> = BTreeSet::new();
        states.insert(self.initial.as_str());
        for (from, tos) in &self.transitions {
            states.insert(from.as_str());
            states.extend(tos.iter().map(|s| s.as_str()));
        }
        states.extend(self.terminal.iter().map(|s| s.as_str()));
        states
    }

    fn knows(&self, state: &str) -> bool {
        self.known_states().contains(state)
    }
}

// ── TOML configuration schema ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct MachineConfig {
    entities: HashMap<String, EntityTypeConfig>,
}

#[derive(Debug, Deserialize)]
struct EntityTypeConfig {
    initial: String,
    #[serde(default)]
    terminal: Vec<String>,
    #[serde(default)]
    transitions: HashMap<String, Vec<String>>,
}

// ── State machine engine ──────────────────────────────────────────────────────

/// Holds the transition table for every tracked entity type and validates
/// transitions against them.
///
/// Built once at startup (programmatically or from TOML) and shared
/// read-only with the state store. Tables are validated at definition
/// time: a terminal state with outgoing transitions is a configuration
/// defect, not something to discover at runtime.
#[derive(Debug, Default)]
pub struct StateMachine {
    tables: HashMap<EntityType, TransitionTable>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the transition table for an entity type.
    ///
    /// Rejects tables where a terminal state has outgoing transitions.
    pub fn define(
        &mut self,
        entity_type: EntityType,
        table: TransitionTable,
    ) -> MaestroResult<()> {
        for term in &table.terminal {
            if table
                .transitions
                .get(term)
                .map(|tos| !tos.is_empty())
                .unwrap_or(false)
            {
                return Err(MaestroError::ConfigError {
                    reason: format!(
                        "terminal state '{}' of entity type '{}' declares outgoing transitions",
                        term, entity_type
                    ),
                });
            }
        }

        debug!(
            entity_type = %entity_type,
            initial = %table.initial,
            state_count = table.known_states().len(),
            "transition table registered"
        );
        self.tables.insert(entity_type, table);
        Ok(())
    }

    /// Parse `s` as TOML and build a `StateMachine`.
    ///
    /// Returns `MaestroError::ConfigError` if the TOML is malformed, does
    /// not match the expected schema, or defines an incoherent table.
    pub fn from_toml_str(s: &str) -> MaestroResult<Self> {
        let config: MachineConfig =
            toml::from_str(s).map_err(|e| MaestroError::ConfigError {
                reason: format!("failed to parse transition table TOML: {}", e),
            })?;

        let mut machine = Self::new();
        for (type_name, entity) in config.entities {
            let mut table = TransitionTable::new(entity.initial);
            table.terminal = entity.terminal.into_iter().collect();
            for (from, tos) in entity.transitions {
                table.transitions.insert(from, tos.into_iter().collect());
            }
            machine.define(EntityType::new(type_name), table)?;
        }
        Ok(machine)
    }

    /// Read the file at `path` and parse it as transition table TOML.
    pub fn from_file(path: &Path) -> MaestroResult<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| MaestroError::ConfigError {
                reason: format!(
                    "failed to read transition table file '{}': {}",
                    path.display(),
                    e
                ),
            })?;
        Self::from_toml_str(&contents)
    }

    fn table(&self, entity_type: &EntityType) -> MaestroResult<&TransitionTable> {
        self.tables
            .get(entity_type)
            .ok_or_else(|| MaestroError::UnknownEntityType(entity_type.to_string()))
    }

    /// The declared initial state for an entity type.
    pub fn initial_state(&self, entity_type: &EntityType) -> MaestroResult<&str> {
        Ok(self.table(entity_type)?.initial.as_str())
    }

    /// True when `state` is a terminal state of `entity_type`.
    pub fn is_terminal(&self, entity_type: &EntityType, state: &str) -> bool {
        self.tables
            .get(entity_type)
            .map(|t| t.terminal.contains(state))
            .unwrap_or(false)
    }

    /// Validate that `from → to` is legal for `entity_type`.
    ///
    /// Pure: no state is read or written here. Unknown entity types and
    /// unknown states produce their own errors so configuration defects
    /// are distinguishable from merely-illegal transitions.
    pub fn validate(
        &self,
        entity_type: &EntityType,
        from: &str,
        to: &str,
    ) -> MaestroResult<()> {
        let table = self.table(entity_type)?;

        for state in [from, to] {
            if !table.knows(state) {
                return Err(MaestroError::UnknownState {
                    entity_type: entity_type.to_string(),
                    state: state.to_string(),
                });
            }
        }

        let allowed = table
            .transitions
            .get(from)
            .map(|tos| tos.contains(to))
            .unwrap_or(false);

        if allowed {
            Ok(())
        } else {
            Err(MaestroError::InvalidTransition {
                entity_type: entity_type.to_string(),
                from: from.to_string(),
                to: to.to_string(),
            })
        }
    }
}
