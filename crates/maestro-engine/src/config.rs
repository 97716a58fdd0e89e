//! Workflow definition loading.
//!
//! Workflows are authored as TOML mirroring the `Workflow` / `Phase` /
//! `AgentDescriptor` shape:
//!
//! ```toml
//! name = "traffic-pipeline"
//!
//! [[phases]]
//! name = "ingest"
//! require_all_succeed = true
//!
//! [[phases.agents]]
//! name = "camera-ingest"
//! depends_on = []
//! timeout_secs = 30
//! max_retries = 2
//! execution_mode = "parallel"
//! ```
//!
//! Omitted fields take the descriptor defaults: enabled, a 60s timeout,
//! no retries, parallel scheduling, `require_all_succeed = true`.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use maestro_contracts::{
    agent::{AgentDescriptor, AgentId, ExecutionMode, Phase, Workflow},
    error::{MaestroError, MaestroResult},
};

#[derive(Debug, Deserialize)]
pub struct WorkflowConfig {
    name: String,
    #[serde(default)]
    phases: Vec<PhaseConfig>,
}

#[derive(Debug, Deserialize)]
struct PhaseConfig {
    name: String,
    #[serde(default = "default_true")]
    require_all_succeed: bool,
    #[serde(default)]
    agents: Vec<AgentConfig>,
}

#[derive(Debug, Deserialize)]
struct AgentConfig {
    name: String,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
    #[serde(default)]
    max_retries: u32,
    #[serde(default)]
    execution_mode: ExecutionModeConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ExecutionModeConfig {
    #[default]
    Parallel,
    Sequential,
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    60
}

impl WorkflowConfig {
    /// Parse `s` as workflow TOML.
    pub fn from_toml_str(s: &str) -> MaestroResult<Self> {
        toml::from_str(s).map_err(|e| MaestroError::ConfigError {
            reason: format!("failed to parse workflow TOML: {}", e),
        })
    }

    /// Read the file at `path` and parse it as workflow TOML.
    pub fn from_file(path: &Path) -> MaestroResult<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| MaestroError::ConfigError {
                reason: format!("failed to read workflow file '{}': {}", path.display(), e),
            })?;
        Self::from_toml_str(&contents)
    }

    /// Convert the parsed definition into the runtime `Workflow` shape.
    pub fn into_workflow(self) -> Workflow {
        let phases = self
            .phases
            .into_iter()
            .map(|phase| Phase {
                name: phase.name,
                require_all_succeed: phase.require_all_succeed,
                agents: phase
                    .agents
                    .into_iter()
                    .map(|agent| AgentDescriptor {
                        name: AgentId::new(agent.name),
                        depends_on: agent.depends_on.into_iter().map(AgentId::new).collect(),
                        enabled: agent.enabled,
                        timeout: Duration::from_secs(agent.timeout_secs),
                        max_retries: agent.max_retries,
                        execution_mode: match agent.execution_mode {
                            ExecutionModeConfig::Parallel => ExecutionMode::Parallel,
                            ExecutionModeConfig::Sequential => ExecutionMode::Sequential,
                        },
                    })
                    .collect(),
            })
            .collect();

        let workflow = Workflow {
            name: self.name,
            phases,
        };
        debug!(workflow = %workflow.name, phases = workflow.phases.len(), "workflow loaded");
        workflow
    }
}
