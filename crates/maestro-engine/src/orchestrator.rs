//! The orchestrator: the public entry point for running workflows.
//!
//! Drives phases strictly in declaration order through the execution
//! engine, accumulates per-agent results, and returns a `RunResult` that
//! enumerates a terminal status for every agent of every phase — aborted
//! and canceled phases included — so a failed run is diagnosable from the
//! result alone.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use maestro_contracts::{
    agent::{Phase, RunId, Workflow},
    error::{MaestroError, MaestroResult},
    result::{AgentResult, PhaseSummary, RunResult, RunStatus},
};
use maestro_graph::resolve_batches;
use maestro_state::StateStore;

use crate::breaker::{BreakerConfig, CircuitBreaker};
use crate::context::RunContext;
use crate::executor::{EngineConfig, ExecutionEngine};
use crate::registry::AgentRegistry;

/// Runs workflows and tracks in-flight runs for cancellation.
///
/// One orchestrator per process is the expected shape: circuit state
/// lives in its engine and persists across runs, and `cancel()` can be
/// called from any task holding a clone of the `Arc`.
pub struct Orchestrator {
    engine: ExecutionEngine,
    registry: Arc<AgentRegistry>,
    store: Arc<StateStore>,
    active: Mutex<HashMap<RunId, CancellationToken>>,
}

impl Orchestrator {
    /// An orchestrator with default engine and breaker tunables.
    pub fn new(registry: Arc<AgentRegistry>, store: Arc<StateStore>) -> Self {
        Self::with_config(
            EngineConfig::default(),
            BreakerConfig::default(),
            registry,
            store,
        )
    }

    pub fn with_config(
        engine_config: EngineConfig,
        breaker_config: BreakerConfig,
        registry: Arc<AgentRegistry>,
        store: Arc<StateStore>,
    ) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(breaker_config));
        Self {
            engine: ExecutionEngine::new(engine_config, Arc::clone(&registry), breaker),
            registry,
            store,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Check a workflow for structural defects without running anything:
    /// every phase must resolve to batches and every enabled agent must
    /// be registered.
    fn validate(&self, workflow: &Workflow) -> MaestroResult<()> {
        for phase in &workflow.phases {
            resolve_batches(phase)?;
            for descriptor in phase.agents.iter().filter(|d| d.enabled) {
                if !self.registry.contains(&descriptor.name) {
                    return Err(MaestroError::UnknownAgent(descriptor.name.to_string()));
                }
            }
        }
        Ok(())
    }

    /// The state store this orchestrator hands to every run.
    pub fn store(&self) -> Arc<StateStore> {
        Arc::clone(&self.store)
    }

    /// Execute a workflow to completion.
    ///
    /// Agent-level failures are contained in the returned `RunResult`;
    /// `Err` is reserved for structural defects (cyclic graph, unknown
    /// dependency, unregistered agent) that abort before or between
    /// agent invocations.
    pub async fn run_workflow(&self, workflow: &Workflow) -> MaestroResult<RunResult> {
        // A malformed workflow never partially runs.
        self.validate(workflow)?;

        let run_id = RunId::new();
        let mut ctx = RunContext::new(run_id, workflow.name.clone(), Arc::clone(&self.store));

        {
            let mut active = self.active.lock().expect("active-run lock poisoned");
            active.insert(run_id, ctx.cancel_token());
        }
        let result = self.drive(workflow, &mut ctx).await;
        {
            let mut active = self.active.lock().expect("active-run lock poisoned");
            active.remove(&run_id);
        }

        result
    }

    async fn drive(
        &self,
        workflow: &Workflow,
        ctx: &mut RunContext,
    ) -> MaestroResult<RunResult> {
        info!(
            run_id = %ctx.run_id,
            workflow = %workflow.name,
            phases = workflow.phases.len(),
            "run starting"
        );

        let mut summaries: Vec<PhaseSummary> = Vec::new();
        let mut first_error: Option<String> = None;
        let mut aborted = false;

        for phase in &workflow.phases {
            if ctx.is_canceled() {
                summaries.push(skipped_phase(phase, "run canceled"));
                continue;
            }
            if aborted {
                summaries.push(skipped_phase(phase, "run aborted"));
                continue;
            }

            let summary = self.engine.run_phase(phase, ctx).await?;

            if let Some(failure) = summary.first_failure() {
                let detail = format!(
                    "agent '{}' in phase '{}' terminated {}: {}",
                    failure.agent,
                    phase.name,
                    failure.status.as_str(),
                    failure.error.as_deref().unwrap_or("no detail"),
                );
                if phase.require_all_succeed {
                    warn!(run_id = %ctx.run_id, phase = %phase.name, "required phase failed, aborting run");
                    first_error.get_or_insert(detail);
                    aborted = true;
                } else {
                    // Tolerated: downstream phases see these outputs as
                    // absent and proceed.
                    info!(
                        run_id = %ctx.run_id,
                        phase = %phase.name,
                        agent = %failure.agent,
                        "failure tolerated, continuing"
                    );
                }
            }

            summaries.push(summary);
        }

        let status = if ctx.is_canceled() {
            RunStatus::Canceled
        } else if aborted {
            RunStatus::Failed
        } else {
            RunStatus::Succeeded
        };
        if status == RunStatus::Canceled && first_error.is_none() {
            first_error = Some("run canceled".to_string());
        }

        let result = RunResult {
            run_id: ctx.run_id,
            status,
            phases: summaries,
            duration: ctx.started_instant.elapsed(),
            first_error,
        };

        info!(
            run_id = %ctx.run_id,
            workflow = %workflow.name,
            status = result.status.as_str(),
            duration_ms = result.duration.as_millis() as u64,
            "run finished"
        );

        Ok(result)
    }

    /// Request cooperative cancellation of an in-flight run.
    ///
    /// The flag is observed at batch boundaries and before retry
    /// attempts; agents holding the run's token may also observe it at
    /// their own checkpoints. Returns false when no such run is active.
    pub fn cancel(&self, run_id: RunId) -> bool {
        let active = self.active.lock().expect("active-run lock poisoned");
        match active.get(&run_id) {
            Some(token) => {
                info!(run_id = %run_id, "cancellation requested");
                token.cancel();
                true
            }
            None => false,
        }
    }
}

/// A summary for a phase that never started: every agent skipped.
fn skipped_phase(phase: &Phase, reason: &str) -> PhaseSummary {
    PhaseSummary {
        phase: phase.name.clone(),
        results: phase
            .agents
            .iter()
            .map(|d| AgentResult::skipped(d.name.clone(), reason))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use maestro_contracts::{
        agent::{AgentDescriptor, AgentId, Phase, Workflow},
        entity::{EntityId, EntityType},
        error::AgentError,
        result::{AgentStatus, RunStatus},
    };
    use maestro_state::{StateMachine, StateStore, TransitionTable};

    use crate::context::RunSnapshot;
    use crate::registry::AgentRegistry;
    use crate::traits::Agent;

    use super::Orchestrator;

    // ── Mock agents ──────────────────────────────────────────────────────────

    struct OkAgent {
        name: String,
    }

    #[async_trait]
    impl Agent for OkAgent {
        async fn run(&self, _ctx: &RunSnapshot) -> Result<Value, AgentError> {
            Ok(json!({ "agent": self.name }))
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    struct FailAgent;

    #[async_trait]
    impl Agent for FailAgent {
        async fn run(&self, _ctx: &RunSnapshot) -> Result<Value, AgentError> {
            Err(AgentError::Fatal("upstream rejected payload".to_string()))
        }

        fn name(&self) -> &str {
            "fail"
        }
    }

    /// Records a detection then confirms it through the state store.
    struct DetectorAgent;

    #[async_trait]
    impl Agent for DetectorAgent {
        async fn run(&self, ctx: &RunSnapshot) -> Result<Value, AgentError> {
            let incident = EntityType::new("incident");
            let id = EntityId::new("inc-7");
            let me = AgentId::new("detector");

            ctx.store()
                .record_transition(&incident, &id, "detected", &me, json!({"camera": 3}))
                .map_err(|e| AgentError::Fatal(e.to_string()))?;
            Ok(json!({ "incident": "inc-7" }))
        }

        fn name(&self) -> &str {
            "detector"
        }
    }

    struct ConfirmerAgent;

    #[async_trait]
    impl Agent for ConfirmerAgent {
        async fn run(&self, ctx: &RunSnapshot) -> Result<Value, AgentError> {
            let incident = EntityType::new("incident");
            let id = EntityId::new("inc-7");
            let me = AgentId::new("confirmer");

            let entity = ctx
                .store()
                .record_transition(&incident, &id, "confirmed", &me, json!({}))
                .map_err(|e| AgentError::Fatal(e.to_string()))?;
            Ok(json!({ "version": entity.version }))
        }

        fn name(&self) -> &str {
            "confirmer"
        }
    }

    /// Sleeps until canceled, then reports a transient failure.
    struct WaitAgent;

    #[async_trait]
    impl Agent for WaitAgent {
        async fn run(&self, ctx: &RunSnapshot) -> Result<Value, AgentError> {
            let token = ctx.cancel_token();
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(60)) => Ok(json!({})),
                _ = token.cancelled() => {
                    Err(AgentError::Transient("interrupted".to_string()))
                }
            }
        }

        fn name(&self) -> &str {
            "wait"
        }
    }

    // ── Harness ──────────────────────────────────────────────────────────────

    fn incident_store() -> Arc<StateStore> {
        let mut machine = StateMachine::new();
        machine
            .define(
                EntityType::new("incident"),
                TransitionTable::new("detected")
                    .allow("detected", &["confirmed", "dismissed"])
                    .allow("confirmed", &["resolved"])
                    .terminal(&["resolved", "dismissed"]),
            )
            .unwrap();
        Arc::new(StateStore::new(Arc::new(machine)))
    }

    fn orchestrator(registry: AgentRegistry) -> Orchestrator {
        Orchestrator::new(Arc::new(registry), incident_store())
    }

    // ── Tests ────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_multi_phase_run_succeeds() {
        let mut registry = AgentRegistry::new();
        for name in ["ingest-a", "ingest-b", "publish"] {
            let name = name.to_string();
            registry.register(name.clone(), move || {
                Arc::new(OkAgent { name: name.clone() })
            });
        }
        let orch = orchestrator(registry);
        let workflow = Workflow::new(
            "traffic",
            vec![
                Phase::new(
                    "ingest",
                    vec![
                        AgentDescriptor::new("ingest-a"),
                        AgentDescriptor::new("ingest-b"),
                    ],
                ),
                Phase::new("publish", vec![AgentDescriptor::new("publish")]),
            ],
        );

        let result = orch.run_workflow(&workflow).await.unwrap();

        assert_eq!(result.status, RunStatus::Succeeded);
        assert_eq!(result.phases.len(), 2);
        assert!(result.first_error.is_none());
        assert!(result
            .result_for(&AgentId::new("publish"))
            .unwrap()
            .is_success());
    }

    /// Linear pipeline: A fails, its dependent B is never invoked, and
    /// the run is failed with later phases aborted.
    #[tokio::test]
    async fn test_required_failure_fails_run_and_aborts_later_phases() {
        let mut registry = AgentRegistry::new();
        registry.register("a", || Arc::new(FailAgent));
        registry.register("b", || {
            Arc::new(OkAgent {
                name: "b".to_string(),
            })
        });
        registry.register("late", || {
            Arc::new(OkAgent {
                name: "late".to_string(),
            })
        });
        let orch = orchestrator(registry);
        let workflow = Workflow::new(
            "pipeline",
            vec![
                Phase::new(
                    "ingest",
                    vec![
                        AgentDescriptor::new("a"),
                        AgentDescriptor::new("b").depends_on(&["a"]),
                    ],
                ),
                Phase::new("report", vec![AgentDescriptor::new("late")]),
            ],
        );

        let result = orch.run_workflow(&workflow).await.unwrap();

        assert_eq!(result.status, RunStatus::Failed);
        assert!(result.first_error.as_deref().unwrap().contains("'a'"));

        let b = result.result_for(&AgentId::new("b")).unwrap();
        assert_eq!(b.status, AgentStatus::Skipped);
        assert_eq!(b.attempts, 0);

        // The later phase never started but is still enumerated.
        let late = result.result_for(&AgentId::new("late")).unwrap();
        assert_eq!(late.status, AgentStatus::Skipped);
        assert_eq!(late.error.as_deref(), Some("run aborted"));
    }

    #[tokio::test]
    async fn test_tolerated_failure_continues_run() {
        let mut registry = AgentRegistry::new();
        registry.register("fail", || Arc::new(FailAgent));
        registry.register("next", || {
            Arc::new(OkAgent {
                name: "next".to_string(),
            })
        });
        let orch = orchestrator(registry);
        let workflow = Workflow::new(
            "tolerant",
            vec![
                Phase::new("analyze", vec![AgentDescriptor::new("fail")]).tolerate_failures(),
                Phase::new("report", vec![AgentDescriptor::new("next")]),
            ],
        );

        let result = orch.run_workflow(&workflow).await.unwrap();

        assert_eq!(result.status, RunStatus::Succeeded);
        assert!(result
            .result_for(&AgentId::new("next"))
            .unwrap()
            .is_success());
    }

    #[tokio::test]
    async fn test_cyclic_workflow_is_structural_error() {
        let orch = orchestrator(AgentRegistry::new());
        let workflow = Workflow::new(
            "broken",
            vec![Phase::new(
                "loop",
                vec![
                    AgentDescriptor::new("a").depends_on(&["b"]),
                    AgentDescriptor::new("b").depends_on(&["a"]),
                ],
            )],
        );

        assert!(orch.run_workflow(&workflow).await.is_err());
    }

    /// Agents in different phases share entity lifecycle through the
    /// store; versions advance with each accepted transition.
    #[tokio::test]
    async fn test_lifecycle_flows_across_phases() {
        let mut registry = AgentRegistry::new();
        registry.register("detector", || Arc::new(DetectorAgent));
        registry.register("confirmer", || Arc::new(ConfirmerAgent));
        let orch = orchestrator(registry);
        let workflow = Workflow::new(
            "lifecycle",
            vec![
                Phase::new("detect", vec![AgentDescriptor::new("detector")]),
                Phase::new("confirm", vec![AgentDescriptor::new("confirmer")]),
            ],
        );

        let result = orch.run_workflow(&workflow).await.unwrap();
        assert_eq!(result.status, RunStatus::Succeeded);

        let store = orch.store();
        let entity = store
            .current_state(&EntityType::new("incident"), &EntityId::new("inc-7"))
            .unwrap();
        assert_eq!(entity.status, "confirmed");
        assert_eq!(entity.version, 2);
        assert!(store.verify_integrity(&EntityType::new("incident"), &EntityId::new("inc-7")));
    }

    #[tokio::test]
    async fn test_cancel_marks_run_canceled() {
        let mut registry = AgentRegistry::new();
        registry.register("wait", || Arc::new(WaitAgent));
        registry.register("after", || {
            Arc::new(OkAgent {
                name: "after".to_string(),
            })
        });
        let orch = Arc::new(orchestrator(registry));
        let workflow = Workflow::new(
            "cancelable",
            vec![
                Phase::new("hold", vec![AgentDescriptor::new("wait")]),
                Phase::new("report", vec![AgentDescriptor::new("after")]),
            ],
        );

        let runner = Arc::clone(&orch);
        let handle =
            tokio::spawn(async move { runner.run_workflow(&workflow).await.unwrap() });

        // Wait for the run to register, then cancel it.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let canceled = {
            let active = orch.active.lock().unwrap();
            let run_id = *active.keys().next().expect("run should be active");
            drop(active);
            orch.cancel(run_id)
        };
        assert!(canceled);

        let result = handle.await.unwrap();
        assert_eq!(result.status, RunStatus::Canceled);

        // The later phase never ran.
        let after = result.result_for(&AgentId::new("after")).unwrap();
        assert_eq!(after.status, AgentStatus::Skipped);
        assert_eq!(after.error.as_deref(), Some("run canceled"));
    }

    #[tokio::test]
    async fn test_cancel_unknown_run_returns_false() {
        let orch = orchestrator(AgentRegistry::new());
        assert!(!orch.cancel(maestro_contracts::agent::RunId::new()));
    }
}
