//! The phase execution engine: bounded concurrency, deadlines, retry
//! with exponential backoff, and circuit-breaker gating.
//!
//! For each dependency batch produced by the resolver, every agent is
//! launched concurrently over a bounded worker pool. The batch drains
//! fully — every agent reaches a terminal `AgentResult` — before its
//! results are folded into the `RunContext` and the next batch starts.
//! That ordering is what gives later batches dependency-respecting
//! visibility of earlier outputs.
//!
//! Deadlines are cooperative: an invocation past its timeout is marked
//! `Timeout` and its cancellation token is canceled, but the task itself
//! is left to drain in the background rather than being aborted while it
//! may hold shared resources.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use maestro_contracts::{
    agent::{AgentDescriptor, AgentId, Phase},
    error::{AgentError, MaestroError, MaestroResult},
    result::{AgentResult, AgentStatus, PhaseSummary},
};
use maestro_graph::resolve_batches;

use crate::breaker::{Admission, CircuitBreaker};
use crate::context::{RunContext, RunSnapshot};
use crate::registry::AgentRegistry;
use crate::traits::Agent;

/// Tunables for the execution engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Concurrent invocations allowed across a batch; excess agents queue.
    pub max_workers: usize,
    /// First retry delay.
    pub backoff_base: Duration,
    /// Multiplier applied to the delay after each retry.
    pub backoff_factor: u32,
    /// Upper bound on any single retry delay.
    pub backoff_cap: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            backoff_base: Duration::from_secs(1),
            backoff_factor: 2,
            backoff_cap: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    /// The delay before retry number `retry` (1-based): base·factorⁿ⁻¹,
    /// capped.
    fn backoff_delay(&self, retry: u32) -> Duration {
        let factor = self.backoff_factor.saturating_pow(retry.saturating_sub(1));
        (self.backoff_base * factor).min(self.backoff_cap)
    }
}

/// Drives the agents of one phase through resolver batches.
///
/// The engine is the single writer of the `RunContext`; agents only ever
/// see read-only snapshots taken at batch boundaries.
pub struct ExecutionEngine {
    config: EngineConfig,
    registry: Arc<AgentRegistry>,
    breaker: Arc<CircuitBreaker>,
    workers: Arc<Semaphore>,
}

impl ExecutionEngine {
    pub fn new(
        config: EngineConfig,
        registry: Arc<AgentRegistry>,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        let workers = Arc::new(Semaphore::new(config.max_workers.max(1)));
        Self {
            config,
            registry,
            breaker,
            workers,
        }
    }

    /// Execute one phase to completion.
    ///
    /// Returns a `PhaseSummary` with exactly one terminal result per
    /// declared agent — including disabled agents and agents never
    /// invoked because a dependency did not succeed, the circuit was
    /// open, or the phase aborted.
    ///
    /// Structural defects (cyclic graph, unknown dependency, unregistered
    /// agent) are returned as `Err` before any agent executes.
    pub async fn run_phase(
        &self,
        phase: &Phase,
        ctx: &mut RunContext,
    ) -> MaestroResult<PhaseSummary> {
        let batches = resolve_batches(phase)?;

        // Every enabled agent must be buildable before anything runs; a
        // half-executed phase over a typo'd workflow helps nobody.
        for descriptor in phase.agents.iter().filter(|d| d.enabled) {
            if !self.registry.contains(&descriptor.name) {
                return Err(MaestroError::UnknownAgent(descriptor.name.to_string()));
            }
        }

        let disabled: HashSet<AgentId> = phase
            .agents
            .iter()
            .filter(|d| !d.enabled)
            .map(|d| d.name.clone())
            .collect();
        for name in &disabled {
            ctx.record(AgentResult::skipped(name.clone(), "agent disabled"));
        }

        info!(
            run_id = %ctx.run_id,
            phase = %phase.name,
            agents = phase.agents.len(),
            batches = batches.len(),
            "phase starting"
        );

        let mut aborted = false;
        for batch in &batches {
            if ctx.is_canceled() {
                for name in batch {
                    ctx.record(AgentResult::skipped(name.clone(), "run canceled"));
                }
                continue;
            }
            if aborted {
                for name in batch {
                    ctx.record(AgentResult::skipped(name.clone(), "phase aborted"));
                }
                continue;
            }

            let results = self.run_batch(phase, batch, ctx).await?;
            for result in results {
                ctx.record(result);
            }

            if phase.require_all_succeed {
                let batch_failed = batch.iter().any(|name| {
                    ctx.result_of(name)
                        .map(|r| matches!(r.status, AgentStatus::Failed | AgentStatus::Timeout))
                        .unwrap_or(false)
                });
                if batch_failed {
                    warn!(
                        run_id = %ctx.run_id,
                        phase = %phase.name,
                        "required agent failed, aborting phase"
                    );
                    aborted = true;
                }
            }
        }

        // Summary in declaration order, one terminal result per agent.
        let results = phase
            .agents
            .iter()
            .map(|d| {
                ctx.result_of(&d.name)
                    .cloned()
                    .unwrap_or_else(|| AgentResult::skipped(d.name.clone(), "not scheduled"))
            })
            .collect();

        Ok(PhaseSummary {
            phase: phase.name.clone(),
            results,
        })
    }

    /// Launch one batch concurrently and wait for it to fully drain.
    async fn run_batch(
        &self,
        phase: &Phase,
        batch: &[AgentId],
        ctx: &RunContext,
    ) -> MaestroResult<Vec<AgentResult>> {
        let snapshot = ctx.snapshot();
        let disabled: HashSet<AgentId> = phase
            .agents
            .iter()
            .filter(|d| !d.enabled)
            .map(|d| d.name.clone())
            .collect();

        let mut tasks: JoinSet<AgentResult> = JoinSet::new();
        let mut results = Vec::new();

        for name in batch {
            let descriptor = phase
                .agents
                .iter()
                .find(|d| &d.name == name)
                .cloned()
                .ok_or_else(|| MaestroError::UnknownAgent(name.to_string()))?;

            // Dependency gate: every dependency must have succeeded.
            // A disabled dependency satisfies the edge without output.
            let unmet = descriptor
                .depends_on
                .iter()
                .find(|dep| !disabled.contains(dep) && !ctx.succeeded(dep));
            if let Some(dep) = unmet {
                results.push(AgentResult::skipped(
                    name.clone(),
                    format!("dependency '{}' did not succeed", dep),
                ));
                continue;
            }

            // Circuit gate: an open circuit skips the invocation outright;
            // a half-open circuit admits one probe with no retries.
            let admission = self.breaker.admit(name);
            if admission == Admission::Skip {
                debug!(agent = %name, "invocation skipped, circuit open");
                results.push(AgentResult::skipped(name.clone(), "circuit open"));
                continue;
            }

            let agent = self.registry.build(name)?;
            let invocation = Invocation {
                descriptor,
                agent,
                config: self.config.clone(),
                breaker: Arc::clone(&self.breaker),
                probe: admission == Admission::Probe,
            };

            let permit = Arc::clone(&self.workers)
                .acquire_owned()
                .await
                .map_err(|_| MaestroError::Internal {
                    reason: "worker pool closed".to_string(),
                })?;
            let snapshot = snapshot.clone();
            tasks.spawn(async move {
                let result = invocation.execute(snapshot).await;
                drop(permit);
                result
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => {
                    // A panic inside the retry wrapper itself; the agent
                    // future proper is isolated in its own task.
                    return Err(MaestroError::Internal {
                        reason: format!("batch task failed to join: {}", e),
                    });
                }
            }
        }

        Ok(results)
    }
}

// ── Single-agent invocation ───────────────────────────────────────────────────

/// Everything needed to drive one agent to a terminal result: deadline,
/// retry loop, backoff, and breaker reporting.
struct Invocation {
    descriptor: AgentDescriptor,
    agent: Arc<dyn Agent>,
    config: EngineConfig,
    breaker: Arc<CircuitBreaker>,
    probe: bool,
}

/// The outcome of one attempt, before retry policy is applied.
enum Attempt {
    Success(serde_json::Value),
    Transient(String),
    Fatal(String),
    TimedOut,
}

impl Invocation {
    /// Run the agent until success, a non-retryable outcome, or the retry
    /// budget is exhausted. Every failed attempt is reported to the
    /// circuit breaker; a success resets it.
    async fn execute(self, snapshot: RunSnapshot) -> AgentResult {
        let name = self.descriptor.name.clone();
        let started = Instant::now();
        // A half-open probe is exactly one trial regardless of budget.
        let max_attempts = if self.probe {
            1
        } else {
            self.descriptor.max_retries + 1
        };

        let mut attempts = 0;
        let mut last_error = String::new();

        while attempts < max_attempts {
            if attempts > 0 {
                let delay = self.config.backoff_delay(attempts);
                debug!(
                    agent = %name,
                    retry = attempts,
                    delay_ms = delay.as_millis() as u64,
                    "backing off before retry"
                );
                tokio::time::sleep(delay).await;

                // Cancellation is re-checked before each retry attempt.
                if snapshot.is_canceled() {
                    last_error = format!("{} (run canceled before retry)", last_error);
                    break;
                }
            }
            attempts += 1;

            match self.attempt(&snapshot).await {
                Attempt::Success(output) => {
                    self.breaker.record_success(&name);
                    return AgentResult {
                        agent: name,
                        status: AgentStatus::Success,
                        output: Some(output),
                        error: None,
                        duration: started.elapsed(),
                        attempts,
                    };
                }
                Attempt::Transient(reason) => {
                    debug!(agent = %name, attempt = attempts, reason = %reason, "transient failure");
                    // Retries contribute to the breaker's counter rather
                    // than resetting it; only success resets.
                    self.breaker.record_failure(&name);
                    last_error = reason;
                }
                Attempt::Fatal(reason) => {
                    warn!(agent = %name, attempt = attempts, reason = %reason, "fatal failure");
                    self.breaker.record_failure(&name);
                    return AgentResult {
                        agent: name,
                        status: AgentStatus::Failed,
                        output: None,
                        error: Some(reason),
                        duration: started.elapsed(),
                        attempts,
                    };
                }
                Attempt::TimedOut => {
                    warn!(
                        agent = %name,
                        timeout_ms = self.descriptor.timeout.as_millis() as u64,
                        "deadline exceeded, task left to drain in background"
                    );
                    self.breaker.record_failure(&name);
                    return AgentResult {
                        agent: name,
                        status: AgentStatus::Timeout,
                        output: None,
                        error: Some(format!(
                            "deadline of {:?} exceeded",
                            self.descriptor.timeout
                        )),
                        duration: started.elapsed(),
                        attempts,
                    };
                }
            }
        }

        // Retry budget exhausted; each failed attempt already advanced
        // the breaker's counter.
        AgentResult {
            agent: name,
            status: AgentStatus::Failed,
            output: None,
            error: Some(last_error),
            duration: started.elapsed(),
            attempts,
        }
    }

    /// One invocation attempt under its deadline.
    ///
    /// The agent future runs in its own task so that a deadline expiry
    /// does not drop it mid-poll: the token is canceled cooperatively and
    /// the task drains in the background.
    async fn attempt(&self, snapshot: &RunSnapshot) -> Attempt {
        if !self.agent.healthy() {
            return Attempt::Transient("agent reported unhealthy".to_string());
        }

        let cancel = snapshot.cancel_token().child_token();
        let invocation_snapshot = snapshot.for_invocation(cancel.clone());
        let agent = Arc::clone(&self.agent);

        let mut handle =
            tokio::spawn(async move { agent.run(&invocation_snapshot).await });

        match tokio::time::timeout(self.descriptor.timeout, &mut handle).await {
            Err(_) => {
                cancel.cancel();
                Attempt::TimedOut
            }
            Ok(Err(join_error)) => {
                // The agent panicked; nothing to retry against.
                Attempt::Fatal(format!("agent panicked: {}", join_error))
            }
            Ok(Ok(Ok(output))) => Attempt::Success(output),
            Ok(Ok(Err(AgentError::Transient(reason)))) => Attempt::Transient(reason),
            Ok(Ok(Err(AgentError::Fatal(reason)))) => Attempt::Fatal(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use maestro_contracts::{
        agent::{AgentDescriptor, AgentId, Phase, RunId},
        error::AgentError,
        result::AgentStatus,
    };
    use maestro_state::{StateMachine, StateStore};

    use crate::breaker::{BreakerConfig, CircuitBreaker};
    use crate::context::{RunContext, RunSnapshot};
    use crate::registry::AgentRegistry;
    use crate::traits::Agent;

    use super::{EngineConfig, ExecutionEngine};

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

    /// Fails transiently until `succeed_on` attempts have been made.
    struct FlakyAgent {
        name: String,
        calls: Arc<AtomicU32>,
        succeed_on: u32,
    }

    #[async_trait]
    impl Agent for FlakyAgent {
        async fn run(&self, _ctx: &RunSnapshot) -> Result<Value, AgentError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call >= self.succeed_on {
                Ok(json!({ "succeeded_on": call }))
            } else {
                Err(AgentError::Transient(format!("attempt {} failed", call)))
            }
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    struct FatalAgent;

    #[async_trait]
    impl Agent for FatalAgent {
        async fn run(&self, _ctx: &RunSnapshot) -> Result<Value, AgentError> {
            Err(AgentError::Fatal("schema mismatch".to_string()))
        }

        fn name(&self) -> &str {
            "fatal"
        }
    }

    struct SlowAgent {
        delay: Duration,
    }

    #[async_trait]
    impl Agent for SlowAgent {
        async fn run(&self, ctx: &RunSnapshot) -> Result<Value, AgentError> {
            let token = ctx.cancel_token();
            tokio::select! {
                _ = tokio::time::sleep(self.delay) => Ok(json!({})),
                _ = token.cancelled() => {
                    Err(AgentError::Transient("canceled mid-work".to_string()))
                }
            }
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    // ── Harness ──────────────────────────────────────────────────────────────

    fn fast_config() -> EngineConfig {
        EngineConfig {
            max_workers: 4,
            backoff_base: Duration::from_millis(10),
            backoff_factor: 2,
            backoff_cap: Duration::from_millis(100),
        }
    }

    fn harness(registry: AgentRegistry) -> (ExecutionEngine, RunContext) {
        let breaker = Arc::new(CircuitBreaker::new(BreakerConfig::default()));
        let engine = ExecutionEngine::new(fast_config(), Arc::new(registry), breaker);
        let store = Arc::new(StateStore::new(Arc::new(StateMachine::new())));
        let ctx = RunContext::new(RunId::new(), "test", store);
        (engine, ctx)
    }

    fn ok_registry(names: &[&str]) -> AgentRegistry {
        let mut registry = AgentRegistry::new();
        for name in names {
            let name = (*name).to_string();
            registry.register(name.clone(), move || {
                Arc::new(OkAgent { name: name.clone() })
            });
        }
        registry
    }

    // ── Tests ────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_single_agent_success() {
        let (engine, mut ctx) = harness(ok_registry(&["solo"]));
        let phase = Phase::new("ingest", vec![AgentDescriptor::new("solo")]);

        let summary = engine.run_phase(&phase, &mut ctx).await.unwrap();

        assert_eq!(summary.results.len(), 1);
        let result = &summary.results[0];
        assert_eq!(result.status, AgentStatus::Success);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.output, Some(json!({ "agent": "solo" })));
    }

    #[tokio::test]
    async fn test_fan_out_batch_completes_fully() {
        let (engine, mut ctx) = harness(ok_registry(&["c", "d", "e"]));
        let phase = Phase::new(
            "analyze",
            vec![
                AgentDescriptor::new("c"),
                AgentDescriptor::new("d"),
                AgentDescriptor::new("e"),
            ],
        );

        let summary = engine.run_phase(&phase, &mut ctx).await.unwrap();

        assert_eq!(summary.results.len(), 3);
        assert!(summary.results.iter().all(|r| r.is_success()));
    }

    #[tokio::test]
    async fn test_retry_until_success_with_backoff() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut registry = AgentRegistry::new();
        {
            let calls = Arc::clone(&calls);
            registry.register("flaky", move || {
                Arc::new(FlakyAgent {
                    name: "flaky".to_string(),
                    calls: Arc::clone(&calls),
                    succeed_on: 3,
                })
            });
        }
        let (engine, mut ctx) = harness(registry);
        let phase = Phase::new(
            "ingest",
            vec![AgentDescriptor::new("flaky").max_retries(3)],
        );

        let summary = engine.run_phase(&phase, &mut ctx).await.unwrap();

        let result = &summary.results[0];
        assert_eq!(result.status, AgentStatus::Success);
        assert_eq!(result.attempts, 3);
        // Two backoff delays: 10ms then 20ms. Duration includes them.
        assert!(result.duration >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_fatal_failure_is_not_retried() {
        let mut registry = AgentRegistry::new();
        registry.register("fatal", || Arc::new(FatalAgent));
        let (engine, mut ctx) = harness(registry);
        let phase = Phase::new(
            "ingest",
            vec![AgentDescriptor::new("fatal").max_retries(5)],
        )
        .tolerate_failures();

        let summary = engine.run_phase(&phase, &mut ctx).await.unwrap();

        let result = &summary.results[0];
        assert_eq!(result.status, AgentStatus::Failed);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.error.as_deref(), Some("schema mismatch"));
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut registry = AgentRegistry::new();
        {
            let calls = Arc::clone(&calls);
            registry.register("flaky", move || {
                Arc::new(FlakyAgent {
                    name: "flaky".to_string(),
                    calls: Arc::clone(&calls),
                    succeed_on: 10,
                })
            });
        }
        let (engine, mut ctx) = harness(registry);
        let phase = Phase::new(
            "ingest",
            vec![AgentDescriptor::new("flaky").max_retries(2)],
        )
        .tolerate_failures();

        let summary = engine.run_phase(&phase, &mut ctx).await.unwrap();

        let result = &summary.results[0];
        assert_eq!(result.status, AgentStatus::Failed);
        assert_eq!(result.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_deadline_marks_timeout() {
        let mut registry = AgentRegistry::new();
        registry.register("slow", || {
            Arc::new(SlowAgent {
                delay: Duration::from_secs(60),
            })
        });
        let (engine, mut ctx) = harness(registry);
        let phase = Phase::new(
            "ingest",
            vec![AgentDescriptor::new("slow").timeout(Duration::from_millis(50))],
        )
        .tolerate_failures();

        let summary = engine.run_phase(&phase, &mut ctx).await.unwrap();

        let result = &summary.results[0];
        assert_eq!(result.status, AgentStatus::Timeout);
        assert_eq!(result.attempts, 1);
        assert!(result.duration < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_failed_dependency_skips_dependent() {
        let mut registry = AgentRegistry::new();
        registry.register("a", || Arc::new(FatalAgent));
        registry.register("b", || {
            Arc::new(OkAgent {
                name: "b".to_string(),
            })
        });
        let (engine, mut ctx) = harness(registry);
        let phase = Phase::new(
            "ingest",
            vec![
                AgentDescriptor::new("a"),
                AgentDescriptor::new("b").depends_on(&["a"]),
            ],
        )
        .tolerate_failures();

        let summary = engine.run_phase(&phase, &mut ctx).await.unwrap();

        let b = summary
            .results
            .iter()
            .find(|r| r.agent == AgentId::new("b"))
            .unwrap();
        assert_eq!(b.status, AgentStatus::Skipped);
        assert_eq!(b.error.as_deref(), Some("dependency 'a' did not succeed"));
        assert_eq!(b.attempts, 0);
    }

    #[tokio::test]
    async fn test_required_failure_aborts_later_batches() {
        let mut registry = AgentRegistry::new();
        registry.register("a", || Arc::new(FatalAgent));
        registry.register("x", || {
            Arc::new(OkAgent {
                name: "x".to_string(),
            })
        });
        let (engine, mut ctx) = harness(registry);
        // "x" is independent of the failing "a" but sits in a later batch
        // because of its sequential mode; the phase aborts before it runs.
        let phase = Phase::new(
            "ingest",
            vec![
                AgentDescriptor::new("a"),
                AgentDescriptor::new("x").sequential(),
            ],
        );

        let summary = engine.run_phase(&phase, &mut ctx).await.unwrap();

        let x = summary
            .results
            .iter()
            .find(|r| r.agent == AgentId::new("x"))
            .unwrap();
        assert_eq!(x.status, AgentStatus::Skipped);
        assert_eq!(x.error.as_deref(), Some("phase aborted"));
    }

    #[tokio::test]
    async fn test_disabled_agent_skipped_but_satisfies_edge() {
        let mut registry = AgentRegistry::new();
        registry.register("b", || {
            Arc::new(OkAgent {
                name: "b".to_string(),
            })
        });
        let (engine, mut ctx) = harness(registry);
        // "a" is disabled and unregistered; it must not gate "b".
        let phase = Phase::new(
            "ingest",
            vec![
                AgentDescriptor::new("a").enabled(false),
                AgentDescriptor::new("b").depends_on(&["a"]),
            ],
        );

        let summary = engine.run_phase(&phase, &mut ctx).await.unwrap();

        let a = summary
            .results
            .iter()
            .find(|r| r.agent == AgentId::new("a"))
            .unwrap();
        assert_eq!(a.status, AgentStatus::Skipped);
        assert_eq!(a.error.as_deref(), Some("agent disabled"));

        let b = summary
            .results
            .iter()
            .find(|r| r.agent == AgentId::new("b"))
            .unwrap();
        assert_eq!(b.status, AgentStatus::Success);
    }

    #[tokio::test]
    async fn test_unregistered_agent_is_structural_error() {
        let (engine, mut ctx) = harness(AgentRegistry::new());
        let phase = Phase::new("ingest", vec![AgentDescriptor::new("ghost")]);

        assert!(engine.run_phase(&phase, &mut ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_circuit_opens_after_threshold_and_skips() {
        let mut registry = AgentRegistry::new();
        registry.register("fatal", || Arc::new(FatalAgent));
        let breaker = Arc::new(CircuitBreaker::new(BreakerConfig {
            failure_threshold: 2,
            cooldown: Duration::from_secs(3600),
            max_cooldown: Duration::from_secs(7200),
        }));
        let engine =
            ExecutionEngine::new(fast_config(), Arc::new(registry), Arc::clone(&breaker));
        let store = Arc::new(StateStore::new(Arc::new(StateMachine::new())));
        let phase = Phase::new("ingest", vec![AgentDescriptor::new("fatal")])
            .tolerate_failures();

        // Two failing runs trip the circuit.
        for _ in 0..2 {
            let mut ctx = RunContext::new(RunId::new(), "test", Arc::clone(&store));
            let summary = engine.run_phase(&phase, &mut ctx).await.unwrap();
            assert_eq!(summary.results[0].status, AgentStatus::Failed);
        }

        // The third run is skipped without invoking the agent.
        let mut ctx = RunContext::new(RunId::new(), "test", Arc::clone(&store));
        let summary = engine.run_phase(&phase, &mut ctx).await.unwrap();
        let result = &summary.results[0];
        assert_eq!(result.status, AgentStatus::Skipped);
        assert_eq!(result.error.as_deref(), Some("circuit open"));
        assert_eq!(result.attempts, 0);
    }

    #[tokio::test]
    async fn test_half_open_probe_gets_single_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut registry = AgentRegistry::new();
        {
            let calls = Arc::clone(&calls);
            registry.register("flaky", move || {
                Arc::new(FlakyAgent {
                    name: "flaky".to_string(),
                    calls: Arc::clone(&calls),
                    succeed_on: 100,
                })
            });
        }
        let breaker = Arc::new(CircuitBreaker::new(BreakerConfig {
            failure_threshold: 1,
            cooldown: Duration::from_millis(20),
            max_cooldown: Duration::from_secs(1),
        }));
        let engine =
            ExecutionEngine::new(fast_config(), Arc::new(registry), Arc::clone(&breaker));
        let store = Arc::new(StateStore::new(Arc::new(StateMachine::new())));
        // A generous retry budget that the probe must ignore.
        let phase = Phase::new(
            "ingest",
            vec![AgentDescriptor::new("flaky").max_retries(5)],
        )
        .tolerate_failures();

        let mut ctx = RunContext::new(RunId::new(), "test", Arc::clone(&store));
        engine.run_phase(&phase, &mut ctx).await.unwrap();
        let after_first = calls.load(Ordering::SeqCst);
        assert_eq!(after_first, 6);

        tokio::time::sleep(Duration::from_millis(30)).await;

        let mut ctx = RunContext::new(RunId::new(), "test", Arc::clone(&store));
        let summary = engine.run_phase(&phase, &mut ctx).await.unwrap();
        let result = &summary.results[0];
        assert_eq!(result.status, AgentStatus::Failed);
        assert_eq!(result.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), after_first + 1);
    }

    #[tokio::test]
    async fn test_later_batch_sees_earlier_outputs() {
        struct ReaderAgent;

        #[async_trait]
        impl Agent for ReaderAgent {
            async fn run(&self, ctx: &RunSnapshot) -> Result<Value, AgentError> {
                let upstream = ctx
                    .output_of(&AgentId::new("producer"))
                    .ok_or_else(|| AgentError::Fatal("producer output missing".to_string()))?;
                Ok(json!({ "saw": upstream.clone() }))
            }

            fn name(&self) -> &str {
                "reader"
            }
        }

        let mut registry = AgentRegistry::new();
        registry.register("producer", || {
            Arc::new(OkAgent {
                name: "producer".to_string(),
            })
        });
        registry.register("reader", || Arc::new(ReaderAgent));
        let (engine, mut ctx) = harness(registry);
        let phase = Phase::new(
            "pipeline",
            vec![
                AgentDescriptor::new("producer"),
                AgentDescriptor::new("reader").depends_on(&["producer"]),
            ],
        );

        let summary = engine.run_phase(&phase, &mut ctx).await.unwrap();

        let reader = summary
            .results
            .iter()
            .find(|r| r.agent == AgentId::new("reader"))
            .unwrap();
        assert_eq!(reader.status, AgentStatus::Success);
        assert_eq!(
            reader.output,
            Some(json!({ "saw": { "agent": "producer" } }))
        );
    }
}
