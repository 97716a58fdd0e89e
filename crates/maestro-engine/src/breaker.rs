//! Per-agent circuit breakers.
//!
//! A persistently failing agent must not consume retry budget on every
//! future run. After N consecutive failures its circuit opens and
//! invocations are skipped outright until a cool-down elapses; then one
//! half-open probe is admitted. A successful probe closes the circuit
//! and resets everything; a failed probe re-opens it with a doubled
//! (capped) cool-down.
//!
//! Circuit state persists across runs for the lifetime of the process.
//! Each agent's state sits behind one shared lock since concurrent runs
//! may reference the same agent.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use maestro_contracts::agent::AgentId;

/// Tunables for the circuit breaker.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures that trip the circuit open.
    pub failure_threshold: u32,
    /// Initial cool-down after tripping.
    pub cooldown: Duration,
    /// Upper bound for the doubled cool-down after failed probes.
    pub max_cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
            max_cooldown: Duration::from_secs(300),
        }
    }
}

/// The admission decision for one prospective invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Circuit closed: invoke normally, full retry budget applies.
    Allow,
    /// Circuit half-open: invoke exactly once, no retries.
    Probe,
    /// Circuit open: skip the invocation, record "circuit open".
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

/// Per-agent breaker state. Mutated only through `CircuitBreaker`.
#[derive(Debug, Clone)]
struct CircuitState {
    state: State,
    consecutive_failures: u32,
    /// Cool-down currently in force; doubles on each failed probe.
    current_cooldown: Duration,
    /// When an open circuit becomes eligible for a half-open probe.
    retry_at: Option<Instant>,
    last_failure_at: Option<DateTime<Utc>>,
}

impl CircuitState {
    fn closed(cooldown: Duration) -> Self {
        Self {
            state: State::Closed,
            consecutive_failures: 0,
            current_cooldown: cooldown,
            retry_at: None,
            last_failure_at: None,
        }
    }
}

/// A read-only view of one agent's circuit, for diagnostics.
#[derive(Debug, Clone)]
pub struct CircuitReport {
    pub agent: AgentId,
    pub state: &'static str,
    pub consecutive_failures: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
}

/// Registry of circuit state for every agent the process has invoked.
pub struct CircuitBreaker {
    config: BreakerConfig,
    circuits: Mutex<HashMap<AgentId, CircuitState>>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            circuits: Mutex::new(HashMap::new()),
        }
    }

    /// Decide whether an invocation of `agent` may proceed.
    ///
    /// Transitions an open circuit to half-open when its cool-down has
    /// elapsed; the caller receiving `Probe` owns the single trial and
    /// must report its outcome via `record_success`/`record_failure`.
    /// While a probe is outstanding, further callers get `Skip`.
    pub fn admit(&self, agent: &AgentId) -> Admission {
        let mut circuits = self.circuits.lock().expect("breaker lock poisoned");
        let circuit = circuits
            .entry(agent.clone())
            .or_insert_with(|| CircuitState::closed(self.config.cooldown));

        match circuit.state {
            State::Closed => Admission::Allow,
            State::HalfOpen => Admission::Skip,
            State::Open => {
                let eligible = circuit
                    .retry_at
                    .map(|at| Instant::now() >= at)
                    .unwrap_or(true);
                if eligible {
                    info!(agent = %agent, "circuit half-open, admitting probe");
                    circuit.state = State::HalfOpen;
                    Admission::Probe
                } else {
                    Admission::Skip
                }
            }
        }
    }

    /// Report a successful invocation: the circuit closes and the failure
    /// counter and cool-down reset.
    pub fn record_success(&self, agent: &AgentId) {
        let mut circuits = self.circuits.lock().expect("breaker lock poisoned");
        let circuit = circuits
            .entry(agent.clone())
            .or_insert_with(|| CircuitState::closed(self.config.cooldown));

        if circuit.state != State::Closed {
            info!(agent = %agent, "circuit closed after successful probe");
        }
        *circuit = CircuitState::closed(self.config.cooldown);
    }

    /// Report a terminally failed invocation (fatal, timeout, or retries
    /// exhausted). Every retry attempt's final outcome lands here once;
    /// individual attempts inside the retry loop do not.
    pub fn record_failure(&self, agent: &AgentId) {
        let mut circuits = self.circuits.lock().expect("breaker lock poisoned");
        let circuit = circuits
            .entry(agent.clone())
            .or_insert_with(|| CircuitState::closed(self.config.cooldown));

        circuit.consecutive_failures += 1;
        circuit.last_failure_at = Some(Utc::now());

        match circuit.state {
            State::Closed => {
                if circuit.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        agent = %agent,
                        failures = circuit.consecutive_failures,
                        cooldown_secs = circuit.current_cooldown.as_secs_f64(),
                        "circuit tripped open"
                    );
                    circuit.state = State::Open;
                    circuit.retry_at = Some(Instant::now() + circuit.current_cooldown);
                }
            }
            State::HalfOpen => {
                // Failed probe: re-open with doubled cool-down, capped.
                circuit.current_cooldown =
                    (circuit.current_cooldown * 2).min(self.config.max_cooldown);
                warn!(
                    agent = %agent,
                    cooldown_secs = circuit.current_cooldown.as_secs_f64(),
                    "probe failed, circuit re-opened with doubled cool-down"
                );
                circuit.state = State::Open;
                circuit.retry_at = Some(Instant::now() + circuit.current_cooldown);
            }
            State::Open => {
                // Already open. Nothing was invoked, nothing to extend.
            }
        }
    }

    /// Diagnostic snapshot of one agent's circuit.
    pub fn report(&self, agent: &AgentId) -> CircuitReport {
        let circuits = self.circuits.lock().expect("breaker lock poisoned");
        let circuit = circuits.get(agent);

        CircuitReport {
            agent: agent.clone(),
            state: match circuit.map(|c| c.state) {
                None | Some(State::Closed) => "closed",
                Some(State::Open) => "open",
                Some(State::HalfOpen) => "half-open",
            },
            consecutive_failures: circuit.map(|c| c.consecutive_failures).unwrap_or(0),
            last_failure_at: circuit.and_then(|c| c.last_failure_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use maestro_contracts::agent::AgentId;

    use super::{Admission, BreakerConfig, CircuitBreaker};

    fn fast_breaker(threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            failure_threshold: threshold,
            cooldown: Duration::from_millis(50),
            max_cooldown: Duration::from_millis(200),
        })
    }

    #[test]
    fn test_closed_circuit_allows() {
        let breaker = fast_breaker(3);
        let agent = AgentId::new("worker");

        assert_eq!(breaker.admit(&agent), Admission::Allow);
        assert_eq!(breaker.report(&agent).state, "closed");
    }

    #[test]
    fn test_trips_open_at_threshold() {
        let breaker = fast_breaker(3);
        let agent = AgentId::new("worker");

        breaker.record_failure(&agent);
        breaker.record_failure(&agent);
        assert_eq!(breaker.admit(&agent), Admission::Allow);

        breaker.record_failure(&agent);
        assert_eq!(breaker.admit(&agent), Admission::Skip);
        assert_eq!(breaker.report(&agent).state, "open");
    }

    #[test]
    fn test_success_resets_counter() {
        let breaker = fast_breaker(3);
        let agent = AgentId::new("worker");

        breaker.record_failure(&agent);
        breaker.record_failure(&agent);
        breaker.record_success(&agent);

        // Counter reset: two more failures stay below the threshold.
        breaker.record_failure(&agent);
        breaker.record_failure(&agent);
        assert_eq!(breaker.admit(&agent), Admission::Allow);
    }

    #[test]
    fn test_half_open_admits_one_probe() {
        let breaker = fast_breaker(1);
        let agent = AgentId::new("worker");

        breaker.record_failure(&agent);
        assert_eq!(breaker.admit(&agent), Admission::Skip);

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(breaker.admit(&agent), Admission::Probe);
        // The probe is outstanding; nobody else gets in.
        assert_eq!(breaker.admit(&agent), Admission::Skip);
    }

    #[test]
    fn test_successful_probe_closes() {
        let breaker = fast_breaker(1);
        let agent = AgentId::new("worker");

        breaker.record_failure(&agent);
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(breaker.admit(&agent), Admission::Probe);

        breaker.record_success(&agent);
        assert_eq!(breaker.admit(&agent), Admission::Allow);
        assert_eq!(breaker.report(&agent).consecutive_failures, 0);
    }

    #[test]
    fn test_failed_probe_doubles_cooldown() {
        let breaker = fast_breaker(1);
        let agent = AgentId::new("worker");

        breaker.record_failure(&agent);
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(breaker.admit(&agent), Admission::Probe);
        breaker.record_failure(&agent);

        // Re-opened with a 100ms cool-down now; the original 50ms wait is
        // no longer enough.
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(breaker.admit(&agent), Admission::Skip);

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(breaker.admit(&agent), Admission::Probe);
    }
}
