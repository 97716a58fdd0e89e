//! Mock traffic-monitoring agents for the demo workflows.
//!
//! Each agent simulates one collaborator of a smart-city traffic
//! pipeline: camera and loop-sensor ingestion, incident detection and
//! confirmation, zone congestion monitoring, and a final publisher. Real
//! deployments would put vision inference or broker calls behind the
//! same contract; the demo agents record believable lifecycle
//! transitions instead.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use maestro_contracts::{
    agent::{AgentDescriptor, AgentId, Phase, Workflow},
    entity::{EntityId, EntityType},
    error::AgentError,
};
use maestro_engine::{AgentRegistry, RunSnapshot};
use maestro_state::{StateMachine, TransitionTable};

/// The transition tables every demo workflow runs against.
pub fn traffic_state_machine() -> StateMachine {
    let mut machine = StateMachine::new();

    machine
        .define(
            EntityType::new("device"),
            TransitionTable::new("provisioned")
                .allow("provisioned", &["active"])
                // "active" re-enters itself on each heartbeat.
                .allow("active", &["active", "inactive"])
                .terminal(&["inactive"]),
        )
        .expect("device table is well-formed");

    machine
        .define(
            EntityType::new("incident"),
            TransitionTable::new("detected")
                .allow("detected", &["confirmed", "dismissed"])
                .allow("confirmed", &["resolved"])
                .terminal(&["resolved", "dismissed"]),
        )
        .expect("incident table is well-formed");

    machine
        .define(
            EntityType::new("zone"),
            TransitionTable::new("clear")
                .allow("clear", &["congested"])
                .allow("congested", &["clear"]),
        )
        .expect("zone table is well-formed");

    machine
}

// ── Ingest agents ─────────────────────────────────────────────────────────────

/// Simulates a camera feed: activates its device and reports a vehicle
/// count.
struct CameraIngest;

#[async_trait]
impl maestro_engine::Agent for CameraIngest {
    async fn run(&self, ctx: &RunSnapshot) -> Result<Value, AgentError> {
        let device = EntityType::new("device");
        let id = EntityId::new("cam-north-01");
        let me = AgentId::new("camera-ingest");
        let store = ctx.store();

        if store.current_state(&device, &id).is_none() {
            store
                .record_transition(&device, &id, "provisioned", &me, json!({}))
                .map_err(|e| AgentError::Fatal(e.to_string()))?;
        }
        store
            .record_transition(&device, &id, "active", &me, json!({ "fps": 25 }))
            .map_err(|e| AgentError::Fatal(e.to_string()))?;

        Ok(json!({ "device": "cam-north-01", "vehicle_count": 87 }))
    }

    fn name(&self) -> &str {
        "camera-ingest"
    }
}

/// Simulates an inductive loop sensor on the same intersection.
struct LoopSensorIngest;

#[async_trait]
impl maestro_engine::Agent for LoopSensorIngest {
    async fn run(&self, ctx: &RunSnapshot) -> Result<Value, AgentError> {
        let device = EntityType::new("device");
        let id = EntityId::new("loop-north-07");
        let me = AgentId::new("sensor-ingest");
        let store = ctx.store();

        if store.current_state(&device, &id).is_none() {
            store
                .record_transition(&device, &id, "provisioned", &me, json!({}))
                .map_err(|e| AgentError::Fatal(e.to_string()))?;
        }
        store
            .record_transition(&device, &id, "active", &me, json!({ "occupancy": 0.62 }))
            .map_err(|e| AgentError::Fatal(e.to_string()))?;

        Ok(json!({ "device": "loop-north-07", "occupancy": 0.62 }))
    }

    fn name(&self) -> &str {
        "sensor-ingest"
    }
}

// ── Analysis agents ───────────────────────────────────────────────────────────

/// Cross-checks the ingest outputs and raises an incident.
struct IncidentDetector;

#[async_trait]
impl maestro_engine::Agent for IncidentDetector {
    async fn run(&self, ctx: &RunSnapshot) -> Result<Value, AgentError> {
        let camera = ctx
            .output_of(&AgentId::new("camera-ingest"))
            .ok_or_else(|| AgentError::Fatal("camera output missing".to_string()))?;
        let count = camera["vehicle_count"].as_u64().unwrap_or(0);

        let incident = EntityType::new("incident");
        let id = EntityId::new("inc-0042");
        let me = AgentId::new("incident-detector");

        ctx.store()
            .record_transition(
                &incident,
                &id,
                "detected",
                &me,
                json!({ "vehicle_count": count, "camera": "cam-north-01" }),
            )
            .map_err(|e| AgentError::Fatal(e.to_string()))?;

        Ok(json!({ "incident": "inc-0042", "severity": "major" }))
    }

    fn name(&self) -> &str {
        "incident-detector"
    }
}

/// Confirms the detector's incident against the sensor data.
struct IncidentConfirmer;

#[async_trait]
impl maestro_engine::Agent for IncidentConfirmer {
    async fn run(&self, ctx: &RunSnapshot) -> Result<Value, AgentError> {
        let incident = EntityType::new("incident");
        let id = EntityId::new("inc-0042");
        let me = AgentId::new("incident-confirmer");

        let entity = ctx
            .store()
            .record_transition(&incident, &id, "confirmed", &me, json!({ "source": "loop" }))
            .map_err(|e| AgentError::Fatal(e.to_string()))?;

        Ok(json!({ "incident": "inc-0042", "version": entity.version }))
    }

    fn name(&self) -> &str {
        "incident-confirmer"
    }
}

/// Marks the affected zone congested.
struct ZoneMonitor;

#[async_trait]
impl maestro_engine::Agent for ZoneMonitor {
    async fn run(&self, ctx: &RunSnapshot) -> Result<Value, AgentError> {
        let zone = EntityType::new("zone");
        let id = EntityId::new("zone-north");
        let me = AgentId::new("zone-monitor");
        let store = ctx.store();

        if store.current_state(&zone, &id).is_none() {
            store
                .record_transition(&zone, &id, "clear", &me, json!({}))
                .map_err(|e| AgentError::Fatal(e.to_string()))?;
        }
        store
            .record_transition(&zone, &id, "congested", &me, json!({ "avg_speed_kmh": 11 }))
            .map_err(|e| AgentError::Fatal(e.to_string()))?;

        Ok(json!({ "zone": "zone-north", "status": "congested" }))
    }

    fn name(&self) -> &str {
        "zone-monitor"
    }
}

// ── Publisher ─────────────────────────────────────────────────────────────────

/// Collects the analysis outputs into a published report payload.
struct ReportPublisher;

#[async_trait]
impl maestro_engine::Agent for ReportPublisher {
    async fn run(&self, ctx: &RunSnapshot) -> Result<Value, AgentError> {
        let incident = ctx.output_of(&AgentId::new("incident-confirmer"));
        let zone = ctx.output_of(&AgentId::new("zone-monitor"));

        Ok(json!({
            "published": true,
            "incident": incident.cloned().unwrap_or(Value::Null),
            "zone": zone.cloned().unwrap_or(Value::Null),
        }))
    }

    fn name(&self) -> &str {
        "report-publisher"
    }
}

/// Fails transiently on every call, for the circuit-breaker showcase.
pub struct UnreliableFeed {
    calls: AtomicU32,
}

impl UnreliableFeed {
    pub fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl maestro_engine::Agent for UnreliableFeed {
    async fn run(&self, _ctx: &RunSnapshot) -> Result<Value, AgentError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Err(AgentError::Transient(format!(
            "feed endpoint unreachable (call {})",
            call
        )))
    }

    fn name(&self) -> &str {
        "unreliable-feed"
    }
}

// ── Registry and workflows ────────────────────────────────────────────────────

/// All demo agents, registered under their workflow names.
pub fn traffic_registry() -> AgentRegistry {
    let mut registry = AgentRegistry::new();
    registry.register("camera-ingest", || Arc::new(CameraIngest));
    registry.register("sensor-ingest", || Arc::new(LoopSensorIngest));
    registry.register("incident-detector", || Arc::new(IncidentDetector));
    registry.register("incident-confirmer", || Arc::new(IncidentConfirmer));
    registry.register("zone-monitor", || Arc::new(ZoneMonitor));
    registry.register("report-publisher", || Arc::new(ReportPublisher));

    // One shared instance so its failure count survives across runs.
    registry.register_instance("unreliable-feed", Arc::new(UnreliableFeed::new()));
    registry
}

/// The three-phase traffic-monitoring workflow: ingest → analyze →
/// publish.
pub fn traffic_workflow() -> Workflow {
    Workflow::new(
        "traffic-monitoring",
        vec![
            Phase::new(
                "ingest",
                vec![
                    AgentDescriptor::new("camera-ingest"),
                    AgentDescriptor::new("sensor-ingest"),
                ],
            ),
            Phase::new(
                "analyze",
                vec![
                    AgentDescriptor::new("incident-detector"),
                    AgentDescriptor::new("incident-confirmer")
                        .depends_on(&["incident-detector"]),
                    AgentDescriptor::new("zone-monitor"),
                ],
            ),
            Phase::new("publish", vec![AgentDescriptor::new("report-publisher")]),
        ],
    )
}

/// A single-phase workflow around the always-failing feed, tolerant so
/// the process can run it repeatedly.
pub fn flaky_workflow() -> Workflow {
    Workflow::new(
        "flaky-feed",
        vec![Phase::new(
            "ingest",
            vec![AgentDescriptor::new("unreliable-feed").max_retries(1)],
        )
        .tolerate_failures()],
    )
}
