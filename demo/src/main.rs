//! MAESTRO — Traffic-monitoring demo CLI
//!
//! Wires real MAESTRO components (registry, state store, circuit
//! breaker, orchestrator) around mock traffic agents.
//!
//! Usage:
//!   cargo run -p demo -- run
//!   cargo run -p demo -- flaky

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use maestro_contracts::{
    entity::EntityType,
    error::MaestroResult,
    result::RunResult,
};
use maestro_engine::{BreakerConfig, EngineConfig, Orchestrator};
use maestro_state::StateStore;

mod agents;

// ── CLI definition ────────────────────────────────────────────────────────────

/// MAESTRO — dependency-aware workflow orchestration demo.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "MAESTRO traffic-monitoring demo",
    long_about = "Runs MAESTRO demo workflows showing dependency-batched scheduling,\n\
                  retry with backoff, circuit breaking, and hash-chained entity lifecycle tracking."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// The three-phase traffic workflow: ingest → analyze → publish.
    Run,
    /// A persistently failing feed: retries, backoff, then circuit-open skips.
    Flaky,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Structured logging; set RUST_LOG=debug for verbose engine output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run => run_traffic().await,
        Command::Flaky => run_flaky().await,
    };

    if let Err(e) = result {
        eprintln!("Demo error: {}", e);
        std::process::exit(1);
    }
}

// ── Scenarios ─────────────────────────────────────────────────────────────────

async fn run_traffic() -> MaestroResult<()> {
    println!();
    println!("MAESTRO — Traffic Monitoring Workflow");
    println!("=====================================");
    println!();

    let store = Arc::new(StateStore::new(Arc::new(agents::traffic_state_machine())));
    let orchestrator = Orchestrator::new(
        Arc::new(agents::traffic_registry()),
        Arc::clone(&store),
    );

    let result = orchestrator.run_workflow(&agents::traffic_workflow()).await?;
    print_run(&result);

    println!("Tracked entities:");
    for type_name in ["device", "incident", "zone"] {
        let entity_type = EntityType::new(type_name);
        for id in store.entity_ids(&entity_type) {
            let entity = store
                .current_state(&entity_type, &id)
                .expect("listed entities have state");
            let chain_ok = store.verify_integrity(&entity_type, &id);
            println!(
                "  {}/{} — status={} version={} chain={}",
                type_name,
                id,
                entity.status,
                entity.version,
                if chain_ok { "verified" } else { "BROKEN" },
            );
        }
    }
    println!();

    Ok(())
}

async fn run_flaky() -> MaestroResult<()> {
    println!();
    println!("MAESTRO — Circuit Breaker Showcase");
    println!("==================================");
    println!();
    println!("The feed agent fails every call. Watch the retries burn down,");
    println!("the circuit trip open, and invocations turn into skips.");
    println!();

    let store = Arc::new(StateStore::new(Arc::new(agents::traffic_state_machine())));
    let orchestrator = Orchestrator::with_config(
        EngineConfig {
            backoff_base: Duration::from_millis(200),
            backoff_cap: Duration::from_secs(2),
            ..EngineConfig::default()
        },
        BreakerConfig {
            failure_threshold: 2,
            cooldown: Duration::from_secs(2),
            max_cooldown: Duration::from_secs(8),
        },
        Arc::new(agents::traffic_registry()),
        store,
    );

    let workflow = agents::flaky_workflow();
    for attempt in 1..=4 {
        println!("── run {} ──", attempt);
        let result = orchestrator.run_workflow(&workflow).await?;
        print_run(&result);
    }

    println!("Waiting out the cool-down for a half-open probe...");
    tokio::time::sleep(Duration::from_millis(2200)).await;

    println!("── probe run ──");
    let result = orchestrator.run_workflow(&workflow).await?;
    print_run(&result);

    Ok(())
}

/// One line per agent, plus the run verdict.
fn print_run(result: &RunResult) {
    for phase in &result.phases {
        println!("phase '{}':", phase.phase);
        for r in &phase.results {
            let detail = match (&r.output, &r.error) {
                (_, Some(err)) => format!(" ({})", err),
                (Some(out), None) => format!(" {}", out),
                (None, None) => String::new(),
            };
            println!(
                "  {:<20} {:<8} attempts={} {:>6}ms{}",
                r.agent.as_str(),
                r.status.as_str(),
                r.attempts,
                r.duration.as_millis(),
                detail,
            );
        }
    }
    println!(
        "run {}: {} in {}ms{}",
        result.run_id,
        result.status.as_str(),
        result.duration.as_millis(),
        result
            .first_error
            .as_deref()
            .map(|e| format!(" — first error: {}", e))
            .unwrap_or_default(),
    );
    println!();
}
