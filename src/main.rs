/*!
 * Guard Simulator - Main Entry Point
 *
 * Replays a synthetic execution feed through the guard:
 * - cheap and expensive queries at different volumes
 * - a missing extension, a missing view with a fallback
 * - a burst of connection failures
 *
 * Configuration: GUARD_CONFIG (JSON path), otherwise defaults.
 */

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use telemetry_guard::{
    init_tracing, system_clock, ExecutionReport, GuardConfig, GuardProcessor, MemoryStore,
    Processor,
};

const ROUNDS: u64 = 500;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = match std::env::var("GUARD_CONFIG") {
        Ok(path) => GuardConfig::from_file(&path)
            .with_context(|| format!("loading guard configuration from {path}"))?,
        Err(_) => {
            let mut config = GuardConfig::default();
            config.apply_env_overrides();
            config
                .fallbacks
                .insert("stat_monitor".to_string(), "stat_statements".to_string());
            config
        }
    };

    let clock = system_clock();
    let store = Arc::new(MemoryStore::new(clock.clone()));
    let guard = GuardProcessor::new(config, store.clone(), clock)?;
    guard.init().await?;

    info!(rounds = ROUNDS, "Replaying synthetic execution feed");
    let mut emitted = 0u64;
    let mut total = 0u64;
    for round in 0..ROUNDS {
        for report in feed(round) {
            if !guard.check_operation(report.operation_id.as_str()).is_allowed() {
                continue;
            }
            total += 1;
            if guard.process(&report).should_emit() {
                emitted += 1;
            }
        }
        if round % 100 == 99 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    info!(total, emitted, "Feed complete");
    for op in guard.get_disabled_operations() {
        info!(
            operation = %op.operation_id,
            feature = %op.feature,
            attempts = op.attempts,
            "Disabled operation"
        );
    }
    for snapshot in guard.breaker_snapshots() {
        info!(
            breaker = %snapshot.name,
            state = %snapshot.state,
            failures = snapshot.failure_count,
            trips = snapshot.trips,
            "Breaker"
        );
    }

    guard.shutdown().await?;
    info!(
        counters = %serde_json::to_string(&guard.counters())?,
        shared_entries = store.len(),
        "Guard simulator finished"
    );
    Ok(())
}

/// One round of synthetic reports
fn feed(round: u64) -> Vec<ExecutionReport> {
    let mut reports = Vec::with_capacity(16);

    for i in 0..10 {
        reports.push(ExecutionReport::success(
            "health_check",
            1.0 + (i % 3) as f64,
        ));
    }
    reports.push(ExecutionReport::success(
        "orders_rollup",
        600.0 + ((round * 37) % 900) as f64,
    ));
    reports.push(ExecutionReport::success("billing_close", 250.0).critical());

    reports.push(ExecutionReport::failure(
        "top_queries",
        2.0,
        r#"ERROR: relation "pg_stat_statements" does not exist"#,
    ));
    reports.push(ExecutionReport::failure(
        "stat_monitor",
        2.0,
        r#"ERROR: relation "pg_stat_monitor" does not exist"#,
    ));

    if (100..130).contains(&round) {
        reports.push(ExecutionReport::failure(
            "replica_lag",
            5_000.0,
            "dial tcp 10.0.0.12:5432: connection refused",
        ));
    } else {
        reports.push(ExecutionReport::success("replica_lag", 15.0));
    }

    reports
}
