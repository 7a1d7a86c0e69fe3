/*!
 * Processor Lifecycle Test
 * Reports flow through both pipelines; init and shutdown manage the sync task
 */

use std::sync::Arc;
use std::time::Duration;
use telemetry_guard::monitoring::counters::{REPORTS_PROCESSED, SHORT_CIRCUITS};
use telemetry_guard::{
    Admission, Clock, ErrorOutcome, ExecutionReport, GuardConfig, GuardProcessor, ManualClock,
    MemoryStore, NoopStore, Processor,
};

fn local_processor() -> (GuardProcessor, Arc<ManualClock>) {
    let clock = ManualClock::starting_now();
    let mut config = GuardConfig::default();
    config.sync.enabled = false;
    config
        .fallbacks
        .insert("stat_monitor".into(), "stat_statements".into());
    (
        GuardProcessor::new(config, Arc::new(NoopStore), clock.clone()).unwrap(),
        clock,
    )
}

#[test]
fn test_failed_reports_always_emitted() {
    let (guard, _) = local_processor();
    for _ in 0..50 {
        let verdict = guard.process(&ExecutionReport::failure(
            "top_queries",
            1.0,
            r#"relation "pg_stat_statements" does not exist"#,
        ));
        assert_eq!(verdict.sample_rate, 1.0);
        assert!(verdict.should_emit());
    }
    assert_eq!(guard.counters().get(REPORTS_PROCESSED), 50);
    assert_eq!(guard.counters().errors["suppressed"], 50);
}

#[test]
fn test_fallback_reported_in_verdict() {
    let (guard, _) = local_processor();
    let verdict = guard.process(&ExecutionReport::failure(
        "stat_monitor",
        1.0,
        r#"relation "pg_stat_monitor" does not exist"#,
    ));
    assert_eq!(verdict.fallback(), Some("stat_statements"));
    assert!(guard.get_disabled_operations().is_empty());
}

#[test]
fn test_connection_outage_short_circuits_then_recovers() {
    let (guard, clock) = local_processor();
    let refused = "connection refused";

    for _ in 0..5 {
        guard.process(&ExecutionReport::failure("replica_lag", 5_000.0, refused));
    }
    let verdict = guard.process(&ExecutionReport::failure("replica_lag", 5_000.0, refused));
    assert!(matches!(
        verdict.outcome,
        Some(ErrorOutcome::ShortCircuited { .. })
    ));
    assert_eq!(guard.counters().get(SHORT_CIRCUITS), 1);
    assert!(matches!(
        guard.check_operation("replica_lag"),
        Admission::BreakerOpen(_)
    ));

    clock.advance(Duration::from_secs(30));
    assert!(guard.check_operation("replica_lag").is_allowed());
    guard.process(&ExecutionReport::success("replica_lag", 12.0));
    assert!(guard.check_operation("replica_lag").is_allowed());
}

#[test]
fn test_global_outage_recovers_when_trial_fails_elsewhere() {
    let (guard, clock) = local_processor();
    let syntax = "syntax error at or near \"SELEKT\"";
    for _ in 0..5 {
        guard.process(&ExecutionReport::failure("bad_query", 1.0, syntax));
    }
    clock.advance(Duration::from_secs(31));
    assert!(guard.check_operation("replica_lag").is_allowed());
    guard.process(&ExecutionReport::failure("replica_lag", 5_000.0, "connection refused"));

    clock.advance(Duration::from_secs(24 * 3600));
    assert!(guard.check_operation("replica_lag").is_allowed());
    assert!(matches!(
        guard.check_operation("bad_query"),
        Admission::BreakerOpen(_)
    ));
    guard.process(&ExecutionReport::success("replica_lag", 12.0));
    assert!(guard.check_operation("bad_query").is_allowed());
}

#[test]
fn test_report_timestamps_drive_throughput() {
    let (guard, clock) = local_processor();
    let start = clock.now();
    for i in 0..10 {
        let report = ExecutionReport::success("q", 5.0).at(start + Duration::from_secs(i));
        guard.process(&report);
    }

    let stats = guard.stats("q").unwrap();
    assert_eq!(stats.first_seen, start);
    assert_eq!(stats.last_seen, start + Duration::from_secs(9));
    assert!((stats.executions_per_second() - 10.0 / 9.0).abs() < 1e-9);
}

#[test]
fn test_success_reenables_operation() {
    let (guard, _) = local_processor();
    guard.process(&ExecutionReport::failure(
        "grants",
        1.0,
        "permission denied for table pg_authid",
    ));
    assert!(matches!(
        guard.check_operation("grants"),
        Admission::Disabled(_)
    ));

    guard.process(&ExecutionReport::success("grants", 3.0));
    assert_eq!(guard.check_operation("grants"), Admission::Allowed);
    assert!(guard.stats("grants").is_some());
}

#[tokio::test]
async fn test_init_spawns_and_shutdown_flushes() {
    let clock = ManualClock::starting_now();
    let store = Arc::new(MemoryStore::new(clock.clone()));
    let guard = GuardProcessor::new(GuardConfig::default(), store.clone(), clock).unwrap();

    guard.init().await.unwrap();
    assert!(guard.is_running());

    guard.process(&ExecutionReport::success("orders", 120.0));
    guard.process(&ExecutionReport::success("invoices", 80.0));

    guard.shutdown().await.unwrap();
    assert!(!guard.is_running());
    assert_eq!(store.len(), 2);
}
