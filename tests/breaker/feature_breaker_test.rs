/*!
 * Feature Breaker Test
 * Connection failures trip a feature-scoped breaker; bound operations are
 * short-circuited until the cooldown elapses
 */

use std::sync::Arc;
use std::time::Duration;
use telemetry_guard::breaker::GLOBAL_BREAKER;
use telemetry_guard::{
    Admission, BreakerConfig, BreakerState, ErrorOutcome, FeatureAwareBreaker, GuardError,
    ManualClock, OperationRequirements, PatternTable, StaticDetector,
};

const REFUSED: &str = "dial tcp 10.1.2.3:5432: connect: connection refused";

fn breaker(threshold: u32) -> (FeatureAwareBreaker, Arc<ManualClock>) {
    let clock = ManualClock::starting_now();
    let config = BreakerConfig {
        failure_threshold: threshold,
        ..BreakerConfig::default()
    };
    (
        FeatureAwareBreaker::new(config, PatternTable::builtin(), clock.clone()),
        clock,
    )
}

#[test]
fn test_connection_breaker_trips_and_short_circuits() {
    let (b, clock) = breaker(5);

    for i in 1..=5 {
        match b.process_error(REFUSED, "replica_lag") {
            ErrorOutcome::PassThrough { breaker, state, .. } => {
                assert_eq!(breaker.as_str(), "connection");
                let expected = if i < 5 {
                    BreakerState::Closed
                } else {
                    BreakerState::Open
                };
                assert_eq!(state, expected);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    // Bound operation: no renewed classification
    for _ in 0..10 {
        assert_eq!(
            b.process_error(REFUSED, "replica_lag"),
            ErrorOutcome::ShortCircuited {
                feature: "connection".into()
            }
        );
    }
    assert_eq!(
        b.check_operation("replica_lag"),
        Admission::BreakerOpen("connection".into())
    );

    let snap = b.existing_breaker("connection").unwrap().snapshot();
    assert_eq!(snap.cooldown, Duration::from_secs(30));
    assert_eq!(snap.trips, 1);

    // Cooldown elapses: one trial, then success closes the breaker
    clock.advance(Duration::from_secs(30));
    assert!(b.check_operation("replica_lag").is_allowed());
    assert!(!b.check_operation("replica_lag").is_allowed());
    b.process_success("replica_lag");
    assert!(b.check_operation("replica_lag").is_allowed());
    assert_eq!(
        b.existing_breaker("connection").unwrap().state(),
        BreakerState::Closed
    );
}

#[test]
fn test_unclassified_errors_open_global_breaker() {
    let (b, clock) = breaker(3);
    for _ in 0..3 {
        b.process_error("something nobody has seen before", "q");
    }
    assert_eq!(b.global_breaker().state(), BreakerState::Open);
    assert_eq!(
        b.check_operation("anything"),
        Admission::BreakerOpen(GLOBAL_BREAKER.into())
    );

    clock.advance(Duration::from_secs(31));
    assert!(b.check_operation("anything").is_allowed());
    b.process_success("anything");
    assert_eq!(b.global_breaker().state(), BreakerState::Closed);
}

#[test]
fn test_fallback_and_degraded_fallback() {
    let (b, _) = breaker(5);
    b.set_fallback_query("stat_monitor", "stat_statements");

    let outcome = b.process_error(r#"relation "pg_stat_monitor" does not exist"#, "stat_monitor");
    assert_eq!(outcome.fallback(), Some("stat_statements"));
    assert!(matches!(
        outcome.into_result(),
        Err(GuardError::FallbackRequired(_))
    ));

    let outcome = b.process_error(
        "Table 'performance_schema.events_statements_summary_by_digest' doesn't exist",
        "digest_summary",
    );
    match outcome {
        ErrorOutcome::Suppressed { error, .. } => {
            assert!(error.message.starts_with("no fallback available: "));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn test_snapshots_global_first() {
    let (b, _) = breaker(5);
    b.process_error("too many connections for role", "a");
    b.process_error("canceling statement due to statement timeout", "b");

    let names: Vec<String> = b
        .breaker_snapshots()
        .into_iter()
        .map(|s| s.name.to_string())
        .collect();
    assert_eq!(names, vec!["global", "connection_limit", "query_performance"]);
}

#[test]
fn test_validate_operation_with_detector() {
    let (b, _) = breaker(5);
    let requirements = OperationRequirements::new("wait_events").extension("pg_wait_sampling");

    // No detector installed: nothing to validate against
    assert!(b.validate_operation(&requirements).is_ok());

    b.set_detector(Arc::new(StaticDetector::new(["pg_stat_statements"])));
    assert!(matches!(
        b.validate_operation(&requirements),
        Err(GuardError::MissingCapability { .. })
    ));
}

const SYNTAX: &str = "syntax error at or near \"SELEKT\"";

#[test]
fn test_global_trial_failing_on_feature_breaker_reopens_global() {
    let (b, clock) = breaker(3);
    for _ in 0..3 {
        b.process_error(SYNTAX, "bad_query");
    }
    clock.advance(Duration::from_secs(31));
    assert!(b.check_operation("replica_lag").is_allowed());

    // The trial fails, but the failure is blamed on the connection breaker
    b.process_error(REFUSED, "replica_lag");
    assert_eq!(b.global_breaker().state(), BreakerState::Open);
    assert_eq!(b.global_breaker().snapshot().trips, 2);
    assert_eq!(
        b.check_operation("other"),
        Admission::BreakerOpen(GLOBAL_BREAKER.into())
    );

    clock.advance(Duration::from_secs(30));
    assert!(b.check_operation("replica_lag").is_allowed());
    b.process_success("replica_lag");
    assert!(b.check_operation("other").is_allowed());
}

#[test]
fn test_feature_trial_failing_on_disable_pattern_reopens_feature() {
    let (b, clock) = breaker(3);
    for _ in 0..3 {
        b.process_error(REFUSED, "replica_lag");
    }
    clock.advance(Duration::from_secs(31));
    assert!(b.check_operation("replica_lag").is_allowed());

    let outcome = b.process_error("permission denied for table pg_authid", "replica_lag");
    assert!(outcome.is_suppressed());
    let connection = b.existing_breaker("connection").unwrap();
    assert_eq!(connection.state(), BreakerState::Open);

    // One cooldown later the breaker offers a trial again
    clock.advance(Duration::from_secs(30));
    assert_eq!(connection.state(), BreakerState::HalfOpen);
    assert!(!connection.is_short_circuiting());

    // Once the disable window is over the operation is admitted
    clock.advance(Duration::from_secs(3600));
    assert!(b.check_operation("replica_lag").is_allowed());
}

#[test]
fn test_feature_trial_failing_unclassified_reopens_feature() {
    let (b, clock) = breaker(3);
    for _ in 0..3 {
        b.process_error(REFUSED, "replica_lag");
    }
    clock.advance(Duration::from_secs(31));
    assert!(b.check_operation("replica_lag").is_allowed());

    b.process_error(SYNTAX, "replica_lag");
    assert_eq!(
        b.existing_breaker("connection").unwrap().state(),
        BreakerState::Open
    );
    assert_eq!(b.global_breaker().snapshot().failure_count, 1);

    clock.advance(Duration::from_secs(30));
    assert!(b.check_operation("replica_lag").is_allowed());
}

#[test]
fn test_feature_trial_kept_while_global_rejects() {
    let (b, clock) = breaker(3);
    for _ in 0..3 {
        b.process_error(REFUSED, "replica_lag");
        b.process_error(SYNTAX, "bad_query");
    }
    clock.advance(Duration::from_secs(31));

    // Another operation holds the global trial
    assert!(b.check_operation("other").is_allowed());
    assert_eq!(
        b.check_operation("replica_lag"),
        Admission::BreakerOpen(GLOBAL_BREAKER.into())
    );
    let connection = b.existing_breaker("connection").unwrap();
    assert!(!connection.is_short_circuiting());

    b.process_success("other");
    assert!(b.check_operation("replica_lag").is_allowed());
    b.process_success("replica_lag");
    assert_eq!(connection.state(), BreakerState::Closed);
}

#[test]
fn test_unreported_trial_expires() {
    let (b, clock) = breaker(3);
    for _ in 0..3 {
        b.process_error(REFUSED, "replica_lag");
    }
    clock.advance(Duration::from_secs(31));
    assert!(b.check_operation("replica_lag").is_allowed());
    assert_eq!(
        b.check_operation("replica_lag"),
        Admission::BreakerOpen("connection".into())
    );

    clock.advance(Duration::from_secs(30));
    assert!(b.check_operation("replica_lag").is_allowed());
}
