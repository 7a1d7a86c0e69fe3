/*!
 * Disablement Escalation Test
 * Repeat disables stretch the re-enable deadline linearly; a success clears it
 */

use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use telemetry_guard::{
    Admission, BreakerConfig, Clock, ErrorOutcome, FeatureAwareBreaker, ManualClock, PatternTable,
};

const MISSING_EXTENSION: &str = r#"ERROR: relation "pg_stat_statements" does not exist"#;

fn breaker() -> (FeatureAwareBreaker, Arc<ManualClock>) {
    let clock = ManualClock::starting_now();
    (
        FeatureAwareBreaker::new(
            BreakerConfig::default(),
            PatternTable::builtin(),
            clock.clone(),
        ),
        clock,
    )
}

#[test]
fn test_linear_escalation() {
    let (b, clock) = breaker();
    let t0 = clock.now();

    match b.process_error(MISSING_EXTENSION, "top_queries") {
        ErrorOutcome::Suppressed {
            attempts,
            reenable_at,
            ..
        } => {
            assert_eq!(attempts, 1);
            assert_eq!(reenable_at, t0 + Duration::from_secs(30 * 60));
        }
        other => panic!("expected suppression, got {other:?}"),
    }

    clock.advance(Duration::from_secs(5 * 60));
    let t1 = clock.now();

    match b.process_error(MISSING_EXTENSION, "top_queries") {
        ErrorOutcome::Suppressed {
            attempts,
            reenable_at,
            ..
        } => {
            assert_eq!(attempts, 2);
            assert_eq!(reenable_at, t1 + Duration::from_secs(60 * 60));
        }
        other => panic!("expected suppression, got {other:?}"),
    }

    let records = b.get_disabled_operations();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].first_disabled_at, t0);
    assert_eq!(records[0].disabled_at, t1);
    assert_eq!(records[0].feature.as_str(), "pg_stat_statements");
}

#[test]
fn test_not_admitted_until_reenable() {
    let (b, clock) = breaker();
    b.process_error(MISSING_EXTENSION, "top_queries");

    clock.advance(Duration::from_secs(29 * 60));
    assert!(matches!(
        b.check_operation("top_queries"),
        Admission::Disabled(_)
    ));

    clock.advance(Duration::from_secs(61));
    assert_eq!(b.check_operation("top_queries"), Admission::Allowed);
}

#[test]
fn test_success_clears_unconditionally() {
    let (b, _) = breaker();
    for _ in 0..4 {
        b.process_error(MISSING_EXTENSION, "top_queries");
    }
    assert!(b.is_disabled("top_queries"));

    b.process_success("top_queries");
    assert!(!b.is_disabled("top_queries"));
    assert!(b.get_disabled_operations().is_empty());

    // Escalation starts over after a success
    match b.process_error(MISSING_EXTENSION, "top_queries") {
        ErrorOutcome::Suppressed { attempts, .. } => assert_eq!(attempts, 1),
        other => panic!("expected suppression, got {other:?}"),
    }
}

#[test]
fn test_concurrent_disables_never_lose_attempts() {
    let (b, _) = breaker();
    let b = Arc::new(b);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let b = Arc::clone(&b);
            std::thread::spawn(move || {
                for _ in 0..25 {
                    b.process_error(MISSING_EXTENSION, "top_queries");
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(b.get_disabled_operations()[0].attempts, 200);
}
