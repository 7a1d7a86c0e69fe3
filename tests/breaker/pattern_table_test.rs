/*!
 * Pattern Table Test
 * Built-in classification rules and config-supplied tables
 */

use std::time::Duration;
use telemetry_guard::{ErrorPatternConfig, GuardError, PatternAction, PatternTable};

#[test]
fn test_builtin_classification() {
    let table = PatternTable::builtin();
    let cases = [
        (r#"relation "pg_stat_statements" does not exist"#, "pg_stat_statements_missing", PatternAction::DisableOperation),
        (r#"relation "pg_stat_monitor" does not exist"#, "pg_stat_monitor_missing", PatternAction::UseFallback),
        ("function pg_ls_waldir() does not exist", "extension_not_loaded", PatternAction::DisableOperation),
        ("permission denied for relation pg_authid", "permission_denied", PatternAction::DisableOperation),
        ("read: connection reset by peer", "connection_failed", PatternAction::TripBreaker),
        ("FATAL: too many connections for role \"monitor\"", "too_many_connections", PatternAction::TripBreaker),
        ("ERROR: canceling statement due to statement timeout", "query_timeout", PatternAction::TripBreaker),
        ("this feature not supported on Amazon RDS", "rds_feature_unavailable", PatternAction::DisableOperation),
    ];

    for (message, name, action) in cases {
        let pattern = table
            .classify(message)
            .unwrap_or_else(|| panic!("no rule for {message}"));
        assert_eq!(pattern.name, name, "message: {message}");
        assert_eq!(pattern.action, action, "message: {message}");
    }
    assert!(table.classify("syntax error at or near SELEC").is_none());
}

#[test]
fn test_first_match_wins() {
    // Both performance_schema rules match; the broader one is listed first
    let table = PatternTable::builtin();
    let pattern = table
        .classify("Table 'performance_schema.events_statements_current' doesn't exist")
        .unwrap();
    assert_eq!(pattern.name, "performance_schema_disabled");
}

#[test]
fn test_invalid_regex_rejected() {
    let configs = vec![ErrorPatternConfig {
        name: "broken".into(),
        pattern: "relation (".into(),
        action: PatternAction::DisableOperation,
        feature: "x".into(),
        backoff: Duration::from_secs(60),
        description: String::new(),
    }];
    assert!(matches!(
        PatternTable::from_configs(&configs),
        Err(GuardError::InvalidPattern { .. })
    ));
}
