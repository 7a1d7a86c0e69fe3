/*!
 * Structured Tracing
 * Subscriber setup and spans for the guard's background work
 *
 * Features:
 * - EnvFilter driven levels (RUST_LOG, default info)
 * - JSON output for collectors, compact output for development
 * - Pass spans carrying a correlation id, entry count and outcome
 */

use std::time::Instant;
use tracing::{debug, info, span, warn, Level};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};
use uuid::Uuid;

/// Environment switch for JSON output
pub const ENV_TRACE_JSON: &str = "GUARD_TRACE_JSON";

/// Passes slower than this are reported at warn level
const SLOW_PASS_MS: u128 = 1000;

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - GUARD_TRACE_JSON: Enable JSON output (default: false)
///
/// Returns false when a global subscriber was already installed.
pub fn init_tracing() -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var(ENV_TRACE_JSON)
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .is_ok()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()
            .is_ok()
    };

    if installed {
        info!(json = use_json, "Structured tracing initialized");
    }
    installed
}

/// Generate a unique id for correlating one pass across log lines
pub fn generate_trace_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span around one background pass (sync, load)
pub struct PassSpan {
    span: tracing::Span,
    start: Instant,
    pass: &'static str,
    trace_id: String,
}

impl PassSpan {
    pub fn new(pass: &'static str) -> Self {
        let trace_id = generate_trace_id();
        let span = span!(
            Level::DEBUG,
            "guard_pass",
            trace_id = %trace_id,
            pass = pass,
            entries = tracing::field::Empty,
            result = tracing::field::Empty,
            error = tracing::field::Empty,
        );

        Self {
            span,
            start: Instant::now(),
            pass,
            trace_id,
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    pub fn record_entries(&self, count: usize) {
        self.span.record("entries", count);
    }

    pub fn record_result(&self, success: bool) {
        self.span
            .record("result", if success { "success" } else { "error" });
    }

    pub fn record_error(&self, error: &str) {
        self.span.record("error", error);
        self.span.record("result", "error");
    }
}

impl Drop for PassSpan {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let _entered = self.span.enter();
        if elapsed.as_millis() > SLOW_PASS_MS {
            warn!(
                trace_id = %self.trace_id,
                pass = self.pass,
                duration_ms = elapsed.as_millis() as u64,
                slow = true,
                "slow guard pass"
            );
        } else {
            debug!(
                trace_id = %self.trace_id,
                pass = self.pass,
                duration_us = elapsed.as_micros() as u64,
                "guard pass completed"
            );
        }
    }
}
