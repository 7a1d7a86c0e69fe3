/*!
 * Monitoring
 * Tracing setup and guard counters
 */

pub mod counters;
pub mod tracer;

pub use counters::{CountersSnapshot, GuardCounters};
pub use tracer::{generate_trace_id, init_tracing, PassSpan};
