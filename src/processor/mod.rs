/*!
 * Processor
 * Lifecycle wiring of the guard into a telemetry pipeline
 */

pub mod guard;
pub mod traits;
pub mod types;

pub use guard::GuardProcessor;
pub use traits::Processor;
pub use types::Verdict;
