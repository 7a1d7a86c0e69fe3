/*!
 * Core Module
 * Fundamental guard types, constants, clock and error handling
 */

pub mod errors;
pub mod limits;
pub mod time;
pub mod types;

// Re-export for convenience
pub use errors::*;
pub use time::{system_clock, Clock, ManualClock, SharedClock, SystemClock};
pub use types::*;
