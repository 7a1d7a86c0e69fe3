/*!
 * Shared State
 * Cross-instance synchronization of sampling profiles
 */

pub mod store;
pub mod synchronizer;
pub mod task;

pub use store::{MemoryStore, NoopStore, SharedStore};
pub use synchronizer::{StateSynchronizer, SyncRecord};
pub use task::{SyncCommand, SyncTask};
