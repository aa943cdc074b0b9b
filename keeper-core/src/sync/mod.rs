//! Replica synchronization against the authoritative remote store.
//!
//! Implements the client side of the replication protocol:
//! - Cold hydration of an empty replica
//! - Push of unsynced local records (create for new, update otherwise)
//! - Pull of the remote dataset with `updated_at` conflict detection
//! - Fail-fast batches: the first error stops the batch, later records wait
//!   for the next tick

pub mod conflict;
pub mod engine;
pub mod gateway;
pub mod memory;
pub mod scheduler;


pub use conflict::{detect_conflict, ConflictKind};
pub use engine::{PushReport, SyncEngine, SyncEvent};
pub use gateway::{CallContext, RemoteGateway};
pub use memory::MemoryRemote;
pub use scheduler::SyncScheduler;
