//! Keeper Core Library
//!
//! Client-side replica of a user's secrets (credentials, notes, cards) and
//! the engine that reconciles it with the authoritative remote store.
//!
//! - [`store::ReplicaStore`] owns the in-memory record map.
//! - [`sync::SyncEngine`] drives hydration, push and pull against a
//!   [`sync::RemoteGateway`].
//! - [`vault::RecordService`] is the surface the presentation layer talks to,
//!   directly or through the [`vault::KeeperHandle`] command channel.

pub mod config;
pub mod record;
pub mod store;
pub mod sync;
pub mod validation;
pub mod vault;

pub use config::ClientConfig;
pub use record::{CardDetails, MetaData, Payload, Record, RecordKind, SyncState};
pub use store::ReplicaStore;
pub use sync::{
    CallContext, ConflictKind, MemoryRemote, RemoteGateway, SyncEngine, SyncEvent, SyncScheduler,
};
pub use vault::{CommandDispatcher, KeeperHandle, RecordService};

use thiserror::Error;
use uuid::Uuid;

/// Result type for keeper operations
pub type Result<T> = std::result::Result<T, KeeperError>;

/// General error type for keeper operations
#[derive(Error, Debug)]
pub enum KeeperError {
    /// Malformed record, rejected before it reaches the store.
    #[error("Invalid record: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Local and remote `updated_at` disagree for the same record.
    #[error("Conflict on record {id}: {kind} (local {local}, remote {remote})")]
    Conflict {
        id: Uuid,
        kind: ConflictKind,
        local: chrono::DateTime<chrono::Utc>,
        remote: chrono::DateTime<chrono::Utc>,
    },

    /// Network, timeout, cancellation or remote-internal failure.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unauthenticated: {0}")]
    Auth(String),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    /// The command dispatcher has stopped accepting requests.
    #[error("Keeper is shutting down")]
    ShuttingDown,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl KeeperError {
    /// Whether the next scheduled tick may succeed where this call failed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
