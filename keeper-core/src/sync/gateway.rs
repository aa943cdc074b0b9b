//! Seam to the remote store and the deadline every outbound call runs under.

use crate::record::Record;
use crate::{KeeperError, Result};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Remote record store, implemented by the transport layer.
///
/// Credentials are attached by the implementation; callers only ever see
/// [`KeeperError::Auth`] when they are missing or rejected.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Store a record the remote has never seen. The remote assigns the id
    /// and timestamps when absent.
    async fn create(&self, record: Record) -> Result<Record>;

    /// Overwrite an existing remote record.
    async fn update(&self, record: Record) -> Result<Record>;

    /// All records of the authenticated principal when `ids` is empty.
    /// Unmatched ids produce an empty collection, not an error.
    async fn read(&self, ids: &[Uuid]) -> Result<Vec<Record>>;

    async fn delete(&self, ids: &[Uuid]) -> Result<()>;
}

/// Cancellation and deadline applied to one outbound remote call.
#[derive(Debug, Clone)]
pub struct CallContext {
    cancel: CancellationToken,
    timeout: Duration,
}

impl CallContext {
    pub fn new(cancel: CancellationToken, timeout: Duration) -> Self {
        Self { cancel, timeout }
    }

    /// Run `call`, surfacing expiry or cancellation as a transport failure.
    pub async fn run<T, F>(&self, op: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                Err(KeeperError::Transport(format!("{} cancelled", op)))
            }
            outcome = tokio::time::timeout(self.timeout, call) => match outcome {
                Ok(result) => result,
                Err(_) => Err(KeeperError::Transport(format!(
                    "{} timed out after {}ms",
                    op,
                    self.timeout.as_millis()
                ))),
            },
        }
    }
}
