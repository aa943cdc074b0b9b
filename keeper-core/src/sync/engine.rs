//! Sync engine: orchestrates hydrate/push/pull against the remote gateway.

use crate::record::Record;
use crate::store::ReplicaStore;
use crate::sync::conflict::detect_conflict;
use crate::sync::gateway::{CallContext, RemoteGateway};
use crate::{KeeperError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 16;

/// Readiness signal for the presentation layer: the replica changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEvent {
    /// Initial remote snapshot fetched.
    Hydrated { count: usize },
    /// Local records committed after a push.
    Pushed { count: usize },
    /// Remote records applied after a pull.
    Pulled { count: usize },
}

/// Result of one push batch.
///
/// A batch stops at the first remote error; records committed before it
/// stay committed.
#[derive(Debug)]
pub struct PushReport {
    pub committed: Vec<Record>,
    pub error: Option<KeeperError>,
}

impl PushReport {
    /// The committed records, or the error that aborted the batch.
    pub fn into_result(self) -> Result<Vec<Record>> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.committed),
        }
    }
}

/// Drives the three synchronization flows over a shared replica.
///
/// No flow holds the store lock across a remote call, and no flow locks the
/// whole batch: foreground edits may interleave between two records.
pub struct SyncEngine {
    store: Arc<ReplicaStore>,
    gateway: Arc<dyn RemoteGateway>,
    request_timeout: Duration,
    events: broadcast::Sender<SyncEvent>,
}

impl SyncEngine {
    /// Create an engine over `store`, bounding each remote call by `request_timeout`.
    pub fn new(
        store: Arc<ReplicaStore>,
        gateway: Arc<dyn RemoteGateway>,
        request_timeout: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            gateway,
            request_timeout,
            events,
        }
    }

    pub fn store(&self) -> &Arc<ReplicaStore> {
        &self.store
    }

    pub fn gateway(&self) -> &Arc<dyn RemoteGateway> {
        &self.gateway
    }

    /// Listen for replica changes caused by sync flows.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub(crate) fn events(&self) -> broadcast::Sender<SyncEvent> {
        self.events.clone()
    }

    /// Deadline for one outbound call made on behalf of `cancel`'s owner.
    pub fn call_context(&self, cancel: &CancellationToken) -> CallContext {
        CallContext::new(cancel.clone(), self.request_timeout)
    }

    /// Cold hydration: fetch the full remote dataset and seed the replica.
    ///
    /// Seeding happens on the first call only; the fetched dataset is
    /// returned either way.
    pub async fn initialize(&self, cancel: &CancellationToken) -> Result<Vec<Record>> {
        let ctx = self.call_context(cancel);
        let records = ctx.run("read all", self.gateway.read(&[])).await?;

        let seeded = self.store.bulk_hydrate(records.clone())?;

        info!("Fetched {} records from remote", records.len());
        if seeded {
            self.notify(SyncEvent::Hydrated {
                count: records.len(),
            });
        }
        Ok(records)
    }

    /// Push unsynced records, most recently updated first.
    pub async fn sync_to_remote(&self, cancel: &CancellationToken) -> Result<Vec<Record>> {
        self.push_batch(cancel).await.into_result()
    }

    /// Push unsynced records and report partial progress on failure.
    pub async fn push_batch(&self, cancel: &CancellationToken) -> PushReport {
        let pending = match self.store.read_unsynced() {
            Ok(pending) => pending,
            Err(e) => {
                return PushReport {
                    committed: Vec::new(),
                    error: Some(e),
                }
            }
        };

        let mut committed = Vec::with_capacity(pending.len());
        let mut error = None;

        for record in pending {
            match self.push_one(record, cancel).await {
                Ok(stored) => committed.push(stored),
                Err(e) => {
                    error = Some(e);
                    break;
                }
            }
        }

        if !committed.is_empty() {
            debug!("Pushed {} records", committed.len());
            self.notify(SyncEvent::Pushed {
                count: committed.len(),
            });
        }

        PushReport { committed, error }
    }

    async fn push_one(&self, record: Record, cancel: &CancellationToken) -> Result<Record> {
        let ctx = self.call_context(cancel);
        let label = record.id_label();
        let local_id = record.id;
        let is_new = record.is_new;
        let state = record.sync_state();

        let pushed = if is_new {
            ctx.run("create", self.gateway.create(record)).await
        } else {
            ctx.run("update", self.gateway.update(record)).await
        };

        let mut remote = pushed.map_err(|e| {
            debug!(
                record_id = %label,
                state = state.as_str(),
                error = %e,
                "Error pushing record"
            );
            e
        })?;

        remote.is_synced = true;
        remote.is_new = false;

        // A create may come back under a server-assigned id; drop the
        // provisional local entry so the record is not pushed twice.
        if let (Some(local_id), Some(remote_id)) = (local_id, remote.id) {
            if is_new && local_id != remote_id {
                self.store.delete(&[local_id])?;
            }
        }

        self.store.replace(remote).map_err(|e| {
            debug!(record_id = %label, error = %e, "Error committing pushed record");
            e
        })
    }

    /// Pull the remote dataset and apply it record by record.
    ///
    /// Stops at the first conflict, leaving that record and every record
    /// after it untouched. Returns how many records were applied.
    pub async fn sync_from_remote(&self, cancel: &CancellationToken) -> Result<usize> {
        let ctx = self.call_context(cancel);
        let remote = ctx.run("read all", self.gateway.read(&[])).await.map_err(|e| {
            debug!(error = %e, "Error reading remote data");
            e
        })?;

        let mut applied = 0;
        let outcome = self.apply_remote(remote, &mut applied);

        if applied > 0 {
            self.notify(SyncEvent::Pulled { count: applied });
        }

        outcome.map(|_| {
            info!("Applied {} remote records", applied);
            applied
        })
    }

    fn apply_remote(&self, remote: Vec<Record>, applied: &mut usize) -> Result<()> {
        for mut record in remote {
            let Some(id) = record.id else {
                warn!(title = %record.title, "Skipping remote record without id");
                continue;
            };

            let local = self.store.read(&[id])?.into_iter().next();
            if let Some(kind) = detect_conflict(local.as_ref(), &record) {
                let local_at = local.map(|l| l.updated_at).unwrap_or(record.updated_at);
                debug!(record_id = %id, %kind, "Error updating local data");
                return Err(KeeperError::Conflict {
                    id,
                    kind,
                    local: local_at,
                    remote: record.updated_at,
                });
            }

            record.is_synced = true;
            record.is_new = false;
            self.store.replace(record)?;
            *applied += 1;
        }
        Ok(())
    }

    fn notify(&self, event: SyncEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
