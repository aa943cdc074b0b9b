//! Record service - the surface the presentation layer drives

mod commands;
#[cfg(test)]
mod tests;

pub use commands::{Command, CommandDispatcher, KeeperHandle};

use crate::{
    record::Record,
    store::ReplicaStore,
    sync::SyncEngine,
    validation::validate_record,
    KeeperError, Result,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

/// Validated record operations over the replica plus the sync flows.
pub struct RecordService {
    engine: Arc<SyncEngine>,
}

impl RecordService {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    fn store(&self) -> &ReplicaStore {
        self.engine.store()
    }

    /// Add a record created on this device; it waits for the next push.
    pub fn create(&self, mut record: Record) -> Result<Record> {
        record.is_new = true;
        record.is_synced = false;
        validate_record(&record)?;

        let created = self.store().create(record)?;
        debug!(
            record_id = %created.id_label(),
            kind = created.kind.as_str(),
            state = created.sync_state().as_str(),
            "Record created"
        );
        Ok(created)
    }

    /// Overwrite a record with local edits and mark it for the next push.
    pub fn update(&self, mut record: Record) -> Result<Record> {
        validate_record(&record)?;
        record.is_synced = false;

        let updated = self.store().update(record)?;
        debug!(
            record_id = %updated.id_label(),
            state = updated.sync_state().as_str(),
            "Record updated"
        );
        Ok(updated)
    }

    /// Remove records locally, then from the remote.
    ///
    /// Records never pushed exist only here and skip the remote call. The
    /// local removal stands even if the remote delete fails.
    pub async fn delete(&self, ids: &[Uuid], cancel: &CancellationToken) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let known_remotely: Vec<Uuid> = self
            .store()
            .read(ids)?
            .into_iter()
            .filter(|r| !r.is_new)
            .filter_map(|r| r.id)
            .collect();

        self.store().delete(ids)?;

        if known_remotely.is_empty() {
            return Ok(());
        }

        let ctx = self.engine.call_context(cancel);
        ctx.run("delete", self.engine.gateway().delete(&known_remotely))
            .await
            .map_err(|e| {
                debug!(count = known_remotely.len(), error = %e, "Error deleting remote records");
                e
            })?;

        info!("Deleted {} records", ids.len());
        Ok(())
    }

    /// All records for no ids, else the matching subset; newest first.
    pub fn read(&self, ids: &[Uuid]) -> Result<Vec<Record>> {
        self.store().read(ids)
    }

    pub fn read_one(&self, id: Uuid) -> Result<Record> {
        self.store()
            .read(&[id])?
            .into_iter()
            .next()
            .ok_or_else(|| KeeperError::NotFound(format!("record {}", id)))
    }

    pub async fn initialize(&self, cancel: &CancellationToken) -> Result<Vec<Record>> {
        self.engine.initialize(cancel).await
    }

    pub async fn sync_to_remote(&self, cancel: &CancellationToken) -> Result<Vec<Record>> {
        self.engine.sync_to_remote(cancel).await
    }

    pub async fn sync_from_remote(&self, cancel: &CancellationToken) -> Result<usize> {
        self.engine.sync_from_remote(cancel).await
    }
}
