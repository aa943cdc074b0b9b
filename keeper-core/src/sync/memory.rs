//! In-process remote store.
//!
//! Behaves like the authoritative server for a single principal: it owns
//! ids and timestamps of the records it accepts. Serves as a loopback
//! remote when no transport is configured.

use crate::record::Record;
use crate::sync::gateway::RemoteGateway;
use crate::{KeeperError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Thread-safe in-memory remote.
pub struct MemoryRemote {
    owner_id: Uuid,
    records: Mutex<HashMap<Uuid, Record>>,
    authenticated: AtomicBool,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new(Uuid::new_v4())
    }
}

impl MemoryRemote {
    /// Create an empty remote owned by `owner_id`.
    pub fn new(owner_id: Uuid) -> Self {
        Self {
            owner_id,
            records: Mutex::new(HashMap::new()),
            authenticated: AtomicBool::new(true),
        }
    }

    pub fn owner_id(&self) -> Uuid {
        self.owner_id
    }

    /// Toggle whether calls carry a valid credential.
    pub fn set_authenticated(&self, authenticated: bool) {
        self.authenticated.store(authenticated, Ordering::SeqCst);
    }

    /// A write made by another client of the same principal.
    ///
    /// Stamps a fresh server `updated_at`, the way any accepted write would.
    pub fn external_write(&self, mut record: Record) -> Result<Record> {
        let mut records = self.lock()?;
        let id = *record.id.get_or_insert_with(Uuid::new_v4);
        let previous = records.get(&id);
        record.created_at = previous.map(|p| p.created_at).unwrap_or_else(Utc::now);
        record.updated_at = server_stamp(previous.map(|p| p.updated_at));
        record.owner_id = Some(self.owner_id);
        let stored = confirmed(record);
        records.insert(id, stored.clone());
        Ok(stored)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Copy of a stored record, bypassing authentication.
    pub fn get(&self, id: &Uuid) -> Result<Option<Record>> {
        Ok(self.lock()?.get(id).cloned())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Uuid, Record>>> {
        self.records
            .lock()
            .map_err(|e| KeeperError::Transport(format!("remote lock error: {}", e)))
    }

    fn authorize(&self) -> Result<()> {
        if self.authenticated.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(KeeperError::Auth("missing or expired token".to_string()))
        }
    }
}

#[async_trait]
impl RemoteGateway for MemoryRemote {
    async fn create(&self, mut record: Record) -> Result<Record> {
        self.authorize()?;
        let mut records = self.lock()?;

        let id = *record.id.get_or_insert_with(Uuid::new_v4);
        if records.contains_key(&id) {
            return Err(KeeperError::Validation(format!("record {} already exists", id)));
        }

        let now = server_stamp(None);
        record.created_at = now;
        record.updated_at = now;
        record.owner_id = Some(self.owner_id);

        let stored = confirmed(record);
        records.insert(id, stored.clone());
        Ok(stored)
    }

    async fn update(&self, mut record: Record) -> Result<Record> {
        self.authorize()?;
        let id = record
            .id
            .ok_or_else(|| KeeperError::Validation("update requires a record id".to_string()))?;
        let mut records = self.lock()?;

        let previous = records
            .get(&id)
            .ok_or_else(|| KeeperError::NotFound(format!("record {}", id)))?;

        record.created_at = previous.created_at;
        record.updated_at = server_stamp(Some(previous.updated_at));
        record.owner_id = Some(self.owner_id);

        let stored = confirmed(record);
        records.insert(id, stored.clone());
        Ok(stored)
    }

    async fn read(&self, ids: &[Uuid]) -> Result<Vec<Record>> {
        self.authorize()?;
        let records = self.lock()?;

        let mut found: Vec<Record> = if ids.is_empty() {
            records.values().cloned().collect()
        } else {
            ids.iter().filter_map(|id| records.get(id)).cloned().collect()
        };
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(found)
    }

    async fn delete(&self, ids: &[Uuid]) -> Result<()> {
        self.authorize()?;
        let mut records = self.lock()?;
        for id in ids {
            records.remove(id);
        }
        Ok(())
    }
}

fn confirmed(mut record: Record) -> Record {
    record.is_synced = true;
    record.is_new = false;
    record
}

fn server_stamp(previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match previous {
        Some(prev) if now <= prev => prev + Duration::microseconds(1),
        _ => now,
    }
}
