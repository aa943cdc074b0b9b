//! In-memory replica of the user's records.
//!
//! A single lock spans the whole map. It makes each operation atomic on its
//! own; sync flows that touch many records take and release it once per
//! record, so a foreground edit may land between two records of one batch.

use crate::record::Record;
use crate::{KeeperError, Result};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

struct StoreState {
    records: HashMap<Uuid, Record>,
    hydration_required: bool,
}

/// Sole owner of the record map; only synchronized accessors are exposed.
pub struct ReplicaStore {
    state: Mutex<StoreState>,
}

impl Default for ReplicaStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplicaStore {
    /// Create an empty store awaiting its first hydration.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState {
                records: HashMap::new(),
                hydration_required: true,
            }),
        }
    }

    fn lock(&self, op: &str) -> Result<MutexGuard<'_, StoreState>> {
        self.state
            .lock()
            .map_err(|_| KeeperError::LockPoisoned(format!("replica store ({})", op)))
    }

    /// Replace the whole map with a remote snapshot, the first time only.
    ///
    /// Later calls are no-ops so a full refresh cannot discard edits made
    /// since the first hydration. Returns whether the snapshot was applied.
    pub fn bulk_hydrate(&self, records: Vec<Record>) -> Result<bool> {
        let mut state = self.lock("hydrate")?;
        if !state.hydration_required {
            debug!("Replica already hydrated, ignoring snapshot of {} records", records.len());
            return Ok(false);
        }

        let mut map = HashMap::with_capacity(records.len());
        for mut record in records {
            let Some(id) = record.id else {
                warn!(title = %record.title, "Skipping remote record without id");
                continue;
            };
            record.is_synced = true;
            record.is_new = false;
            map.insert(id, record);
        }

        debug!("Replica hydrated with {} records", map.len());
        state.records = map;
        state.hydration_required = false;
        Ok(true)
    }

    /// Insert a new record, assigning an id when it has none.
    pub fn create(&self, mut record: Record) -> Result<Record> {
        let mut state = self.lock("create")?;

        let id = *record.id.get_or_insert_with(Uuid::new_v4);
        let now = next_stamp(state.records.get(&id).map(|r| r.updated_at));
        record.created_at = now;
        record.updated_at = now;

        state.records.insert(id, record.clone());
        Ok(record)
    }

    /// Overwrite the entry at `record.id` wholesale, stamping `updated_at`.
    ///
    /// An id that is not in the map is inserted rather than reported.
    pub fn update(&self, mut record: Record) -> Result<Record> {
        let id = require_id(&record, "update")?;
        let mut state = self.lock("update")?;

        record.updated_at = next_stamp(state.records.get(&id).map(|r| r.updated_at));
        state.records.insert(id, record.clone());
        Ok(record)
    }

    /// Raw overwrite that keeps the record's timestamps.
    ///
    /// Reserved for committing records that already carry authoritative
    /// remote timestamps.
    pub fn replace(&self, record: Record) -> Result<Record> {
        let id = require_id(&record, "replace")?;
        let mut state = self.lock("replace")?;

        state.records.insert(id, record.clone());
        Ok(record)
    }

    /// Remove records; unknown ids are ignored.
    pub fn delete(&self, ids: &[Uuid]) -> Result<()> {
        let mut state = self.lock("delete")?;
        for id in ids {
            state.records.remove(id);
        }
        Ok(())
    }

    /// Every record when `ids` is empty, otherwise the matching subset,
    /// most recently updated first.
    pub fn read(&self, ids: &[Uuid]) -> Result<Vec<Record>> {
        let state = self.lock("read")?;

        let records = if ids.is_empty() {
            state.records.values().cloned().collect()
        } else {
            ids.iter()
                .filter_map(|id| state.records.get(id))
                .cloned()
                .collect()
        };

        Ok(sort_by_updated(records))
    }

    /// Records with local changes the remote has not confirmed yet.
    pub fn read_unsynced(&self) -> Result<Vec<Record>> {
        let state = self.lock("read unsynced")?;
        let records = state
            .records
            .values()
            .filter(|r| !r.is_synced)
            .cloned()
            .collect();
        Ok(sort_by_updated(records))
    }

    /// Whether the one-time hydration has already happened.
    pub fn is_hydrated(&self) -> Result<bool> {
        Ok(!self.lock("is hydrated")?.hydration_required)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock("len")?.records.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

fn require_id(record: &Record, op: &str) -> Result<Uuid> {
    record
        .id
        .ok_or_else(|| KeeperError::Validation(format!("{} requires a record id", op)))
}

/// Current time, nudged past `previous` so a record's stamp never repeats.
fn next_stamp(previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match previous {
        Some(prev) if now <= prev => prev + Duration::microseconds(1),
        _ => now,
    }
}

fn sort_by_updated(mut records: Vec<Record>) -> Vec<Record> {
    records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Payload;
    use chrono::TimeZone;

    fn text(title: &str) -> Record {
        Record::new_local(title, Payload::Text("secret".to_string())).unwrap()
    }

    fn remote(title: &str, secs: i64) -> Record {
        let at = Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap();
        let mut record = text(title);
        record.id = Some(Uuid::new_v4());
        record.is_new = false;
        record.created_at = at;
        record.updated_at = at;
        record
    }

    #[test]
    fn create_assigns_id_and_stamps() {
        let store = ReplicaStore::new();
        let before = Utc::now();

        let created = store.create(text("Mail")).unwrap();

        assert!(created.id.is_some());
        assert!(created.updated_at >= before);
        assert_eq!(created.created_at, created.updated_at);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn create_keeps_given_id() {
        let store = ReplicaStore::new();
        let id = Uuid::new_v4();
        let mut record = text("Mail");
        record.id = Some(id);

        assert_eq!(store.create(record).unwrap().id, Some(id));
        assert_eq!(store.read(&[id]).unwrap().len(), 1);
    }

    #[test]
    fn hydrate_only_first_time() {
        let store = ReplicaStore::new();
        let first = remote("A", 1);
        let mut unsynced = first.clone();
        unsynced.is_synced = false;

        assert!(store.bulk_hydrate(vec![unsynced]).unwrap());
        assert!(store.is_hydrated().unwrap());

        let all = store.read(&[]).unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].is_synced);
        assert!(!all[0].is_new);

        assert!(!store.bulk_hydrate(vec![remote("B", 2), remote("C", 3)]).unwrap());
        let all = store.read(&[]).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, first.id);
    }

    #[test]
    fn hydrate_skips_records_without_id() {
        let store = ReplicaStore::new();
        store.bulk_hydrate(vec![text("orphan"), remote("A", 1)]).unwrap();
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn update_stamps_and_overwrites() {
        let store = ReplicaStore::new();
        let original = store.replace(remote("Old", 1)).unwrap();

        let mut edited = original.clone();
        edited.title = "New".to_string();
        edited.metadata.clear();
        let updated = store.update(edited).unwrap();

        assert!(updated.updated_at > original.updated_at);
        let stored = &store.read(&[original.id.unwrap()]).unwrap()[0];
        assert_eq!(stored.title, "New");
        assert_eq!(stored.updated_at, updated.updated_at);
    }

    #[test]
    fn update_stamp_is_strictly_increasing() {
        let store = ReplicaStore::new();
        let mut future = remote("Ahead", 0);
        future.updated_at = Utc::now() + Duration::hours(1);
        let future = store.replace(future).unwrap();

        let updated = store.update(future.clone()).unwrap();
        assert!(updated.updated_at > future.updated_at);
    }

    #[test]
    fn update_of_unknown_id_inserts() {
        let store = ReplicaStore::new();
        let record = remote("Ghost", 1);
        store.update(record.clone()).unwrap();
        assert_eq!(store.read(&[record.id.unwrap()]).unwrap().len(), 1);
    }

    #[test]
    fn update_without_id_is_rejected() {
        let store = ReplicaStore::new();
        let err = store.update(text("No id")).unwrap_err();
        assert!(matches!(err, KeeperError::Validation(_)));
        assert!(store.replace(text("No id")).is_err());
    }

    #[test]
    fn replace_keeps_timestamps() {
        let store = ReplicaStore::new();
        let record = remote("Fixed", 42);
        let stored = store.replace(record.clone()).unwrap();
        assert_eq!(stored.updated_at, record.updated_at);
        assert_eq!(store.read(&[record.id.unwrap()]).unwrap()[0], record);
    }

    #[test]
    fn delete_ignores_missing_ids() {
        let store = ReplicaStore::new();
        let a = store.replace(remote("A", 1)).unwrap();
        let b = store.replace(remote("B", 2)).unwrap();

        store.delete(&[a.id.unwrap(), Uuid::new_v4()]).unwrap();

        let all = store.read(&[]).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, b.id);
    }

    #[test]
    fn read_orders_by_updated_desc() {
        let store = ReplicaStore::new();
        store.replace(remote("middle", 5)).unwrap();
        store.replace(remote("oldest", 1)).unwrap();
        store.replace(remote("newest", 9)).unwrap();

        let titles: Vec<_> = store
            .read(&[])
            .unwrap()
            .into_iter()
            .map(|r| r.title)
            .collect();
        assert_eq!(titles, vec!["newest", "middle", "oldest"]);
    }

    #[test]
    fn read_subset_drops_unknown_ids() {
        let store = ReplicaStore::new();
        let a = store.replace(remote("A", 1)).unwrap();
        let c = store.replace(remote("C", 3)).unwrap();
        store.replace(remote("B", 2)).unwrap();

        let found = store
            .read(&[a.id.unwrap(), Uuid::new_v4(), c.id.unwrap()])
            .unwrap();
        let titles: Vec<_> = found.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["C", "A"]);

        assert!(store.read(&[Uuid::new_v4()]).unwrap().is_empty());
    }

    #[test]
    fn read_unsynced_matches_flag() {
        let store = ReplicaStore::new();
        let mut synced = remote("synced", 1);
        synced.is_synced = true;
        store.replace(synced).unwrap();
        store.replace(remote("dirty-old", 2)).unwrap();
        store.create(text("fresh")).unwrap();
        store.replace(remote("dirty-new", 3)).unwrap();

        let unsynced = store.read_unsynced().unwrap();
        assert_eq!(unsynced.len(), 3);
        assert!(unsynced.iter().all(|r| !r.is_synced));
        assert_eq!(unsynced[0].title, "fresh");
        assert_eq!(unsynced[1].title, "dirty-new");
        assert_eq!(unsynced[2].title, "dirty-old");
    }
}
