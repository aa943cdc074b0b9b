//! `updated_at` conflict detection for pulled records.
//!
//! Detection only: a conflict is reported to the caller and never resolved
//! or retried here.

use crate::record::Record;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a pulled record disagrees with the local copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// The local copy had no pending edits; another writer moved the remote.
    RemoteChanged,
    /// The local copy carries edits that were never pushed.
    LocalDiverged,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RemoteChanged => write!(f, "data has been modified remotely"),
            Self::LocalDiverged => write!(f, "data has been modified since last sync"),
        }
    }
}

/// Compare a pulled record against the local copy with the same id.
///
/// Rules:
/// 1. No local copy: no conflict, the remote record is applied.
/// 2. Equal `updated_at`: no conflict, the overwrite is idempotent.
/// 3. Different `updated_at`: conflict, classified by the local sync flag.
pub fn detect_conflict(local: Option<&Record>, remote: &Record) -> Option<ConflictKind> {
    let local = local?;
    if local.updated_at == remote.updated_at {
        return None;
    }

    if local.is_synced {
        Some(ConflictKind::RemoteChanged)
    } else {
        Some(ConflictKind::LocalDiverged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Payload;
    use chrono::{Duration, Utc};

    fn make_record(is_synced: bool) -> Record {
        let mut record = Record::new_local("entry", Payload::Text("v".to_string())).unwrap();
        record.id = Some(uuid::Uuid::new_v4());
        record.is_new = false;
        record.is_synced = is_synced;
        record
    }

    #[test]
    fn missing_local_copy_is_applied() {
        let remote = make_record(true);
        assert_eq!(detect_conflict(None, &remote), None);
    }

    #[test]
    fn equal_timestamps_do_not_conflict() {
        let local = make_record(true);
        let remote = local.clone();
        assert_eq!(detect_conflict(Some(&local), &remote), None);
    }

    #[test]
    fn newer_remote_over_synced_local() {
        let local = make_record(true);
        let mut remote = local.clone();
        remote.updated_at = local.updated_at + Duration::seconds(5);
        assert_eq!(
            detect_conflict(Some(&local), &remote),
            Some(ConflictKind::RemoteChanged)
        );
    }

    #[test]
    fn older_remote_still_conflicts() {
        // Any mismatch counts, not only a newer remote.
        let local = make_record(true);
        let mut remote = local.clone();
        remote.updated_at = local.updated_at - Duration::seconds(5);
        assert!(detect_conflict(Some(&local), &remote).is_some());
    }

    #[test]
    fn dirty_local_diverged() {
        let mut local = make_record(false);
        local.updated_at = Utc::now();
        let mut remote = local.clone();
        remote.updated_at = local.updated_at - Duration::minutes(1);
        assert_eq!(
            detect_conflict(Some(&local), &remote),
            Some(ConflictKind::LocalDiverged)
        );
    }
}
