//! Record validation applied before anything reaches the replica store.

use crate::record::{Payload, Record};
use crate::{KeeperError, Result};

/// Reject structurally malformed records.
///
/// Validation failures are final: they are never retried and the store is
/// left untouched.
pub fn validate_record(record: &Record) -> Result<()> {
    if record.title.trim().is_empty() {
        return Err(KeeperError::Validation("title is required".to_string()));
    }

    if record.payload.is_empty() {
        return Err(KeeperError::Validation("payload is required".to_string()));
    }

    if !record.is_new && record.id.is_none() {
        return Err(KeeperError::Validation(
            "record known to the remote must carry an id".to_string(),
        ));
    }

    if let Payload::Card(card) = record.data()? {
        let fields = [
            ("number", &card.number),
            ("exp_month", &card.exp_month),
            ("exp_year", &card.exp_year),
            ("cvc", &card.cvc),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(KeeperError::Validation(format!("card {} is required", name)));
            }
        }
    }

    Ok(())
}
