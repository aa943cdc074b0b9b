//! Record model: the unit of synchronization, its typed payload, and sync flags.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{KeeperError, Result};

/// Determines how a record's payload bytes are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordKind {
    Text,
    Binary,
    Card,
}

impl RecordKind {
    /// Convert the kind to its wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Binary => "BINARY",
            Self::Card => "CARD",
        }
    }
}

/// Bank card fields stored in a [`RecordKind::Card`] payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDetails {
    pub number: String,
    pub exp_month: String,
    pub exp_year: String,
    pub cvc: String,
}

/// Typed view over `(kind, payload)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
    Card(CardDetails),
}

impl Payload {
    /// Decode raw payload bytes according to `kind`.
    pub fn decode(kind: RecordKind, bytes: &[u8]) -> Result<Self> {
        match kind {
            RecordKind::Text => String::from_utf8(bytes.to_vec())
                .map(Payload::Text)
                .map_err(|e| KeeperError::Validation(format!("text payload is not UTF-8: {}", e))),
            RecordKind::Binary => Ok(Payload::Binary(bytes.to_vec())),
            RecordKind::Card => serde_json::from_slice(bytes)
                .map(Payload::Card)
                .map_err(|e| KeeperError::Validation(format!("malformed card payload: {}", e))),
        }
    }

    /// Encode into the kind tag and raw bytes carried by a [`Record`].
    pub fn encode(&self) -> Result<(RecordKind, Vec<u8>)> {
        match self {
            Payload::Text(text) => Ok((RecordKind::Text, text.as_bytes().to_vec())),
            Payload::Binary(bytes) => Ok((RecordKind::Binary, bytes.clone())),
            Payload::Card(card) => serde_json::to_vec(card)
                .map(|bytes| (RecordKind::Card, bytes))
                .map_err(|e| KeeperError::Validation(format!("card serialization failed: {}", e))),
        }
    }

    /// Parse user-supplied base64 into a binary payload.
    pub fn binary_from_base64(encoded: &str) -> Result<Self> {
        STANDARD
            .decode(encoded.trim())
            .map(Payload::Binary)
            .map_err(|e| KeeperError::Validation(format!("invalid base64: {}", e)))
    }

    /// Human-facing rendering; binary data is surfaced base64-encoded.
    pub fn display_value(&self) -> String {
        match self {
            Payload::Text(text) => text.clone(),
            Payload::Binary(bytes) => STANDARD.encode(bytes),
            Payload::Card(card) => format!(
                "{} {}/{}",
                mask_card_number(&card.number),
                card.exp_month,
                card.exp_year
            ),
        }
    }
}

fn mask_card_number(number: &str) -> String {
    let digits: Vec<char> = number.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() <= 4 {
        return digits.into_iter().collect();
    }
    let tail: String = digits[digits.len() - 4..].iter().collect();
    format!("**** {}", tail)
}

/// Ordered (title, value) annotation on a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaData {
    pub title: String,
    pub value: String,
}

impl MetaData {
    pub fn new(title: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            value: value.into(),
        }
    }
}

/// Sync lifecycle position derived from a record's flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Never pushed to the remote.
    New,
    /// Known to the remote, with unpushed local edits.
    Dirty,
    /// Identical to the last confirmed remote copy.
    Synced,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Dirty => "dirty",
            Self::Synced => "synced",
        }
    }
}

/// One stored secret.
///
/// `updated_at` is the conflict-detection vector: the store stamps it on
/// every local mutation and the remote echoes its own value on every write
/// it accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Absent on brand-new local records until the store assigns one.
    pub id: Option<Uuid>,
    pub owner_id: Option<Uuid>,
    pub title: String,
    pub kind: RecordKind,
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
    #[serde(default)]
    pub metadata: Vec<MetaData>,
    pub is_synced: bool,
    pub is_new: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    /// A record created on this device that has never been pushed.
    pub fn new_local(title: impl Into<String>, payload: Payload) -> Result<Self> {
        let (kind, bytes) = payload.encode()?;
        let now = Utc::now();
        Ok(Self {
            id: None,
            owner_id: None,
            title: title.into(),
            kind,
            payload: bytes,
            metadata: Vec::new(),
            is_synced: false,
            is_new: true,
            created_at: now,
            updated_at: now,
        })
    }

    /// Append a metadata pair, keeping insertion order.
    pub fn with_metadata(mut self, title: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push(MetaData::new(title, value));
        self
    }

    /// Decode the payload bytes into their typed form.
    pub fn data(&self) -> Result<Payload> {
        Payload::decode(self.kind, &self.payload)
    }

    /// Replace kind and payload bytes from a typed value.
    pub fn set_data(&mut self, payload: &Payload) -> Result<()> {
        let (kind, bytes) = payload.encode()?;
        self.kind = kind;
        self.payload = bytes;
        Ok(())
    }

    pub fn sync_state(&self) -> SyncState {
        if self.is_new {
            SyncState::New
        } else if self.is_synced {
            SyncState::Synced
        } else {
            SyncState::Dirty
        }
    }

    /// Short id for log fields; brand-new records have none yet.
    pub(crate) fn id_label(&self) -> String {
        self.id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "<unassigned>".to_string())
    }
}

/// Custom base64 serialization for `Vec<u8>`.
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Vec<u8>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}
