use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::error::LedgerError;
use crate::ledger::canonical::{canonicalize_payload, format_timestamp, parse_timestamp};
use crate::ledger::entry::ChainEntry;

/// A `chain_entries` row exactly as persisted.
///
/// Kept undecoded so that verification can report rows it can no longer
/// interpret instead of failing outright.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub entry_id: String,
    pub scope_key: String,
    pub sequence: i64,
    pub payload: String,
    pub actor: String,
    pub recorded_at: String,
    pub previous_hash: String,
    pub entry_hash: String,
}

impl StoredEntry {
    pub fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            entry_id: row.try_get("entry_id")?,
            scope_key: row.try_get("scope_key")?,
            sequence: row.try_get("sequence")?,
            payload: row.try_get("payload")?,
            actor: row.try_get("actor")?,
            recorded_at: row.try_get("recorded_at")?,
            previous_hash: row.try_get("previous_hash")?,
            entry_hash: row.try_get("entry_hash")?,
        })
    }

    /// Interpret the row as a ledger entry
    pub fn decode(&self) -> Result<ChainEntry, String> {
        let entry_id = Uuid::parse_str(&self.entry_id)
            .map_err(|e| format!("invalid entry id '{}': {}", self.entry_id, e))?;
        let sequence = u64::try_from(self.sequence)
            .map_err(|_| format!("negative sequence {}", self.sequence))?;
        let payload = match serde_json::from_str::<Value>(&self.payload) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Err("payload is not a JSON object".to_string()),
            Err(e) => return Err(format!("payload is not valid JSON: {}", e)),
        };
        let timestamp = parse_timestamp(&self.recorded_at).map_err(|e| e.to_string())?;

        Ok(ChainEntry {
            entry_id,
            scope_key: self.scope_key.clone(),
            sequence,
            payload,
            actor: self.actor.clone(),
            timestamp,
            previous_hash: self.previous_hash.clone(),
            entry_hash: self.entry_hash.clone(),
        })
    }
}

impl TryFrom<&ChainEntry> for StoredEntry {
    type Error = LedgerError;

    fn try_from(entry: &ChainEntry) -> Result<Self, Self::Error> {
        let sequence = i64::try_from(entry.sequence).map_err(|_| {
            LedgerError::InvalidEntry(format!("Sequence {} out of range", entry.sequence))
        })?;

        Ok(Self {
            entry_id: entry.entry_id.to_string(),
            scope_key: entry.scope_key.clone(),
            sequence,
            payload: canonicalize_payload(&entry.payload)?,
            actor: entry.actor.clone(),
            recorded_at: format_timestamp(&entry.timestamp),
            previous_hash: entry.previous_hash.clone(),
            entry_hash: entry.entry_hash.clone(),
        })
    }
}

/// Number of entries and latest digest of one scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeSummary {
    pub scope_key: String,
    pub entry_count: u64,
    pub head_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::canonical::Payload;
    use crate::ledger::scope::ChainScope;
    use chrono::Utc;
    use serde_json::json;

    fn entry() -> ChainEntry {
        let mut payload = Payload::new();
        payload.insert("subject_id".to_string(), json!("S-042"));
        payload.insert("event".to_string(), json!("withdrawn"));
        let scope = ChainScope::parse("consent:S-042").unwrap();
        ChainEntry::link(&scope, None, payload, "coordinator-7", Utc::now()).unwrap()
    }

    #[test]
    fn test_stored_entry_decodes_back() {
        let original = entry();
        let stored = StoredEntry::try_from(&original).unwrap();

        assert_eq!(stored.payload, r#"{"event":"withdrawn","subject_id":"S-042"}"#);
        assert_eq!(stored.decode().unwrap(), original);
    }

    #[test]
    fn test_floats_survive_storage_exactly() {
        let mut payload = Payload::new();
        payload.insert("dose_mg".to_string(), json!(1.0715660391465826e-75));
        payload.insert("weight_kg".to_string(), json!(72.30000000000001));
        let scope = ChainScope::parse("correction:global").unwrap();
        let original = ChainEntry::link(&scope, None, payload, "pharmacist", Utc::now()).unwrap();

        let decoded = StoredEntry::try_from(&original).unwrap().decode().unwrap();
        assert_eq!(decoded, original);
        assert!(decoded.verify_hash());
    }

    #[test]
    fn test_undecodable_payload_is_reported() {
        let mut stored = StoredEntry::try_from(&entry()).unwrap();
        stored.payload = "not json".to_string();
        assert!(stored.decode().unwrap_err().contains("not valid JSON"));

        stored.payload = "[1,2]".to_string();
        assert!(stored.decode().unwrap_err().contains("not a JSON object"));
    }

    #[test]
    fn test_negative_sequence_is_reported() {
        let mut stored = StoredEntry::try_from(&entry()).unwrap();
        stored.sequence = -1;
        assert!(stored.decode().is_err());
    }
}
