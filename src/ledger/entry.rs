//! Chain Entry
//!
//! An immutable ledger entry and the derivation of its digest.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerError;
use crate::ledger::canonical::{
    format_timestamp, hash_input, normalize_timestamp, Payload, TIMESTAMP_YEARS,
};
use crate::ledger::hash::{digest, GENESIS};
use crate::ledger::scope::ChainScope;

/// One link of a hash chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainEntry {
    pub entry_id: Uuid,
    pub scope_key: String,
    pub sequence: u64,
    pub payload: Payload,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    pub previous_hash: String,
    pub entry_hash: String,
}

/// The latest entry of a scope, as seen by an appender
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTail {
    pub sequence: u64,
    pub entry_hash: String,
}

/// What a compliance module keeps after appending
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendReceipt {
    pub entry_id: Uuid,
    pub scope_key: String,
    pub sequence: u64,
    pub entry_hash: String,
}

impl ChainEntry {
    /// Build the entry that extends `tail` (or starts the chain when `None`)
    pub fn link(
        scope: &ChainScope,
        tail: Option<&ChainTail>,
        payload: Payload,
        actor: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, LedgerError> {
        if actor.trim().is_empty() {
            return Err(LedgerError::InvalidEntry("Actor must not be empty".to_string()));
        }
        if !TIMESTAMP_YEARS.contains(&timestamp.year()) {
            return Err(LedgerError::InvalidEntry(format!(
                "Timestamp year {} is outside {}..={}",
                timestamp.year(),
                TIMESTAMP_YEARS.start(),
                TIMESTAMP_YEARS.end()
            )));
        }

        let (sequence, previous_hash) = match tail {
            Some(tail) => (tail.sequence + 1, tail.entry_hash.clone()),
            None => (0, GENESIS.to_string()),
        };
        let timestamp = normalize_timestamp(timestamp);
        let entry_hash = Self::compute_hash(&payload, actor, &timestamp, &previous_hash)?;

        Ok(Self {
            entry_id: Uuid::new_v4(),
            scope_key: scope.key(),
            sequence,
            payload,
            actor: actor.to_string(),
            timestamp,
            previous_hash,
            entry_hash,
        })
    }

    /// `H(canonical([payload, actor, timestamp, previous_hash]))`
    pub fn compute_hash(
        payload: &Payload,
        actor: &str,
        timestamp: &DateTime<Utc>,
        previous_hash: &str,
    ) -> Result<String, LedgerError> {
        let input = hash_input(payload, actor, &format_timestamp(timestamp), previous_hash)?;
        Ok(digest(input.as_bytes()))
    }

    /// Re-derive this entry's digest from its stored fields
    pub fn calculate_hash(&self) -> Result<String, LedgerError> {
        Self::compute_hash(&self.payload, &self.actor, &self.timestamp, &self.previous_hash)
    }

    pub fn verify_hash(&self) -> bool {
        matches!(self.calculate_hash(), Ok(hash) if hash == self.entry_hash)
    }

    pub fn tail(&self) -> ChainTail {
        ChainTail {
            sequence: self.sequence,
            entry_hash: self.entry_hash.clone(),
        }
    }

    pub fn receipt(&self) -> AppendReceipt {
        AppendReceipt {
            entry_id: self.entry_id,
            scope_key: self.scope_key.clone(),
            sequence: self.sequence,
            entry_hash: self.entry_hash.clone(),
        }
    }

    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "{}#{} by {} at {} ({})",
            self.scope_key,
            self.sequence,
            self.actor,
            format_timestamp(&self.timestamp),
            self.entry_hash
        )
    }
}
