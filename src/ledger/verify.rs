//! Chain Verification
//!
//! Replays a chain and checks, for every entry, the sequence position, the
//! link to its predecessor and its own digest. Verification never writes and
//! never repairs anything.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, info};

use crate::database::models::StoredEntry;
use crate::error::LedgerError;
use crate::ledger::hash::GENESIS;

/// What went wrong at one position of a chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViolationKind {
    /// `previous_hash` does not name the predecessor (or GENESIS)
    LinkMismatch { expected: String, found: String },
    /// Stored `entry_hash` differs from the digest re-derived from the entry
    HashMismatch { expected: String, found: String },
    /// Sequence numbers skip or repeat, i.e. entries were removed or forged
    SequenceGap { expected: u64, found: i64 },
    /// The stored row can no longer be interpreted
    Unreadable { reason: String },
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationKind::LinkMismatch { expected, found } => {
                write!(f, "previous hash mismatch: expected {}, got {}", expected, found)
            }
            ViolationKind::HashMismatch { expected, found } => {
                write!(f, "entry hash mismatch: computed {}, stored {}", expected, found)
            }
            ViolationKind::SequenceGap { expected, found } => {
                write!(f, "sequence gap: expected {}, got {}", expected, found)
            }
            ViolationKind::Unreadable { reason } => write!(f, "unreadable entry: {}", reason),
        }
    }
}

/// A violation located in the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainViolation {
    pub sequence: u64,
    pub kind: ViolationKind,
}

/// Outcome of replaying one scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub scope_key: String,
    pub valid: bool,
    pub first_invalid_sequence: Option<u64>,
    pub total_entries: u64,
    pub head_hash: Option<String>,
    pub violations: Vec<ChainViolation>,
}

impl VerificationReport {
    /// No entries yet; an empty scope is valid
    pub fn is_empty(&self) -> bool {
        self.total_entries == 0
    }

    /// Turn an invalid report into an error naming the first violation
    pub fn into_result(self) -> Result<Self, LedgerError> {
        match self.violations.first() {
            Some(violation) => Err(LedgerError::IntegrityViolation {
                scope: self.scope_key.clone(),
                sequence: violation.sequence,
                kind: violation.kind.clone(),
            }),
            None => Ok(self),
        }
    }

    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        if self.valid {
            format!(
                "✅ {} is valid ({} entries)",
                self.scope_key, self.total_entries
            )
        } else {
            format!(
                "❌ {} is invalid ({} entries): first violation at sequence {}: {}",
                self.scope_key,
                self.total_entries,
                self.first_invalid_sequence
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "?".to_string()),
                self.violations
                    .first()
                    .map(|v| v.kind.to_string())
                    .unwrap_or_else(|| "Unknown error".to_string())
            )
        }
    }
}

/// Verify the rows of one scope, given in ascending sequence order
pub fn verify_entries(scope_key: &str, rows: &[StoredEntry]) -> VerificationReport {
    let mut violations = Vec::new();
    let mut expected_previous = GENESIS.to_string();
    let mut expected_sequence: u64 = 0;

    for row in rows {
        // where to report this row; a negative sequence is pinned to its slot
        let position = u64::try_from(row.sequence).unwrap_or(expected_sequence);

        if row.sequence != expected_sequence as i64 {
            violations.push(ChainViolation {
                sequence: position,
                kind: ViolationKind::SequenceGap {
                    expected: expected_sequence,
                    found: row.sequence,
                },
            });
        }

        if row.previous_hash != expected_previous {
            violations.push(ChainViolation {
                sequence: position,
                kind: ViolationKind::LinkMismatch {
                    expected: expected_previous.clone(),
                    found: row.previous_hash.clone(),
                },
            });
        }

        match row.decode() {
            Ok(entry) => match entry.calculate_hash() {
                Ok(computed) if computed == row.entry_hash => {}
                Ok(computed) => violations.push(ChainViolation {
                    sequence: position,
                    kind: ViolationKind::HashMismatch {
                        expected: computed,
                        found: row.entry_hash.clone(),
                    },
                }),
                Err(e) => violations.push(ChainViolation {
                    sequence: position,
                    kind: ViolationKind::Unreadable {
                        reason: e.to_string(),
                    },
                }),
            },
            Err(reason) => violations.push(ChainViolation {
                sequence: position,
                kind: ViolationKind::Unreadable { reason },
            }),
        }

        // continue from the stored values so each break is reported where it happens
        expected_previous = row.entry_hash.clone();
        expected_sequence = position + 1;
    }

    let report = VerificationReport {
        scope_key: scope_key.to_string(),
        valid: violations.is_empty(),
        first_invalid_sequence: violations.first().map(|v| v.sequence),
        total_entries: rows.len() as u64,
        head_hash: rows.last().map(|row| row.entry_hash.clone()),
        violations,
    };

    if report.valid {
        info!(
            "Chain verification successful: {} ({} entries)",
            scope_key, report.total_entries
        );
    } else {
        error!(
            "Chain verification failed: {} ({} violations, first at sequence {:?})",
            scope_key,
            report.violations.len(),
            report.first_invalid_sequence
        );
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::canonical::Payload;
    use crate::ledger::entry::ChainEntry;
    use crate::ledger::scope::ChainScope;
    use chrono::Utc;
    use serde_json::json;

    fn chain(scope_key: &str, len: u64) -> Vec<StoredEntry> {
        let scope = ChainScope::parse(scope_key).unwrap();
        let mut entries: Vec<ChainEntry> = Vec::new();
        for n in 0..len {
            let mut payload = Payload::new();
            payload.insert("followup".to_string(), json!(n));
            let tail = entries.last().map(ChainEntry::tail);
            entries.push(
                ChainEntry::link(&scope, tail.as_ref(), payload, "investigator", Utc::now()).unwrap(),
            );
        }
        entries
            .iter()
            .map(|e| StoredEntry::try_from(e).unwrap())
            .collect()
    }

    #[test]
    fn test_empty_scope_is_valid() {
        let report = verify_entries("consent:S-1", &[]);
        assert!(report.valid);
        assert!(report.is_empty());
        assert_eq!(report.first_invalid_sequence, None);
        assert_eq!(report.head_hash, None);
    }

    #[test]
    fn test_valid_chain() {
        let rows = chain("ae_followup:17", 5);
        let report = verify_entries("ae_followup:17", &rows);
        assert!(report.valid);
        assert_eq!(report.total_entries, 5);
        assert_eq!(report.head_hash.as_deref(), Some(rows[4].entry_hash.as_str()));
        assert!(report.summary().contains("✅"));
    }

    #[test]
    fn test_single_entry_must_start_at_genesis() {
        let mut rows = chain("ae_followup:17", 1);
        assert!(verify_entries("ae_followup:17", &rows).valid);

        rows[0].previous_hash = crate::ledger::hash::digest(b"elsewhere");
        let report = verify_entries("ae_followup:17", &rows);
        assert!(!report.valid);
        assert_eq!(report.first_invalid_sequence, Some(0));
        assert!(matches!(
            report.violations[0].kind,
            ViolationKind::LinkMismatch { .. }
        ));
    }

    #[test]
    fn test_payload_tampering_is_located() {
        let mut rows = chain("ae_followup:17", 4);
        rows[2].payload = r#"{"followup":200}"#.to_string();

        let report = verify_entries("ae_followup:17", &rows);
        assert!(!report.valid);
        assert_eq!(report.first_invalid_sequence, Some(2));
        assert_eq!(report.violations.len(), 1);
        assert!(matches!(
            report.violations[0].kind,
            ViolationKind::HashMismatch { .. }
        ));
    }

    #[test]
    fn test_recomputed_hash_catches_consistent_relinking() {
        // rewrite an entry and its stored hash, then fix up the successor link
        let mut rows = chain("correction:global", 3);
        rows[1].actor = "mallory".to_string();
        rows[1].entry_hash = crate::ledger::hash::digest(b"forged");
        rows[2].previous_hash = rows[1].entry_hash.clone();

        let report = verify_entries("correction:global", &rows);
        assert_eq!(report.first_invalid_sequence, Some(1));
    }

    #[test]
    fn test_deleted_entry_is_detected() {
        let mut rows = chain("retention:R-9", 4);
        rows.remove(1);

        let report = verify_entries("retention:R-9", &rows);
        assert!(!report.valid);
        assert_eq!(report.first_invalid_sequence, Some(2));
        assert!(report
            .violations
            .iter()
            .any(|v| matches!(v.kind, ViolationKind::SequenceGap { expected: 1, found: 2 })));
    }

    #[test]
    fn test_unreadable_row_is_a_violation() {
        let mut rows = chain("consent:S-3", 2);
        rows[0].recorded_at = "not a timestamp".to_string();

        let report = verify_entries("consent:S-3", &rows);
        assert_eq!(report.first_invalid_sequence, Some(0));
        assert!(matches!(
            report.violations[0].kind,
            ViolationKind::Unreadable { .. }
        ));
    }

    #[test]
    fn test_into_result() {
        let rows = chain("consent:S-4", 2);
        assert!(verify_entries("consent:S-4", &rows).into_result().is_ok());

        let mut broken = rows.clone();
        broken[1].actor = "someone else".to_string();
        let err = verify_entries("consent:S-4", &broken).into_result().unwrap_err();
        assert!(matches!(
            err,
            LedgerError::IntegrityViolation { sequence: 1, .. }
        ));
    }

    #[test]
    fn test_verification_is_idempotent() {
        let rows = chain("deviation:global", 3);
        let first = verify_entries("deviation:global", &rows);
        let second = verify_entries("deviation:global", &rows);
        assert_eq!(first, second);
    }
}
