//! Compliance Records
//!
//! Ledger payload shapes of the compliance modules. A module describes what
//! it hashes by implementing [`LedgerRecord`] and appends through the shared
//! [`ChainLedger`]; the chain mechanics are never re-implemented per module.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::LedgerError;
use crate::ledger::{AppendReceipt, ChainDomain, ChainLedger, ChainScope, Payload};

/// Payload field carrying the record schema version
pub const SCHEMA_VERSION_FIELD: &str = "schema_version";

/// A business record that is audited through the ledger
pub trait LedgerRecord: Serialize {
    const DOMAIN: ChainDomain;

    /// Bumped whenever hashed fields are renamed or removed
    const SCHEMA_VERSION: u32 = 1;

    /// Key of the owning entity; `None` for module-wide chains
    fn entity_key(&self) -> Option<String> {
        None
    }

    fn scope(&self) -> Result<ChainScope, LedgerError> {
        ChainScope::resolve(Self::DOMAIN, self.entity_key())
    }

    fn ledger_payload(&self) -> Result<Payload, LedgerError> {
        match serde_json::to_value(self)? {
            Value::Object(mut map) => {
                if map.contains_key(SCHEMA_VERSION_FIELD) {
                    return Err(LedgerError::InvalidEntry(format!(
                        "'{}' is reserved",
                        SCHEMA_VERSION_FIELD
                    )));
                }
                map.insert(SCHEMA_VERSION_FIELD.to_string(), Value::from(Self::SCHEMA_VERSION));
                Ok(map)
            }
            _ => Err(LedgerError::InvalidEntry(
                "Ledger records must serialize to a JSON object".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionStatus {
    Submitted,
    Approved,
    Rejected,
    Applied,
}

/// Data-correction request on a captured form field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionRequestRecord {
    pub request_id: String,
    pub subject_id: String,
    pub form: String,
    pub field: String,
    pub previous_value: Option<String>,
    pub corrected_value: Option<String>,
    pub reason: String,
    pub status: CorrectionStatus,
}

impl LedgerRecord for CorrectionRequestRecord {
    const DOMAIN: ChainDomain = ChainDomain::Correction;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentAction {
    Granted,
    Withdrawn,
    Reconsented,
    Declined,
}

/// Consent event of one subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsentEventRecord {
    pub subject_id: String,
    pub consent_form_version: String,
    pub action: ConsentAction,
    pub witness: Option<String>,
}

impl LedgerRecord for ConsentEventRecord {
    const DOMAIN: ChainDomain = ChainDomain::Consent;

    fn entity_key(&self) -> Option<String> {
        Some(self.subject_id.clone())
    }
}

/// Adverse event report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdverseEventRecord {
    pub adverse_event_id: String,
    pub subject_id: String,
    pub term: String,
    pub severity: u8,
    pub serious: bool,
    pub onset: NaiveDate,
}

impl LedgerRecord for AdverseEventRecord {
    const DOMAIN: ChainDomain = ChainDomain::AdverseEvent;
}

/// Follow-up on one adverse event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AeFollowUpRecord {
    pub adverse_event_id: String,
    pub followup_number: u32,
    pub outcome: String,
    pub narrative: String,
}

impl LedgerRecord for AeFollowUpRecord {
    const DOMAIN: ChainDomain = ChainDomain::AeFollowup;

    fn entity_key(&self) -> Option<String> {
        Some(self.adverse_event_id.clone())
    }
}

/// Protocol deviation report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviationRecord {
    pub deviation_id: String,
    pub site_id: String,
    pub category: String,
    pub description: String,
    pub major: bool,
}

impl LedgerRecord for DeviationRecord {
    const DOMAIN: ChainDomain = ChainDomain::Deviation;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RightsRequestStatus {
    Received,
    Granted,
    Refused,
    Fulfilled,
}

/// Subject's objection to a processing purpose
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectionRecord {
    pub request_id: String,
    pub subject_id: String,
    pub processing_purpose: String,
    pub status: RightsRequestStatus,
}

impl LedgerRecord for ObjectionRecord {
    const DOMAIN: ChainDomain = ChainDomain::Objection;
}

/// Data portability request; the export itself is referenced by digest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortabilityRecord {
    pub request_id: String,
    pub subject_id: String,
    pub export_format: String,
    pub export_digest: Option<String>,
    pub status: RightsRequestStatus,
}

impl LedgerRecord for PortabilityRecord {
    const DOMAIN: ChainDomain = ChainDomain::Portability;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionAction {
    Scheduled,
    LegalHold,
    HoldReleased,
    Archived,
    Destroyed,
}

/// Retention action on one business record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionActionRecord {
    pub record_id: String,
    pub action: RetentionAction,
    pub policy: String,
    pub effective_on: NaiveDate,
}

impl LedgerRecord for RetentionActionRecord {
    const DOMAIN: ChainDomain = ChainDomain::Retention;

    fn entity_key(&self) -> Option<String> {
        Some(self.record_id.clone())
    }
}

impl ChainLedger {
    /// Append a typed compliance record to the scope it resolves to
    pub async fn record<R: LedgerRecord>(
        &self,
        record: &R,
        actor: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<AppendReceipt, LedgerError> {
        let scope = record.scope()?;
        let payload = record.ledger_payload()?;
        let entry = self.append(&scope, payload, actor, timestamp).await?;
        Ok(entry.receipt())
    }

    /// Run a business operation and append the record it produces.
    ///
    /// The caller must only commit the business state change when this
    /// returns `Ok`: a failed job appends nothing, and a failed append fails
    /// the whole operation.
    pub async fn execute_recorded<R, F, E>(
        &self,
        actor: &str,
        job: F,
    ) -> Result<(R, AppendReceipt), LedgerError>
    where
        R: LedgerRecord,
        F: FnOnce() -> Result<R, E>,
        E: fmt::Display,
    {
        let record = job().map_err(|e| LedgerError::OperationFailed(e.to_string()))?;
        let receipt = self.record(&record, actor, Utc::now()).await?;
        Ok((record, receipt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn correction(status: CorrectionStatus) -> CorrectionRequestRecord {
        CorrectionRequestRecord {
            request_id: "DCR-0001".to_string(),
            subject_id: "S-042".to_string(),
            form: "vitals".to_string(),
            field: "systolic_bp".to_string(),
            previous_value: Some("1400".to_string()),
            corrected_value: Some("140".to_string()),
            reason: "transcription error".to_string(),
            status,
        }
    }

    #[test]
    fn test_payload_carries_schema_version() {
        let payload = correction(CorrectionStatus::Submitted).ledger_payload().unwrap();
        assert_eq!(payload[SCHEMA_VERSION_FIELD], Value::from(1));
        assert_eq!(payload["status"], Value::from("submitted"));
    }

    #[test]
    fn test_scopes_follow_domain_policy() {
        assert_eq!(
            correction(CorrectionStatus::Approved).scope().unwrap().key(),
            "correction:global"
        );

        let followup = AeFollowUpRecord {
            adverse_event_id: "17".to_string(),
            followup_number: 1,
            outcome: "recovering".to_string(),
            narrative: "dose reduced".to_string(),
        };
        assert_eq!(followup.scope().unwrap().key(), "ae_followup:17");

        let retention = RetentionActionRecord {
            record_id: "recordY".to_string(),
            action: RetentionAction::LegalHold,
            policy: "GCP-25Y".to_string(),
            effective_on: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
        };
        assert_eq!(retention.scope().unwrap().key(), "retention:recordY");
    }

    #[tokio::test]
    async fn test_record_appends_to_resolved_scope() {
        let ledger = ChainLedger::in_memory().await.unwrap();
        let consent = ConsentEventRecord {
            subject_id: "subjectX".to_string(),
            consent_form_version: "v3.1".to_string(),
            action: ConsentAction::Granted,
            witness: None,
        };

        let receipt = ledger.record(&consent, "coordinator-1", Utc::now()).await.unwrap();
        assert_eq!(receipt.scope_key, "consent:subjectX");

        let chain = ledger.get_chain("consent:subjectX").await.unwrap();
        assert_eq!(chain[0].payload["action"], Value::from("granted"));
    }

    #[tokio::test]
    async fn test_failed_job_appends_nothing() {
        let ledger = ChainLedger::in_memory().await.unwrap();

        let result = ledger
            .execute_recorded("reviewer", || -> Result<CorrectionRequestRecord, String> {
                Err("approval rejected by validation".to_string())
            })
            .await;

        assert!(matches!(result, Err(LedgerError::OperationFailed(_))));
        assert!(ledger.get_chain("correction:global").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_successful_job_is_recorded() {
        let ledger = ChainLedger::in_memory().await.unwrap();

        let (record, receipt) = ledger
            .execute_recorded("reviewer", || -> Result<_, String> {
                Ok(correction(CorrectionStatus::Approved))
            })
            .await
            .unwrap();

        assert_eq!(record.status, CorrectionStatus::Approved);
        assert_eq!(receipt.sequence, 0);
        assert!(ledger.verify_chain("correction:global").await.unwrap().valid);
    }
}
