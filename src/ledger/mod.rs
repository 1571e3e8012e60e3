//! Hash-Chain Ledger
//!
//! One reusable, tamper-evident ledger shared by every compliance module.
//! Each regulated record is linked to its predecessor in its scope by a
//! SHA-256 digest; chains are append-only and verifiable end to end.

pub mod append;
pub mod canonical;
pub mod entry;
pub mod hash;
pub mod locks;
pub mod scope;
pub mod verify;

pub use canonical::Payload;
pub use entry::{AppendReceipt, ChainEntry, ChainTail};
pub use hash::GENESIS;
pub use scope::{ChainDomain, ChainScope, ScopePolicy};
pub use verify::{ChainViolation, VerificationReport, ViolationKind};

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::LedgerConfig;
use crate::database::models::ScopeSummary;
use crate::database::queries::EntryQueries;
use crate::database::Database;
use crate::error::LedgerError;
use locks::ScopeLocks;

/// Retry and wait bounds for appends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendPolicy {
    pub max_attempts: u32,
    pub lock_timeout: Duration,
    pub retry_backoff: Duration,
}

impl From<&LedgerConfig> for AppendPolicy {
    fn from(config: &LedgerConfig) -> Self {
        Self {
            max_attempts: config.max_append_attempts.max(1),
            lock_timeout: config.lock_timeout(),
            retry_backoff: config.retry_backoff(),
        }
    }
}

/// Ledger handle injected into compliance modules. Cheap to clone; clones
/// share the connection pool and the per-scope locks.
#[derive(Clone)]
pub struct ChainLedger {
    database: Database,
    locks: Arc<ScopeLocks>,
    policy: AppendPolicy,
}

impl ChainLedger {
    pub fn new(database: Database, policy: AppendPolicy) -> Self {
        Self {
            database,
            locks: Arc::new(ScopeLocks::new()),
            policy,
        }
    }

    pub async fn open(config: &LedgerConfig) -> Result<Self, LedgerError> {
        config.validate()?;
        let database = Database::connect(config).await?;
        Ok(Self::new(database, AppendPolicy::from(config)))
    }

    pub async fn in_memory() -> Result<Self, LedgerError> {
        let config = LedgerConfig {
            database_url: "sqlite::memory:".to_string(),
            ..LedgerConfig::default()
        };
        Self::open(&config).await
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Append a payload to the chain named by `scope_key`
    pub async fn append_entry(
        &self,
        scope_key: &str,
        payload: Payload,
        actor_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<AppendReceipt, LedgerError> {
        let scope = ChainScope::parse(scope_key)?;
        let entry = self.append(&scope, payload, actor_id, timestamp).await?;
        Ok(entry.receipt())
    }

    /// Replay the chain named by `scope_key`
    pub async fn verify_chain(&self, scope_key: &str) -> Result<VerificationReport, LedgerError> {
        let scope = ChainScope::parse(scope_key)?;
        self.verify(&scope).await
    }

    /// Entries of the chain named by `scope_key`, oldest first
    pub async fn get_chain(&self, scope_key: &str) -> Result<Vec<ChainEntry>, LedgerError> {
        let scope = ChainScope::parse(scope_key)?;
        self.entries(&scope).await
    }

    pub async fn verify(&self, scope: &ChainScope) -> Result<VerificationReport, LedgerError> {
        self.verify_key(&scope.key()).await
    }

    /// Verify and fail with `IntegrityViolation` if the chain is broken
    pub async fn ensure_intact(&self, scope: &ChainScope) -> Result<VerificationReport, LedgerError> {
        self.verify(scope).await?.into_result()
    }

    /// Verify every scope present in the store, ordered by scope key
    pub async fn verify_all(&self) -> Result<Vec<VerificationReport>, LedgerError> {
        let summaries = self.scopes().await?;
        let mut reports = Vec::with_capacity(summaries.len());
        for summary in &summaries {
            reports.push(self.verify_key(&summary.scope_key).await?);
        }

        let invalid = reports.iter().filter(|r| !r.valid).count();
        info!(
            "Verified {} chains ({} invalid)",
            reports.len(),
            invalid
        );
        Ok(reports)
    }

    pub async fn entries(&self, scope: &ChainScope) -> Result<Vec<ChainEntry>, LedgerError> {
        let scope_key = scope.key();
        EntryQueries::entries(self.database.pool(), &scope_key)
            .await
            .map_err(|e| e.into_ledger_error(&scope_key))
    }

    /// Latest entry of a scope
    pub async fn head(&self, scope: &ChainScope) -> Result<Option<ChainEntry>, LedgerError> {
        let scope_key = scope.key();
        EntryQueries::head(self.database.pool(), &scope_key)
            .await
            .map_err(|e| e.into_ledger_error(&scope_key))
    }

    pub async fn count(&self, scope: &ChainScope) -> Result<u64, LedgerError> {
        let scope_key = scope.key();
        EntryQueries::count(self.database.pool(), &scope_key)
            .await
            .map_err(|e| e.into_ledger_error(&scope_key))
    }

    /// Every scope holding at least one entry
    pub async fn scopes(&self) -> Result<Vec<ScopeSummary>, LedgerError> {
        Ok(EntryQueries::scope_summaries(self.database.pool()).await?)
    }

    /// Find the entry a receipt or external reference points at
    pub async fn locate(&self, entry_hash: &str) -> Result<Option<ChainEntry>, LedgerError> {
        Ok(EntryQueries::find_by_hash(self.database.pool(), entry_hash).await?)
    }

    async fn verify_key(&self, scope_key: &str) -> Result<VerificationReport, LedgerError> {
        let rows = EntryQueries::rows(self.database.pool(), scope_key)
            .await
            .map_err(|e| e.into_ledger_error(scope_key))?;
        Ok(verify::verify_entries(scope_key, &rows))
    }
}
