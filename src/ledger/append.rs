//! Ledger Appender
//!
//! Tail lookup, digest and insert run in one transaction while the scope's
//! in-process lock is held. The store's `(scope_key, sequence)` and
//! `(scope_key, previous_hash)` uniqueness constraints catch writers outside
//! this process; those conflicts are retried against a freshly read tail.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::database::queries::EntryQueries;
use crate::error::LedgerError;
use crate::ledger::canonical::Payload;
use crate::ledger::entry::ChainEntry;
use crate::ledger::hash::{is_digest, GENESIS};
use crate::ledger::scope::ChainScope;
use crate::ledger::ChainLedger;

impl ChainLedger {
    /// Append to the current tail of `scope`, retrying on conflicts
    pub async fn append(
        &self,
        scope: &ChainScope,
        payload: Payload,
        actor: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<ChainEntry, LedgerError> {
        let scope_key = scope.key();
        let _guard = self
            .locks
            .acquire(&scope_key, self.policy.lock_timeout)
            .await?;

        let max_attempts = self.policy.max_attempts;
        let mut last_conflict = String::new();

        for attempt in 1..=max_attempts {
            match self.try_append(scope, None, &payload, actor, timestamp).await {
                Ok(entry) => {
                    debug!("Appended chain entry: {}", entry.summary());
                    return Ok(entry);
                }
                Err(LedgerError::ChainConflict { reason, .. }) => {
                    warn!(
                        "Append conflict on {} (attempt {}/{}): {}",
                        scope_key, attempt, max_attempts, reason
                    );
                    last_conflict = reason;
                    if attempt < max_attempts {
                        tokio::time::sleep(self.policy.retry_backoff * attempt).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(LedgerError::chain_conflict(
            scope_key,
            format!(
                "retry budget of {} attempts exhausted: {}",
                max_attempts, last_conflict
            ),
        ))
    }

    /// Append only if the tail of `scope` is still `expected_previous`.
    ///
    /// Pass [`GENESIS`] to claim the first position of an empty scope. A
    /// moved tail fails with `ChainConflict` and nothing is written.
    pub async fn append_after(
        &self,
        scope: &ChainScope,
        expected_previous: &str,
        payload: Payload,
        actor: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<ChainEntry, LedgerError> {
        if !is_digest(expected_previous) {
            return Err(LedgerError::InvalidEntry(format!(
                "Expected previous hash is not a digest: {}",
                expected_previous
            )));
        }

        let _guard = self
            .locks
            .acquire(&scope.key(), self.policy.lock_timeout)
            .await?;

        let entry = self
            .try_append(scope, Some(expected_previous), &payload, actor, timestamp)
            .await?;
        debug!("Appended chain entry: {}", entry.summary());
        Ok(entry)
    }

    /// One transactional attempt; dropping the transaction on error rolls it back
    async fn try_append(
        &self,
        scope: &ChainScope,
        expected_previous: Option<&str>,
        payload: &Payload,
        actor: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<ChainEntry, LedgerError> {
        let scope_key = scope.key();
        let store_err = |e: crate::database::StoreError| e.into_ledger_error(&scope_key);

        let mut tx = self.database.pool().begin().await.map_err(|e| store_err(e.into()))?;

        let tail = EntryQueries::tail(&mut *tx, &scope_key)
            .await
            .map_err(store_err)?;

        if let Some(expected) = expected_previous {
            let current = tail
                .as_ref()
                .map(|t| t.entry_hash.as_str())
                .unwrap_or(GENESIS);
            if current != expected {
                return Err(LedgerError::chain_conflict(
                    &scope_key,
                    format!("tail moved: expected {}, found {}", expected, current),
                ));
            }
        }

        let entry = ChainEntry::link(scope, tail.as_ref(), payload.clone(), actor, timestamp)?;

        EntryQueries::insert(&mut *tx, &entry)
            .await
            .map_err(store_err)?;
        tx.commit().await.map_err(|e| store_err(e.into()))?;

        Ok(entry)
    }
}
