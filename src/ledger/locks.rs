//! Per-scope write serialization.
//!
//! Appenders to the same scope queue on one async mutex; appenders to
//! different scopes never touch each other's lock. Idle locks are dropped
//! from the table when their last holder releases them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::error::LedgerError;

type LockTable = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

#[derive(Default)]
pub struct ScopeLocks {
    table: Arc<LockTable>,
}

/// Held for the duration of one append
pub struct ScopeGuard {
    guard: Option<OwnedMutexGuard<()>>,
    scope_key: String,
    table: Arc<LockTable>,
}

impl ScopeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive write access to a scope, at most `timeout`
    pub async fn acquire(&self, scope_key: &str, timeout: Duration) -> Result<ScopeGuard, LedgerError> {
        let lock = {
            let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            table
                .entry(scope_key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        let acquired = tokio::time::timeout(timeout, lock.lock_owned()).await;
        match acquired {
            Ok(guard) => Ok(ScopeGuard {
                guard: Some(guard),
                scope_key: scope_key.to_string(),
                table: Arc::clone(&self.table),
            }),
            Err(_) => {
                // the timed-out future dropped our clone
                self.release_idle(scope_key);
                Err(LedgerError::chain_conflict(
                    scope_key,
                    format!("timed out after {:?} waiting for the scope lock", timeout),
                ))
            }
        }
    }

    /// Number of scopes with a live lock
    pub fn active_scopes(&self) -> usize {
        self.table.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn release_idle(&self, scope_key: &str) {
        forget_if_idle(&self.table, scope_key);
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        // release the mutex (and its Arc) before inspecting the table
        drop(self.guard.take());
        forget_if_idle(&self.table, &self.scope_key);
    }
}

fn forget_if_idle(table: &LockTable, scope_key: &str) {
    let mut table = table.lock().unwrap_or_else(|e| e.into_inner());
    let idle = table
        .get(scope_key)
        .map(|lock| Arc::strong_count(lock) == 1)
        .unwrap_or(false);
    if idle {
        table.remove(scope_key);
    }
}
