#![allow(dead_code)]

use compliance_ledger::{ChainLedger, LedgerConfig, Payload};
use serde_json::Value;
use std::path::Path;

/// Setup a ledger over a private in-memory database
pub async fn setup_test_ledger() -> ChainLedger {
    ChainLedger::in_memory()
        .await
        .expect("Failed to create in-memory ledger")
}

/// Configuration for an on-disk ledger inside `dir`
pub fn file_config(dir: &Path) -> LedgerConfig {
    LedgerConfig {
        database_url: format!("sqlite://{}", dir.join("ledger.db").display()),
        max_append_attempts: 32,
        ..LedgerConfig::default()
    }
}

/// Open an on-disk ledger; several calls on one `dir` behave like separate processes
pub async fn setup_file_ledger(dir: &Path) -> ChainLedger {
    ChainLedger::open(&file_config(dir))
        .await
        .expect("Failed to open file ledger")
}

/// Build a payload from a JSON object literal
pub fn payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        other => panic!("payload must be a JSON object, got {}", other),
    }
}

/// Rewrite stored rows behind the ledger's back, the way an attacker with
/// database access would: drop the append-only triggers, then run `sql`.
pub async fn tamper(ledger: &ChainLedger, sql: &str) {
    let pool = ledger.database().pool();
    sqlx::query("DROP TRIGGER IF EXISTS chain_entries_no_update")
        .execute(pool)
        .await
        .expect("Failed to drop update trigger");
    sqlx::query("DROP TRIGGER IF EXISTS chain_entries_no_delete")
        .execute(pool)
        .await
        .expect("Failed to drop delete trigger");
    sqlx::query(sql)
        .execute(pool)
        .await
        .expect("Failed to tamper with chain entries");
}
