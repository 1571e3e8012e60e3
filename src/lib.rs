//! Tamper-evident, append-only hash-chain ledger for clinical-trial
//! compliance records.

pub mod config;
pub mod database;
pub mod error;
pub mod ledger;
pub mod records;

pub use config::LedgerConfig;
pub use error::LedgerError;
pub use ledger::{
    AppendReceipt, ChainDomain, ChainEntry, ChainLedger, ChainScope, Payload, VerificationReport,
    GENESIS,
};
