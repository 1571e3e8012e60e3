// Database schema definitions and migrations
// This module contains the SQL schema for the ledger database

pub const CHAIN_ENTRIES_SCHEMA: &str = include_str!("../../migrations/001_chain_entries.sql");

/// Applied in order on every open; each script is idempotent
pub const MIGRATIONS: &[(&str, &str)] = &[("001_chain_entries", CHAIN_ENTRIES_SCHEMA)];
