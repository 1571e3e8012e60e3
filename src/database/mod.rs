pub mod models;
pub mod queries;
pub mod schema;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::LedgerConfig;
use crate::error::LedgerError;

/// SQLite result codes that mean another writer got there first
const CONTENTION_CODES: &[&str] = &["5", "6", "261", "262", "517"];

/// Store-level failures, with write contention kept apart from real faults
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("conflicting write: {0}")]
    Conflict(String),

    #[error("malformed entry {entry_id}: {reason}")]
    Malformed { entry_id: String, reason: String },

    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return Self::Conflict(db_err.message().to_string());
            }
            if let Some(code) = db_err.code() {
                let code: &str = &code;
                if CONTENTION_CODES.contains(&code) {
                    return Self::Conflict(format!("{} (code {})", db_err.message(), code));
                }
            }
        }
        Self::Database(err)
    }
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Attach the scope the failing operation was working on
    pub fn into_ledger_error(self, scope_key: &str) -> LedgerError {
        match self {
            Self::Conflict(reason) => LedgerError::chain_conflict(scope_key, reason),
            other => LedgerError::PersistenceFailure(other.to_string()),
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        err.into_ledger_error("unscoped")
    }
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open a database with default pool settings
    pub async fn new(database_url: &str) -> Result<Self, LedgerError> {
        let config = LedgerConfig {
            database_url: database_url.to_string(),
            ..LedgerConfig::default()
        };
        Self::connect(&config).await
    }

    /// Private in-memory database, mainly for tests
    pub async fn new_in_memory() -> Result<Self, LedgerError> {
        Self::new("sqlite::memory:").await
    }

    pub async fn connect(config: &LedgerConfig) -> Result<Self, LedgerError> {
        let in_memory = config.database_url.contains(":memory:");

        let mut options = SqliteConnectOptions::from_str(&config.database_url)?
            .create_if_missing(true)
            .busy_timeout(config.busy_timeout());
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // every connection to :memory: is a separate database
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(config.max_connections)
        };

        let pool = pool_options.connect_with(options).await?;
        let database = Database { pool };
        database.run_migrations().await?;

        info!("Ledger database ready at {}", config.database_url);
        Ok(database)
    }

    pub async fn run_migrations(&self) -> Result<(), LedgerError> {
        for (name, script) in schema::MIGRATIONS {
            sqlx::raw_sql(*script).execute(&self.pool).await?;
            debug!("Applied migration {}", name);
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
