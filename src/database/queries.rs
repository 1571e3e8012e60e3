use sqlx::sqlite::{SqliteConnection, SqlitePool};
use sqlx::Row;

use crate::database::models::{ScopeSummary, StoredEntry};
use crate::database::StoreError;
use crate::ledger::entry::{ChainEntry, ChainTail};

const ENTRY_COLUMNS: &str =
    "entry_id, scope_key, sequence, payload, actor, recorded_at, previous_hash, entry_hash";

/// Queries against `chain_entries`.
///
/// Every chain read and tail lookup filters by scope key; the latest row of
/// the table is never a valid tail for anything.
pub struct EntryQueries;

impl EntryQueries {
    /// Latest entry of a scope, read inside the caller's transaction
    pub async fn tail(
        conn: &mut SqliteConnection,
        scope_key: &str,
    ) -> Result<Option<ChainTail>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT sequence, entry_hash
            FROM chain_entries
            WHERE scope_key = ?
            ORDER BY sequence DESC
            LIMIT 1
            "#,
        )
        .bind(scope_key)
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => {
                let sequence: i64 = row.try_get("sequence")?;
                let sequence = u64::try_from(sequence).map_err(|_| StoreError::Malformed {
                    entry_id: format!("{}#{}", scope_key, sequence),
                    reason: "negative sequence".to_string(),
                })?;
                Ok(Some(ChainTail {
                    sequence,
                    entry_hash: row.try_get("entry_hash")?,
                }))
            }
            None => Ok(None),
        }
    }

    /// Insert one entry inside the caller's transaction
    pub async fn insert(conn: &mut SqliteConnection, entry: &ChainEntry) -> Result<(), StoreError> {
        let stored = StoredEntry::try_from(entry).map_err(|e| StoreError::Malformed {
            entry_id: entry.entry_id.to_string(),
            reason: e.to_string(),
        })?;

        sqlx::query(
            r#"
            INSERT INTO chain_entries
            (entry_id, scope_key, sequence, payload, actor, recorded_at, previous_hash, entry_hash)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&stored.entry_id)
        .bind(&stored.scope_key)
        .bind(stored.sequence)
        .bind(&stored.payload)
        .bind(&stored.actor)
        .bind(&stored.recorded_at)
        .bind(&stored.previous_hash)
        .bind(&stored.entry_hash)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// All rows of a scope in sequence order, read as one statement
    pub async fn rows(pool: &SqlitePool, scope_key: &str) -> Result<Vec<StoredEntry>, StoreError> {
        let sql = format!(
            "SELECT {} FROM chain_entries WHERE scope_key = ? ORDER BY sequence ASC",
            ENTRY_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(scope_key).fetch_all(pool).await?;

        rows.iter()
            .map(|row| StoredEntry::from_row(row).map_err(StoreError::from))
            .collect()
    }

    /// Decoded entries of a scope; fails on the first row that cannot be decoded
    pub async fn entries(pool: &SqlitePool, scope_key: &str) -> Result<Vec<ChainEntry>, StoreError> {
        Self::rows(pool, scope_key)
            .await?
            .iter()
            .map(decode)
            .collect()
    }

    pub async fn head(pool: &SqlitePool, scope_key: &str) -> Result<Option<ChainEntry>, StoreError> {
        let sql = format!(
            "SELECT {} FROM chain_entries WHERE scope_key = ? ORDER BY sequence DESC LIMIT 1",
            ENTRY_COLUMNS
        );
        let row = sqlx::query(&sql).bind(scope_key).fetch_optional(pool).await?;

        match row {
            Some(row) => Ok(Some(decode(&StoredEntry::from_row(&row)?)?)),
            None => Ok(None),
        }
    }

    pub async fn find_by_hash(
        pool: &SqlitePool,
        entry_hash: &str,
    ) -> Result<Option<ChainEntry>, StoreError> {
        let sql = format!(
            "SELECT {} FROM chain_entries WHERE entry_hash = ? ORDER BY scope_key, sequence LIMIT 1",
            ENTRY_COLUMNS
        );
        let row = sqlx::query(&sql).bind(entry_hash).fetch_optional(pool).await?;

        match row {
            Some(row) => Ok(Some(decode(&StoredEntry::from_row(&row)?)?)),
            None => Ok(None),
        }
    }

    pub async fn count(pool: &SqlitePool, scope_key: &str) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chain_entries WHERE scope_key = ?")
            .bind(scope_key)
            .fetch_one(pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    /// Every scope with at least one entry, ordered by key
    pub async fn scope_summaries(pool: &SqlitePool) -> Result<Vec<ScopeSummary>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT e.scope_key AS scope_key, c.entry_count AS entry_count, e.entry_hash AS head_hash
            FROM chain_entries e
            JOIN (
                SELECT scope_key, COUNT(*) AS entry_count, MAX(sequence) AS max_sequence
                FROM chain_entries
                GROUP BY scope_key
            ) c ON c.scope_key = e.scope_key AND c.max_sequence = e.sequence
            ORDER BY e.scope_key
            "#,
        )
        .fetch_all(pool)
        .await?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            let entry_count: i64 = row.try_get("entry_count")?;
            summaries.push(ScopeSummary {
                scope_key: row.try_get("scope_key")?,
                entry_count: entry_count.max(0) as u64,
                head_hash: row.try_get("head_hash")?,
            });
        }
        Ok(summaries)
    }
}

fn decode(stored: &StoredEntry) -> Result<ChainEntry, StoreError> {
    stored.decode().map_err(|reason| StoreError::Malformed {
        entry_id: stored.entry_id.clone(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::ledger::canonical::Payload;
    use crate::ledger::scope::ChainScope;
    use chrono::Utc;
    use serde_json::json;

    fn payload(n: u64) -> Payload {
        let mut payload = Payload::new();
        payload.insert("n".to_string(), json!(n));
        payload
    }

    async fn insert_chain(db: &Database, scope: &ChainScope, len: u64) -> Vec<ChainEntry> {
        let mut conn = db.pool().acquire().await.unwrap();
        let mut entries: Vec<ChainEntry> = Vec::new();
        for n in 0..len {
            let tail = entries.last().map(ChainEntry::tail);
            let entry = ChainEntry::link(scope, tail.as_ref(), payload(n), "tester", Utc::now()).unwrap();
            EntryQueries::insert(&mut conn, &entry).await.unwrap();
            entries.push(entry);
        }
        entries
    }

    #[tokio::test]
    async fn test_tail_is_scoped() {
        let db = Database::new_in_memory().await.unwrap();
        let consent = ChainScope::parse("consent:S-1").unwrap();
        let retention = ChainScope::parse("retention:R-1").unwrap();

        let consent_entries = insert_chain(&db, &consent, 3).await;
        insert_chain(&db, &retention, 1).await;

        let mut conn = db.pool().acquire().await.unwrap();
        let tail = EntryQueries::tail(&mut conn, &consent.key()).await.unwrap().unwrap();
        assert_eq!(tail, consent_entries[2].tail());

        let empty = EntryQueries::tail(&mut conn, "consent:S-2").await.unwrap();
        assert!(empty.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_sequence_is_a_conflict() {
        let db = Database::new_in_memory().await.unwrap();
        let scope = ChainScope::parse("correction:global").unwrap();
        insert_chain(&db, &scope, 1).await;

        let fork = ChainEntry::link(&scope, None, payload(99), "intruder", Utc::now()).unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        let result = EntryQueries::insert(&mut conn, &fork).await;

        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_updates_and_deletes_are_refused() {
        let db = Database::new_in_memory().await.unwrap();
        let scope = ChainScope::parse("correction:global").unwrap();
        insert_chain(&db, &scope, 1).await;

        let update = sqlx::query("UPDATE chain_entries SET actor = 'mallory'")
            .execute(db.pool())
            .await;
        assert!(update.is_err());

        let delete = sqlx::query("DELETE FROM chain_entries").execute(db.pool()).await;
        assert!(delete.is_err());

        assert_eq!(EntryQueries::count(db.pool(), &scope.key()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rows_are_ordered_and_summarised() {
        let db = Database::new_in_memory().await.unwrap();
        let followups = ChainScope::parse("ae_followup:17").unwrap();
        let corrections = ChainScope::parse("correction:global").unwrap();
        let inserted = insert_chain(&db, &followups, 4).await;
        insert_chain(&db, &corrections, 2).await;

        let entries = EntryQueries::entries(db.pool(), &followups.key()).await.unwrap();
        assert_eq!(entries, inserted);

        let head = EntryQueries::head(db.pool(), &followups.key()).await.unwrap().unwrap();
        assert_eq!(head.sequence, 3);

        let found = EntryQueries::find_by_hash(db.pool(), &inserted[1].entry_hash)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.entry_id, inserted[1].entry_id);

        let summaries = EntryQueries::scope_summaries(db.pool()).await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].scope_key, "ae_followup:17");
        assert_eq!(summaries[0].entry_count, 4);
        assert_eq!(summaries[0].head_hash, inserted[3].entry_hash);
        assert_eq!(summaries[1].scope_key, "correction:global");
    }
}
