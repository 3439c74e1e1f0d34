//! # Balance Repository
//!
//! The materialized current balance per entity key.
//!
//! Reads are public. Writes take the appender's transaction connection so a
//! balance can only change together with the entry that explains it.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use tracing::debug;

use super::sql_timestamp;
use crate::error::DbResult;
use stockledger_core::{BalanceRecord, Page, Pagination, Quantity};

/// Upper bound on bound parameters per `IN (...)` query.
const MAX_KEYS_PER_QUERY: usize = 500;

/// Repository for balance reads.
#[derive(Debug, Clone)]
pub struct BalanceRepository {
    pool: SqlitePool,
}

impl BalanceRepository {
    /// Creates a new BalanceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        BalanceRepository { pool }
    }

    /// Gets the balance record for a key, if any movement was ever applied.
    pub async fn get(&self, entity_key: &str) -> DbResult<Option<BalanceRecord>> {
        let record = sqlx::query_as::<_, BalanceRecord>(
            r#"
            SELECT entity_key, balance, updated_at
            FROM ledger_balances
            WHERE entity_key = ?1
            "#,
        )
        .bind(entity_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Current balance; zero for keys that never moved.
    pub async fn get_balance(&self, entity_key: &str) -> DbResult<Quantity> {
        Ok(self
            .get(entity_key)
            .await?
            .map(|record| record.balance)
            .unwrap_or_default())
    }

    /// Balances for many keys in one round trip per chunk.
    ///
    /// Results follow request order; unknown keys report zero.
    pub async fn get_many(&self, entity_keys: &[String]) -> DbResult<Vec<(String, Quantity)>> {
        let mut found: HashMap<String, Quantity> = HashMap::with_capacity(entity_keys.len());

        for chunk in entity_keys.chunks(MAX_KEYS_PER_QUERY) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT entity_key, balance FROM ledger_balances WHERE entity_key IN (");
            let mut separated = builder.separated(", ");
            for key in chunk {
                separated.push_bind(key.as_str());
            }
            separated.push_unseparated(")");

            let rows: Vec<(String, Quantity)> = builder.build_query_as().fetch_all(&self.pool).await?;
            found.extend(rows);
        }

        Ok(entity_keys
            .iter()
            .map(|key| (key.clone(), found.get(key).copied().unwrap_or_default()))
            .collect())
    }

    /// Lists balances, most recently moved first.
    pub async fn list(&self, page: Pagination) -> DbResult<Page<BalanceRecord>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ledger_balances")
            .fetch_one(&self.pool)
            .await?;

        let items = sqlx::query_as::<_, BalanceRecord>(
            r#"
            SELECT entity_key, balance, updated_at
            FROM ledger_balances
            ORDER BY updated_at DESC, entity_key ASC
            LIMIT ?1 OFFSET ?2
            "#,
        )
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(Page {
            items,
            total: total as u64,
            limit: page.limit,
            offset: page.offset,
        })
    }
}

// =============================================================================
// Unit-of-work writes
// =============================================================================

/// Claims the balance row for `entity_key` and returns it.
///
/// Must be the first statement of the transaction: the insert takes the
/// SQLite write lock before anything is read, so the balance read below
/// cannot be stale. A key seen for the first time gets a zero row, which is
/// discarded again if the transaction rolls back.
pub(crate) async fn claim(
    conn: &mut SqliteConnection,
    entity_key: &str,
    now: DateTime<Utc>,
) -> DbResult<BalanceRecord> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO ledger_balances (entity_key, balance, updated_at)
        VALUES (?1, 0, ?2)
        ON CONFLICT(entity_key) DO NOTHING
        "#,
    )
    .bind(entity_key)
    .bind(sql_timestamp(&now))
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if inserted > 0 {
        debug!(entity_key = %entity_key, "Created balance record");
    }

    let record = sqlx::query_as::<_, BalanceRecord>(
        r#"
        SELECT entity_key, balance, updated_at
        FROM ledger_balances
        WHERE entity_key = ?1
        "#,
    )
    .bind(entity_key)
    .fetch_one(&mut *conn)
    .await?;

    Ok(record)
}

/// Stores the new balance for a claimed key.
pub(crate) async fn write(
    conn: &mut SqliteConnection,
    entity_key: &str,
    balance: Quantity,
    updated_at: DateTime<Utc>,
) -> DbResult<()> {
    sqlx::query(
        r#"
        UPDATE ledger_balances
        SET balance = ?1, updated_at = ?2
        WHERE entity_key = ?3
        "#,
    )
    .bind(balance)
    .bind(sql_timestamp(&updated_at))
    .bind(entity_key)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_unknown_key_is_zero() {
        let db = db().await;

        assert!(db.balances().get("SKU-404").await.unwrap().is_none());
        assert_eq!(db.balances().get_balance("SKU-404").await.unwrap(), Quantity::zero());
    }

    #[tokio::test]
    async fn test_claim_then_write() {
        let db = db().await;
        let now = Utc::now();

        let mut tx = db.pool().begin().await.unwrap();
        let claimed = claim(&mut tx, "SKU-1", now).await.unwrap();
        assert_eq!(claimed.balance, Quantity::zero());

        write(&mut tx, "SKU-1", Quantity::from_units(7), now).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(db.balances().get_balance("SKU-1").await.unwrap(), Quantity::from_units(7));
    }

    #[tokio::test]
    async fn test_rolled_back_claim_leaves_nothing() {
        let db = db().await;

        let mut tx = db.pool().begin().await.unwrap();
        claim(&mut tx, "SKU-1", Utc::now()).await.unwrap();
        tx.rollback().await.unwrap();

        assert!(db.balances().get("SKU-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_negative_balance_rejected_by_storage() {
        let db = db().await;

        let mut tx = db.pool().begin().await.unwrap();
        claim(&mut tx, "SKU-1", Utc::now()).await.unwrap();
        let result = write(&mut tx, "SKU-1", Quantity::from_units(-1), Utc::now()).await;

        assert!(matches!(
            result,
            Err(crate::error::DbError::ConstraintViolation { .. })
        ));
    }

    #[tokio::test]
    async fn test_get_many_keeps_request_order() {
        let db = db().await;

        let mut tx = db.pool().begin().await.unwrap();
        claim(&mut tx, "SKU-2", Utc::now()).await.unwrap();
        write(&mut tx, "SKU-2", Quantity::from_units(2), Utc::now()).await.unwrap();
        tx.commit().await.unwrap();

        let keys = vec!["SKU-3".to_string(), "SKU-2".to_string()];
        let balances = db.balances().get_many(&keys).await.unwrap();

        assert_eq!(
            balances,
            vec![
                ("SKU-3".to_string(), Quantity::zero()),
                ("SKU-2".to_string(), Quantity::from_units(2)),
            ]
        );
        assert!(db.balances().get_many(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_pages() {
        let db = db().await;

        let mut tx = db.pool().begin().await.unwrap();
        for key in ["A", "B", "C"] {
            claim(&mut tx, key, Utc::now()).await.unwrap();
        }
        tx.commit().await.unwrap();

        let page = db
            .balances()
            .list(Pagination { limit: 2, offset: 0 })
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
        assert!(page.has_more());
    }
}
