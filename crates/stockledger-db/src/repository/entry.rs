//! # Entry Repository
//!
//! Reads over the append-only ledger log, plus the crate-private insert used
//! by the appender's unit of work.
//!
//! ## Ordering
//! ```text
//! listing:  ORDER BY created_at DESC, seq DESC    (newest first)
//! audit:    ORDER BY created_at ASC,  seq ASC     (replay order)
//! ```
//! `created_at` is strictly increasing per entity key, `seq` breaks ties
//! across keys.

use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

use super::{sql_lower_bound, sql_timestamp};
use crate::error::DbResult;
use stockledger_core::{GroupBalance, LedgerEntry, LedgerFilter, Page, Pagination};

const ENTRY_COLUMNS: &str = "id, entity_key, group_key, location_key, source_event_id, \
                             delta, balance_after, reason, reference, created_at";

/// Repository for ledger entry reads.
#[derive(Debug, Clone)]
pub struct EntryRepository {
    pool: SqlitePool,
}

impl EntryRepository {
    /// Creates a new EntryRepository.
    pub fn new(pool: SqlitePool) -> Self {
        EntryRepository { pool }
    }

    /// Gets an entry by its ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<LedgerEntry>> {
        let entry = sqlx::query_as::<_, LedgerEntry>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    /// Gets the entry produced by a source event, if it was applied.
    pub async fn get_by_source_event(&self, source_event_id: &str) -> DbResult<Option<LedgerEntry>> {
        let mut conn = self.pool.acquire().await?;
        find_by_source_event(&mut conn, source_event_id).await
    }

    /// Lists entries matching `filter`, newest first.
    pub async fn query(&self, filter: &LedgerFilter, page: Pagination) -> DbResult<Page<LedgerEntry>> {
        let mut count: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM ledger_entries");
        push_filter(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {ENTRY_COLUMNS} FROM ledger_entries"));
        push_filter(&mut select, filter);
        select
            .push(" ORDER BY created_at DESC, seq DESC LIMIT ")
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.offset);

        let items: Vec<LedgerEntry> = select.build_query_as().fetch_all(&self.pool).await?;

        debug!(
            total = total,
            returned = items.len(),
            "Queried ledger entries"
        );

        Ok(Page {
            items,
            total: total as u64,
            limit: page.limit,
            offset: page.offset,
        })
    }

    /// Every entry of one key, oldest first.
    pub async fn entries_for(&self, entity_key: &str) -> DbResult<Vec<LedgerEntry>> {
        let entries = sqlx::query_as::<_, LedgerEntry>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries \
             WHERE entity_key = ?1 \
             ORDER BY created_at ASC, seq ASC"
        ))
        .bind(entity_key)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Per `(entity_key, group_key)` balances summed from the log.
    ///
    /// Entries without a group are excluded. `updated_at` is the time of the
    /// group's latest entry; most recently active groups come first.
    pub async fn group_balances(
        &self,
        entity_key: Option<&str>,
        group_key: Option<&str>,
        page: Pagination,
    ) -> DbResult<Page<GroupBalance>> {
        let push_where = |builder: &mut QueryBuilder<'_, Sqlite>| {
            builder.push(" WHERE group_key IS NOT NULL");
            if let Some(key) = entity_key {
                builder.push(" AND entity_key = ").push_bind(key.to_string());
            }
            if let Some(group) = group_key {
                builder.push(" AND group_key = ").push_bind(group.to_string());
            }
        };

        let mut count: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM (SELECT 1 FROM ledger_entries");
        push_where(&mut count);
        count.push(" GROUP BY entity_key, group_key)");
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT entity_key, group_key, SUM(delta) AS balance, MAX(created_at) AS updated_at \
             FROM ledger_entries",
        );
        push_where(&mut select);
        select
            .push(
                " GROUP BY entity_key, group_key \
                 ORDER BY MAX(created_at) DESC, MAX(seq) DESC LIMIT ",
            )
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.offset);

        let items: Vec<GroupBalance> = select.build_query_as().fetch_all(&self.pool).await?;

        Ok(Page {
            items,
            total: total as u64,
            limit: page.limit,
            offset: page.offset,
        })
    }

    /// Total number of entries in the log.
    pub async fn count(&self) -> DbResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ledger_entries")
            .fetch_one(&self.pool)
            .await?;

        Ok(count as u64)
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &LedgerFilter) {
    let mut has_where = false;
    let mut clause = |builder: &mut QueryBuilder<'_, Sqlite>, sql: &str| {
        builder.push(if has_where { " AND " } else { " WHERE " });
        builder.push(sql);
        has_where = true;
    };

    if let Some(key) = &filter.entity_key {
        clause(builder, "entity_key = ");
        builder.push_bind(key.clone());
    }
    if let Some(group) = &filter.group_key {
        clause(builder, "group_key = ");
        builder.push_bind(group.clone());
    }
    if let Some(location) = &filter.location_key {
        clause(builder, "location_key = ");
        builder.push_bind(location.clone());
    }
    if let Some(reason) = filter.reason {
        clause(builder, "reason = ");
        builder.push_bind(reason);
    }
    if let Some(from) = &filter.from {
        clause(builder, "created_at >= ");
        builder.push_bind(sql_lower_bound(from));
    }
    if let Some(to) = &filter.to {
        clause(builder, "created_at <= ");
        builder.push_bind(sql_timestamp(to));
    }
}

// =============================================================================
// Unit-of-work access
// =============================================================================

/// Looks up an entry by source event on the given connection.
pub(crate) async fn find_by_source_event(
    conn: &mut SqliteConnection,
    source_event_id: &str,
) -> DbResult<Option<LedgerEntry>> {
    let entry = sqlx::query_as::<_, LedgerEntry>(&format!(
        "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE source_event_id = ?1"
    ))
    .bind(source_event_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(entry)
}

/// Inserts `entry` unless its `source_event_id` is already recorded.
///
/// Returns `false` when an entry for the same source event already exists;
/// nothing is written in that case.
pub(crate) async fn insert_if_absent(conn: &mut SqliteConnection, entry: &LedgerEntry) -> DbResult<bool> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO ledger_entries (
            id, entity_key, group_key, location_key, source_event_id,
            delta, balance_after, reason, reference, created_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5,
            ?6, ?7, ?8, ?9, ?10
        )
        ON CONFLICT(source_event_id) DO NOTHING
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.entity_key)
    .bind(&entry.group_key)
    .bind(&entry.location_key)
    .bind(&entry.source_event_id)
    .bind(entry.delta)
    .bind(entry.balance_after)
    .bind(entry.reason)
    .bind(&entry.reference)
    .bind(sql_timestamp(&entry.created_at))
    .execute(&mut *conn)
    .await?
    .rows_affected();

    Ok(inserted == 1)
}
