//! # Ledger Appender
//!
//! The single write path into the ledger: validates a movement, serializes
//! it per entity key, and records entry and balance in one transaction.
//!
//! ## Append Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         append(event)                                   │
//! │                                                                         │
//! │  1. validate_movement ──────────────► ValidationError (nothing touched)│
//! │  2. source_event_id seen? ──────────► Replayed(existing)                │
//! │  3. KeyLocks::acquire(entity_key)     (other keys proceed in parallel)  │
//! │  4. BEGIN                                                               │
//! │     ├── claim balance row             (takes the SQLite write lock)     │
//! │     ├── source_event_id seen? ──────► ROLLBACK, Replayed(existing)      │
//! │     ├── guard.check(prior, delta) ──► ROLLBACK, ConsistencyError        │
//! │     ├── INSERT entry (ON CONFLICT DO NOTHING)                           │
//! │     └── UPDATE balance                                                  │
//! │     COMMIT ─────────────────────────► Applied(entry)                    │
//! │  5. key released (guard dropped)                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Cancellation
//! Dropping the future at any await point drops the open transaction (rolled
//! back by sqlx) and the key guard (released). A retry is always safe: the
//! idempotency key turns a duplicate into a replay.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audit::{audit_chain, ChainReport};
use crate::config::LedgerConfig;
use crate::error::{DbError, LedgerResult};
use crate::lock::KeyLocks;
use crate::pool::Database;
use crate::repository::{balance, entry};
use stockledger_core::validation::{
    validate_key, validate_movement, validate_pagination, validate_time_range,
};
use stockledger_core::{
    BalanceRecord, ConsistencyGuard, GroupBalance, LedgerEntry, LedgerFilter, MovementEvent,
    MovementPolicy, Page, Pagination, Quantity,
};

/// What an append did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// A new entry was written.
    Applied(LedgerEntry),
    /// The source event was already applied; this is the stored entry.
    Replayed(LedgerEntry),
}

impl AppendOutcome {
    pub fn entry(&self) -> &LedgerEntry {
        match self {
            AppendOutcome::Applied(entry) | AppendOutcome::Replayed(entry) => entry,
        }
    }

    pub fn into_entry(self) -> LedgerEntry {
        match self {
            AppendOutcome::Applied(entry) | AppendOutcome::Replayed(entry) => entry,
        }
    }

    pub fn is_replay(&self) -> bool {
        matches!(self, AppendOutcome::Replayed(_))
    }
}

/// Appends movements and answers balance queries.
///
/// Cheap to clone; clones share the pool, the lock table and the guard.
/// Keep one instance (or its clones) per database: key locks only
/// serialize appends that go through the same lock table.
#[derive(Debug, Clone)]
pub struct LedgerAppender {
    db: Database,
    locks: Arc<KeyLocks>,
    guard: Arc<ConsistencyGuard>,
    policy: MovementPolicy,
}

impl LedgerAppender {
    /// Creates an appender with default rules: non-negative balances,
    /// adjustments require a reference.
    pub fn new(db: Database) -> Self {
        LedgerAppender {
            db,
            locks: Arc::new(KeyLocks::default()),
            guard: Arc::new(ConsistencyGuard::default()),
            policy: MovementPolicy::default(),
        }
    }

    /// Creates an appender with the rules and lock sharding from `config`.
    pub fn from_config(db: Database, config: &LedgerConfig) -> Self {
        LedgerAppender {
            db,
            locks: Arc::new(KeyLocks::new(config.ledger.lock_shards)),
            guard: Arc::new(config.guard()),
            policy: config.policy(),
        }
    }

    pub fn with_guard(mut self, guard: ConsistencyGuard) -> Self {
        self.guard = Arc::new(guard);
        self
    }

    pub fn with_policy(mut self, policy: MovementPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    // =========================================================================
    // Append
    // =========================================================================

    /// Applies a movement and returns its entry.
    ///
    /// A replayed `source_event_id` returns the original entry unchanged.
    pub async fn append(&self, event: &MovementEvent) -> LedgerResult<LedgerEntry> {
        self.append_detailed(event).await.map(AppendOutcome::into_entry)
    }

    /// Applies a movement, telling a fresh write apart from a replay.
    pub async fn append_detailed(&self, event: &MovementEvent) -> LedgerResult<AppendOutcome> {
        let movement = validate_movement(event, &self.policy)?;
        let entity_key = event.entity_key.as_str();
        let source_event_id = event.source_event_id.as_str();

        if let Some(existing) = self.db.entries().get_by_source_event(source_event_id).await? {
            debug!(
                source_event_id = %source_event_id,
                entry_id = %existing.id,
                "Movement already applied"
            );
            return Ok(AppendOutcome::Replayed(existing));
        }

        let _key = self.locks.acquire(entity_key).await;

        let mut tx = self.db.pool().begin().await?;
        let now = Utc::now().trunc_subsecs(6);

        let current = balance::claim(&mut tx, entity_key, now).await?;

        if let Some(existing) = entry::find_by_source_event(&mut tx, source_event_id).await? {
            tx.rollback().await?;
            debug!(
                source_event_id = %source_event_id,
                entry_id = %existing.id,
                "Movement applied concurrently"
            );
            return Ok(AppendOutcome::Replayed(existing));
        }

        let balance_after = match self.guard.check(entity_key, current.balance, movement.delta) {
            Ok(candidate) => candidate,
            Err(violation) => {
                tx.rollback().await?;
                warn!(
                    entity_key = %entity_key,
                    source_event_id = %source_event_id,
                    balance = %current.balance,
                    delta = %movement.delta,
                    "Movement rejected: {}",
                    violation
                );
                return Err(violation.into());
            }
        };

        let new_entry = LedgerEntry {
            id: Uuid::new_v4().to_string(),
            entity_key: entity_key.to_string(),
            group_key: movement.group_key,
            location_key: movement.location_key,
            source_event_id: source_event_id.to_string(),
            delta: movement.delta,
            balance_after,
            reason: movement.reason,
            reference: movement.reference,
            created_at: next_timestamp(now, &current),
        };

        if !entry::insert_if_absent(&mut tx, &new_entry).await? {
            let existing = entry::find_by_source_event(&mut tx, source_event_id)
                .await?
                .ok_or_else(|| DbError::not_found("LedgerEntry", source_event_id))?;
            tx.rollback().await?;
            return Ok(AppendOutcome::Replayed(existing));
        }

        balance::write(&mut tx, entity_key, balance_after, new_entry.created_at).await?;
        tx.commit().await?;

        info!(
            entity_key = %entity_key,
            source_event_id = %source_event_id,
            location_key = ?new_entry.location_key,
            delta = %new_entry.delta,
            balance_after = %new_entry.balance_after,
            reason = %new_entry.reason,
            "Movement applied"
        );

        Ok(AppendOutcome::Applied(new_entry))
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Current balance of one key (zero if it never moved).
    pub async fn balance(&self, entity_key: &str) -> LedgerResult<Quantity> {
        validate_key("entity_key", entity_key)?;
        Ok(self.db.balances().get_balance(entity_key).await?)
    }

    /// Stored balance record of one key, if any.
    pub async fn balance_record(&self, entity_key: &str) -> LedgerResult<Option<BalanceRecord>> {
        validate_key("entity_key", entity_key)?;
        Ok(self.db.balances().get(entity_key).await?)
    }

    /// Balances of many keys, in request order; unknown keys report zero.
    pub async fn balances(&self, entity_keys: &[String]) -> LedgerResult<Vec<(String, Quantity)>> {
        for key in entity_keys {
            validate_key("entity_key", key)?;
        }
        Ok(self.db.balances().get_many(entity_keys).await?)
    }

    /// Pages through all balance records, most recently moved first.
    pub async fn list_balances(&self, page: Pagination) -> LedgerResult<Page<BalanceRecord>> {
        let page = validate_pagination(page.limit.into(), page.offset.into())?;
        Ok(self.db.balances().list(page).await?)
    }

    /// Lists entries newest first.
    pub async fn entries(
        &self,
        filter: &LedgerFilter,
        page: Pagination,
    ) -> LedgerResult<Page<LedgerEntry>> {
        let page = validate_pagination(page.limit.into(), page.offset.into())?;
        validate_time_range(filter.from, filter.to)?;
        if let Some(key) = &filter.entity_key {
            validate_key("entity_key", key)?;
        }
        if let Some(group) = &filter.group_key {
            validate_key("group_key", group)?;
        }
        if let Some(location) = &filter.location_key {
            validate_key("location_key", location)?;
        }

        Ok(self.db.entries().query(filter, page).await?)
    }

    /// Per-group balances derived from the log.
    pub async fn group_balances(
        &self,
        entity_key: Option<&str>,
        group_key: Option<&str>,
        page: Pagination,
    ) -> LedgerResult<Page<GroupBalance>> {
        let page = validate_pagination(page.limit.into(), page.offset.into())?;
        if let Some(key) = entity_key {
            validate_key("entity_key", key)?;
        }
        if let Some(group) = group_key {
            validate_key("group_key", group)?;
        }

        Ok(self
            .db
            .entries()
            .group_balances(entity_key, group_key, page)
            .await?)
    }

    /// Audits one key's entry chain against its stored balance.
    ///
    /// Holds the key lock so no append interleaves with the two reads.
    pub async fn verify_chain(&self, entity_key: &str) -> LedgerResult<ChainReport> {
        validate_key("entity_key", entity_key)?;

        let _key = self.locks.acquire(entity_key).await;
        let entries = self.db.entries().entries_for(entity_key).await?;
        let stored = self.db.balances().get_balance(entity_key).await?;

        let report = audit_chain(entity_key, &entries, stored);
        if !report.is_consistent() {
            warn!(
                entity_key = %entity_key,
                violations = report.violations.len(),
                "Ledger chain inconsistent"
            );
        }

        Ok(report)
    }
}

/// `created_at` for the next entry of a key: now, but strictly after the
/// key's previous entry even if the clock went backwards.
fn next_timestamp(now: DateTime<Utc>, current: &BalanceRecord) -> DateTime<Utc> {
    if now > current.updated_at {
        now
    } else {
        current.updated_at + Duration::microseconds(1)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
