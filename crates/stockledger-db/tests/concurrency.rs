//! File-backed ledger under concurrent load: several pool connections,
//! several worker threads, many keys.

use std::collections::HashMap;
use std::time::Duration;

use proptest::prelude::*;
use stockledger_core::{Direction, LedgerFilter, MovementEvent, Pagination, Quantity};
use stockledger_db::{Database, DbConfig, LedgerAppender, LedgerError};

async fn file_ledger(dir: &tempfile::TempDir) -> LedgerAppender {
    let config = DbConfig::new(dir.path().join("ledger.db")).max_connections(4);
    let db = Database::new(config).await.expect("open file database");
    LedgerAppender::new(db)
}

fn movement(id: String, key: &str, direction: Direction, units: i64) -> MovementEvent {
    MovementEvent::new(id, key, direction, Quantity::from_units(units))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn no_lost_updates_on_one_key() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = file_ledger(&dir).await;

    ledger
        .append(&movement("seed".into(), "SKU-HOT", Direction::Increase, 20))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..40 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger
                .append(&movement(format!("sale-{i}"), "SKU-HOT", Direction::Decrease, 1))
                .await
        }));
    }

    let mut applied = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => applied += 1,
            Err(LedgerError::Consistency(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(applied, 20);
    assert_eq!(ledger.balance("SKU-HOT").await.unwrap(), Quantity::zero());

    let report = ledger.verify_chain("SKU-HOT").await.unwrap();
    assert!(report.is_consistent(), "{:?}", report.violations);
    assert_eq!(report.entries, 21);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn independent_keys_conserve_their_sums() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = file_ledger(&dir).await;

    let keys: Vec<String> = (0..8).map(|k| format!("SKU-{k}")).collect();

    let mut handles = Vec::new();
    for key in &keys {
        for i in 0..10 {
            let ledger = ledger.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                let event = movement(format!("{key}-in-{i}"), &key, Direction::Increase, 3);
                ledger.append(&event).await
            }));
        }
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let mut handles = Vec::new();
    for key in &keys {
        for i in 0..5 {
            let ledger = ledger.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                let event = movement(format!("{key}-out-{i}"), &key, Direction::Decrease, 2);
                ledger.append(&event).await
            }));
        }
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let balances: HashMap<String, Quantity> = ledger.balances(&keys).await.unwrap().into_iter().collect();
    for key in &keys {
        assert_eq!(balances[key], Quantity::from_units(20));

        let page = ledger
            .entries(&LedgerFilter::for_entity(key.clone()), Pagination::default())
            .await
            .unwrap();
        assert_eq!(page.total, 15);
        let sum: Quantity = page.items.iter().map(|e| e.delta).sum();
        assert_eq!(sum, balances[key]);

        assert!(ledger.verify_chain(key).await.unwrap().is_consistent());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn replay_across_connections_applies_once() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = file_ledger(&dir).await;
    let event = movement("E1".into(), "SKU-1", Direction::Increase, 5);

    let mut handles = Vec::new();
    for _ in 0..12 {
        let ledger = ledger.clone();
        let event = event.clone();
        handles.push(tokio::spawn(async move { ledger.append_detailed(&event).await }));
    }

    let mut fresh = 0;
    for handle in handles {
        if !handle.await.unwrap().unwrap().is_replay() {
            fresh += 1;
        }
    }

    assert_eq!(fresh, 1);
    assert_eq!(ledger.balance("SKU-1").await.unwrap(), Quantity::from_units(5));
    assert_eq!(ledger.database().entries().count().await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn append_cancelled_inside_transaction_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = file_ledger(&dir).await;
    ledger
        .append(&movement("receipt".into(), "SKU-1", Direction::Increase, 10))
        .await
        .unwrap();

    // Another writer owns the SQLite write lock, so the append stalls on its
    // first write (the balance claim) inside the open transaction.
    let mut blocker = ledger.database().pool().acquire().await.unwrap();
    sqlx::query("BEGIN IMMEDIATE").execute(&mut *blocker).await.unwrap();

    let sale = movement("sale-1".into(), "SKU-1", Direction::Decrease, 4);
    let abandoned = tokio::time::timeout(Duration::from_millis(200), ledger.append(&sale)).await;
    assert!(abandoned.is_err());

    sqlx::query("ROLLBACK").execute(&mut *blocker).await.unwrap();
    drop(blocker);

    assert!(ledger
        .database()
        .entries()
        .get_by_source_event("sale-1")
        .await
        .unwrap()
        .is_none());
    assert_eq!(ledger.balance("SKU-1").await.unwrap(), Quantity::from_units(10));

    let retried = ledger.append_detailed(&sale).await.unwrap();
    assert!(!retried.is_replay());
    assert_eq!(retried.entry().balance_after, Quantity::from_units(6));

    let again = ledger.append_detailed(&sale).await.unwrap();
    assert!(again.is_replay());
    assert_eq!(ledger.database().entries().count().await.unwrap(), 2);
    assert!(ledger.verify_chain("SKU-1").await.unwrap().is_consistent());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn balance_is_sum_of_accepted_deltas(
        moves in proptest::collection::vec((any::<bool>(), 1i64..20), 1..30),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let (expected, stored, consistent) = runtime.block_on(async {
            let db = Database::new(DbConfig::in_memory()).await.unwrap();
            let ledger = LedgerAppender::new(db);
            let mut expected = 0i64;

            for (i, (incoming, units)) in moves.iter().enumerate() {
                let direction = if *incoming { Direction::Increase } else { Direction::Decrease };
                let result = ledger
                    .append(&movement(format!("mv-{i}"), "SKU-P", direction, *units))
                    .await;

                match result {
                    Ok(_) if *incoming => expected += units,
                    Ok(_) => expected -= units,
                    Err(LedgerError::Consistency(_)) => assert!(!*incoming && *units > expected),
                    Err(other) => panic!("unexpected error: {other}"),
                }
            }

            let stored = ledger.balance("SKU-P").await.unwrap();
            let consistent = ledger.verify_chain("SKU-P").await.unwrap().is_consistent();
            (expected, stored, consistent)
        });

        prop_assert_eq!(stored, Quantity::from_units(expected));
        prop_assert!(consistent);
    }
}
