//! Integration coverage for the atomic numeric update engine.

mod support;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use cipherstore_domain::{FieldUpdate, NumericOutcome};
use cipherstore_infra::database::NumericFieldUpdater;
use support::TestDatabase;

fn gold(db: &TestDatabase) -> i64 {
    db.query_i64("SELECT gold FROM players WHERE id = 1")
}

/// Validates the 100-gold scenario end to end.
///
/// Assertions:
/// - Confirms an oversized decrement is rejected with the current value and
///   leaves the row untouched.
/// - Confirms valid decrements and increments return the new value.
/// - Confirms a missing record reports `NotFound` and a missing column
///   reports `Failed`.
#[test]
fn gold_scenario() {
    let db = TestDatabase::with_players();
    let updater = NumericFieldUpdater::new(Arc::clone(&db.manager));

    assert_eq!(
        updater.safe_decrement("players", "1", "gold", 150),
        NumericOutcome::Insufficient { current: 100, requested: 150 }
    );
    assert_eq!(gold(&db), 100);

    assert_eq!(updater.safe_decrement("players", "1", "gold", 50), NumericOutcome::updated(50));
    assert_eq!(updater.safe_increment("players", "1", "gold", 30), NumericOutcome::updated(80));
    assert_eq!(gold(&db), 80);

    assert_eq!(updater.safe_increment("players", "999", "gold", 1), NumericOutcome::NotFound);
    assert!(matches!(
        updater.safe_increment("players", "1", "nope", 1),
        NumericOutcome::Failed { .. }
    ));
    assert_eq!(updater.safe_decrement("players", "1", "gold", 80), NumericOutcome::updated(0));
}

/// Validates increment followed by decrement of the same amount restores
/// the original value.
#[test]
fn increment_and_decrement_are_inverse() {
    let db = TestDatabase::with_players();
    let updater = NumericFieldUpdater::new(Arc::clone(&db.manager));

    for amount in [1, 7, 100, 12_345] {
        assert!(updater.safe_increment("players", "1", "gold", amount).is_updated());
        assert_eq!(updater.safe_decrement("players", "1", "gold", amount), NumericOutcome::updated(100));
    }
}

/// Validates K threads doing N increments each lose no update.
#[test]
fn concurrent_increments_are_not_lost() {
    const THREADS: i64 = 8;
    const PER_THREAD: i64 = 25;

    let db = TestDatabase::with_players();
    let updater = NumericFieldUpdater::new(Arc::clone(&db.manager));

    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let updater = updater.clone();
            thread::spawn(move || {
                (0..PER_THREAD)
                    .filter(|_| updater.safe_increment("players", "1", "gold", 1).is_updated())
                    .count()
            })
        })
        .collect();

    let applied: usize = workers.into_iter().map(|worker| worker.join().expect("worker")).sum();

    assert_eq!(applied as i64, THREADS * PER_THREAD);
    assert_eq!(gold(&db), 100 + THREADS * PER_THREAD);
}

/// Validates multi-field updates are all-or-nothing.
#[test]
fn multiple_fields_all_or_nothing() {
    let db = TestDatabase::with_players();
    let updater = NumericFieldUpdater::new(Arc::clone(&db.manager));
    let args = ["1".to_string()];

    let rejected = BTreeMap::from([("gold".to_string(), -150), ("level".to_string(), 1)]);
    assert!(!updater.update_multiple_fields("players", "id = ?", &args, &rejected));
    assert_eq!(gold(&db), 100);
    assert_eq!(db.query_i64("SELECT level FROM players WHERE id = 1"), 1);

    let accepted = BTreeMap::from([("gold".to_string(), -50), ("level".to_string(), 1)]);
    assert!(updater.update_multiple_fields("players", "id = ?", &args, &accepted));
    assert_eq!(gold(&db), 50);
    assert_eq!(db.query_i64("SELECT level FROM players WHERE id = 1"), 2);
}

/// Validates a batch with one underflow rolls back every update.
#[test]
fn batch_update_rolls_back_on_underflow() {
    let db = TestDatabase::with_players();
    db.execute_batch("INSERT INTO players (id, name, gold) VALUES (2, 'bob', 10)");
    let updater = NumericFieldUpdater::new(Arc::clone(&db.manager));

    let batch = [
        FieldUpdate::new("players", "id = ?", vec!["1".into()], "gold", 25),
        FieldUpdate::new("players", "id = ?", vec!["2".into()], "gold", -20),
    ];
    assert!(!updater.batch_update(&batch));
    assert_eq!(gold(&db), 100);
    assert_eq!(db.query_i64("SELECT gold FROM players WHERE id = 2"), 10);

    let batch = [
        FieldUpdate::new("players", "id = ?", vec!["1".into()], "gold", 25),
        FieldUpdate::new("players", "id = ?", vec!["2".into()], "gold", -10),
    ];
    assert!(updater.batch_update(&batch));
    assert_eq!(gold(&db), 125);
    assert_eq!(db.query_i64("SELECT gold FROM players WHERE id = 2"), 0);
}

/// Validates predicates other than `id` and the lock map bookkeeping.
#[test]
fn custom_predicates_use_their_own_locks() {
    let db = TestDatabase::with_players();
    let updater = NumericFieldUpdater::new(Arc::clone(&db.manager));

    let outcome = updater.safe_update("players", "name = ?", &["alice".into()], "gold", -40);
    assert_eq!(outcome, NumericOutcome::updated(60));
    updater.safe_increment("players", "1", "gold", 1);

    assert_eq!(updater.locks().len(), 2);
}

/// Validates engine errors are reported apart from a missing row.
///
/// Assertions:
/// - Confirms a missing table yields `Failed` with the engine's reason.
/// - Confirms overflow and an out-of-range decrement yield `Failed`.
/// - Confirms the sentinel form still reads `-1` for both.
#[test]
fn engine_errors_report_failed() {
    let db = TestDatabase::with_players();
    let updater = NumericFieldUpdater::new(Arc::clone(&db.manager));

    let outcome = updater.safe_increment("no_such_table", "1", "gold", 1);
    match &outcome {
        NumericOutcome::Failed { reason } => assert!(reason.contains("no_such_table"), "{reason}"),
        other => panic!("expected Failed, got {other:?}"),
    }
    assert_eq!(outcome.as_sentinel(), NumericOutcome::NOT_FOUND_SENTINEL);

    assert!(matches!(
        updater.safe_increment("players", "1", "gold", i64::MAX),
        NumericOutcome::Failed { .. }
    ));
    assert!(matches!(
        updater.safe_decrement("players", "1", "gold", i64::MIN),
        NumericOutcome::Failed { .. }
    ));
    assert_eq!(gold(&db), 100);
}

/// Validates a predicate matching two rows changes neither of them.
///
/// Assertions:
/// - Confirms `safe_update` does not report `Updated`.
/// - Confirms `update_multiple_fields` and `batch_update` return false.
/// - Confirms both rows keep their original gold.
#[test]
fn multi_row_predicate_writes_nothing() {
    let db = TestDatabase::with_players();
    db.execute_batch("INSERT INTO players (id, name, gold) VALUES (2, 'bob', 10)");
    let updater = NumericFieldUpdater::new(Arc::clone(&db.manager));
    let args = ["0".to_string()];

    let outcome = updater.safe_update("players", "gold >= ?", &args, "gold", 5);
    assert!(matches!(outcome, NumericOutcome::Failed { .. }), "{outcome:?}");

    let deltas = BTreeMap::from([("gold".to_string(), 5), ("level".to_string(), 1)]);
    assert!(!updater.update_multiple_fields("players", "gold >= ?", &args, &deltas));

    let batch = [FieldUpdate::new("players", "gold >= ?", vec!["0".into()], "gold", 5)];
    assert!(!updater.batch_update(&batch));

    assert_eq!(gold(&db), 100);
    assert_eq!(db.query_i64("SELECT gold FROM players WHERE id = 2"), 10);
    assert_eq!(db.query_i64("SELECT SUM(level) FROM players"), 2);
}
