mod common;

use common::*;
use scoring_core::{
    clock::TimerInfo,
    job::RunOutcome,
    sink::EventSink,
    store::ScoringStore,
};

fn now() -> TimerInfo {
    TimerInfo::immediate(chrono::Utc::now())
}

// ── Tests ────────────────────────────────────────────────────────────────────

/// An empty fetch writes nothing: no updates, no run log, no publish.
#[test]
fn nothing_pending_makes_no_writes() {
    let (db, conn) = shared_db("recon_nothing");
    seed_fraud(&conn, &[("T1", 0.1, "credit")]);
    conn.execute_batch("UPDATE FraudTable SET Processed = 1;").unwrap();

    let sink = RecordingSink::default();
    let outcome = fraud_job().run(&db, Some(&sink as &dyn EventSink), &now());

    assert_eq!(outcome, RunOutcome::NothingPending);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM scoring_run"), 0);
    assert_eq!(count(&conn, "SELECT Meta_Prediction FROM FraudTable"), 0);
    assert!(sink.batches.lock().unwrap().is_empty());
}

/// A failure on the second update rolls back the first: every row stays
/// pending, no run is logged and nothing reaches the stream.
#[test]
fn failed_update_rolls_back_whole_batch() {
    let (db, conn) = shared_db("recon_rollback");
    seed_fraud(&conn, &[("T1", 0.1, "credit"), ("T2", 0.2, "debit"), ("T3", 0.4, "credit")]);
    conn.execute_batch(
        "CREATE TRIGGER reject_t2 BEFORE UPDATE ON FraudTable
         WHEN NEW.TransactionID = 'T2'
         BEGIN SELECT RAISE(ABORT, 'row locked'); END;",
    )
    .unwrap();

    let sink = RecordingSink::default();
    let outcome = fraud_job().run(&db, Some(&sink as &dyn EventSink), &now());

    assert!(matches!(outcome, RunOutcome::Failed(ref e) if e.contains("row locked")), "{outcome:?}");
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM FraudTable WHERE Processed = 0"), 3);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM FraudTable WHERE Meta_Prediction = 1"), 0);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM scoring_run"), 0);
    assert!(sink.published().is_empty());

    // Once the obstacle is gone the same rows are picked up again.
    conn.execute_batch("DROP TRIGGER reject_t2;").unwrap();
    let retry = fraud_job().run(&db, Some(&sink as &dyn EventSink), &now());
    assert!(matches!(retry, RunOutcome::Scored(ref s) if s.rows_updated == 3), "{retry:?}");
    assert_eq!(sink.published().len(), 3);
}

/// A stream outage is logged; the committed predictions stay committed.
#[test]
fn sink_failure_does_not_undo_commit() {
    let (db, conn) = shared_db("recon_sink_down");
    seed_fraud(&conn, &[("T1", 0.1, "credit"), ("T2", 0.5, "debit")]);

    let outcome = fraud_job().run(&db, Some(&FailingSink as &dyn EventSink), &now());

    let RunOutcome::Scored(summary) = outcome else {
        panic!("expected a scored run, got {outcome:?}");
    };
    assert_eq!(summary.rows_updated, 2);
    assert_eq!(summary.published, 0);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM FraudTable WHERE Processed = 1"), 2);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM scoring_run"), 1);
}

/// Processed rows are never scored twice.
#[test]
fn second_run_finds_nothing() {
    let (db, conn) = shared_db("recon_idempotent");
    seed_fraud(&conn, &[("T1", 0.1, "credit")]);

    let sink = RecordingSink::default();
    let job = fraud_job();
    assert!(matches!(job.run(&db, Some(&sink as &dyn EventSink), &now()), RunOutcome::Scored(_)));
    assert_eq!(job.run(&db, Some(&sink as &dyn EventSink), &now()), RunOutcome::NothingPending);
    assert_eq!(sink.published().len(), 1);
}

/// Each committed run leaves one row in the run log with its counts.
#[test]
fn committed_run_is_logged() {
    let (db, conn) = shared_db("recon_run_log");
    seed_fraud(&conn, &[("T1", 0.1, "credit"), ("T2", 0.2, "debit"), ("T3", 0.9, "credit")]);

    let RunOutcome::Scored(summary) = fraud_job().run(&db, None, &now()) else {
        panic!("expected a scored run");
    };

    let store = ScoringStore::open(&db.connection_string).unwrap();
    assert_eq!(store.run_count("fraud").unwrap(), 1);
    let runs = store.recent_runs("fraud", 10).unwrap();
    assert_eq!(runs[0].run_id, summary.run_id);
    assert_eq!(runs[0].source_table, "FraudTable");
    assert_eq!(runs[0].rows_scored, 3);
    assert_eq!(runs[0].positives, 2);
    assert_eq!(runs[0].threshold, 0.3);
    assert!(!runs[0].past_due);
    assert!(runs[0].run_id.starts_with("fraud-"));
}

/// A source table that is missing entirely is a failed run, not a panic.
#[test]
fn missing_table_fails_the_run() {
    let (db, _conn) = shared_db("recon_no_table");
    let outcome = fraud_job().run(&db, None, &now());
    assert!(matches!(outcome, RunOutcome::Failed(_)), "{outcome:?}");
}

/// Two source rows share a key. Both are written, counted once each, and the
/// key is reported as ambiguous.
#[test]
fn duplicate_keys_are_reported() {
    let (db, conn) = shared_db("recon_duplicate_key");
    seed_fraud(&conn, &[("T1", 0.1, "credit"), ("T1", 0.9, "debit"), ("T2", 0.5, "credit")]);

    let outcome = fraud_job().run(&db, None, &now());

    let RunOutcome::Scored(summary) = outcome else {
        panic!("expected a scored run, got {outcome:?}");
    };
    assert_eq!(summary.rows_scored, 3);
    assert_eq!(summary.rows_updated, 3);
    assert_eq!(summary.ambiguous_keys, 1);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM FraudTable WHERE Processed = 1"), 3);
    // The last record for T1 wins on both rows.
    assert_eq!(
        count(&conn, "SELECT COUNT(*) FROM FraudTable WHERE TransactionID = 'T1' AND Meta_Prediction = 0"),
        2
    );
}
