// File: engine/tests/maintenance_tests.rs
//
// Maintenance engine behaviour against a scripted store

mod common;

use common::fixtures::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use update_keeper::maintenance::{MaintenanceOperationKind, MaintenancePlan};
use update_keeper::progress::{ProgressEvent, ProgressStage};
use update_keeper::MaintenanceEngine;

fn engine(store: &Arc<FakeStore>) -> MaintenanceEngine {
    MaintenanceEngine::new(store.clone(), fast_maintenance())
}

fn plan() -> MaintenancePlan {
    MaintenancePlan::from(&fast_maintenance())
}

#[tokio::test]
async fn test_optimize_below_threshold_touches_nothing() {
    let store = Arc::new(
        FakeStore::new()
            .with_index("ixA", 500, 2.0)
            .with_index("ixB", 80, 9.9),
    );

    let outcome = engine(&store).optimize_indexes(10.0, 30.0, None).await;

    assert_eq!(outcome.rebuilt, 0);
    assert_eq!(outcome.reorganized, 0);
    assert!(outcome.result.success);
    assert!(store.mutating_calls().is_empty());
}

#[tokio::test]
async fn test_optimize_processes_largest_first_and_skips_failures() {
    let store = Arc::new(
        FakeStore::new()
            .with_index("ixSmall", 10, 50.0)
            .with_index("ixLarge", 1_000, 15.0)
            .with_index("ixBroken", 400, 80.0)
            .with_index("ixBoundary", 200, 30.0)
            .failing_index("ixBroken"),
    );

    let outcome = engine(&store).optimize_indexes(10.0, 30.0, None).await;

    assert_eq!(
        store.mutating_calls(),
        vec![
            "reorganize:ixLarge",
            "rebuild:ixBroken",
            "reorganize:ixBoundary",
            "rebuild:ixSmall",
        ]
    );
    assert_eq!(outcome.rebuilt, 1);
    assert_eq!(outcome.reorganized, 2);
    assert_eq!(outcome.failed, 1);
    assert_eq!(outcome.result.affected, 3);
    assert!(!outcome.result.success);
}

#[tokio::test]
async fn test_superseded_cleanup_runs_in_batches_and_is_repeatable() {
    let store = Arc::new(FakeStore::new().with_superseded(25_000));
    let engine = engine(&store);

    let first = engine.remove_superseded_records(10_000, None).await;
    assert!(first.success);
    assert_eq!(first.affected, 25_000);
    assert_eq!(
        store.mutating_calls(),
        vec![
            "delete_superseded_batch:10000",
            "delete_superseded_batch:10000",
            "delete_superseded_batch:10000",
            "delete_superseded_batch:10000",
        ]
    );

    let second = engine.remove_superseded_records(10_000, None).await;
    assert!(second.success);
    assert_eq!(second.affected, 0);
}

#[tokio::test]
async fn test_superseded_cleanup_reports_running_totals() {
    let store = Arc::new(FakeStore::new().with_superseded(25));
    let events: Mutex<Vec<ProgressEvent>> = Mutex::new(Vec::new());
    let sink = |event: ProgressEvent| events.lock().unwrap().push(event);

    let result = engine(&store).remove_superseded_records(10, Some(&sink)).await;
    assert!(result.success);

    let totals: Vec<Option<u64>> = events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| e.stage == ProgressStage::SupersededCleanup)
        .map(|e| e.current)
        .collect();
    assert_eq!(totals, vec![Some(10), Some(20), Some(25), Some(25)]);
}

#[tokio::test]
async fn test_declined_failure_reports_zero_and_message() {
    let mut store = FakeStore::new().with_declined(12);
    store.declined_fails = true;
    let store = Arc::new(store);

    let result = engine(&store).remove_declined_records().await;

    assert!(!result.success);
    assert_eq!(result.affected, 0);
    assert!(result.message.unwrap().contains("no such table"));
}

#[tokio::test]
async fn test_declined_cleanup_counts_rows() {
    let store = Arc::new(FakeStore::new().with_declined(37));
    let engine = engine(&store);

    assert_eq!(engine.remove_declined_records().await.affected, 37);
    assert_eq!(engine.remove_declined_records().await.affected, 0);
}

#[tokio::test]
async fn test_concurrent_mutation_is_rejected_while_run_holds_database() {
    let mut store = FakeStore::new().with_superseded(30);
    store.batch_delay = Some(Duration::from_millis(50));
    let store = Arc::new(store);
    let engine = engine(&store);

    let plan = MaintenancePlan {
        batch_size: 10,
        ..plan()
    };

    let (report, rejected) = tokio::join!(engine.run_maintenance(&plan, None), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        engine.remove_declined_records().await
    });

    assert!(report.success, "{}", report.status_message());
    assert!(!rejected.success);
    assert!(rejected.message.unwrap().contains("busy"));

    // The claim is released once the run completes
    assert!(engine.remove_declined_records().await.success);
}

#[tokio::test]
async fn test_run_maintenance_continues_after_a_failed_step() {
    let mut store = FakeStore::new()
        .with_declined(5)
        .with_superseded(7)
        .with_index("ixA", 100, 45.0);
    store.declined_fails = true;
    let store = Arc::new(store);

    let report = engine(&store).run_maintenance(&plan(), None).await;

    assert!(!report.success);
    assert!(!report.cancelled);
    assert_eq!(report.steps.len(), 4);
    assert!(!report.step(MaintenanceOperationKind::RemoveDeclined).unwrap().success);
    assert_eq!(
        report
            .step(MaintenanceOperationKind::RemoveSuperseded)
            .unwrap()
            .affected,
        7
    );
    assert!(report.step(MaintenanceOperationKind::OptimizeIndexes).unwrap().success);
    assert!(report.step(MaintenanceOperationKind::UpdateStatistics).unwrap().success);
    assert!(report.step(MaintenanceOperationKind::Shrink).is_none());
}

#[tokio::test]
async fn test_run_maintenance_shrinks_last_when_planned() {
    let store = Arc::new(FakeStore::new().with_superseded(3));
    let plan = MaintenancePlan {
        shrink: true,
        shrink_target_free_percent: 15,
        ..plan()
    };

    let events: Mutex<Vec<ProgressEvent>> = Mutex::new(Vec::new());
    let sink = |event: ProgressEvent| events.lock().unwrap().push(event);
    let report = engine(&store).run_maintenance(&plan, Some(&sink)).await;

    assert!(report.success);
    assert_eq!(store.mutating_calls().last().unwrap(), "shrink:15");
    assert!(report.space_before.is_some());
    assert_eq!(
        events.lock().unwrap().last().unwrap().stage,
        ProgressStage::Finished
    );
}

#[tokio::test]
async fn test_cancelled_run_stops_between_batches() {
    let mut store = FakeStore::new().with_superseded(1_000);
    store.batch_delay = Some(Duration::from_millis(20));
    let store = Arc::new(store);
    let cancel = CancellationToken::new();
    let engine = MaintenanceEngine::new(store.clone(), fast_maintenance())
        .with_cancellation(cancel.clone());

    let plan = MaintenancePlan {
        batch_size: 10,
        ..plan()
    };

    let (report, _) = tokio::join!(engine.run_maintenance(&plan, None), async {
        tokio::time::sleep(Duration::from_millis(70)).await;
        cancel.cancel();
    });

    assert!(report.cancelled);
    assert!(!report.success);

    let superseded = report
        .step(MaintenanceOperationKind::RemoveSuperseded)
        .unwrap();
    assert!(!superseded.success);
    assert!(superseded.affected > 0 && superseded.affected < 1_000);
    assert_eq!(superseded.affected % 10, 0);
    assert!(report.step(MaintenanceOperationKind::OptimizeIndexes).is_none());
}

#[tokio::test]
async fn test_space_queries_are_none_when_database_is_unreachable() {
    let mut store = FakeStore::new();
    store.probe_fails = true;
    let store = Arc::new(store);
    let engine = engine(&store);

    assert!(engine.probe().await.is_err());
    assert!(engine.space_usage().await.is_none());
    assert!(engine.size_gb().await.is_none());
}

#[tokio::test]
async fn test_size_gb_reports_allocated_space() {
    let store = Arc::new(FakeStore::new().with_size_gb(2.5));
    let size = engine(&store).size_gb().await.unwrap();
    assert!((size - 2.5).abs() < 0.01);
}
