//! # Issue Flow
//!
//! ```text
//! start ──lock/open──► CU board opens 12 ──► tracking ──► weight drops 100 g
//!       ──► lock closed ──► commit ──► bin/close ──► validation ──► COMPLETED
//! ```

use std::time::Duration;

use sc_03_transactions::{FailureKind, LedgerRepository, TransactionApi, TransactionStatus};
use shared_bus::{CabinetEvent, EventFilter, EventTopic};
use shared_types::entities::Bin;
use shared_types::lock::{LockProtocol, LockState};

use super::fixtures::{config, SimulatedCabinet, LOCK_ID, STOCK, TARE, UNIT_WEIGHT};

#[tokio::test(start_paused = true)]
async fn test_issue_two_items_end_to_end() {
    let cabinet = SimulatedCabinet::start(config(false)).await;
    let c = cabinet.container();
    let mut finished = c.bus.subscribe(EventFilter::topics(vec![EventTopic::Transaction]));

    let tx = c.transactions.start(cabinet.issue(2)).await.unwrap();
    assert_eq!(tx.status, TransactionStatus::Processing);
    assert_eq!(cabinet.board.state(LOCK_ID), LockState::Open);
    assert!(!c.store.bin(cabinet.bin_id).unwrap().is_locked);

    cabinet.weigh(TARE - 2.0 * UNIT_WEIGHT).await;
    assert_eq!(cabinet.cell().await.reading.pending_change, -2);

    cabinet.board.close(LOCK_ID);
    let done = cabinet.wait_for(tx.id, TransactionStatus::Completed).await;
    assert!(done.last_error.is_none());

    let cell = cabinet.cell().await;
    assert_eq!(cell.calibration.available_quantity, STOCK - 2);
    assert_eq!(cell.reading.pending_change, 0);
    assert!(c.store.bin(cabinet.bin_id).unwrap().is_locked);

    let events = c.audit.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].quantity_changed, -2);
    assert_eq!(events[0].quantity_before, STOCK);

    let entry = c
        .ledger
        .get(cabinet.user_id, cabinet.item_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.quantity, 2);

    let mut completed = None;
    while let Ok(Some(event)) = finished.try_recv() {
        if let CabinetEvent::TransactionFinished { status, .. } = event {
            completed = Some(status);
        }
    }
    assert_eq!(completed.as_deref(), Some("COMPLETED"));
    assert!(!c.transactions.is_polling(tx.id));
}

#[tokio::test(start_paused = true)]
async fn test_wrong_quantity_waits_for_correction() {
    let cabinet = SimulatedCabinet::start(config(false)).await;
    let c = cabinet.container();

    let tx = c.transactions.start(cabinet.issue(2)).await.unwrap();
    cabinet.weigh(TARE - 3.0 * UNIT_WEIGHT).await;
    cabinet.board.close(LOCK_ID);

    let paused = cabinet
        .wait_for(tx.id, TransactionStatus::AwaitingCorrection)
        .await;
    let failure = paused.last_error.unwrap();
    assert_eq!(failure.kind, FailureKind::Validation);
    assert!(!failure.messages.is_empty());

    // The physical take is committed even though the step failed.
    assert_eq!(cabinet.cell().await.calibration.available_quantity, STOCK - 3);

    let cancelled = c.transactions.cancel(tx.id).await.unwrap();
    assert_eq!(cancelled.status, TransactionStatus::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_compartment_left_open_times_out() {
    let mut cfg = config(false);
    cfg.lock.tracking_ceiling_secs = 5;
    let cabinet = SimulatedCabinet::start(cfg).await;
    let c = cabinet.container();

    let tx = c.transactions.start(cabinet.issue(1)).await.unwrap();
    tokio::time::sleep(Duration::from_secs(6)).await;

    let paused = cabinet
        .wait_for(tx.id, TransactionStatus::AwaitingCorrection)
        .await;
    assert_eq!(paused.last_error.unwrap().kind, FailureKind::LockTimeout);
    assert_eq!(cabinet.board.state(LOCK_ID), LockState::Open);

    cabinet.runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_missing_lock_board_exhausts_attempts() {
    let cabinet = SimulatedCabinet::start(config(false)).await;
    let c = cabinet.container();

    // No SCU board is attached, so every open comes back as a 503 fault.
    let bin = Bin::new("B1", LockProtocol::Scu, 3, 1);
    let bin_id = bin.id;
    c.store.insert(bin);
    let mut request = cabinet.issue(1);
    request.steps[0].bin_id = bin_id;

    let tx = c.transactions.start(request).await.unwrap();
    assert_eq!(tx.status, TransactionStatus::AwaitingCorrection);
    let failure = tx.last_error.unwrap();
    assert_eq!(failure.kind, FailureKind::OpenFailed);
    assert_eq!(tx.steps[0].open_failures, 3);
    assert!(c.store.bin(bin_id).unwrap().is_failed);
    assert_eq!(c.lock_gateway.pending_count(), 0);
}
