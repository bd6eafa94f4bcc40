//! Lock commands over the bus: `lock/open` → handler → `lock/response`.

use std::time::Duration;

use shared_bus::{BusError, CabinetEvent, EventFilter, EventPublisher, EventTopic};
use shared_types::ipc::LockTrackingRequest;
use shared_types::lock::{LockCommandRequest, LockProtocol, LockState, LockTarget};
use tokio::time::timeout;

use super::fixtures::{config, SimulatedCabinet, LOCK_ID};

fn target() -> LockTarget {
    LockTarget {
        protocol: LockProtocol::Cu,
        device_id: 0,
        lock_id: LOCK_ID,
    }
}

#[tokio::test(start_paused = true)]
async fn test_open_and_status_round_trip() {
    let cabinet = SimulatedCabinet::start(config(false)).await;
    let gateway = cabinet.container().lock_gateway.clone();

    let opened = gateway
        .request(LockCommandRequest::open(&target()))
        .await
        .unwrap();
    assert!(opened.is_success);
    assert_eq!(opened.status_of(LOCK_ID), LockState::Open);
    assert_eq!(cabinet.board.state(LOCK_ID), LockState::Open);

    cabinet.board.close(LOCK_ID);
    let status = gateway
        .request(LockCommandRequest::status(&target()))
        .await
        .unwrap();
    assert_eq!(status.status_of(LOCK_ID), LockState::Closed);
    assert_eq!(gateway.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_missing_protocol_port_is_a_fault_reply() {
    let cabinet = SimulatedCabinet::start(config(false)).await;
    let gateway = cabinet.container().lock_gateway.clone();

    let scu = LockTarget {
        protocol: LockProtocol::Scu,
        device_id: 1,
        lock_id: 1,
    };
    let err = gateway
        .request(LockCommandRequest::open(&scu))
        .await
        .unwrap_err();
    match err {
        BusError::Fault(fault) => assert_eq!(fault.code, 503),
        other => panic!("expected fault reply, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_tracking_reports_until_closed() {
    let cabinet = SimulatedCabinet::start(config(false)).await;
    let c = cabinet.container();
    let mut updates = c
        .bus
        .subscribe(EventFilter::topics(vec![EventTopic::LockTrackingStatus]));

    c.lock_gateway
        .request(LockCommandRequest::open(&target()))
        .await
        .unwrap();
    c.bus
        .publish(CabinetEvent::LockTrackingRequested(LockTrackingRequest {
            key: "manual".into(),
            bin_id: None,
            request: LockCommandRequest::status(&target()),
        }))
        .await;

    let first = timeout(Duration::from_secs(5), updates.recv())
        .await
        .unwrap()
        .unwrap();
    let CabinetEvent::LockTrackingUpdated(first) = first else {
        panic!("unexpected event");
    };
    assert!(!first.all_closed);
    assert_eq!(first.result.status_of(LOCK_ID), LockState::Open);

    cabinet.board.close(LOCK_ID);
    let last = timeout(Duration::from_secs(5), updates.recv())
        .await
        .unwrap()
        .unwrap();
    let CabinetEvent::LockTrackingUpdated(last) = last else {
        panic!("unexpected event");
    };
    assert!(last.all_closed);
    assert_eq!(last.key, "manual");

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!c.tracker.is_tracking("manual"));
}
