//! # Bus Lock Gateway
//!
//! Lock commands from the orchestrator travel as `lock/open` requests with a
//! correlation id; the reply handler completes the matching waiter.

use async_trait::async_trait;
use sc_03_transactions::{LockGateway, TransactionError, TransactionResult};
use shared_bus::{BusError, BusFault, CabinetEvent, InMemoryEventBus, PendingRequestStore};
use shared_types::ipc::LockTrackingRequest;
use shared_types::lock::{LockCommand, LockCommandRequest, LockStatusResult, LockTarget};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use super::bus::publish;

/// Payload of a `lock/response`.
pub type LockReply = Result<LockStatusResult, BusFault>;

pub struct BusLockGateway {
    bus: Arc<InMemoryEventBus>,
    pending: PendingRequestStore<LockReply>,
}

impl BusLockGateway {
    pub fn new(bus: Arc<InMemoryEventBus>, timeout: Duration) -> Self {
        Self {
            bus,
            pending: PendingRequestStore::new(timeout),
        }
    }

    /// Deliver a `lock/response`. False when nobody waits for it.
    pub fn complete(&self, correlation_id: Uuid, reply: LockReply) -> bool {
        self.pending.complete(correlation_id, reply)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.pending_count()
    }

    /// Send a lock command and wait for the reply.
    pub async fn request(&self, request: LockCommandRequest) -> Result<LockStatusResult, BusError> {
        let method = match request.command {
            LockCommand::OpenLock => "lock/open",
            LockCommand::GetStatus => "lock/status",
        };
        let (correlation_id, receiver) = self.pending.register(method, None);
        let event = CabinetEvent::LockCommandRequested {
            correlation_id,
            request,
        };

        if publish(&self.bus, event).await == 0 {
            self.pending.cancel(&correlation_id);
            return Err(BusError::NoReceivers {
                topic: method.to_string(),
            });
        }

        self.pending
            .wait(correlation_id, receiver)
            .await?
            .map_err(BusError::Fault)
    }
}

#[async_trait]
impl LockGateway for BusLockGateway {
    async fn open(&self, target: &LockTarget) -> TransactionResult<LockStatusResult> {
        self.request(LockCommandRequest::open(target))
            .await
            .map_err(|e| {
                warn!(lock = %target, error = %e, "Lock request failed");
                TransactionError::Lock(e.to_string())
            })
    }

    async fn track_close(&self, request: LockTrackingRequest) {
        publish(&self.bus, CabinetEvent::LockTrackingRequested(request)).await;
    }
}
