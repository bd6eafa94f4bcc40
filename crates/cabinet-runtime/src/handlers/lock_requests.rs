//! `lock/open` and `lock/status` requests and their replies.

use sc_01_lock_control::{LockControlApi, LockControlError};
use shared_bus::{BusFault, CabinetEvent, EventFilter, EventTopic, InMemoryEventBus, Subscription};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::record_received;
use crate::adapters::{publish, BusLockGateway};

/// Map a lock control error to the fault carried on `lock/response`.
pub fn fault_for(error: &LockControlError) -> BusFault {
    let code = match error {
        LockControlError::NoPortForProtocol { .. } | LockControlError::PortNotOpen { .. } => 503,
        LockControlError::Timeout { .. } => 504,
        LockControlError::InvalidRequest { .. } => 400,
        LockControlError::Transport { .. } => 502,
    };
    BusFault::new(code, error.to_string())
}

/// Executes lock commands against the hardware and publishes the result.
pub struct LockRequestHandler<A: LockControlApi> {
    bus: Arc<InMemoryEventBus>,
    locks: Arc<A>,
    requests: Subscription,
}

impl<A: LockControlApi + 'static> LockRequestHandler<A> {
    pub fn new(bus: Arc<InMemoryEventBus>, locks: Arc<A>) -> Self {
        let requests = bus.subscribe(EventFilter::topics(vec![
            EventTopic::LockOpen,
            EventTopic::LockStatus,
        ]));
        Self {
            bus,
            locks,
            requests,
        }
    }

    pub async fn run(mut self) {
        info!("Lock request handler started");

        while let Some(event) = self.requests.recv().await {
            record_received(&event);
            let CabinetEvent::LockCommandRequested {
                correlation_id,
                request,
            } = event
            else {
                continue;
            };

            // Commands to different ports run concurrently; the service
            // serializes each port itself.
            let bus = self.bus.clone();
            let locks = self.locks.clone();
            tokio::spawn(async move {
                let result = locks.execute(request).await.map_err(|e| {
                    warn!(%correlation_id, error = %e, "Lock command failed");
                    fault_for(&e)
                });
                publish(
                    &bus,
                    CabinetEvent::LockCommandCompleted {
                        correlation_id,
                        result,
                    },
                )
                .await;
            });
        }
    }
}

/// Completes orchestrator requests waiting in the lock gateway.
pub struct LockReplyHandler {
    gateway: Arc<BusLockGateway>,
    replies: Subscription,
}

impl LockReplyHandler {
    pub fn new(bus: &InMemoryEventBus, gateway: Arc<BusLockGateway>) -> Self {
        Self {
            gateway,
            replies: bus.subscribe(EventFilter::topics(vec![EventTopic::LockResponse])),
        }
    }

    pub async fn run(mut self) {
        info!("Lock reply handler started");

        while let Some(event) = self.replies.recv().await {
            record_received(&event);
            if let CabinetEvent::LockCommandCompleted {
                correlation_id,
                result,
            } = event
            {
                if !self.gateway.complete(correlation_id, result) {
                    debug!(%correlation_id, "Late or foreign lock reply ignored");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_codes() {
        let cases = [
            (
                LockControlError::NoPortForProtocol {
                    protocol: shared_types::lock::LockProtocol::Scu,
                },
                503,
            ),
            (
                LockControlError::Timeout {
                    operation: "lock close".into(),
                    timeout_ms: 3_600_000,
                },
                504,
            ),
            (
                LockControlError::InvalidRequest {
                    reason: "lock id 49 out of range".into(),
                },
                400,
            ),
            (
                LockControlError::Transport {
                    path: "/dev/ttyUSB0".into(),
                    reason: "broken pipe".into(),
                },
                502,
            ),
        ];

        for (error, code) in cases {
            let fault = fault_for(&error);
            assert_eq!(fault.code, code);
            assert_eq!(fault.message, error.to_string());
        }
    }
}
