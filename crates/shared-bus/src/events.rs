//! # Cabinet Events
//!
//! Defines all event types that flow through the shared bus together with
//! their topic paths (`lock/open`, `loadcell/weight-calculated`, ...).

use serde::{Deserialize, Serialize};
use shared_types::ipc::{
    LockTrackingRequest, LockTrackingStatus, NoticeLevel, QuantityCalculated, SensorWatch,
    StepId, TransactionId, TransactionNotice, TransactionType, WeightSample,
};
use shared_types::entities::BinId;
use shared_types::lock::{LockCommand, LockCommandRequest, LockStatusResult};
use uuid::Uuid;

/// Subsystem identifiers used as event sources.
pub mod source {
    /// Hardware bridges and the runtime itself.
    pub const RUNTIME: u8 = 0;
    /// Lock control (codec, execution, tracking).
    pub const LOCK_CONTROL: u8 = 1;
    /// Loadcell quantity engine.
    pub const LOADCELL: u8 = 2;
    /// Transaction orchestrator.
    pub const TRANSACTIONS: u8 = 3;
}

/// All events that can be published to the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum CabinetEvent {
    // =========================================================================
    // LOCK CONTROL (request/response)
    // =========================================================================
    /// Point-to-point lock command. Topic depends on the command:
    /// `lock/open` or `lock/status`.
    LockCommandRequested {
        correlation_id: Uuid,
        request: LockCommandRequest,
    },

    /// Reply to `LockCommandRequested` with the same correlation id.
    LockCommandCompleted {
        correlation_id: Uuid,
        result: Result<LockStatusResult, BusFault>,
    },

    /// Start watching a lock until it closes.
    LockTrackingRequested(LockTrackingRequest),

    /// Lock tracking progress.
    LockTrackingUpdated(LockTrackingStatus),

    // =========================================================================
    // COMPARTMENT SIGNALS
    // =========================================================================
    /// Compartment opened for a step; starts validation polling.
    BinOpened {
        bin_id: BinId,
        transaction_id: Option<TransactionId>,
        step_id: Option<StepId>,
    },

    /// Compartment re-secured (hardware-reported).
    BinClosed { bin_id: BinId },

    /// Compartment sensors are about to be watched.
    DeviceActivated { bin_id: BinId },

    // =========================================================================
    // LOADCELLS
    // =========================================================================
    StartReading(SensorWatch),

    StopReading(SensorWatch),

    /// Raw weight sample from loadcell hardware.
    WeightCalculated(WeightSample),

    /// Quantity delta derived by the quantity engine.
    QuantityCalculated(QuantityCalculated),

    // =========================================================================
    // TRANSACTIONS
    // =========================================================================
    /// Per-step success/warning/error notice.
    TransactionNotified {
        kind: TransactionType,
        level: NoticeLevel,
        notice: TransactionNotice,
    },

    /// Transaction reached a terminal state.
    TransactionFinished {
        transaction_id: TransactionId,
        kind: TransactionType,
        status: String,
        reason: Option<String>,
    },
}

/// Error payload carried by bus responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusFault {
    pub code: u16,
    pub message: String,
}

impl BusFault {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl CabinetEvent {
    /// Get the topic for this event (for filtering).
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::LockCommandRequested { request, .. } => match request.command {
                LockCommand::OpenLock => EventTopic::LockOpen,
                LockCommand::GetStatus => EventTopic::LockStatus,
            },
            Self::LockCommandCompleted { .. } => EventTopic::LockResponse,
            Self::LockTrackingRequested(_) => EventTopic::LockTracking,
            Self::LockTrackingUpdated(_) => EventTopic::LockTrackingStatus,
            Self::BinOpened { .. } => EventTopic::BinOpen,
            Self::BinClosed { .. } => EventTopic::BinClose,
            Self::DeviceActivated { .. } => EventTopic::DeviceActive,
            Self::StartReading(_) => EventTopic::LoadcellStartReading,
            Self::StopReading(_) => EventTopic::LoadcellStopReading,
            Self::WeightCalculated(_) => EventTopic::LoadcellWeight,
            Self::QuantityCalculated(_) => EventTopic::LoadcellQuantity,
            Self::TransactionNotified { .. } | Self::TransactionFinished { .. } => {
                EventTopic::Transaction
            }
        }
    }

    /// Full topic path as seen on the wire.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::TransactionNotified { kind, level, .. } => {
                format!("transaction/{}/{}", kind.as_str(), level.as_str())
            }
            Self::TransactionFinished { .. } => "transaction/completed".to_string(),
            other => other.topic().as_str().to_string(),
        }
    }

    /// Get the originating subsystem ID.
    #[must_use]
    pub fn source_subsystem(&self) -> u8 {
        match self {
            Self::LockCommandCompleted { .. } | Self::LockTrackingUpdated(_) => {
                source::LOCK_CONTROL
            }
            Self::QuantityCalculated(_) => source::LOADCELL,
            Self::LockCommandRequested { .. }
            | Self::LockTrackingRequested(_)
            | Self::BinOpened { .. }
            | Self::DeviceActivated { .. }
            | Self::StartReading(_)
            | Self::StopReading(_)
            | Self::TransactionNotified { .. }
            | Self::TransactionFinished { .. } => source::TRANSACTIONS,
            Self::BinClosed { .. } | Self::WeightCalculated(_) => source::RUNTIME,
        }
    }

    /// Correlation id for request/response events.
    #[must_use]
    pub fn correlation_id(&self) -> Option<Uuid> {
        match self {
            Self::LockCommandRequested { correlation_id, .. }
            | Self::LockCommandCompleted { correlation_id, .. } => Some(*correlation_id),
            _ => None,
        }
    }
}

/// Event topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    LockOpen,
    LockStatus,
    LockResponse,
    LockTracking,
    LockTrackingStatus,
    BinOpen,
    BinClose,
    DeviceActive,
    LoadcellStartReading,
    LoadcellStopReading,
    LoadcellWeight,
    LoadcellQuantity,
    /// Every `transaction/...` path.
    Transaction,
    /// All events (no filtering).
    All,
}

impl EventTopic {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LockOpen => "lock/open",
            Self::LockStatus => "lock/status",
            Self::LockResponse => "lock/response",
            Self::LockTracking => "lock/tracking",
            Self::LockTrackingStatus => "lock/tracking-status",
            Self::BinOpen => "bin/open",
            Self::BinClose => "bin/close",
            Self::DeviceActive => "device/active",
            Self::LoadcellStartReading => "loadcell/start-reading",
            Self::LoadcellStopReading => "loadcell/stop-reading",
            Self::LoadcellWeight => "loadcell/weight-calculated",
            Self::LoadcellQuantity => "loadcell/quantity-calculated",
            Self::Transaction => "transaction",
            Self::All => "#",
        }
    }
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
    /// Source subsystems to include. Empty means all sources.
    pub source_subsystems: Vec<u8>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self {
            topics,
            source_subsystems: Vec::new(),
        }
    }

    /// Create a filter for events from specific subsystems.
    #[must_use]
    pub fn from_subsystems(subsystems: Vec<u8>) -> Self {
        Self {
            topics: Vec::new(),
            source_subsystems: subsystems,
        }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &CabinetEvent) -> bool {
        let topic_match = self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic());

        let source_match = self.source_subsystems.is_empty()
            || self.source_subsystems.contains(&event.source_subsystem());

        topic_match && source_match
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::lock::{LockProtocol, LockTarget};

    fn target() -> LockTarget {
        LockTarget {
            protocol: LockProtocol::Cu,
            device_id: 1,
            lock_id: 4,
        }
    }

    #[test]
    fn test_lock_request_topic_follows_command() {
        let open = CabinetEvent::LockCommandRequested {
            correlation_id: Uuid::new_v4(),
            request: LockCommandRequest::open(&target()),
        };
        assert_eq!(open.topic(), EventTopic::LockOpen);
        assert_eq!(open.path(), "lock/open");

        let status = CabinetEvent::LockCommandRequested {
            correlation_id: Uuid::new_v4(),
            request: LockCommandRequest::status(&target()),
        };
        assert_eq!(status.path(), "lock/status");
    }

    #[test]
    fn test_transaction_notice_path() {
        let event = CabinetEvent::TransactionNotified {
            kind: TransactionType::Issue,
            level: NoticeLevel::Warning,
            notice: TransactionNotice {
                transaction_id: Uuid::new_v4(),
                step_id: None,
                errors: vec![],
            },
        };
        assert_eq!(event.path(), "transaction/issue/warning");
        assert_eq!(event.topic(), EventTopic::Transaction);
    }

    #[test]
    fn test_filter_by_topic() {
        let filter = EventFilter::topics(vec![EventTopic::BinClose]);
        assert!(filter.matches(&CabinetEvent::BinClosed {
            bin_id: Uuid::new_v4()
        }));
        assert!(!filter.matches(&CabinetEvent::DeviceActivated {
            bin_id: Uuid::new_v4()
        }));
    }

    #[test]
    fn test_filter_by_subsystem() {
        let filter = EventFilter::from_subsystems(vec![source::LOCK_CONTROL]);
        let reply = CabinetEvent::LockCommandCompleted {
            correlation_id: Uuid::new_v4(),
            result: Err(BusFault::new(503, "no port")),
        };
        assert!(filter.matches(&reply));
        assert!(!filter.matches(&CabinetEvent::BinClosed {
            bin_id: Uuid::new_v4()
        }));
    }

    #[test]
    fn test_event_json_is_tagged() {
        let event = CabinetEvent::BinClosed {
            bin_id: Uuid::nil(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "BinClosed");
        assert!(json["payload"]["bin_id"].is_string());
    }
}
