//! # Shared Bus - Event Bus for Inter-Subsystem Communication
//!
//! Subsystems never call each other directly; they publish [`CabinetEvent`]s
//! and subscribe with an [`EventFilter`].
//!
//! ```text
//! ┌──────────────┐   lock/open      ┌──────────────┐
//! │ Transactions │ ───────────────► │ Lock Control │
//! │              │ ◄─────────────── │              │
//! └──────────────┘   lock/response  └──────────────┘
//!        ▲                                  │
//!        │ bin/close                        │ lock/tracking-status
//!        │                                  ▼
//!  ┌──────────────────────────────────────────────┐
//!  │                  Event Bus                   │
//!  └──────────────────────────────────────────────┘
//!        ▲ loadcell/weight-calculated
//!        │
//!  ┌──────────────┐
//!  │   Loadcell   │
//!  └──────────────┘
//! ```
//!
//! Point-to-point requests are matched with their replies through a
//! [`PendingRequestStore`] keyed by correlation id. Long-running watchers are
//! kept in a [`MonitorRegistry`] so that at most one runs per key.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod error;
pub mod events;
pub mod monitor;
pub mod publisher;
pub mod request;
pub mod subscriber;

pub use error::{BusError, BusResult};
pub use events::{source, BusFault, CabinetEvent, EventFilter, EventTopic};
pub use monitor::{CancelToken, MonitorRegistry};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use request::{PendingRequestStore, PendingStats};
pub use subscriber::{Subscription, SubscriptionError};

/// Maximum events to buffer per subscriber before lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Default deadline for a point-to-point request. A full 48-lock CU train
/// takes 12 s of inter-frame delay alone.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
