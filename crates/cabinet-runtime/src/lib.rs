//! # Smart Cabinet Runtime
//!
//! Builds the subsystems of one cabinet and connects them through the event
//! bus.
//!
//! ## Modular Structure
//!
//! - `container/` - configuration, cabinet store, subsystem construction
//! - `adapters/` - bus-backed implementations of subsystem ports
//! - `handlers/` - bus subscribers driving the subsystems
//! - `runtime` - startup and graceful shutdown
//!
//! ## Flow of one issue step
//!
//! ```text
//! Transactions ──lock/open──► LockRequestHandler ──► sc-01 execute
//!      ▲                              │
//!      └────────lock/response─────────┘
//! Transactions ──lock/tracking──► LockTracker ──lock/tracking-status──┐
//!                                                                     ▼
//!                     BinStateHandler: flush, secure, commit ──bin/close──► Transactions
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod container;
pub mod handlers;
pub mod runtime;

pub use container::{load_config, CabinetConfig, CabinetContainer, CabinetStore, ConfigError};
pub use runtime::CabinetRuntime;
