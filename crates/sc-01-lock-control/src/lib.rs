//! # Lock Control Subsystem
//!
//! **Subsystem ID:** 1
//!
//! ## Purpose
//!
//! Talks to the lock control boards over serial lines: discovers which ports
//! carry CU (multi-lock) or SCU (single-lock) boards, executes OPEN_LOCK and
//! GET_STATUS commands, and watches opened locks until they are pushed shut.
//!
//! ## Wire Formats
//!
//! | Family | Request frame | Response |
//! |--------|---------------|----------|
//! | CU  | `02 dev idx cmd 03 cs` (6 bytes) | 6-byte ack for OPEN, 18-byte status bitmap |
//! | SCU | `F5 dev 70/00 00/71 00 5F cs 00` (8 bytes) | 8 bytes, bit 0 of byte 7 = closed |
//!
//! A CU command for several locks is sent as a train of frames spaced by the
//! inter-frame delay; only the reply to the last frame is decoded.
//!
//! ## Invariants
//!
//! - At most one exchange is in flight per serial port.
//! - A result only lists lock ids the request asked about.
//! - At most one close monitor runs per tracking key.
//!
//! ## Module Structure (Hexagonal Architecture)
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  adapters/serial.rs     - tokio-serial transport               │
//! │  adapters/simulated.rs  - in-memory lines + simulated boards   │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ implements ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  ports/inbound.rs  - LockControlApi                            │
//! │  ports/outbound.rs - SerialTransport, TrackingSink             │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ uses ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  domain/codec.rs - LockCodec, framing, checksum                │
//! │  domain/cu.rs    - CU frames                                   │
//! │  domain/scu.rs   - SCU frames                                  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod domain;
pub mod error;
pub mod ports;
pub mod service;
pub mod tracking;

pub use adapters::{
    InMemorySerialTransport, SimulatedBoard, SimulatedCuBoard, SimulatedScuBoard,
    TokioSerialTransport,
};
pub use domain::{codec_for, FramingOptions, LockCodec};
pub use error::{LockControlError, LockControlResult};
pub use ports::{DiscoveryReport, LockControlApi, SerialTransport, TrackingSink};
pub use service::{LockControlConfig, LockControlService};
pub use tracking::{LockTracker, TrackingConfig};
