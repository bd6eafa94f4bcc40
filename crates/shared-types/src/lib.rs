//! # Shared Types Crate
//!
//! This crate contains the cabinet entities (compartments, loadcells, lock
//! commands) and the payloads carried on the message bus.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: All cross-subsystem types are defined here.
//! - **Hardware-driven state**: fields such as `Bin::is_locked` are only ever
//!   written from hardware reports, never from application intent.
//! - **JSON on the wire**: every bus payload derives `Serialize`/`Deserialize`
//!   with camelCase field names.

pub mod entities;
pub mod errors;
pub mod ipc;
pub mod lock;

pub use entities::*;
pub use errors::*;
pub use ipc::*;
pub use lock::*;
