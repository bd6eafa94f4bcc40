//! # Loadcell Quantity Engine
//!
//! **Subsystem ID:** 2
//!
//! ## Purpose
//!
//! Turns raw weight samples from shelf sensors into item quantities. A
//! shelf can only be trusted once its compartment is secured again, so
//! changes observed while a compartment is open accrue as a pending delta and
//! are committed when it re-secures.
//!
//! ## Ingestion Paths
//!
//! | Path | Entry point | Write pattern |
//! |------|-------------|---------------|
//! | Inline | `LoadcellApi::ingest` | one write per sample |
//! | Batched | `BatchIngestor::push` | one bulk write per window, last value wins |
//!
//! Both paths run the same rule ([`domain::apply_sample`]). Unknown hardware
//! ids are provisioned on first sight, together with their port record.
//!
//! ## Module Structure
//!
//! ```text
//! domain/quantity.rs  - dead-zone rounding
//! domain/rules.rs     - accrue / commit rule
//! ports/              - LoadcellApi, LoadcellStore, BinStateProvider, QuantityPublisher
//! adapters/memory.rs  - in-memory store and bin states
//! service.rs          - LoadcellService
//! batch.rs            - BatchIngestor
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod batch;
pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

pub use adapters::{InMemoryBinStates, InMemoryLoadcellStore, RecordingQuantityPublisher};
pub use batch::{BatchIngestor, FlushOutcome};
pub use domain::SampleOutcome;
pub use error::{LoadcellError, LoadcellResult};
pub use ports::{BinStateProvider, LoadcellApi, LoadcellStore, QuantityPublisher};
pub use service::{BatchReport, LoadcellConfig, LoadcellService};
