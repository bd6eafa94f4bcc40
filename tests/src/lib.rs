//! # Smart Cabinet Test Suite
//!
//! Cross-subsystem flows that need more than one crate.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── fixtures.rs        # Simulated cabinet built on the real runtime
//!     ├── issue_flow.rs      # Issue transaction from open to audit
//!     ├── lock_round_trip.rs # lock/open over the bus
//!     └── ingestion_modes.rs # Batched vs inline quantity engine
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p sc-tests
//! cargo test -p sc-tests integration::issue_flow
//! ```

pub mod integration;
