//! # Container
//!
//! Configuration, shared state and subsystem construction.

pub mod config;
pub mod store;
pub mod subsystems;

pub use config::{load_config, load_config_from, CabinetConfig, ConfigError};
pub use store::CabinetStore;
pub use subsystems::{
    CabinetContainer, ConcreteIngestor, ConcreteLoadcellService, ConcreteLockService,
    ConcreteTracker,
};
