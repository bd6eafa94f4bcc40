//! # Cabinet Store
//!
//! Compartment records shared by the loadcell engine (secured state) and the
//! orchestrator (open/failed/damaged flags).

use async_trait::async_trait;
use parking_lot::RwLock;
use sc_02_loadcell::BinStateProvider;
use sc_03_transactions::BinRepository;
use shared_types::entities::{Bin, BinId};
use shared_types::errors::StoreError;
use std::collections::HashMap;
use tracing::debug;

#[derive(Default)]
pub struct CabinetStore {
    bins: RwLock<HashMap<BinId, Bin>>,
}

impl CabinetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, bin: Bin) {
        self.bins.write().insert(bin.id, bin);
    }

    pub fn bin(&self, id: BinId) -> Option<Bin> {
        self.bins.read().get(&id).cloned()
    }

    pub fn bins(&self) -> Vec<Bin> {
        self.bins.read().values().cloned().collect()
    }

    /// Apply a hardware-reported lock state. Returns false for unknown bins.
    pub fn set_locked(&self, id: BinId, locked: bool) -> bool {
        match self.bins.write().get_mut(&id) {
            Some(bin) => {
                if bin.is_locked != locked {
                    debug!(bin_id = %id, locked, "Compartment lock state changed");
                }
                bin.is_locked = locked;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl BinRepository for CabinetStore {
    async fn get(&self, id: BinId) -> Result<Option<Bin>, StoreError> {
        Ok(self.bin(id))
    }

    async fn save(&self, bin: &Bin) -> Result<(), StoreError> {
        self.insert(bin.clone());
        Ok(())
    }
}

#[async_trait]
impl BinStateProvider for CabinetStore {
    async fn is_secured(&self, bin_id: BinId) -> Result<Option<bool>, StoreError> {
        Ok(self.bins.read().get(&bin_id).map(|b| b.is_locked))
    }
}
