//! Orchestrator view of the loadcell engine.

use async_trait::async_trait;
use sc_02_loadcell::{LoadcellApi, LoadcellError};
use sc_03_transactions::LoadCellGateway;
use shared_types::entities::{BinId, LoadCell, LoadCellId};
use shared_types::errors::StoreError;
use std::sync::Arc;

pub struct LoadcellGateway<L: LoadcellApi> {
    loadcell: Arc<L>,
}

impl<L: LoadcellApi> LoadcellGateway<L> {
    pub fn new(loadcell: Arc<L>) -> Self {
        Self { loadcell }
    }
}

fn store_error(error: LoadcellError) -> StoreError {
    match error {
        LoadcellError::Store(e) => e,
        LoadcellError::LoadCellNotFound { id } => StoreError::not_found("load cell", id),
        other => StoreError::Backend(other.to_string()),
    }
}

#[async_trait]
impl<L: LoadcellApi + 'static> LoadCellGateway for LoadcellGateway<L> {
    async fn load_cells(&self, bin_id: BinId) -> Result<Vec<LoadCell>, StoreError> {
        self.loadcell
            .get_load_cells(Some(bin_id))
            .await
            .map_err(store_error)
    }

    async fn add_damage(&self, id: LoadCellId, quantity: i64) -> Result<(), StoreError> {
        self.loadcell
            .add_damage(id, quantity)
            .await
            .map(|_| ())
            .map_err(store_error)
    }

    async fn commit_bin(&self, bin_id: BinId) -> Result<(), StoreError> {
        self.loadcell
            .commit_bin(bin_id)
            .await
            .map(|_| ())
            .map_err(store_error)
    }
}
