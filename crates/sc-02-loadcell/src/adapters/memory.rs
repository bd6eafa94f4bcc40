//! In-memory adapters for the loadcell ports.
//!
//! Used by tests and by the runtime when no external store is configured.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use shared_types::entities::{BinId, HardwareId, LoadCell, LoadCellId, LoadcellPort};
use shared_types::errors::StoreError;
use shared_types::ipc::QuantityCalculated;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::ports::{BinStateProvider, LoadcellStore, QuantityPublisher};

/// Sensor store over hash maps.
#[derive(Default)]
pub struct InMemoryLoadcellStore {
    cells: RwLock<HashMap<LoadCellId, LoadCell>>,
    ports: RwLock<HashMap<String, LoadcellPort>>,
    /// Hardware ids whose writes fail.
    failing: RwLock<HashSet<HardwareId>>,
    bulk_writes: AtomicUsize,
}

impl InMemoryLoadcellStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make writes for `hardware_id` fail (or succeed again).
    pub fn fail_writes_for(&self, hardware_id: HardwareId, fail: bool) {
        let mut failing = self.failing.write();
        if fail {
            failing.insert(hardware_id);
        } else {
            failing.remove(&hardware_id);
        }
    }

    /// Number of `save_many` calls so far.
    pub fn bulk_write_count(&self) -> usize {
        self.bulk_writes.load(Ordering::Relaxed)
    }

    pub fn insert(&self, cell: LoadCell) {
        self.cells.write().insert(cell.id, cell);
    }

    pub fn port_count(&self) -> usize {
        self.ports.read().len()
    }

    fn write(&self, cell: &LoadCell) -> Result<(), StoreError> {
        if self.failing.read().contains(&cell.hardware_id) {
            return Err(StoreError::Backend(format!(
                "write rejected for hardware id {}",
                cell.hardware_id
            )));
        }
        self.cells.write().insert(cell.id, cell.clone());
        Ok(())
    }
}

#[async_trait]
impl LoadcellStore for InMemoryLoadcellStore {
    async fn find_by_hardware_id(
        &self,
        hardware_id: HardwareId,
    ) -> Result<Option<LoadCell>, StoreError> {
        Ok(self
            .cells
            .read()
            .values()
            .find(|c| c.hardware_id == hardware_id)
            .cloned())
    }

    async fn get(&self, id: LoadCellId) -> Result<Option<LoadCell>, StoreError> {
        Ok(self.cells.read().get(&id).cloned())
    }

    async fn list(&self, bin_id: Option<BinId>) -> Result<Vec<LoadCell>, StoreError> {
        let mut cells: Vec<LoadCell> = self
            .cells
            .read()
            .values()
            .filter(|c| bin_id.is_none() || c.bin_id == bin_id)
            .cloned()
            .collect();
        cells.sort_by_key(|c| c.hardware_id);
        Ok(cells)
    }

    async fn save(&self, cell: &LoadCell) -> Result<(), StoreError> {
        self.write(cell)
    }

    async fn save_many(&self, cells: &[LoadCell]) -> Vec<Result<(), StoreError>> {
        self.bulk_writes.fetch_add(1, Ordering::Relaxed);
        cells.iter().map(|cell| self.write(cell)).collect()
    }

    async fn find_port(&self, path: &str) -> Result<Option<LoadcellPort>, StoreError> {
        Ok(self.ports.read().get(path).cloned())
    }

    async fn save_port(&self, port: &LoadcellPort) -> Result<(), StoreError> {
        self.ports.write().insert(port.path.clone(), port.clone());
        Ok(())
    }
}

/// Compartment secured flags keyed by bin id.
#[derive(Default)]
pub struct InMemoryBinStates {
    secured: RwLock<HashMap<BinId, bool>>,
}

impl InMemoryBinStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_secured(&self, bin_id: BinId, secured: bool) {
        self.secured.write().insert(bin_id, secured);
    }
}

#[async_trait]
impl BinStateProvider for InMemoryBinStates {
    async fn is_secured(&self, bin_id: BinId) -> Result<Option<bool>, StoreError> {
        Ok(self.secured.read().get(&bin_id).copied())
    }
}

/// Keeps every published quantity change.
#[derive(Default)]
pub struct RecordingQuantityPublisher {
    published: Mutex<Vec<QuantityCalculated>>,
}

impl RecordingQuantityPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<QuantityCalculated> {
        self.published.lock().clone()
    }
}

#[async_trait]
impl QuantityPublisher for RecordingQuantityPublisher {
    async fn publish_quantity(&self, change: QuantityCalculated) {
        self.published.lock().push(change);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_save_many_isolates_failures() {
        let store = InMemoryLoadcellStore::new();
        let port = Uuid::new_v4();
        let good = LoadCell::provisioned(1, port, "/dev/ttyUSB0", 0.0);
        let bad = LoadCell::provisioned(2, port, "/dev/ttyUSB0", 0.0);
        store.fail_writes_for(2, true);

        let results = store.save_many(&[good.clone(), bad.clone()]).await;
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(StoreError::Backend(_))));
        assert_eq!(store.bulk_write_count(), 1);

        assert!(store.get(good.id).await.unwrap().is_some());
        assert!(store.get(bad.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_filters_by_bin() {
        let store = InMemoryLoadcellStore::new();
        let bin = Uuid::new_v4();
        let mut mounted = LoadCell::provisioned(5, Uuid::new_v4(), "/dev/ttyUSB0", 0.0);
        mounted.bin_id = Some(bin);
        store.insert(mounted);
        store.insert(LoadCell::provisioned(3, Uuid::new_v4(), "/dev/ttyUSB0", 0.0));

        assert_eq!(store.list(Some(bin)).await.unwrap().len(), 1);
        let all = store.list(None).await.unwrap();
        assert_eq!(all.iter().map(|c| c.hardware_id).collect::<Vec<_>>(), vec![3, 5]);
        assert!(store.find_by_hardware_id(5).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_bin_states() {
        let states = InMemoryBinStates::new();
        let bin = Uuid::new_v4();
        assert_eq!(states.is_secured(bin).await.unwrap(), None);
        states.set_secured(bin, false);
        assert_eq!(states.is_secured(bin).await.unwrap(), Some(false));
    }
}
