//! Loadcell Service - sample ingestion and sensor administration.

use async_trait::async_trait;
use cabinet_telemetry::{
    log_bin_event, BATCH_UNIT_FAILURES, LOADCELLS_PROVISIONED, LOADCELL_SAMPLES, QUANTITY_COMMITS,
    SUBSYSTEM_ERRORS,
};
use shared_types::entities::{BinId, Calibration, ItemId, LoadCell, LoadCellId, LoadcellPort};
use shared_types::ipc::{QuantityCalculated, SampleStatus, WeightSample};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::domain::{apply_sample, commit_pending, SampleOutcome};
use crate::error::{LoadcellError, LoadcellResult};
use crate::ports::{BinStateProvider, LoadcellApi, LoadcellStore, QuantityPublisher};

/// Loadcell configuration.
#[derive(Clone, Debug)]
pub struct LoadcellConfig {
    /// Route samples through the batch ingestor instead of the inline path.
    pub batched: bool,
    /// Buffering window of the batch ingestor.
    pub batch_window: Duration,
}

impl Default for LoadcellConfig {
    fn default() -> Self {
        Self {
            batched: false,
            batch_window: Duration::from_millis(1000),
        }
    }
}

/// Result of one bulk flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Samples written through the bulk write.
    pub applied: usize,
    /// Sensors created from unknown hardware ids.
    pub provisioned: usize,
    /// Units dropped because their write (or lookup) failed.
    pub failed: usize,
    /// Pending changes committed.
    pub committed: usize,
}

enum Prepared {
    Provisioned,
    Updated(LoadCell, SampleOutcome),
}

/// Secured state per compartment, looked up once per ingestion cycle.
type SecuredCache = HashMap<BinId, bool>;

pub struct LoadcellService<S, B, P>
where
    S: LoadcellStore,
    B: BinStateProvider,
    P: QuantityPublisher,
{
    config: LoadcellConfig,
    store: Arc<S>,
    bins: Arc<B>,
    publisher: Arc<P>,
    /// Serializes read-modify-write cycles on sensors.
    writer: Mutex<()>,
}

impl<S, B, P> LoadcellService<S, B, P>
where
    S: LoadcellStore,
    B: BinStateProvider,
    P: QuantityPublisher,
{
    pub fn new(config: LoadcellConfig, store: Arc<S>, bins: Arc<B>, publisher: Arc<P>) -> Self {
        Self {
            config,
            store,
            bins,
            publisher,
            writer: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &LoadcellConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Apply a set of samples with one bulk write.
    ///
    /// Per-unit failures are logged and dropped; the rest of the batch is
    /// still written.
    pub async fn ingest_batch(&self, samples: Vec<WeightSample>) -> BatchReport {
        let _writer = self.writer.lock().await;
        let mut report = BatchReport::default();
        let mut cache = SecuredCache::new();
        let mut updated = Vec::with_capacity(samples.len());

        for sample in samples {
            if sample.status == SampleStatus::Error {
                continue;
            }
            LOADCELL_SAMPLES.with_label_values(&["batched"]).inc();
            match self.prepare(&sample, &mut cache).await {
                Ok(Prepared::Provisioned) => report.provisioned += 1,
                Ok(Prepared::Updated(cell, outcome)) => updated.push((cell, outcome)),
                Err(e) => {
                    warn!(hardware_id = sample.hardware_id, error = %e, "Dropping sample from batch");
                    SUBSYSTEM_ERRORS
                        .with_label_values(&["loadcell", e.kind()])
                        .inc();
                    report.failed += 1;
                }
            }
        }

        if updated.is_empty() {
            return report;
        }

        let cells: Vec<LoadCell> = updated.iter().map(|(cell, _)| cell.clone()).collect();
        let results = self.store.save_many(&cells).await;

        for ((cell, outcome), result) in updated.into_iter().zip(results) {
            match result {
                Ok(()) => {
                    report.applied += 1;
                    if outcome.committed().is_some() {
                        report.committed += 1;
                    }
                    self.announce(&cell, outcome).await;
                }
                Err(e) => {
                    warn!(hardware_id = cell.hardware_id, error = %e, "Bulk write unit failed");
                    BATCH_UNIT_FAILURES.inc();
                    report.failed += 1;
                }
            }
        }

        report
    }

    async fn secured(&self, cell: &LoadCell, cache: &mut SecuredCache) -> LoadcellResult<bool> {
        // Unmounted sensors have no compartment to wait for.
        let Some(bin_id) = cell.bin_id else {
            return Ok(true);
        };
        if let Some(secured) = cache.get(&bin_id) {
            return Ok(*secured);
        }
        let secured = match self.bins.is_secured(bin_id).await? {
            Some(secured) => secured,
            None => {
                warn!(%bin_id, load_cell_id = %cell.id, "Sensor mounted in unknown compartment");
                true
            }
        };
        cache.insert(bin_id, secured);
        Ok(secured)
    }

    async fn port_for(&self, path: &str) -> LoadcellResult<LoadcellPort> {
        if let Some(port) = self.store.find_port(path).await? {
            return Ok(port);
        }
        let port = LoadcellPort::new(path);
        self.store.save_port(&port).await?;
        info!(path, port_id = %port.id, "Loadcell port registered");
        Ok(port)
    }

    async fn provision(&self, sample: &WeightSample) -> LoadcellResult<()> {
        let port = self.port_for(&sample.port_path).await?;
        let cell = LoadCell::provisioned(
            sample.hardware_id,
            port.id,
            sample.port_path.clone(),
            sample.weight,
        );
        self.store.save(&cell).await?;
        LOADCELLS_PROVISIONED.inc();
        info!(
            hardware_id = sample.hardware_id,
            path = %sample.port_path,
            load_cell_id = %cell.id,
            "Loadcell provisioned"
        );
        Ok(())
    }

    /// Apply `sample` to its sensor without persisting the result.
    async fn prepare(
        &self,
        sample: &WeightSample,
        cache: &mut SecuredCache,
    ) -> LoadcellResult<Prepared> {
        let Some(mut cell) = self.store.find_by_hardware_id(sample.hardware_id).await? else {
            self.provision(sample).await?;
            return Ok(Prepared::Provisioned);
        };

        if cell.port_path != sample.port_path {
            let port = self.port_for(&sample.port_path).await?;
            info!(
                hardware_id = cell.hardware_id,
                from = %cell.port_path,
                to = %port.path,
                "Loadcell reconnected on another port"
            );
            cell.port_id = port.id;
            cell.port_path = port.path;
        }

        let secured = self.secured(&cell, cache).await?;
        let outcome = apply_sample(&mut cell, sample.weight, secured);
        Ok(Prepared::Updated(cell, outcome))
    }

    /// Publish the quantity change of a persisted sample.
    async fn announce(&self, cell: &LoadCell, outcome: SampleOutcome) {
        if let Some(committed) = outcome.committed() {
            QUANTITY_COMMITS.inc();
            debug!(load_cell_id = %cell.id, committed, "Pending change committed");
        }
        let delta = outcome.delta();
        if delta != 0 {
            self.publisher
                .publish_quantity(QuantityCalculated {
                    item_id: cell.item_id,
                    loadcell_id: cell.id,
                    hardware_id: cell.hardware_id,
                    change_in_quantity: delta,
                })
                .await;
        }
    }

    async fn load(&self, id: LoadCellId) -> LoadcellResult<LoadCell> {
        self.store
            .get(id)
            .await?
            .ok_or(LoadcellError::LoadCellNotFound { id })
    }
}

#[async_trait]
impl<S, B, P> LoadcellApi for LoadcellService<S, B, P>
where
    S: LoadcellStore,
    B: BinStateProvider,
    P: QuantityPublisher,
{
    async fn ingest(&self, sample: WeightSample) -> LoadcellResult<SampleOutcome> {
        if sample.status == SampleStatus::Error {
            debug!(hardware_id = sample.hardware_id, "Ignoring error sample");
            return Ok(SampleOutcome::Ignored);
        }

        let _writer = self.writer.lock().await;
        LOADCELL_SAMPLES.with_label_values(&["inline"]).inc();

        let mut cache = SecuredCache::new();
        match self.prepare(&sample, &mut cache).await? {
            Prepared::Provisioned => Ok(SampleOutcome::Provisioned),
            Prepared::Updated(cell, outcome) => {
                self.store.save(&cell).await?;
                self.announce(&cell, outcome).await;
                Ok(outcome)
            }
        }
    }

    #[instrument(skip(self))]
    async fn commit_bin(&self, bin_id: BinId) -> LoadcellResult<Vec<(LoadCellId, i64)>> {
        let _writer = self.writer.lock().await;
        let mut commits = Vec::new();

        for mut cell in self.store.list(Some(bin_id)).await? {
            if let Some(committed) = commit_pending(&mut cell) {
                self.store.save(&cell).await?;
                QUANTITY_COMMITS.inc();
                commits.push((cell.id, committed));
            }
        }

        if !commits.is_empty() {
            log_bin_event!(info, "loadcell", bin_id, "Compartment secured, pending changes committed", sensors = commits.len());
        }
        Ok(commits)
    }

    async fn get_load_cells(&self, bin_id: Option<BinId>) -> LoadcellResult<Vec<LoadCell>> {
        Ok(self.store.list(bin_id).await?)
    }

    async fn calibrate(
        &self,
        id: LoadCellId,
        unit_weight: f64,
        quantity: i64,
        max_quantity: i64,
    ) -> LoadcellResult<LoadCell> {
        if !unit_weight.is_finite() || unit_weight <= 0.0 {
            return Err(LoadcellError::InvalidCalibration {
                reason: format!("unit weight must be positive, got {unit_weight}"),
            });
        }
        if quantity < 0 || max_quantity < quantity {
            return Err(LoadcellError::InvalidCalibration {
                reason: format!("quantity {quantity} outside 0..={max_quantity}"),
            });
        }

        let _writer = self.writer.lock().await;
        let mut cell = self.load(id).await?;
        cell.calibration = Calibration {
            zero_weight: None,
            unit_weight,
            available_quantity: quantity,
            max_quantity,
            damage_quantity: cell.calibration.damage_quantity,
        };
        cell.reading.pending_change = 0;
        cell.state.is_calibrated = true;
        cell.state.is_running = true;
        cell.is_sync = false;
        self.store.save(&cell).await?;

        info!(load_cell_id = %id, unit_weight, quantity, "Calibration armed");
        Ok(cell)
    }

    async fn move_calibration(&self, from: LoadCellId, to: LoadCellId) -> LoadcellResult<()> {
        let _writer = self.writer.lock().await;
        let mut source = self.load(from).await?;
        let mut target = self.load(to).await?;

        if source.port_path != target.port_path {
            return Err(LoadcellError::PortMismatch {
                from,
                to,
                from_port: source.port_path,
                to_port: target.port_path,
            });
        }

        let moved = !target.state.is_calibrated;
        std::mem::swap(&mut source.calibration, &mut target.calibration);
        std::mem::swap(&mut source.item_id, &mut target.item_id);
        std::mem::swap(&mut source.bin_id, &mut target.bin_id);
        std::mem::swap(&mut source.state, &mut target.state);
        std::mem::swap(
            &mut source.reading.pending_change,
            &mut target.reading.pending_change,
        );

        for cell in [&mut source, &mut target] {
            // Each physical sensor has its own tare.
            cell.calibration.zero_weight = None;
            cell.is_sync = false;
        }

        self.store.save(&source).await?;
        self.store.save(&target).await?;

        info!(%from, %to, moved, "Calibration moved");
        Ok(())
    }

    async fn activate(
        &self,
        id: LoadCellId,
        bin_id: BinId,
        item_id: Option<ItemId>,
    ) -> LoadcellResult<LoadCell> {
        let _writer = self.writer.lock().await;
        let mut cell = self.load(id).await?;
        cell.bin_id = Some(bin_id);
        cell.item_id = item_id;
        cell.state.is_running = true;
        self.store.save(&cell).await?;
        log_bin_event!(info, "loadcell", bin_id, "Loadcell mounted", load_cell_id = %id);
        Ok(cell)
    }

    async fn deactivate(&self, id: LoadCellId) -> LoadcellResult<LoadCell> {
        let _writer = self.writer.lock().await;
        let mut cell = self.load(id).await?;
        cell.bin_id = None;
        cell.item_id = None;
        cell.state.is_running = false;
        self.store.save(&cell).await?;
        info!(load_cell_id = %id, "Loadcell unmounted");
        Ok(cell)
    }

    async fn add_damage(&self, id: LoadCellId, quantity: i64) -> LoadcellResult<LoadCell> {
        let _writer = self.writer.lock().await;
        let mut cell = self.load(id).await?;
        cell.calibration.damage_quantity += quantity;
        self.store.save(&cell).await?;
        debug!(load_cell_id = %id, quantity, total = cell.calibration.damage_quantity, "Damage recorded");
        Ok(cell)
    }
}
