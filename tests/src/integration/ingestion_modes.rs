//! Batched and inline ingestion must land on the same quantities.

use std::sync::Arc;

use rand::{rngs::StdRng, Rng, SeedableRng};
use sc_02_loadcell::{
    BatchIngestor, FlushOutcome, InMemoryBinStates, InMemoryLoadcellStore, LoadcellApi,
    LoadcellConfig, LoadcellService, RecordingQuantityPublisher,
};
use shared_types::entities::{BinId, HardwareId};
use shared_types::ipc::WeightSample;
use uuid::Uuid;

type Service = LoadcellService<InMemoryLoadcellStore, InMemoryBinStates, RecordingQuantityPublisher>;

const SENSORS: [HardwareId; 3] = [21, 22, 23];
const PORT: &str = "/dev/ttyLC1";

struct Engine {
    service: Arc<Service>,
    bins: Arc<InMemoryBinStates>,
    bin: BinId,
}

/// Three sensors of 25 g items, 12 in stock, tared at 500 g.
async fn engine(batched: bool, bin: BinId) -> Engine {
    let bins = Arc::new(InMemoryBinStates::new());
    let service = Arc::new(LoadcellService::new(
        LoadcellConfig {
            batched,
            ..LoadcellConfig::default()
        },
        Arc::new(InMemoryLoadcellStore::new()),
        bins.clone(),
        Arc::new(RecordingQuantityPublisher::new()),
    ));
    bins.set_secured(bin, true);

    for hw in SENSORS {
        service.ingest(WeightSample::new(hw, PORT, 500.0)).await.unwrap();
    }
    for cell in service.get_load_cells(None).await.unwrap() {
        service.activate(cell.id, bin, Some(Uuid::new_v4())).await.unwrap();
        service.calibrate(cell.id, 25.0, 12, 30).await.unwrap();
    }
    for hw in SENSORS {
        service.ingest(WeightSample::new(hw, PORT, 500.0)).await.unwrap();
    }

    Engine { service, bins, bin }
}

/// Final committed quantity per sensor, in hardware id order.
async fn quantities(service: &Service) -> Vec<(HardwareId, i64)> {
    let mut cells: Vec<_> = service
        .get_load_cells(None)
        .await
        .unwrap()
        .into_iter()
        .map(|c| (c.hardware_id, c.calibration.available_quantity))
        .collect();
    cells.sort();
    cells
}

#[tokio::test]
async fn test_batched_matches_inline() {
    let bin = Uuid::new_v4();
    let inline = engine(false, bin).await;
    let batched = engine(true, bin).await;
    let ingestor = BatchIngestor::new(batched.service.clone());

    // Compartment open: items taken and put back in random steps.
    inline.bins.set_secured(bin, false);
    batched.bins.set_secured(bin, false);

    let mut rng = StdRng::seed_from_u64(7);
    let mut weights = [500.0f64; 3];
    for round in 0..20 {
        for (i, hw) in SENSORS.iter().enumerate() {
            let taken: i64 = rng.gen_range(0..=10);
            weights[i] = 500.0 - taken as f64 * 25.0 + rng.gen_range(-3.0..3.0);
            let sample = WeightSample::new(*hw, PORT, weights[i]);
            inline.service.ingest(sample.clone()).await.unwrap();
            ingestor.push(sample);
        }
        if round % 5 == 4 {
            assert!(matches!(ingestor.flush_all().await, FlushOutcome::Flushed(_)));
        }
    }
    ingestor.flush_all().await;

    // Closing the compartment commits whatever is pending.
    for side in [&inline, &batched] {
        side.bins.set_secured(side.bin, true);
        side.service.commit_bin(side.bin).await.unwrap();
    }

    let expected = quantities(&inline.service).await;
    assert_eq!(quantities(&batched.service).await, expected);
    assert!(expected.iter().all(|(_, q)| (2..=12).contains(q)));
}
