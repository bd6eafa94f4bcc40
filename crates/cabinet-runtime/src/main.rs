//! # Cabinet Runtime Binary
//!
//! Loads configuration, starts every subsystem and runs until Ctrl-C.
//!
//! With `SC_SIMULATED_HARDWARE=1` the serial layer is replaced by simulated
//! lock boards so the controller can run on a workstation.

use std::sync::Arc;

use anyhow::{Context, Result};
use cabinet_runtime::{load_config, CabinetRuntime};
use cabinet_telemetry::{init_telemetry, TelemetryConfig};
use sc_01_lock_control::{
    InMemorySerialTransport, SerialTransport, SimulatedCuBoard, SimulatedScuBoard,
    TokioSerialTransport,
};
use tracing::info;

async fn run<T: SerialTransport + 'static>(
    config: cabinet_runtime::CabinetConfig,
    transport: Arc<T>,
) -> Result<()> {
    let runtime = CabinetRuntime::new(config, transport);
    runtime.start().await.context("starting cabinet runtime")?;

    info!("Cabinet is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;

    runtime.shutdown().await;
    Ok(())
}

fn simulated_transport() -> Arc<InMemorySerialTransport> {
    let transport = Arc::new(InMemorySerialTransport::new());
    transport.attach("/dev/ttySIM0", SimulatedCuBoard::new(0));
    transport.attach("/dev/ttySIM1", SimulatedScuBoard::new(1));
    transport
}

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = TelemetryConfig::from_env();
    let _guard = init_telemetry(telemetry).context("initializing telemetry")?;

    let config = load_config();
    config.validate().context("invalid cabinet configuration")?;

    info!("===========================================");
    info!("  Smart Cabinet Runtime v{}", env!("CARGO_PKG_VERSION"));
    info!("===========================================");

    if config.lock.simulated {
        info!("Using simulated lock hardware");
        run(config, simulated_transport()).await
    } else {
        run(config, Arc::new(TokioSerialTransport::new())).await
    }
}
