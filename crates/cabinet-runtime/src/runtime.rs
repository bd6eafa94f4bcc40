//! # Cabinet Runtime
//!
//! Owns the container and the handler tasks.
//!
//! ## Startup Sequence
//!
//! 1. Discover lock control ports (a cabinet without locks still weighs)
//! 2. Start the batch window timer when ingestion is batched
//! 3. Start every bus handler
//!
//! ## Shutdown Sequence
//!
//! 1. Signal handlers to stop
//! 2. Force-flush buffered weight samples
//! 3. Cancel lock tracking and quantity polling monitors

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use sc_01_lock_control::{LockControlApi, SerialTransport};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::container::{CabinetConfig, CabinetContainer};
use crate::handlers::{
    BinStateHandler, LockReplyHandler, LockRequestHandler, TrackingRequestHandler,
    TransactionSignalHandler, WeightHandler,
};

pub struct CabinetRuntime<T: SerialTransport + 'static> {
    container: Arc<CabinetContainer<T>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: SerialTransport + 'static> CabinetRuntime<T> {
    pub fn new(config: CabinetConfig, transport: Arc<T>) -> Self {
        info!("Creating cabinet runtime");
        let container = Arc::new(CabinetContainer::new(config, transport));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            container,
            shutdown_tx,
            shutdown_rx,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub async fn start(&self) -> Result<()> {
        let c = &self.container;

        match c.locks.initialize().await {
            Ok(report) => info!(
                cu_ports = ?report.cu_ports,
                scu_ports = ?report.scu_ports,
                unclassified = report.unclassified.len(),
                "Lock control ports discovered"
            ),
            Err(e) => warn!(error = %e, "Lock port discovery failed, locks unavailable"),
        }

        let batched = c.config.loadcell.batched;
        if batched {
            c.ingestor.start();
        }

        self.spawn_handler(
            "lock-requests",
            LockRequestHandler::new(c.bus.clone(), c.locks.clone()).run(),
        );
        self.spawn_handler(
            "lock-replies",
            LockReplyHandler::new(&c.bus, c.lock_gateway.clone()).run(),
        );
        self.spawn_handler(
            "lock-tracking",
            TrackingRequestHandler::new(&c.bus, c.tracker.clone()).run(),
        );
        self.spawn_handler(
            "weights",
            WeightHandler::new(&c.bus, c.loadcell.clone(), c.ingestor.clone(), batched).run(),
        );
        self.spawn_handler(
            "bin-state",
            BinStateHandler::new(
                c.bus.clone(),
                c.store.clone(),
                c.loadcell.clone(),
                c.ingestor.clone(),
                batched,
            )
            .run(),
        );
        self.spawn_handler(
            "transactions",
            TransactionSignalHandler::new(&c.bus, c.transactions.clone()).run(),
        );

        info!(
            handlers = self.handles.lock().len(),
            subscribers = c.bus.subscriber_count(),
            "Cabinet runtime started"
        );
        Ok(())
    }

    fn spawn_handler<F>(&self, name: &'static str, handler: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut shutdown = self.shutdown_rx.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = handler => {}
                _ = shutdown.changed() => {
                    debug!(handler = name, "Shutdown signal received");
                }
            }
        });
        self.handles.lock().push(handle);
    }

    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown...");

        if let Err(e) = self.shutdown_tx.send(true) {
            error!("Failed to send shutdown signal: {}", e);
        }
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }

        let c = &self.container;
        let outcome = c.ingestor.shutdown().await;
        debug!(?outcome, "Buffered samples flushed");
        c.tracker.shutdown().await;
        c.transactions.shutdown().await;

        info!("Shutdown complete");
    }

    pub fn container(&self) -> Arc<CabinetContainer<T>> {
        Arc::clone(&self.container)
    }
}
