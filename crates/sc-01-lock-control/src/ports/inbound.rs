//! Driving ports (API - Inbound).

use crate::error::LockControlResult;
use async_trait::async_trait;
use shared_types::lock::{LockCommandRequest, LockProtocol, LockStatusResult};

/// Outcome of scanning the serial ports at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    pub cu_ports: Vec<String>,
    pub scu_ports: Vec<String>,
    /// Ports that answered neither probe (or failed to open).
    pub unclassified: Vec<String>,
}

impl DiscoveryReport {
    pub fn ports_for(&self, protocol: LockProtocol) -> &[String] {
        match protocol {
            LockProtocol::Cu => &self.cu_ports,
            LockProtocol::Scu => &self.scu_ports,
        }
    }
}

/// Primary lock control API.
#[async_trait]
pub trait LockControlApi: Send + Sync {
    /// Scan every available serial port, classify it and reopen the
    /// classified ones with protocol framing.
    async fn initialize(&self) -> LockControlResult<DiscoveryReport>;

    /// Execute one command against hardware. No retries at this layer.
    async fn execute(&self, request: LockCommandRequest) -> LockControlResult<LockStatusResult>;

    /// Ports currently bound to `protocol`.
    fn ports(&self, protocol: LockProtocol) -> Vec<String>;
}
