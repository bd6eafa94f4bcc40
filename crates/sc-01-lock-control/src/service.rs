//! Lock Control Service - port discovery and command execution.

use async_trait::async_trait;
use cabinet_telemetry::{time_histogram, LOCK_COMMANDS, LOCK_COMMAND_DURATION, LOCK_PORTS, SUBSYSTEM_ERRORS};
use parking_lot::RwLock;
use shared_types::lock::{LockCommand, LockCommandRequest, LockProtocol, LockStatusResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::domain::{codec_for, FramingOptions, LockCodec};
use crate::error::{LockControlError, LockControlResult};
use crate::ports::{DiscoveryReport, LockControlApi, SerialTransport};

/// Lock control configuration.
#[derive(Clone, Debug)]
pub struct LockControlConfig {
    /// Read window for each discovery probe.
    pub probe_timeout: Duration,
    /// Baud rate the classified ports are reopened with.
    pub baud_rate: u32,
    /// Read window once a port is classified.
    pub read_window: Duration,
    /// Delay between frames of a CU command train.
    pub cu_frame_delay: Duration,
}

impl Default for LockControlConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_millis(300),
            baud_rate: FramingOptions::DEFAULT_BAUD_RATE,
            read_window: FramingOptions::DEFAULT_READ_WINDOW,
            cu_frame_delay: Duration::from_millis(250),
        }
    }
}

/// Lock control service.
///
/// Commands to one port are serialized by a per-port async mutex held for
/// the whole write-train/read exchange; commands to different ports run
/// concurrently.
pub struct LockControlService<T: SerialTransport> {
    config: LockControlConfig,
    transport: Arc<T>,
    ports: RwLock<DiscoveryReport>,
    port_guards: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl<T: SerialTransport> LockControlService<T> {
    pub fn new(config: LockControlConfig, transport: Arc<T>) -> Self {
        Self {
            config,
            transport,
            ports: RwLock::new(DiscoveryReport::default()),
            port_guards: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &LockControlConfig {
        &self.config
    }

    fn framing_for(&self, codec: &dyn LockCodec) -> FramingOptions {
        FramingOptions {
            baud_rate: self.config.baud_rate,
            read_window: self.config.read_window,
            ..codec.framing()
        }
    }

    fn guard_for(&self, path: &str) -> Arc<Mutex<()>> {
        if let Some(guard) = self.port_guards.read().get(path) {
            return guard.clone();
        }
        self.port_guards
            .write()
            .entry(path.to_string())
            .or_default()
            .clone()
    }

    /// Send one probe and report whether `codec` recognises the reply.
    async fn probe(&self, path: &str, codec: &dyn LockCodec) -> LockControlResult<bool> {
        self.transport.write(path, &codec.detection_frame()).await?;
        let reply = self.transport.read_frame(path).await?;
        Ok(codec.is_detection_response(&reply))
    }

    async fn classify(&self, path: &str) -> LockControlResult<Option<LockProtocol>> {
        let probe_framing = FramingOptions {
            baud_rate: self.config.baud_rate,
            ..FramingOptions::probe(self.config.probe_timeout)
        };
        self.transport.open(path, &probe_framing).await?;

        let mut found = None;
        for protocol in [LockProtocol::Cu, LockProtocol::Scu] {
            match self.probe(path, codec_for(protocol)).await {
                Ok(true) => {
                    found = Some(protocol);
                    break;
                }
                Ok(false) => {}
                Err(e) => {
                    let _ = self.transport.close(path).await;
                    return Err(e);
                }
            }
        }

        self.transport.close(path).await?;
        Ok(found)
    }

    fn port_for(&self, protocol: LockProtocol) -> LockControlResult<String> {
        // Multiple boards of one family share the first port (multidrop bus).
        self.ports
            .read()
            .ports_for(protocol)
            .first()
            .cloned()
            .ok_or(LockControlError::NoPortForProtocol { protocol })
    }

    fn validate(request: &LockCommandRequest) -> LockControlResult<()> {
        if request.protocol == LockProtocol::Scu && request.lock_ids.len() > 1 {
            return Err(LockControlError::InvalidRequest {
                reason: format!(
                    "SCU device {} addresses a single lock, got {} ids",
                    request.device_id,
                    request.lock_ids.len()
                ),
            });
        }
        Ok(())
    }

    async fn run(&self, request: &LockCommandRequest) -> LockControlResult<LockStatusResult> {
        Self::validate(request)?;
        let path = self.port_for(request.protocol)?;
        if !self.transport.is_open(&path) {
            return Err(LockControlError::PortNotOpen { path });
        }

        let protocol = request.protocol.to_string();
        let _timer = time_histogram!(LOCK_COMMAND_DURATION.with_label_values(&[protocol.as_str()]));
        self.exchange(&path, codec_for(request.protocol), request).await
    }

    async fn exchange(
        &self,
        path: &str,
        codec: &dyn LockCodec,
        request: &LockCommandRequest,
    ) -> LockControlResult<LockStatusResult> {
        let lock_ids = request.effective_lock_ids();
        let frames = codec.encode(request.command, request.device_id, &lock_ids);
        let delay = match codec.protocol() {
            LockProtocol::Cu => self.config.cu_frame_delay,
            LockProtocol::Scu => codec.inter_frame_delay(),
        };

        let guard = self.guard_for(path);
        let _exclusive = guard.lock().await;

        for (i, frame) in frames.iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.transport.write(path, frame).await?;
        }
        let reply = self.transport.read_frame(path).await?;

        Ok(codec.decode(request.command, request.device_id, &lock_ids, &reply))
    }
}

fn command_label(command: LockCommand) -> &'static str {
    match command {
        LockCommand::GetStatus => "GET_STATUS",
        LockCommand::OpenLock => "OPEN_LOCK",
    }
}

#[async_trait]
impl<T: SerialTransport> LockControlApi for LockControlService<T> {
    async fn initialize(&self) -> LockControlResult<DiscoveryReport> {
        let mut report = DiscoveryReport::default();

        for path in self.transport.list_ports().await? {
            match self.classify(&path).await {
                Ok(Some(LockProtocol::Cu)) => report.cu_ports.push(path),
                Ok(Some(LockProtocol::Scu)) => report.scu_ports.push(path),
                Ok(None) => report.unclassified.push(path),
                Err(e) => {
                    warn!(port = %path, error = %e, "Port probe failed");
                    report.unclassified.push(path);
                }
            }
        }

        for protocol in [LockProtocol::Cu, LockProtocol::Scu] {
            let codec = codec_for(protocol);
            let framing = self.framing_for(codec);
            let mut opened = Vec::new();
            for path in report.ports_for(protocol) {
                match self.transport.open(path, &framing).await {
                    Ok(()) => opened.push(path.clone()),
                    Err(e) => warn!(port = %path, %protocol, error = %e, "Failed to reopen classified port"),
                }
            }
            LOCK_PORTS
                .with_label_values(&[protocol.to_string().as_str()])
                .set(opened.len() as f64);
            match protocol {
                LockProtocol::Cu => report.cu_ports = opened,
                LockProtocol::Scu => report.scu_ports = opened,
            }
        }

        info!(
            cu = ?report.cu_ports,
            scu = ?report.scu_ports,
            unclassified = report.unclassified.len(),
            "Lock port discovery complete"
        );
        *self.ports.write() = report.clone();
        Ok(report)
    }

    #[instrument(skip(self), fields(protocol = %request.protocol, device_id = request.device_id))]
    async fn execute(&self, request: LockCommandRequest) -> LockControlResult<LockStatusResult> {
        let protocol = request.protocol.to_string();
        let command = command_label(request.command);

        let outcome = self.run(&request).await;

        match &outcome {
            Ok(result) => {
                let label = if result.is_success { "success" } else { "unsuccessful" };
                LOCK_COMMANDS
                    .with_label_values(&[protocol.as_str(), command, label])
                    .inc();
                debug!(is_success = result.is_success, statuses = ?result.lock_statuses, "Lock command executed");
            }
            Err(e) => {
                LOCK_COMMANDS
                    .with_label_values(&[protocol.as_str(), command, "error"])
                    .inc();
                SUBSYSTEM_ERRORS
                    .with_label_values(&["lock_control", e.kind()])
                    .inc();
                warn!(error = %e, "Lock command failed");
            }
        }
        outcome
    }

    fn ports(&self, protocol: LockProtocol) -> Vec<String> {
        self.ports.read().ports_for(protocol).to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemorySerialTransport, SimulatedCuBoard, SimulatedScuBoard};
    use shared_types::lock::{LockState, LockTarget};

    fn cu_target(lock_id: u8) -> LockTarget {
        LockTarget {
            protocol: LockProtocol::Cu,
            device_id: 1,
            lock_id,
        }
    }

    fn fast_config() -> LockControlConfig {
        LockControlConfig {
            cu_frame_delay: Duration::from_millis(1),
            ..LockControlConfig::default()
        }
    }

    async fn cabinet() -> (
        LockControlService<InMemorySerialTransport>,
        Arc<InMemorySerialTransport>,
        Arc<SimulatedCuBoard>,
        Arc<SimulatedScuBoard>,
    ) {
        let transport = Arc::new(InMemorySerialTransport::new());
        let cu = SimulatedCuBoard::new(1);
        let scu = SimulatedScuBoard::new(5);
        transport.attach("/dev/ttyUSB0", cu.clone());
        transport.attach("/dev/ttyUSB1", scu.clone());
        transport.add_port("/dev/ttyS0");

        let service = LockControlService::new(fast_config(), transport.clone());
        service.initialize().await.unwrap();
        (service, transport, cu, scu)
    }

    #[tokio::test]
    async fn test_discovery_classifies_ports() {
        let (service, transport, _, _) = cabinet().await;

        assert_eq!(service.ports(LockProtocol::Cu), vec!["/dev/ttyUSB0".to_string()]);
        assert_eq!(service.ports(LockProtocol::Scu), vec!["/dev/ttyUSB1".to_string()]);
        assert!(!transport.is_open("/dev/ttyS0"));
        assert_eq!(transport.framing("/dev/ttyUSB0").unwrap().frame_length, 18);
        assert_eq!(transport.framing("/dev/ttyUSB1").unwrap().frame_length, 8);
        assert_eq!(transport.framing("/dev/ttyUSB1").unwrap().baud_rate, 19_200);
    }

    #[tokio::test]
    async fn test_discovery_survives_unopenable_port() {
        let transport = Arc::new(InMemorySerialTransport::new());
        transport.attach("/dev/ttyUSB0", SimulatedCuBoard::new(1));
        transport.add_port("/dev/ttyUSB9");
        transport.refuse_open("/dev/ttyUSB9");

        let service = LockControlService::new(fast_config(), transport);
        let report = service.initialize().await.unwrap();
        assert_eq!(report.cu_ports.len(), 1);
        assert_eq!(report.unclassified, vec!["/dev/ttyUSB9".to_string()]);
    }

    #[tokio::test]
    async fn test_open_cu_lock() {
        let (service, _, board, _) = cabinet().await;

        let result = service
            .execute(LockCommandRequest::open(&cu_target(12)))
            .await
            .unwrap();

        assert!(result.is_success);
        assert_eq!(result.status_of(12), LockState::Open);
        assert_eq!(board.state(12), LockState::Open);
    }

    #[tokio::test]
    async fn test_cu_status_filters_to_requested_ids() {
        let (service, _, _, _) = cabinet().await;
        service
            .execute(LockCommandRequest::open(&cu_target(3)))
            .await
            .unwrap();

        let mut request = LockCommandRequest::status(&cu_target(3));
        request.lock_ids = vec![3, 4];
        let result = service.execute(request).await.unwrap();

        assert_eq!(result.lock_statuses.len(), 2);
        assert_eq!(result.status_of(3), LockState::Open);
        assert_eq!(result.status_of(4), LockState::Closed);
    }

    #[tokio::test]
    async fn test_scu_round_trip() {
        let (service, _, _, board) = cabinet().await;
        let target = LockTarget {
            protocol: LockProtocol::Scu,
            device_id: 5,
            lock_id: 1,
        };

        let opened = service.execute(LockCommandRequest::open(&target)).await.unwrap();
        assert_eq!(opened.lock_status(), LockState::Open);

        board.close();
        let status = service.execute(LockCommandRequest::status(&target)).await.unwrap();
        assert_eq!(status.lock_status(), LockState::Closed);
    }

    #[tokio::test]
    async fn test_missing_protocol_fails_fast() {
        let transport = Arc::new(InMemorySerialTransport::new());
        transport.attach("/dev/ttyUSB0", SimulatedCuBoard::new(1));
        let service = LockControlService::new(fast_config(), transport);
        service.initialize().await.unwrap();

        let target = LockTarget {
            protocol: LockProtocol::Scu,
            device_id: 5,
            lock_id: 1,
        };
        let err = service.execute(LockCommandRequest::open(&target)).await.unwrap_err();
        assert_eq!(
            err,
            LockControlError::NoPortForProtocol {
                protocol: LockProtocol::Scu
            }
        );
    }

    #[tokio::test]
    async fn test_closed_port_is_reported() {
        let (service, transport, _, _) = cabinet().await;
        transport.close("/dev/ttyUSB0").await.unwrap();

        let err = service
            .execute(LockCommandRequest::open(&cu_target(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, LockControlError::PortNotOpen { .. }));
    }

    #[tokio::test]
    async fn test_transport_fault_surfaces_immediately() {
        let (service, transport, _, _) = cabinet().await;
        transport.fail_io("/dev/ttyUSB0", true);

        let err = service
            .execute(LockCommandRequest::open(&cu_target(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, LockControlError::Transport { .. }));
    }

    #[tokio::test]
    async fn test_scu_rejects_multiple_lock_ids() {
        let (service, _, _, _) = cabinet().await;
        let request = LockCommandRequest {
            protocol: LockProtocol::Scu,
            device_id: 5,
            lock_ids: vec![1, 2],
            command: LockCommand::OpenLock,
        };
        assert!(matches!(
            service.execute(request).await,
            Err(LockControlError::InvalidRequest { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cu_train_spacing() {
        let transport = Arc::new(InMemorySerialTransport::new());
        transport.attach("/dev/ttyUSB0", SimulatedCuBoard::new(1));
        let service = LockControlService::new(LockControlConfig::default(), transport.clone());
        service.initialize().await.unwrap();
        let writes_after_discovery = transport.written("/dev/ttyUSB0").len();

        let mut request = LockCommandRequest::status(&cu_target(1));
        request.lock_ids = vec![1, 2, 3, 4];

        let started = tokio::time::Instant::now();
        service.execute(request).await.unwrap();

        assert_eq!(started.elapsed(), Duration::from_millis(750));
        assert_eq!(transport.written("/dev/ttyUSB0").len() - writes_after_discovery, 4);
    }

    #[tokio::test]
    async fn test_same_port_commands_are_serialized() {
        let (service, transport, _, _) = cabinet().await;
        let service = Arc::new(service);
        let before = transport.written("/dev/ttyUSB0").len();

        let mut handles = Vec::new();
        for lock_id in 1..=4u8 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service.execute(LockCommandRequest::open(&cu_target(lock_id))).await
            }));
        }
        for handle in handles {
            let result = handle.await.unwrap().unwrap();
            assert!(result.is_success);
        }
        assert_eq!(transport.written("/dev/ttyUSB0").len() - before, 4);
    }
}
