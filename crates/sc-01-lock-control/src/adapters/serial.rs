//! `tokio-serial` backed transport.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, warn};

use crate::domain::FramingOptions;
use crate::error::{LockControlError, LockControlResult};
use crate::ports::SerialTransport;

struct OpenPort {
    stream: SerialStream,
    framing: FramingOptions,
}

type SharedPort = Arc<Mutex<OpenPort>>;

/// Serial transport over real hardware. 8N1, no flow control.
#[derive(Default)]
pub struct TokioSerialTransport {
    ports: RwLock<HashMap<String, SharedPort>>,
}

impl TokioSerialTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn port(&self, path: &str) -> LockControlResult<SharedPort> {
        self.ports
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| LockControlError::PortNotOpen {
                path: path.to_string(),
            })
    }

    fn open_native(path: &str, framing: &FramingOptions) -> LockControlResult<SerialStream> {
        tokio_serial::new(path, framing.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(framing.read_window)
            .open_native_async()
            .map_err(|e| LockControlError::transport(path, e))
    }
}

#[async_trait]
impl SerialTransport for TokioSerialTransport {
    async fn list_ports(&self) -> LockControlResult<Vec<String>> {
        let ports = tokio::task::spawn_blocking(serialport::available_ports)
            .await
            .map_err(|e| LockControlError::transport("*", e))?
            .map_err(|e| LockControlError::transport("*", e))?;

        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }

    async fn open(&self, path: &str, framing: &FramingOptions) -> LockControlResult<()> {
        let owned = path.to_string();
        let framing = *framing;
        let stream = tokio::task::spawn_blocking(move || Self::open_native(&owned, &framing))
            .await
            .map_err(|e| LockControlError::transport(path, e))??;

        let replaced = self
            .ports
            .write()
            .insert(path.to_string(), Arc::new(Mutex::new(OpenPort { stream, framing })))
            .is_some();

        info!(
            port = path,
            baud = framing.baud_rate,
            frame_length = framing.frame_length,
            replaced,
            "Opened serial port"
        );
        Ok(())
    }

    async fn close(&self, path: &str) -> LockControlResult<()> {
        // Dropping the last handle closes the descriptor.
        if self.ports.write().remove(path).is_some() {
            debug!(port = path, "Closed serial port");
        }
        Ok(())
    }

    fn is_open(&self, path: &str) -> bool {
        self.ports.read().contains_key(path)
    }

    async fn write(&self, path: &str, bytes: &[u8]) -> LockControlResult<()> {
        let port = self.port(path)?;
        let mut guard = port.lock().await;

        if let Err(e) = guard.stream.clear(tokio_serial::ClearBuffer::Input) {
            warn!(port = path, error = %e, "Failed to discard stale input");
        }
        guard
            .stream
            .write_all(bytes)
            .await
            .map_err(|e| LockControlError::transport(path, e))?;
        guard
            .stream
            .flush()
            .await
            .map_err(|e| LockControlError::transport(path, e))
    }

    async fn read_frame(&self, path: &str) -> LockControlResult<Vec<u8>> {
        let port = self.port(path)?;
        let mut guard = port.lock().await;
        let framing = guard.framing;

        let deadline = tokio::time::Instant::now() + framing.read_window;
        let mut frame = Vec::with_capacity(framing.frame_length);
        let mut chunk = [0u8; 64];

        while frame.len() < framing.frame_length {
            match tokio::time::timeout_at(deadline, guard.stream.read(&mut chunk)).await {
                Err(_) | Ok(Ok(0)) => break,
                Ok(Ok(n)) => frame.extend_from_slice(&chunk[..n]),
                Ok(Err(e)) => return Err(LockControlError::transport(path, e)),
            }
        }

        frame.truncate(framing.frame_length);
        debug!(port = path, bytes = frame.len(), "Read frame");
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unopened_port_is_rejected() {
        let transport = TokioSerialTransport::new();
        assert!(!transport.is_open("/dev/ttyS99"));
        assert_eq!(
            transport.write("/dev/ttyS99", &[0x02]).await,
            Err(LockControlError::PortNotOpen {
                path: "/dev/ttyS99".into()
            })
        );
    }

    #[tokio::test]
    async fn test_open_missing_device_is_transport_error() {
        let transport = TokioSerialTransport::new();
        let framing = FramingOptions::probe(std::time::Duration::from_millis(50));
        let result = transport.open("/dev/does-not-exist-sc", &framing).await;
        assert!(matches!(result, Err(LockControlError::Transport { .. })));
        assert!(!transport.is_open("/dev/does-not-exist-sc"));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let transport = TokioSerialTransport::new();
        assert!(transport.close("/dev/ttyS98").await.is_ok());
    }
}
