//! In-memory serial transport with simulated lock boards.
//!
//! Each path can host a [`SimulatedBoard`] that answers written frames the
//! way real hardware does. Used by unit tests, the integration crate and the
//! runtime's simulation mode.

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::lock::{LockState, CU_MAX_LOCKS};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::domain::{checksum, CuCodec, FramingOptions};
use crate::error::{LockControlError, LockControlResult};
use crate::ports::SerialTransport;

/// Something that answers frames on a serial line.
pub trait SimulatedBoard: Send + Sync {
    /// Reply to one written frame, if the board answers at all.
    fn respond(&self, frame: &[u8]) -> Option<Vec<u8>>;
}

/// Shared lock state of a simulated board.
#[derive(Default)]
struct Locks {
    states: Mutex<BTreeMap<u8, LockState>>,
    jammed: AtomicBool,
}

impl Locks {
    fn state(&self, lock_id: u8) -> LockState {
        self.states
            .lock()
            .get(&lock_id)
            .copied()
            .unwrap_or(LockState::Closed)
    }

    fn open(&self, lock_id: u8) {
        if !self.jammed.load(Ordering::SeqCst) {
            self.states.lock().insert(lock_id, LockState::Open);
        }
    }
}

// =============================================================================
// CU BOARD
// =============================================================================

/// Simulated multi-lock board. All locks start closed.
pub struct SimulatedCuBoard {
    device_id: u8,
    locks: Locks,
}

impl SimulatedCuBoard {
    pub fn new(device_id: u8) -> Arc<Self> {
        Arc::new(Self {
            device_id,
            locks: Locks::default(),
        })
    }

    /// Simulate a person pushing the door shut.
    pub fn close(&self, lock_id: u8) {
        self.locks.states.lock().insert(lock_id, LockState::Closed);
    }

    /// A jammed board acknowledges commands but never releases a lock.
    pub fn set_jammed(&self, jammed: bool) {
        self.locks.jammed.store(jammed, Ordering::SeqCst);
    }

    pub fn state(&self, lock_id: u8) -> LockState {
        self.locks.state(lock_id)
    }

    fn status_reply(&self, index: u8) -> Vec<u8> {
        let mut reply = vec![0x02, self.device_id, index, 0x75];
        for byte in 0..usize::from(CU_MAX_LOCKS / 8) {
            let mut bits = 0u8;
            for bit in 0..8u8 {
                let lock_id = (byte as u8) * 8 + bit + 1;
                if self.locks.state(lock_id) == LockState::Closed {
                    bits |= 1 << bit;
                }
            }
            reply.push(bits);
        }
        reply.resize(CuCodec::FRAME_LENGTH - 1, 0x00);
        reply.push(checksum(&reply));
        reply
    }
}

impl SimulatedBoard for SimulatedCuBoard {
    fn respond(&self, frame: &[u8]) -> Option<Vec<u8>> {
        if frame.len() != 6 || frame[0] != 0x02 || frame[5] != checksum(&frame[..5]) {
            return None;
        }
        let (device, index, cmd) = (frame[1], frame[2], frame[3]);
        if device != self.device_id && device != 0 {
            return None;
        }
        match cmd {
            0x61 => {
                self.locks.open(index + 1);
                let mut ack = vec![0x02, self.device_id, index, 0x75, 0x03];
                ack.push(checksum(&ack));
                Some(ack)
            }
            0x60 => Some(self.status_reply(index)),
            _ => None,
        }
    }
}

// =============================================================================
// SCU BOARD
// =============================================================================

/// Simulated single-lock board. The lock starts closed.
pub struct SimulatedScuBoard {
    device_id: u8,
    locks: Locks,
}

impl SimulatedScuBoard {
    pub fn new(device_id: u8) -> Arc<Self> {
        Arc::new(Self {
            device_id,
            locks: Locks::default(),
        })
    }

    pub fn close(&self) {
        self.locks.states.lock().insert(1, LockState::Closed);
    }

    pub fn set_jammed(&self, jammed: bool) {
        self.locks.jammed.store(jammed, Ordering::SeqCst);
    }

    pub fn state(&self) -> LockState {
        self.locks.state(1)
    }
}

impl SimulatedBoard for SimulatedScuBoard {
    fn respond(&self, frame: &[u8]) -> Option<Vec<u8>> {
        if frame.len() != 8 || frame[0] != 0xF5 || frame[6] != checksum(&frame[..6]) {
            return None;
        }
        if frame[1] != self.device_id && frame[1] != 0 {
            return None;
        }
        if frame[3] == 0x71 {
            self.locks.open(1);
        }
        let state = u8::from(self.locks.state(1) == LockState::Closed);
        Some(vec![0xF5, self.device_id, frame[2], 0x10, 0x00, 0x00, 0x00, state])
    }
}

// =============================================================================
// TRANSPORT
// =============================================================================

#[derive(Default)]
struct Line {
    board: Option<Arc<dyn SimulatedBoard>>,
    framing: Option<FramingOptions>,
    rx: Vec<u8>,
    written: Vec<Vec<u8>>,
    fail_io: bool,
}

/// Serial transport over in-memory lines.
#[derive(Default)]
pub struct InMemorySerialTransport {
    lines: Mutex<HashMap<String, Line>>,
    unopenable: Mutex<HashSet<String>>,
}

impl InMemorySerialTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a port with no device attached.
    pub fn add_port(&self, path: &str) {
        self.lines.lock().entry(path.to_string()).or_default();
    }

    /// Add a port with `board` attached.
    pub fn attach(&self, path: &str, board: Arc<dyn SimulatedBoard>) {
        self.lines.lock().entry(path.to_string()).or_default().board = Some(board);
    }

    /// Make every subsequent write/read on `path` fail.
    pub fn fail_io(&self, path: &str, fail: bool) {
        if let Some(line) = self.lines.lock().get_mut(path) {
            line.fail_io = fail;
        }
    }

    /// Make `open(path)` fail.
    pub fn refuse_open(&self, path: &str) {
        self.unopenable.lock().insert(path.to_string());
    }

    /// Every frame written to `path` so far.
    pub fn written(&self, path: &str) -> Vec<Vec<u8>> {
        self.lines
            .lock()
            .get(path)
            .map(|line| line.written.clone())
            .unwrap_or_default()
    }

    /// Framing `path` is currently open with.
    pub fn framing(&self, path: &str) -> Option<FramingOptions> {
        self.lines.lock().get(path).and_then(|line| line.framing)
    }

    fn with_open_line<T>(
        &self,
        path: &str,
        f: impl FnOnce(&mut Line) -> LockControlResult<T>,
    ) -> LockControlResult<T> {
        let mut lines = self.lines.lock();
        let line = lines
            .get_mut(path)
            .filter(|line| line.framing.is_some())
            .ok_or_else(|| LockControlError::PortNotOpen {
                path: path.to_string(),
            })?;
        if line.fail_io {
            return Err(LockControlError::transport(path, "simulated I/O failure"));
        }
        f(line)
    }
}

#[async_trait]
impl SerialTransport for InMemorySerialTransport {
    async fn list_ports(&self) -> LockControlResult<Vec<String>> {
        let mut ports: Vec<String> = self.lines.lock().keys().cloned().collect();
        ports.sort();
        Ok(ports)
    }

    async fn open(&self, path: &str, framing: &FramingOptions) -> LockControlResult<()> {
        if self.unopenable.lock().contains(path) {
            return Err(LockControlError::transport(path, "permission denied"));
        }
        let mut lines = self.lines.lock();
        let line = lines
            .get_mut(path)
            .ok_or_else(|| LockControlError::transport(path, "no such device"))?;
        line.framing = Some(*framing);
        line.rx.clear();
        Ok(())
    }

    async fn close(&self, path: &str) -> LockControlResult<()> {
        if let Some(line) = self.lines.lock().get_mut(path) {
            line.framing = None;
            line.rx.clear();
        }
        Ok(())
    }

    fn is_open(&self, path: &str) -> bool {
        self.lines
            .lock()
            .get(path)
            .is_some_and(|line| line.framing.is_some())
    }

    async fn write(&self, path: &str, bytes: &[u8]) -> LockControlResult<()> {
        self.with_open_line(path, |line| {
            line.rx.clear();
            line.written.push(bytes.to_vec());
            if let Some(reply) = line.board.as_ref().and_then(|b| b.respond(bytes)) {
                line.rx.extend(reply);
            }
            Ok(())
        })
    }

    async fn read_frame(&self, path: &str) -> LockControlResult<Vec<u8>> {
        self.with_open_line(path, |line| {
            let limit = line.framing.map(|f| f.frame_length).unwrap_or(0);
            let mut frame = std::mem::take(&mut line.rx);
            frame.truncate(limit);
            Ok(frame)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{codec_for, LockCodec, ScuCodec};
    use shared_types::lock::{LockCommand, LockProtocol};
    use std::time::Duration;

    #[tokio::test]
    async fn test_cu_board_open_then_status() {
        let board = SimulatedCuBoard::new(1);
        let transport = InMemorySerialTransport::new();
        transport.attach("/dev/ttyS0", board.clone());
        let codec = codec_for(LockProtocol::Cu);
        transport.open("/dev/ttyS0", &codec.framing()).await.unwrap();

        for frame in codec.encode(LockCommand::OpenLock, 1, &[12]) {
            transport.write("/dev/ttyS0", &frame).await.unwrap();
        }
        let ack = transport.read_frame("/dev/ttyS0").await.unwrap();
        assert_eq!(ack.len(), 6);
        assert_eq!(board.state(12), LockState::Open);

        board.close(12);
        for frame in codec.encode(LockCommand::GetStatus, 1, &[12]) {
            transport.write("/dev/ttyS0", &frame).await.unwrap();
        }
        let reply = transport.read_frame("/dev/ttyS0").await.unwrap();
        let result = codec.decode(LockCommand::GetStatus, 1, &[12], &reply);
        assert_eq!(result.status_of(12), LockState::Closed);
    }

    #[tokio::test]
    async fn test_scu_board_answers_probe() {
        let transport = InMemorySerialTransport::new();
        transport.attach("/dev/ttyS1", SimulatedScuBoard::new(3));
        transport
            .open("/dev/ttyS1", &FramingOptions::probe(Duration::from_millis(50)))
            .await
            .unwrap();

        transport
            .write("/dev/ttyS1", &ScuCodec.detection_frame())
            .await
            .unwrap();
        let reply = transport.read_frame("/dev/ttyS1").await.unwrap();
        assert!(ScuCodec.is_detection_response(&reply));
    }

    #[tokio::test]
    async fn test_io_on_closed_port_fails() {
        let transport = InMemorySerialTransport::new();
        transport.add_port("/dev/ttyS2");
        assert!(matches!(
            transport.write("/dev/ttyS2", &[1]).await,
            Err(LockControlError::PortNotOpen { .. })
        ));
    }

    #[tokio::test]
    async fn test_jammed_board_keeps_lock_closed() {
        let board = SimulatedScuBoard::new(2);
        board.set_jammed(true);
        assert!(board
            .respond(&ScuCodec.encode(LockCommand::OpenLock, 2, &[1])[0])
            .is_some());
        assert_eq!(board.state(), LockState::Closed);
    }
}
