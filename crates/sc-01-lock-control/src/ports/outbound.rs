//! Driven ports (SPI - Outbound Dependencies).

use crate::domain::FramingOptions;
use crate::error::LockControlResult;
use async_trait::async_trait;
use shared_types::ipc::LockTrackingStatus;

/// Byte-level access to serial ports.
///
/// Implementations keep one handle per path and serialize access to it;
/// callers that need a multi-frame exchange to be atomic must hold their own
/// per-port guard across the calls.
#[async_trait]
pub trait SerialTransport: Send + Sync {
    /// Paths of the serial ports present on the machine.
    async fn list_ports(&self) -> LockControlResult<Vec<String>>;

    /// Open `path` with the given framing, replacing any existing handle.
    async fn open(&self, path: &str, framing: &FramingOptions) -> LockControlResult<()>;

    async fn close(&self, path: &str) -> LockControlResult<()>;

    fn is_open(&self, path: &str) -> bool;

    /// Write one frame. Stale unread input is discarded first.
    async fn write(&self, path: &str, bytes: &[u8]) -> LockControlResult<()>;

    /// Gather up to one frame of input within the port's read window.
    /// Returns whatever arrived, possibly nothing.
    async fn read_frame(&self, path: &str) -> LockControlResult<Vec<u8>>;
}

/// Receiver of lock tracking progress (published on `lock/tracking-status`).
#[async_trait]
pub trait TrackingSink: Send + Sync {
    async fn report(&self, status: LockTrackingStatus);
}
