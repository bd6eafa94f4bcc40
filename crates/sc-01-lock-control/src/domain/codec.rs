//! Codec interface shared by CU and SCU boards.
//!
//! Codecs are stateless: `encode` turns a command into the frames to put on
//! the wire, `decode` turns whatever came back into a `LockStatusResult`.
//! Decoding never fails; malformed or short input yields an unsuccessful
//! result.

use shared_types::lock::{LockCommand, LockProtocol, LockStatusResult};
use std::time::Duration;

use super::{CuCodec, ScuCodec};

/// Device id used in the probe frames sent during port discovery.
pub const DETECTION_DEVICE_ID: u8 = 0x00;

/// Line settings a port is opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramingOptions {
    pub baud_rate: u32,
    /// Bytes that make up one response frame.
    pub frame_length: usize,
    /// How long to gather bytes for one frame before giving up.
    pub read_window: Duration,
}

impl FramingOptions {
    pub const DEFAULT_BAUD_RATE: u32 = 19_200;
    pub const DEFAULT_READ_WINDOW: Duration = Duration::from_millis(500);

    /// Framing for a discovery probe: large enough for any reply, short window.
    pub fn probe(window: Duration) -> Self {
        Self {
            baud_rate: Self::DEFAULT_BAUD_RATE,
            frame_length: CuCodec::FRAME_LENGTH,
            read_window: window,
        }
    }
}

/// Wire codec for one lock board family.
pub trait LockCodec: Send + Sync {
    fn protocol(&self) -> LockProtocol;

    /// Framing the port is reopened with once classified.
    fn framing(&self) -> FramingOptions;

    /// Delay between consecutive frames of one command.
    fn inter_frame_delay(&self) -> Duration;

    /// Frames for `command` addressed to `lock_ids` on `device_id`.
    fn encode(&self, command: LockCommand, device_id: u8, lock_ids: &[u8]) -> Vec<Vec<u8>>;

    /// Decode a response. Only the requested lock ids appear in the result.
    fn decode(
        &self,
        command: LockCommand,
        device_id: u8,
        lock_ids: &[u8],
        bytes: &[u8],
    ) -> LockStatusResult;

    /// Frame sent while probing a port for this protocol.
    fn detection_frame(&self) -> Vec<u8>;

    /// True when `bytes` look like a reply from this board family.
    fn is_detection_response(&self, bytes: &[u8]) -> bool;
}

static CU: CuCodec = CuCodec;
static SCU: ScuCodec = ScuCodec;

/// Codec for a protocol.
pub fn codec_for(protocol: LockProtocol) -> &'static dyn LockCodec {
    match protocol {
        LockProtocol::Cu => &CU,
        LockProtocol::Scu => &SCU,
    }
}

/// Low byte of the sum of `bytes`.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}
