//! SCU (single-lock) board codec.
//!
//! Request frame, 8 bytes:
//!
//! ```text
//! [0xF5, device, 0x70|0x00, 0x00|0x71, 0x00, 0x5F, checksum(0..=5), 0x00]
//!                status     open
//! ```
//!
//! Success replies carry `0xF5, device` and `0x10` at offset 3; bit 0 of the
//! last byte is the lock state (1 = closed).

use shared_types::lock::{LockCommand, LockProtocol, LockState, LockStatusResult};
use std::collections::BTreeMap;
use std::time::Duration;

use super::codec::{checksum, FramingOptions, LockCodec, DETECTION_DEVICE_ID};

const HEADER: u8 = 0xF5;
const CMD_STATUS: u8 = 0x70;
const CMD_OPEN: u8 = 0x71;
const MARKER: u8 = 0x5F;
const REPLY_OK: u8 = 0x10;

#[derive(Debug, Clone, Copy, Default)]
pub struct ScuCodec;

impl ScuCodec {
    pub const FRAME_LENGTH: usize = 8;

    fn frame(device_id: u8, command: LockCommand) -> Vec<u8> {
        let (status, open) = match command {
            LockCommand::GetStatus => (CMD_STATUS, 0x00),
            LockCommand::OpenLock => (0x00, CMD_OPEN),
        };
        let mut frame = vec![HEADER, device_id, status, open, 0x00, MARKER];
        frame.push(checksum(&frame));
        frame.push(0x00);
        frame
    }

    /// The single map key a result is reported under.
    fn result_key(lock_ids: &[u8]) -> u8 {
        lock_ids.first().copied().unwrap_or(1)
    }
}

impl LockCodec for ScuCodec {
    fn protocol(&self) -> LockProtocol {
        LockProtocol::Scu
    }

    fn framing(&self) -> FramingOptions {
        FramingOptions {
            baud_rate: FramingOptions::DEFAULT_BAUD_RATE,
            frame_length: Self::FRAME_LENGTH,
            read_window: FramingOptions::DEFAULT_READ_WINDOW,
        }
    }

    fn inter_frame_delay(&self) -> Duration {
        Duration::ZERO
    }

    fn encode(&self, command: LockCommand, device_id: u8, _lock_ids: &[u8]) -> Vec<Vec<u8>> {
        vec![Self::frame(device_id, command)]
    }

    fn decode(
        &self,
        _command: LockCommand,
        device_id: u8,
        lock_ids: &[u8],
        bytes: &[u8],
    ) -> LockStatusResult {
        let key = Self::result_key(lock_ids);

        let ok = bytes.len() >= Self::FRAME_LENGTH
            && bytes[0] == HEADER
            && bytes[1] == device_id
            && bytes[3] == REPLY_OK;
        if !ok {
            return LockStatusResult::failed(device_id, &[key]);
        }

        let state = if bytes[7] & 0x01 == 1 {
            LockState::Closed
        } else {
            LockState::Open
        };

        LockStatusResult {
            device_id,
            is_success: true,
            lock_statuses: BTreeMap::from([(key, state)]),
        }
    }

    fn detection_frame(&self) -> Vec<u8> {
        Self::frame(DETECTION_DEVICE_ID, LockCommand::GetStatus)
    }

    fn is_detection_response(&self, bytes: &[u8]) -> bool {
        bytes.len() > 2 && bytes[0] == HEADER && bytes[2] == CMD_STATUS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(device: u8, state_byte: u8) -> Vec<u8> {
        vec![HEADER, device, CMD_STATUS, REPLY_OK, 0x00, 0x00, 0x00, state_byte]
    }

    #[test]
    fn test_status_byte_placement() {
        let frame = ScuCodec.encode(LockCommand::GetStatus, 7, &[]).remove(0);
        assert_eq!(frame.len(), 8);
        assert_eq!(&frame[..6], &[0xF5, 0x07, 0x70, 0x00, 0x00, 0x5F]);
        assert_eq!(frame[6], checksum(&frame[..6]));
        assert_eq!(frame[7], 0x00);
    }

    #[test]
    fn test_open_byte_placement() {
        let frame = ScuCodec.encode(LockCommand::OpenLock, 7, &[1]).remove(0);
        assert_eq!(frame[2], 0x00);
        assert_eq!(frame[3], 0x71);
        assert_eq!(frame[5], 0x5F);
        assert_eq!(frame[6], checksum(&frame[..6]));
    }

    #[test]
    fn test_decode_state_bit() {
        let open = ScuCodec.decode(LockCommand::GetStatus, 4, &[1], &reply(4, 0x00));
        assert!(open.is_success);
        assert_eq!(open.lock_status(), LockState::Open);

        let closed = ScuCodec.decode(LockCommand::GetStatus, 4, &[1], &reply(4, 0x01));
        assert_eq!(closed.lock_status(), LockState::Closed);
        assert_eq!(closed.lock_statuses.len(), 1);
    }

    #[test]
    fn test_result_keyed_by_requested_lock() {
        let result = ScuCodec.decode(LockCommand::GetStatus, 4, &[3], &reply(4, 0x01));
        assert_eq!(result.status_of(3), LockState::Closed);
        assert_eq!(result.lock_statuses.len(), 1);
    }

    #[test]
    fn test_failure_flags() {
        let mut wrong_ack = reply(4, 0x01);
        wrong_ack[3] = 0x11;
        for bytes in [reply(5, 0x01), wrong_ack, vec![HEADER, 4, CMD_STATUS]] {
            let result = ScuCodec.decode(LockCommand::GetStatus, 4, &[1], &bytes);
            assert!(!result.is_success);
            assert_eq!(result.lock_status(), LockState::Unknown);
        }
    }

    #[test]
    fn test_detection() {
        assert!(ScuCodec.is_detection_response(&reply(9, 0)));
        assert!(!ScuCodec.is_detection_response(&[0x02, 1, 0, 0x75]));
        assert_eq!(ScuCodec.detection_frame()[2], CMD_STATUS);
    }
}
