//! CU (multi-lock) board codec.
//!
//! Request frame, 6 bytes:
//!
//! ```text
//! [0x02, device, lock_index, cmd, 0x03, checksum]
//!                 0..=47     0x60 status / 0x61 open
//! ```
//!
//! Responses start `[0x02, device, _, 0x75]`. A status response carries one
//! bit per lock from byte 4 on (1 = closed); an open acknowledgement is 6
//! bytes long and names the opened lock in byte 2.
//!
//! An acknowledgement only ever confirms that one lock. When a single OPEN
//! reply is decoded for several requested ids, the others come back
//! [`LockState::Unknown`]; callers that need each lock confirmed open one
//! lock per request or follow up with GET_STATUS.

use shared_types::lock::{LockCommand, LockProtocol, LockState, LockStatusResult, CU_MAX_LOCKS};
use std::collections::BTreeMap;
use std::time::Duration;

use super::codec::{checksum, FramingOptions, LockCodec, DETECTION_DEVICE_ID};

const STX: u8 = 0x02;
const ETX: u8 = 0x03;
const CMD_STATUS: u8 = 0x60;
const CMD_OPEN: u8 = 0x61;
const REPLY_OK: u8 = 0x75;
const BITMAP_OFFSET: usize = 4;
const ACK_LENGTH: usize = 6;

#[derive(Debug, Clone, Copy, Default)]
pub struct CuCodec;

impl CuCodec {
    pub const FRAME_LENGTH: usize = 18;
    pub const INTER_FRAME_DELAY: Duration = Duration::from_millis(250);

    fn frame(device_id: u8, lock_id: u8, cmd: u8) -> Vec<u8> {
        let index = lock_id.saturating_sub(1).min(CU_MAX_LOCKS - 1);
        let mut frame = vec![STX, device_id, index, cmd, ETX];
        frame.push(checksum(&frame));
        frame
    }

    fn requested(lock_ids: &[u8]) -> Vec<u8> {
        if lock_ids.is_empty() {
            (1..=CU_MAX_LOCKS).collect()
        } else {
            lock_ids.to_vec()
        }
    }

    fn bitmap_state(bytes: &[u8], lock_id: u8) -> LockState {
        let Some(offset) = lock_id.checked_sub(1) else {
            return LockState::Unknown;
        };
        let byte = BITMAP_OFFSET + usize::from(offset / 8);
        match bytes.get(byte) {
            Some(b) if (b >> (offset % 8)) & 1 == 1 => LockState::Closed,
            Some(_) => LockState::Open,
            None => LockState::Unknown,
        }
    }
}

impl LockCodec for CuCodec {
    fn protocol(&self) -> LockProtocol {
        LockProtocol::Cu
    }

    fn framing(&self) -> FramingOptions {
        FramingOptions {
            baud_rate: FramingOptions::DEFAULT_BAUD_RATE,
            frame_length: Self::FRAME_LENGTH,
            read_window: FramingOptions::DEFAULT_READ_WINDOW,
        }
    }

    fn inter_frame_delay(&self) -> Duration {
        Self::INTER_FRAME_DELAY
    }

    fn encode(&self, command: LockCommand, device_id: u8, lock_ids: &[u8]) -> Vec<Vec<u8>> {
        let cmd = match command {
            LockCommand::GetStatus => CMD_STATUS,
            LockCommand::OpenLock => CMD_OPEN,
        };
        Self::requested(lock_ids)
            .into_iter()
            .map(|id| Self::frame(device_id, id, cmd))
            .collect()
    }

    fn decode(
        &self,
        command: LockCommand,
        device_id: u8,
        lock_ids: &[u8],
        bytes: &[u8],
    ) -> LockStatusResult {
        let requested = Self::requested(lock_ids);

        let header_ok = bytes.len() >= BITMAP_OFFSET
            && bytes[0] == STX
            && bytes[1] == device_id
            && bytes[3] == REPLY_OK;
        if !header_ok {
            return LockStatusResult::failed(device_id, &requested);
        }

        let lock_statuses: BTreeMap<u8, LockState> =
            if command == LockCommand::OpenLock && bytes.len() == ACK_LENGTH {
                let opened = bytes[2].saturating_add(1);
                requested
                    .iter()
                    .map(|id| {
                        let state = if *id == opened {
                            LockState::Open
                        } else {
                            LockState::Unknown
                        };
                        (*id, state)
                    })
                    .collect()
            } else {
                requested
                    .iter()
                    .map(|id| (*id, Self::bitmap_state(bytes, *id)))
                    .collect()
            };

        LockStatusResult {
            device_id,
            is_success: true,
            lock_statuses,
        }
    }

    fn detection_frame(&self) -> Vec<u8> {
        Self::frame(DETECTION_DEVICE_ID, 1, CMD_STATUS)
    }

    fn is_detection_response(&self, bytes: &[u8]) -> bool {
        bytes.len() > 3 && bytes[0] == STX && bytes[3] == REPLY_OK
    }
}
