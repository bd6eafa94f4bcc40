//! # Lock Command Types
//!
//! Request/response types for lock control units. Two hardware families exist:
//! multi-lock "CU" boards addressing up to 48 locks per device, and single-lock
//! "SCU" boards addressing exactly one lock per device.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Number of locks addressable on one CU board.
pub const CU_MAX_LOCKS: u8 = 48;

/// Hardware family of a lock control unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LockProtocol {
    /// Multi-lock control unit.
    Cu,
    /// Single-lock control unit.
    Scu,
}

impl fmt::Display for LockProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cu => write!(f, "CU"),
            Self::Scu => write!(f, "SCU"),
        }
    }
}

/// Command sent to a lock control unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockCommand {
    /// Query lock status.
    GetStatus,
    /// Release a lock.
    OpenLock,
}

/// Physical state of a single lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum LockState {
    Open,
    Closed,
    #[default]
    Unknown,
}

/// Lock command addressed to one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockCommandRequest {
    pub protocol: LockProtocol,
    pub device_id: u8,
    /// 1-based lock ids. Empty means "every lock on the device" for CU.
    pub lock_ids: Vec<u8>,
    pub command: LockCommand,
}

impl LockCommandRequest {
    pub fn open(target: &LockTarget) -> Self {
        Self {
            protocol: target.protocol,
            device_id: target.device_id,
            lock_ids: vec![target.lock_id],
            command: LockCommand::OpenLock,
        }
    }

    pub fn status(target: &LockTarget) -> Self {
        Self {
            protocol: target.protocol,
            device_id: target.device_id,
            lock_ids: vec![target.lock_id],
            command: LockCommand::GetStatus,
        }
    }

    /// Lock ids this request addresses, expanding an empty CU list to all locks.
    pub fn effective_lock_ids(&self) -> Vec<u8> {
        if !self.lock_ids.is_empty() {
            return self.lock_ids.clone();
        }
        match self.protocol {
            LockProtocol::Cu => (1..=CU_MAX_LOCKS).collect(),
            LockProtocol::Scu => vec![1],
        }
    }
}

/// Address of one physical lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockTarget {
    pub protocol: LockProtocol,
    pub device_id: u8,
    pub lock_id: u8,
}

impl fmt::Display for LockTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.protocol, self.device_id, self.lock_id)
    }
}

/// Decoded response from a lock control unit.
///
/// Only lock ids present in the originating request appear in `lock_statuses`.
/// SCU results carry exactly one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockStatusResult {
    pub device_id: u8,
    pub is_success: bool,
    pub lock_statuses: BTreeMap<u8, LockState>,
}

impl LockStatusResult {
    /// Unsuccessful result with every requested lock marked unknown.
    pub fn failed(device_id: u8, lock_ids: &[u8]) -> Self {
        Self {
            device_id,
            is_success: false,
            lock_statuses: lock_ids.iter().map(|id| (*id, LockState::Unknown)).collect(),
        }
    }

    pub fn status_of(&self, lock_id: u8) -> LockState {
        self.lock_statuses
            .get(&lock_id)
            .copied()
            .unwrap_or(LockState::Unknown)
    }

    /// Single-lock view used for SCU results.
    pub fn lock_status(&self) -> LockState {
        self.lock_statuses
            .values()
            .next()
            .copied()
            .unwrap_or(LockState::Unknown)
    }

    /// True when the response succeeded and every listed lock is in `state`.
    pub fn all_in(&self, lock_ids: &[u8], state: LockState) -> bool {
        self.is_success
            && !lock_ids.is_empty()
            && lock_ids.iter().all(|id| self.status_of(*id) == state)
    }
}
