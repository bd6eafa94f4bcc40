//! Outstanding-issue ledger.
//!
//! One entry per (user, item). Issues add to it with a per-location
//! breakdown; returns draw it down, preferring the location the item is
//! returned to. An entry that reaches zero is removed by the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared_types::entities::{BinId, ItemId, LoadCellId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerLocation {
    pub bin_id: BinId,
    pub load_cell_id: LoadCellId,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueLedgerEntry {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub quantity: i64,
    pub locations: Vec<LedgerLocation>,
    pub updated_at: DateTime<Utc>,
}

impl IssueLedgerEntry {
    pub fn new(user_id: UserId, item_id: ItemId) -> Self {
        Self {
            user_id,
            item_id,
            quantity: 0,
            locations: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn record_issue(&mut self, bin_id: BinId, load_cell_id: LoadCellId, quantity: i64) {
        self.quantity += quantity;
        match self
            .locations
            .iter_mut()
            .find(|l| l.bin_id == bin_id && l.load_cell_id == load_cell_id)
        {
            Some(location) => location.quantity += quantity,
            None => self.locations.push(LedgerLocation {
                bin_id,
                load_cell_id,
                quantity,
            }),
        }
        self.updated_at = Utc::now();
    }

    /// Draw down `quantity`, matching location first.
    pub fn record_return(&mut self, bin_id: BinId, load_cell_id: LoadCellId, quantity: i64) {
        let mut remaining = quantity.min(self.quantity);
        self.quantity -= remaining;

        // Same location first, then the rest in issue order.
        self.locations
            .sort_by_key(|l| !(l.bin_id == bin_id && l.load_cell_id == load_cell_id));
        for location in &mut self.locations {
            if remaining == 0 {
                break;
            }
            let taken = remaining.min(location.quantity);
            location.quantity -= taken;
            remaining -= taken;
        }
        self.locations.retain(|l| l.quantity > 0);
        self.updated_at = Utc::now();
    }

    pub fn is_settled(&self) -> bool {
        self.quantity <= 0
    }
}
