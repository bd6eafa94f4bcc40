//! In-memory repositories.

use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::entities::{Bin, BinId, ItemId, UserId};
use shared_types::errors::StoreError;
use shared_types::ipc::TransactionId;
use std::collections::HashMap;

use crate::domain::{IssueLedgerEntry, Transaction, TransactionEvent};
use crate::ports::{AuditLog, BinRepository, LedgerRepository, TransactionRepository};

#[derive(Default)]
pub struct InMemoryTransactionRepository {
    transactions: RwLock<HashMap<TransactionId, Transaction>>,
}

impl InMemoryTransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn get(&self, id: TransactionId) -> Result<Option<Transaction>, StoreError> {
        Ok(self.transactions.read().get(&id).cloned())
    }

    async fn save(&self, transaction: &Transaction) -> Result<(), StoreError> {
        self.transactions
            .write()
            .insert(transaction.id, transaction.clone());
        Ok(())
    }

    async fn list_open(&self) -> Result<Vec<Transaction>, StoreError> {
        let mut open: Vec<Transaction> = self
            .transactions
            .read()
            .values()
            .filter(|t| !t.status.is_terminal())
            .cloned()
            .collect();
        open.sort_by_key(|t| t.created_at);
        Ok(open)
    }
}

#[derive(Default)]
pub struct InMemoryBinRepository {
    bins: RwLock<HashMap<BinId, Bin>>,
}

impl InMemoryBinRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, bin: Bin) {
        self.bins.write().insert(bin.id, bin);
    }

    pub fn set_locked(&self, id: BinId, locked: bool) {
        if let Some(bin) = self.bins.write().get_mut(&id) {
            bin.is_locked = locked;
        }
    }

    pub fn snapshot(&self, id: BinId) -> Option<Bin> {
        self.bins.read().get(&id).cloned()
    }
}

#[async_trait]
impl BinRepository for InMemoryBinRepository {
    async fn get(&self, id: BinId) -> Result<Option<Bin>, StoreError> {
        Ok(self.bins.read().get(&id).cloned())
    }

    async fn save(&self, bin: &Bin) -> Result<(), StoreError> {
        self.bins.write().insert(bin.id, bin.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryLedger {
    entries: RwLock<HashMap<(UserId, ItemId), IssueLedgerEntry>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl LedgerRepository for InMemoryLedger {
    async fn get(
        &self,
        user_id: UserId,
        item_id: ItemId,
    ) -> Result<Option<IssueLedgerEntry>, StoreError> {
        Ok(self.entries.read().get(&(user_id, item_id)).cloned())
    }

    async fn save(&self, entry: &IssueLedgerEntry) -> Result<(), StoreError> {
        self.entries
            .write()
            .insert((entry.user_id, entry.item_id), entry.clone());
        Ok(())
    }

    async fn remove(&self, user_id: UserId, item_id: ItemId) -> Result<(), StoreError> {
        self.entries.write().remove(&(user_id, item_id));
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryAuditLog {
    events: RwLock<Vec<TransactionEvent>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TransactionEvent> {
        self.events.read().clone()
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn record(&self, event: TransactionEvent) -> Result<(), StoreError> {
        self.events.write().push(event);
        Ok(())
    }
}
