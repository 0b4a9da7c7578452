//! redb-based local order store
//!
//! Holds every order the relay has fetched together with the authoritative
//! `printed` / `notified` flags. The remote API may report stale flags; the
//! values here always win.

use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use shared::Order;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::core::RelayError;

/// Orders table: key = order id, value = JSON
const ORDERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("orders");

#[derive(Debug, Error)]
pub enum OrderStoreError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<OrderStoreError> for RelayError {
    fn from(e: OrderStoreError) -> Self {
        RelayError::Storage(e.to_string())
    }
}

pub type OrderStoreResult<T> = Result<T, OrderStoreError>;

/// Local order store
#[derive(Clone)]
pub struct OrderStore {
    db: Arc<Database>,
}

impl OrderStore {
    /// Open or create database
    pub fn open(path: impl AsRef<Path>) -> OrderStoreResult<Self> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Open in-memory database (for testing)
    pub fn open_in_memory() -> OrderStoreResult<Self> {
        let db =
            Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> OrderStoreResult<Self> {
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(ORDERS_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Insert or refresh an order from the backend
    ///
    /// Local flags are kept: a fetched copy can never un-print or un-notify
    /// an order. Returns the merged record.
    pub fn upsert(&self, order: &Order) -> OrderStoreResult<Order> {
        let txn = self.db.begin_write()?;
        let merged = {
            let mut table = txn.open_table(ORDERS_TABLE)?;

            let existing = match table.get(order.id.as_str())? {
                Some(guard) => Some(serde_json::from_slice::<Order>(guard.value())?),
                None => None,
            };

            let mut merged = order.clone();
            if let Some(local) = existing {
                merged.merge_local_flags(&local);
            }

            let value = serde_json::to_vec(&merged)?;
            table.insert(merged.id.as_str(), value.as_slice())?;
            merged
        };
        txn.commit()?;
        Ok(merged)
    }

    /// Get an order by ID
    pub fn get(&self, id: &str) -> OrderStoreResult<Option<Order>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ORDERS_TABLE)?;

        match table.get(id)? {
            Some(guard) => {
                let order: Order = serde_json::from_slice(guard.value())?;
                Ok(Some(order))
            }
            None => Ok(None),
        }
    }

    /// Set the printed flag; `false` if the order is unknown
    pub fn mark_printed(&self, id: &str) -> OrderStoreResult<bool> {
        self.update(id, |order| order.printed = true)
    }

    /// Set the notified flag; `false` if the order is unknown
    pub fn mark_notified(&self, id: &str) -> OrderStoreResult<bool> {
        self.update(id, |order| order.notified = true)
    }

    fn update(&self, id: &str, f: impl FnOnce(&mut Order)) -> OrderStoreResult<bool> {
        let txn = self.db.begin_write()?;
        let found = {
            let mut table = txn.open_table(ORDERS_TABLE)?;

            // Read first
            let bytes = match table.get(id)? {
                Some(value) => value.value().to_vec(),
                None => return Ok(false),
            };

            let mut order: Order = serde_json::from_slice(&bytes)?;
            f(&mut order);

            let new_value = serde_json::to_vec(&order)?;
            table.insert(id, new_value.as_slice())?;
            true
        };
        txn.commit()?;
        Ok(found)
    }

    // ========== Cleanup ==========

    /// Clean up orders created more than `max_age_secs` ago
    pub fn cleanup_old_records(&self, max_age_secs: i64) -> OrderStoreResult<usize> {
        let cutoff = shared::util::now_millis() - max_age_secs * 1000;

        let txn = self.db.begin_write()?;
        let deleted = {
            let mut table = txn.open_table(ORDERS_TABLE)?;

            let mut to_delete = Vec::new();
            for result in table.iter()? {
                let (key, guard) = result?;
                let order: Order = serde_json::from_slice(guard.value())?;
                if order.created_at < cutoff {
                    to_delete.push(key.value().to_string());
                }
            }

            for id in &to_delete {
                table.remove(id.as_str())?;
            }
            to_delete.len()
        };
        txn.commit()?;
        Ok(deleted)
    }

    /// Number of stored orders
    pub fn count(&self) -> OrderStoreResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ORDERS_TABLE)?;
        Ok(table.len()?)
    }
}
