//! Transactional Inventory Store
//!
//! Durable mapping from canonical item name to quantity, plus the mutation
//! log behind single-step undo. Every mutating call is one atomic
//! transaction; a failed call leaves the prior state untouched.

mod migrations;
mod sqlite;

pub use migrations::{Migration, MIGRATIONS};
pub use sqlite::SqliteInventoryStore;

use crate::error::StoreError;
use crate::types::{InventoryEntry, MutationRecord};

pub trait InventoryStore: Send + Sync {
    /// Increment, creating the entry if absent.
    fn add(&self, name: &str, quantity: u32) -> Result<MutationRecord, StoreError>;

    /// Decrement, floored at zero. Removing an absent item is not an error.
    fn remove(&self, name: &str, quantity: u32) -> Result<MutationRecord, StoreError>;

    /// Overwrite unconditionally. Zero deletes the entry.
    fn set(&self, name: &str, quantity: u32) -> Result<MutationRecord, StoreError>;

    /// Revert the newest mutation and consume its record. `None` when there
    /// is nothing to undo, including right after a previous undo.
    fn undo(&self) -> Result<Option<MutationRecord>, StoreError>;

    /// Current quantity; absent items read as zero.
    fn quantity(&self, name: &str) -> Result<u32, StoreError>;

    fn list_all(&self) -> Result<Vec<InventoryEntry>, StoreError>;

    /// The current undo target, without consuming it.
    fn last_mutation(&self) -> Result<Option<MutationRecord>, StoreError>;
}
