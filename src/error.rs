//! Error Taxonomy
//!
//! Every failure a command can hit is one of these variants. All of them are
//! recoverable locally and map onto a spoken feedback line; only a migration
//! failure at startup is fatal, and that surfaces as a `StoreError` from
//! `SqliteInventoryStore::open`.

use thiserror::Error;

/// Failures of the durable inventory store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("migration '{name}' failed: {source}")]
    Migration {
        name: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("store lock poisoned by a panicked writer")]
    Poisoned,

    #[error("commit did not finish within {0:?}")]
    Timeout(std::time::Duration),

    #[error("stored quantity {0} is outside the valid range")]
    InvalidQuantity(i64),
}

/// Failures of a single `process_command` call.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Empty, oversized or malformed text. Never retried.
    #[error("input rejected: {0}")]
    InputRejected(String),

    /// No command verb matched.
    #[error("command not recognized")]
    Unrecognized,

    /// Item name or quantity out of bounds; the store was not touched.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// The transaction could not commit and was rolled back.
    #[error("store failure: {0}")]
    Store(#[from] StoreError),

    /// There is no mutation left to undo.
    #[error("nothing to undo")]
    UndoUnavailable,
}

impl InventoryError {
    /// The line announced to the user for this failure.
    pub fn feedback(&self) -> String {
        match self {
            InventoryError::InputRejected(_) => {
                "Could not understand audio. Please try again.".to_string()
            }
            InventoryError::Unrecognized => {
                "Command not recognized. Please try again with a valid command.".to_string()
            }
            InventoryError::ValidationFailed(reason) => {
                format!("Could not process that item: {}. Please try again.", reason)
            }
            InventoryError::Store(_) => "Command failed to execute. Please try again.".to_string(),
            InventoryError::UndoUnavailable => "Nothing to undo. No recent changes were found.".to_string(),
        }
    }
}
