//! Larder
//!
//! Household inventory driven by spoken commands:
//! - Command interpretation with synonym and fuzzy item matching
//! - Transactional SQLite store with single-step undo
//! - Non-blocking audio feedback behind circuit breakers
//! - Layered YAML/env configuration

pub mod command;
pub mod config;
pub mod diagnostics;
pub mod display;
pub mod error;
pub mod feedback;
pub mod listener;
pub mod logging;
pub mod orchestrator;
pub mod safety;
pub mod store;
pub mod types;

// Re-exports for convenience
pub use command::{CommandInterpreter, Operation};
pub use config::LarderConfig;
pub use error::{InventoryError, StoreError};
pub use orchestrator::{CommandOutcome, InventoryOrchestrator};
pub use store::{InventoryStore, SqliteInventoryStore};
