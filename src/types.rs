//! Shared inventory data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The three mutations a command can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Add,
    Remove,
    Set,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Add => "add",
            MutationKind::Remove => "remove",
            MutationKind::Set => "set",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(MutationKind::Add),
            "remove" => Ok(MutationKind::Remove),
            "set" => Ok(MutationKind::Set),
            other => Err(format!("unknown mutation kind '{}'", other)),
        }
    }
}

/// One stocked item. Rows with quantity zero are never kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub canonical_name: String,
    pub quantity: u32,
}

/// Durable before/after pair for one successful mutation; the newest record
/// is the single undo target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationRecord {
    pub id: i64,
    pub canonical_name: String,
    pub previous_quantity: u32,
    pub new_quantity: u32,
    pub operation_kind: MutationKind,
    pub recorded_at: DateTime<Utc>,
}

/// Item and count extracted from an utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemQuantity {
    pub item: String,
    pub quantity: u32,
}

impl ItemQuantity {
    pub fn new(item: impl Into<String>, quantity: u32) -> Self {
        Self {
            item: item.into(),
            quantity,
        }
    }
}
