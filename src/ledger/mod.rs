// Notification ledger module
pub mod migrations;
pub mod sqlite;

// Re-export key types for easier access
pub use sqlite::{Ledger, LedgerOp};

use crate::models::{EntityKind, UsageRecord};

/// The unique key a ledger entry is stored under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LedgerKey {
    pub entity_id: u32,
    pub entity_kind: EntityKind,
    pub filesystem: String,
}

impl LedgerKey {
    pub fn for_record(record: &UsageRecord) -> Self {
        Self {
            entity_id: record.entity.id,
            entity_kind: record.entity.kind,
            filesystem: record.filesystem.clone(),
        }
    }
}

/// Ledger storage failures. Always fatal for the run: evaluating without
/// durable dedup risks duplicate notifications.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("failed to create ledger directory {path}: {source}")]
    CreateDir {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to open ledger at {path}: {source}")]
    Open {
        path: String,
        source: rusqlite::Error,
    },
    #[error("ledger storage failure: {0}")]
    Storage(#[from] rusqlite::Error),
}
