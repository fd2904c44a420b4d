use rusqlite::{params, Connection};
use std::path::Path;

use super::{migrations::apply_migrations, LedgerError, LedgerKey};

/// A staged ledger write, applied transactionally by [`Ledger::apply`].
#[derive(Debug, Clone)]
pub enum LedgerOp {
    /// Upsert the last-notified tier for a key.
    Set { key: LedgerKey, tier: u8 },
    /// Delete the entry for a key, returning it to the never-notified state.
    Clear { key: LedgerKey },
}

/// Durable store of the last-notified threshold per (entity, filesystem).
pub struct Ledger {
    connection: Connection,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("connection", &"<SQLite Connection>")
            .finish()
    }
}

impl Ledger {
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| LedgerError::CreateDir {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let connection = Connection::open(path).map_err(|source| LedgerError::Open {
            path: path.display().to_string(),
            source,
        })?;

        Self::initialize(connection)
    }

    /// Volatile ledger for tests.
    pub fn in_memory() -> Result<Self, LedgerError> {
        let connection = Connection::open_in_memory().map_err(|source| LedgerError::Open {
            path: ":memory:".to_string(),
            source,
        })?;
        Self::initialize(connection)
    }

    fn initialize(connection: Connection) -> Result<Self, LedgerError> {
        connection.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
        ",
        )?;

        apply_migrations(&connection)?;
        Ok(Self { connection })
    }

    /// The tier this key was last notified for, or `None` if it never was.
    pub fn last_tier(&self, key: &LedgerKey) -> Result<Option<u8>, LedgerError> {
        let result = self.connection.query_row(
            "SELECT threshold FROM notification
             WHERE entity_id = ?1 AND entity_kind = ?2 AND file_system = ?3",
            params![key.entity_id, key.entity_kind.as_str(), key.filesystem],
            |row| row.get::<_, u8>(0),
        );

        match result {
            Ok(tier) => Ok(Some(tier)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Apply a batch of staged writes in a single transaction.
    pub fn apply(&mut self, ops: &[LedgerOp]) -> Result<(), LedgerError> {
        if ops.is_empty() {
            return Ok(());
        }

        let tx = self.connection.transaction()?;
        for op in ops {
            match op {
                LedgerOp::Set { key, tier } => {
                    tx.execute(
                        "INSERT OR REPLACE INTO notification
                         (entity_id, entity_kind, file_system, threshold, last_update)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![
                            key.entity_id,
                            key.entity_kind.as_str(),
                            key.filesystem,
                            tier,
                            chrono::Utc::now().to_rfc3339(),
                        ],
                    )?;
                }
                LedgerOp::Clear { key } => {
                    tx.execute(
                        "DELETE FROM notification
                         WHERE entity_id = ?1 AND entity_kind = ?2 AND file_system = ?3",
                        params![key.entity_id, key.entity_kind.as_str(), key.filesystem],
                    )?;
                }
            }
        }
        tx.commit()?;

        Ok(())
    }

    /// Number of entries currently stored.
    pub fn entry_count(&self) -> Result<u64, LedgerError> {
        let count: u64 =
            self.connection
                .query_row("SELECT COUNT(*) FROM notification", [], |row| row.get(0))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityKind;
    use tempfile::TempDir;

    fn key(filesystem: &str) -> LedgerKey {
        LedgerKey {
            entity_id: 1001,
            entity_kind: EntityKind::User,
            filesystem: filesystem.to_string(),
        }
    }

    #[test]
    fn test_absent_key_reads_as_none() {
        let ledger = Ledger::in_memory().unwrap();
        assert_eq!(ledger.last_tier(&key("main")).unwrap(), None);
    }

    #[test]
    fn test_set_then_read() {
        let mut ledger = Ledger::in_memory().unwrap();
        ledger
            .apply(&[LedgerOp::Set {
                key: key("main"),
                tier: 75,
            }])
            .unwrap();
        assert_eq!(ledger.last_tier(&key("main")).unwrap(), Some(75));
    }

    #[test]
    fn test_upsert_replaces_tier() {
        let mut ledger = Ledger::in_memory().unwrap();
        ledger
            .apply(&[LedgerOp::Set {
                key: key("main"),
                tier: 75,
            }])
            .unwrap();
        ledger
            .apply(&[LedgerOp::Set {
                key: key("main"),
                tier: 90,
            }])
            .unwrap();

        assert_eq!(ledger.last_tier(&key("main")).unwrap(), Some(90));
        assert_eq!(ledger.entry_count().unwrap(), 1);
    }

    #[test]
    fn test_clear_removes_entry() {
        let mut ledger = Ledger::in_memory().unwrap();
        ledger
            .apply(&[LedgerOp::Set {
                key: key("main"),
                tier: 75,
            }])
            .unwrap();
        ledger
            .apply(&[LedgerOp::Clear { key: key("main") }])
            .unwrap();

        assert_eq!(ledger.last_tier(&key("main")).unwrap(), None);
        assert_eq!(ledger.entry_count().unwrap(), 0);
    }

    #[test]
    fn test_keys_are_scoped_per_filesystem() {
        let mut ledger = Ledger::in_memory().unwrap();
        ledger
            .apply(&[
                LedgerOp::Set {
                    key: key("main"),
                    tier: 75,
                },
                LedgerOp::Set {
                    key: key("scratch"),
                    tier: 90,
                },
            ])
            .unwrap();

        assert_eq!(ledger.last_tier(&key("main")).unwrap(), Some(75));
        assert_eq!(ledger.last_tier(&key("scratch")).unwrap(), Some(90));
    }

    #[test]
    fn test_state_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("ledger.db");

        let mut ledger = Ledger::open(&db_path).unwrap();
        ledger
            .apply(&[LedgerOp::Set {
                key: key("main"),
                tier: 75,
            }])
            .unwrap();
        drop(ledger);

        let reopened = Ledger::open(&db_path).unwrap();
        assert_eq!(reopened.last_tier(&key("main")).unwrap(), Some(75));
    }
}
