use rusqlite::Connection;

use super::LedgerError;

pub struct Migration {
    pub version: i32,
    pub name: &'static str,
    pub sql: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: include_str!("../../migrations/001_initial.sql"),
}];

pub fn get_schema_version(connection: &Connection) -> Result<i32, LedgerError> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
        [],
    )?;

    // Current version, defaulting to 0 on a fresh database
    let version = connection
        .query_row(
            "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get::<_, i32>(0),
        )
        .unwrap_or(0);

    Ok(version)
}

pub fn apply_migrations(connection: &Connection) -> Result<(), LedgerError> {
    let current_version = get_schema_version(connection)?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::debug!(
                version = migration.version,
                name = migration.name,
                "applying ledger migration"
            );

            connection.execute_batch(migration.sql)?;
            connection.execute(
                "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
                [migration.version],
            )?;
        }
    }

    Ok(())
}
