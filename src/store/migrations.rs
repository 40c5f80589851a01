//! Ordered schema migrations, each applied at most once and tracked by name.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::StoreError;

#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub name: &'static str,
    pub sql: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "001_create_inventory",
        sql: r#"
            CREATE TABLE IF NOT EXISTS inventory (
                canonical_name TEXT PRIMARY KEY,
                quantity INTEGER NOT NULL CHECK (quantity >= 0),
                updated_at TEXT NOT NULL
            );
        "#,
    },
    Migration {
        name: "002_create_mutation_log",
        sql: r#"
            CREATE TABLE IF NOT EXISTS mutation_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                canonical_name TEXT NOT NULL,
                previous_quantity INTEGER NOT NULL CHECK (previous_quantity >= 0),
                new_quantity INTEGER NOT NULL CHECK (new_quantity >= 0),
                operation_kind TEXT NOT NULL CHECK (operation_kind IN ('add', 'remove', 'set')),
                recorded_at TEXT NOT NULL
            );
        "#,
    },
    Migration {
        name: "003_mutation_log_undo_target",
        sql: r#"
            ALTER TABLE mutation_log ADD COLUMN undoable INTEGER NOT NULL DEFAULT 0;
            UPDATE mutation_log SET undoable = 1
                WHERE id = (SELECT MAX(id) FROM mutation_log);
            CREATE INDEX IF NOT EXISTS idx_mutation_log_undoable ON mutation_log(undoable);
        "#,
    },
];

const TRACKING_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS schema_migrations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        migration_name TEXT NOT NULL UNIQUE,
        applied_at TEXT NOT NULL
    );
"#;

/// Apply every pending migration in order. Returns how many were applied.
pub(crate) fn apply(conn: &mut Connection, migrations: &[Migration]) -> Result<usize, StoreError> {
    conn.execute_batch(TRACKING_TABLE).map_err(|source| StoreError::Migration {
        name: "schema_migrations".to_string(),
        source,
    })?;

    let mut applied = 0;
    for migration in migrations {
        let fresh = apply_one(conn, migration).map_err(|source| StoreError::Migration {
            name: migration.name.to_string(),
            source,
        })?;
        if fresh {
            applied += 1;
        }
    }

    if applied > 0 {
        info!("Applied {} schema migration(s)", applied);
    }
    Ok(applied)
}

fn apply_one(conn: &mut Connection, migration: &Migration) -> rusqlite::Result<bool> {
    let tx = conn.transaction()?;
    let done = tx
        .query_row(
            "SELECT 1 FROM schema_migrations WHERE migration_name = ?1",
            params![migration.name],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    if done {
        debug!("Migration {} already applied", migration.name);
        return Ok(false);
    }

    tx.execute_batch(migration.sql)?;
    tx.execute(
        "INSERT INTO schema_migrations (migration_name, applied_at) VALUES (?1, ?2)",
        params![migration.name, Utc::now().to_rfc3339()],
    )?;
    tx.commit()?;
    info!("Applied migration {}", migration.name);
    Ok(true)
}

/// Names of applied migrations, oldest first.
pub(crate) fn applied_names(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT migration_name FROM schema_migrations ORDER BY id")?;
    let names = stmt.query_map([], |row| row.get(0))?.collect();
    names
}
