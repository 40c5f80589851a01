//! SQLite-backed `InventoryStore`.
//!
//! One connection behind a mutex: mutations and reads are serialized, and
//! each mutation runs in an IMMEDIATE transaction so the read-modify-write
//! holds the write lock from the first read. Lock waits on the database file
//! are bounded by the commit timeout.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::migrations::{self, MIGRATIONS};
use super::InventoryStore;
use crate::error::StoreError;
use crate::types::{InventoryEntry, MutationKind, MutationRecord};

const DEFAULT_COMMIT_TIMEOUT: Duration = Duration::from_secs(30);

const RECORD_COLUMNS: &str =
    "id, canonical_name, previous_quantity, new_quantity, operation_kind, recorded_at";

pub struct SqliteInventoryStore {
    conn: Mutex<Connection>,
    commit_timeout: Duration,
}

impl SqliteInventoryStore {
    /// Open (or create) the database and bring its schema up to date. A
    /// migration failure is returned as `StoreError::Migration`.
    pub fn open(path: impl AsRef<Path>, commit_timeout: Duration) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = if path == Path::new(":memory:") {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        info!("Opened inventory database at {}", path.display());
        Self::with_connection(conn, commit_timeout)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, DEFAULT_COMMIT_TIMEOUT)
    }

    fn with_connection(mut conn: Connection, commit_timeout: Duration) -> Result<Self, StoreError> {
        conn.busy_timeout(commit_timeout)?;
        migrations::apply(&mut conn, MIGRATIONS)?;
        Ok(Self {
            conn: Mutex::new(conn),
            commit_timeout,
        })
    }

    /// Names of the schema migrations recorded in this database.
    pub fn applied_migrations(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.lock()?;
        migrations::applied_names(&conn).map_err(|e| self.classify(e))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn classify(&self, error: rusqlite::Error) -> StoreError {
        match error {
            e if e.sqlite_error_code() == Some(ErrorCode::DatabaseBusy) => {
                StoreError::Timeout(self.commit_timeout)
            }
            rusqlite::Error::IntegralValueOutOfRange(_, value) => StoreError::InvalidQuantity(value),
            e => StoreError::Sqlite(e),
        }
    }

    /// Read, compute, write and log in one transaction. Any error drops the
    /// transaction, which rolls it back.
    fn mutate<F>(&self, name: &str, kind: MutationKind, compute: F) -> Result<MutationRecord, StoreError>
    where
        F: FnOnce(u32) -> u32,
    {
        let mut conn = self.lock()?;
        let result = (|| -> rusqlite::Result<MutationRecord> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let previous = read_quantity(&tx, name)?;
            let new = compute(previous);
            let recorded_at = Utc::now();
            let stamp = recorded_at.to_rfc3339();

            write_quantity(&tx, name, new, &stamp)?;
            tx.execute("UPDATE mutation_log SET undoable = 0 WHERE undoable = 1", [])?;
            tx.execute(
                "INSERT INTO mutation_log
                    (canonical_name, previous_quantity, new_quantity, operation_kind, recorded_at, undoable)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1)",
                params![name, previous, new, kind.as_str(), &stamp],
            )?;
            let id = tx.last_insert_rowid();
            tx.commit()?;

            Ok(MutationRecord {
                id,
                canonical_name: name.to_string(),
                previous_quantity: previous,
                new_quantity: new,
                operation_kind: kind,
                recorded_at,
            })
        })();

        match result {
            Ok(record) => {
                debug!(
                    item = %record.canonical_name,
                    from = record.previous_quantity,
                    to = record.new_quantity,
                    "Committed {}",
                    kind
                );
                Ok(record)
            }
            Err(e) => {
                warn!("{} of '{}' rolled back: {}", kind, name, e);
                Err(self.classify(e))
            }
        }
    }
}

fn read_quantity(conn: &Connection, name: &str) -> rusqlite::Result<u32> {
    let quantity = conn
        .query_row(
            "SELECT quantity FROM inventory WHERE canonical_name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(quantity.unwrap_or(0))
}

/// Zero never gets stored: the row is deleted instead.
fn write_quantity(conn: &Connection, name: &str, quantity: u32, stamp: &str) -> rusqlite::Result<()> {
    if quantity == 0 {
        conn.execute("DELETE FROM inventory WHERE canonical_name = ?1", params![name])?;
    } else {
        conn.execute(
            "INSERT INTO inventory (canonical_name, quantity, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(canonical_name) DO UPDATE SET
                quantity = excluded.quantity,
                updated_at = excluded.updated_at",
            params![name, quantity, stamp],
        )?;
    }
    Ok(())
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<MutationRecord> {
    let kind: String = row.get(4)?;
    let recorded_at: String = row.get(5)?;
    Ok(MutationRecord {
        id: row.get(0)?,
        canonical_name: row.get(1)?,
        previous_quantity: row.get(2)?,
        new_quantity: row.get(3)?,
        operation_kind: kind
            .parse()
            .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, e.into()))?,
        recorded_at: DateTime::parse_from_rfc3339(&recorded_at)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?
            .with_timezone(&Utc),
    })
}

fn undo_target(conn: &Connection) -> rusqlite::Result<Option<MutationRecord>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM mutation_log WHERE undoable = 1 ORDER BY id DESC LIMIT 1",
            RECORD_COLUMNS
        ),
        [],
        record_from_row,
    )
    .optional()
}

impl InventoryStore for SqliteInventoryStore {
    fn add(&self, name: &str, quantity: u32) -> Result<MutationRecord, StoreError> {
        self.mutate(name, MutationKind::Add, |current| current.saturating_add(quantity))
    }

    fn remove(&self, name: &str, quantity: u32) -> Result<MutationRecord, StoreError> {
        self.mutate(name, MutationKind::Remove, |current| current.saturating_sub(quantity))
    }

    fn set(&self, name: &str, quantity: u32) -> Result<MutationRecord, StoreError> {
        self.mutate(name, MutationKind::Set, |_| quantity)
    }

    fn undo(&self) -> Result<Option<MutationRecord>, StoreError> {
        let mut conn = self.lock()?;
        let result = (|| -> rusqlite::Result<Option<MutationRecord>> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let Some(record) = undo_target(&tx)? else {
                return Ok(None);
            };
            write_quantity(&tx, &record.canonical_name, record.previous_quantity, &Utc::now().to_rfc3339())?;
            tx.execute("DELETE FROM mutation_log WHERE id = ?1", params![record.id])?;
            tx.commit()?;
            Ok(Some(record))
        })();

        match result {
            Ok(Some(record)) => {
                info!(
                    item = %record.canonical_name,
                    restored = record.previous_quantity,
                    "Undid {} #{}",
                    record.operation_kind,
                    record.id
                );
                Ok(Some(record))
            }
            Ok(None) => {
                debug!("Undo requested with no undo target");
                Ok(None)
            }
            Err(e) => {
                warn!("Undo rolled back: {}", e);
                Err(self.classify(e))
            }
        }
    }

    fn quantity(&self, name: &str) -> Result<u32, StoreError> {
        let conn = self.lock()?;
        read_quantity(&conn, name).map_err(|e| self.classify(e))
    }

    fn list_all(&self) -> Result<Vec<InventoryEntry>, StoreError> {
        let conn = self.lock()?;
        let entries = (|| -> rusqlite::Result<Vec<InventoryEntry>> {
            let mut stmt = conn.prepare("SELECT canonical_name, quantity FROM inventory ORDER BY canonical_name")?;
            let rows = stmt.query_map([], |row| {
                Ok(InventoryEntry {
                    canonical_name: row.get(0)?,
                    quantity: row.get(1)?,
                })
            })?;
            rows.collect()
        })();
        entries.map_err(|e| self.classify(e))
    }

    fn last_mutation(&self) -> Result<Option<MutationRecord>, StoreError> {
        let conn = self.lock()?;
        undo_target(&conn).map_err(|e| self.classify(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    fn store() -> SqliteInventoryStore {
        SqliteInventoryStore::open_in_memory().unwrap()
    }

    #[test]
    fn test_add_remove_set() -> Result<(), StoreError> {
        let store = store();
        let record = store.add("salmon", 3)?;
        assert_eq!((record.previous_quantity, record.new_quantity), (0, 3));
        assert_eq!(record.operation_kind, MutationKind::Add);

        store.add("salmon", 2)?;
        assert_eq!(store.quantity("salmon")?, 5);

        store.remove("salmon", 2)?;
        assert_eq!(store.quantity("salmon")?, 3);

        store.set("steak", 7)?;
        assert_eq!(
            store.list_all()?,
            vec![
                InventoryEntry { canonical_name: "salmon".into(), quantity: 3 },
                InventoryEntry { canonical_name: "steak".into(), quantity: 7 },
            ]
        );
        Ok(())
    }

    #[test]
    fn test_remove_floors_at_zero_and_deletes_row() -> Result<(), StoreError> {
        let store = store();
        store.add("ice cream", 2)?;
        let record = store.remove("ice cream", 5)?;
        assert_eq!(record.new_quantity, 0);
        assert_eq!(store.quantity("ice cream")?, 0);
        assert!(store.list_all()?.is_empty());

        // absent item: still a recorded, undoable mutation
        let record = store.remove("steak", 1)?;
        assert_eq!((record.previous_quantity, record.new_quantity), (0, 0));
        Ok(())
    }

    #[test]
    fn test_set_zero_deletes_row() -> Result<(), StoreError> {
        let store = store();
        store.set("salmon", 4)?;
        store.set("salmon", 0)?;
        assert!(store.list_all()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_undo_is_single_step() -> Result<(), StoreError> {
        let store = store();
        assert!(store.undo()?.is_none());

        store.add("salmon", 3)?;
        store.add("salmon", 2)?;
        let last = store.last_mutation()?.expect("undo target");
        assert_eq!(last.new_quantity, 5);

        let undone = store.undo()?.expect("undone");
        assert_eq!(undone.id, last.id);
        assert_eq!(store.quantity("salmon")?, 3);

        // the earlier record is no longer an undo target
        assert!(store.undo()?.is_none());
        assert!(store.last_mutation()?.is_none());
        assert_eq!(store.quantity("salmon")?, 3);

        store.set("salmon", 9)?;
        assert!(store.undo()?.is_some());
        assert_eq!(store.quantity("salmon")?, 3);
        Ok(())
    }

    #[test]
    fn test_undo_of_first_add_deletes_row() -> Result<(), StoreError> {
        let store = store();
        store.add("steak", 2)?;
        store.undo()?;
        assert!(store.list_all()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_record_ids_are_monotonic() -> Result<(), StoreError> {
        let store = store();
        let first = store.add("steak", 1)?;
        store.undo()?;
        let second = store.add("steak", 1)?;
        assert!(second.id > first.id);
        assert_eq!(store.last_mutation()?, Some(second));
        Ok(())
    }

    #[test]
    fn test_restart_keeps_state_and_skips_migrations() -> Result<(), StoreError> {
        let file = NamedTempFile::new().unwrap();
        {
            let store = SqliteInventoryStore::open(file.path(), Duration::from_secs(5))?;
            store.add("chicken tenders", 3)?;
        }

        let store = SqliteInventoryStore::open(file.path(), Duration::from_secs(5))?;
        assert_eq!(store.applied_migrations()?.len(), MIGRATIONS.len());
        assert_eq!(store.quantity("chicken tenders")?, 3);
        assert!(store.undo()?.is_some());
        assert_eq!(store.quantity("chicken tenders")?, 0);
        Ok(())
    }

    #[test]
    fn test_locked_database_times_out_and_rolls_back() -> Result<(), StoreError> {
        let file = NamedTempFile::new().unwrap();
        let store = SqliteInventoryStore::open(file.path(), Duration::from_millis(50))?;
        let before = store.add("salmon", 3)?;

        let other = Connection::open(file.path())?;
        other.execute_batch("BEGIN IMMEDIATE;")?;

        match store.add("salmon", 2) {
            Err(StoreError::Timeout(timeout)) => assert_eq!(timeout, Duration::from_millis(50)),
            other => panic!("expected timeout, got {:?}", other),
        }
        assert!(matches!(store.undo(), Err(StoreError::Timeout(_))));

        other.execute_batch("ROLLBACK;")?;
        assert_eq!(store.quantity("salmon")?, 3);
        assert_eq!(store.last_mutation()?, Some(before));

        store.add("salmon", 2)?;
        assert_eq!(store.quantity("salmon")?, 5);
        Ok(())
    }

    #[test]
    fn test_concurrent_mutations_serialize() {
        let store = Arc::new(store());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        store.add("steak", 1).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.quantity("steak").unwrap(), 100);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(usize, u32),
        Remove(usize, u32),
        Set(usize, u32),
    }

    const ITEMS: [&str; 3] = ["salmon", "steak", "ice cream"];

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..3usize, 0..20u32).prop_map(|(i, q)| Op::Add(i, q)),
            (0..3usize, 0..20u32).prop_map(|(i, q)| Op::Remove(i, q)),
            (0..3usize, 0..20u32).prop_map(|(i, q)| Op::Set(i, q)),
        ]
    }

    fn apply(store: &SqliteInventoryStore, op: &Op) -> MutationRecord {
        match *op {
            Op::Add(i, q) => store.add(ITEMS[i], q),
            Op::Remove(i, q) => store.remove(ITEMS[i], q),
            Op::Set(i, q) => store.set(ITEMS[i], q),
        }
        .unwrap()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_matches_floored_model(ops in prop::collection::vec(op(), 1..30)) {
            let store = store();
            let mut model: HashMap<&str, i64> = HashMap::new();
            for op in &ops {
                apply(&store, op);
                match *op {
                    Op::Add(i, q) => *model.entry(ITEMS[i]).or_default() += i64::from(q),
                    Op::Remove(i, q) => {
                        let slot = model.entry(ITEMS[i]).or_default();
                        *slot = (*slot - i64::from(q)).max(0);
                    }
                    Op::Set(i, q) => { model.insert(ITEMS[i], i64::from(q)); }
                }
            }
            for item in ITEMS {
                let expected = model.get(item).copied().unwrap_or(0);
                prop_assert_eq!(i64::from(store.quantity(item).unwrap()), expected);
            }
            prop_assert!(store.list_all().unwrap().iter().all(|e| e.quantity > 0));
        }

        #[test]
        fn prop_undo_restores_exactly(history in prop::collection::vec(op(), 0..10), last in op()) {
            let store = store();
            for op in &history {
                apply(&store, op);
            }
            let before: Vec<u32> = ITEMS.iter().map(|i| store.quantity(i).unwrap()).collect();

            apply(&store, &last);
            prop_assert!(store.undo().unwrap().is_some());

            let after: Vec<u32> = ITEMS.iter().map(|i| store.quantity(i).unwrap()).collect();
            prop_assert_eq!(before, after);
            prop_assert!(store.undo().unwrap().is_none());
        }
    }
}
