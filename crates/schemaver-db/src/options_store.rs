use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, params};
use schemaver_common::{Error, Result};
use schemaver_security::IdentifierValidator;
use tracing::debug;

/// The host's key/value configuration table.
pub trait OptionsStore {
    fn get_option(&self, name: &str) -> Result<Option<String>>;
    fn set_option(&self, name: &str, value: &str) -> Result<()>;
    fn delete_option(&self, name: &str) -> Result<()>;

    /// Run `work` so that every write it makes through this store lands or
    /// none does. Stores without transactions just run it.
    fn atomically(&self, work: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        work()
    }
}

/// Options stored in a `{prefix}options` table on the host's connection.
///
/// Statements run by `atomically` on the same connection share its
/// transaction, so migration DDL and the version record commit together.
pub struct SqliteOptionsStore<'c> {
    conn: &'c Connection,
    table: String,
    exists: bool,
}

impl<'c> SqliteOptionsStore<'c> {
    /// Bind to `conn`, creating the options table if it does not exist yet.
    pub fn open(conn: &'c Connection, table_prefix: &str) -> Result<Self> {
        IdentifierValidator::validate_table_prefix(table_prefix)?;
        let table = format!("{table_prefix}options");

        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                name TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );"
        ))
        .map_err(|e| Error::Persistence(format!("failed to create {table}: {e}")))?;
        debug!("options table {table} ready");

        Ok(Self {
            conn,
            table,
            exists: true,
        })
    }

    /// Bind to `conn` without creating anything. Works on read-only
    /// connections; a missing options table reads as empty.
    pub fn attach(conn: &'c Connection, table_prefix: &str) -> Result<Self> {
        IdentifierValidator::validate_table_prefix(table_prefix)?;
        let table = format!("{table_prefix}options");

        let exists = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
                |row| row.get::<_, i64>(0),
            )
            .map_err(|e| Error::Persistence(format!("failed to inspect {table}: {e}")))?
            > 0;
        if !exists {
            debug!("options table {table} does not exist yet");
        }

        Ok(Self {
            conn,
            table,
            exists,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

impl OptionsStore for SqliteOptionsStore<'_> {
    fn get_option(&self, name: &str) -> Result<Option<String>> {
        if !self.exists {
            return Ok(None);
        }
        self.conn
            .query_row(
                &format!("SELECT value FROM {} WHERE name = ?1", self.table),
                params![name],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::Persistence(format!("failed to read option {name}: {e}")))
    }

    fn set_option(&self, name: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                &format!(
                    "INSERT INTO {} (name, value) VALUES (?1, ?2)
                     ON CONFLICT(name) DO UPDATE SET value = excluded.value",
                    self.table
                ),
                params![name, value],
            )
            .map_err(|e| Error::Persistence(format!("failed to write option {name}: {e}")))?;
        Ok(())
    }

    fn delete_option(&self, name: &str) -> Result<()> {
        self.conn
            .execute(
                &format!("DELETE FROM {} WHERE name = ?1", self.table),
                params![name],
            )
            .map_err(|e| Error::Persistence(format!("failed to delete option {name}: {e}")))?;
        Ok(())
    }

    fn atomically(&self, work: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| Error::Persistence(format!("failed to begin transaction: {e}")))?;
        work()?;
        tx.commit()
            .map_err(|e| Error::Persistence(format!("failed to commit transaction: {e}")))
    }
}

/// In-process options store. Clones share the same values.
///
/// `set_unreachable(true)` makes every call fail with a persistence error.
#[derive(Clone, Default)]
pub struct MemoryOptionsStore {
    values: Arc<Mutex<BTreeMap<String, String>>>,
    unreachable: Arc<AtomicBool>,
}

impl MemoryOptionsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    fn values(&self) -> Result<MutexGuard<'_, BTreeMap<String, String>>> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(Error::Persistence("options store unreachable".into()));
        }
        self.values
            .lock()
            .map_err(|_| Error::Persistence("options store lock poisoned".into()))
    }
}

impl OptionsStore for MemoryOptionsStore {
    fn get_option(&self, name: &str) -> Result<Option<String>> {
        Ok(self.values()?.get(name).cloned())
    }

    fn set_option(&self, name: &str, value: &str) -> Result<()> {
        self.values()?.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn delete_option(&self, name: &str) -> Result<()> {
        self.values()?.remove(name);
        Ok(())
    }
}
