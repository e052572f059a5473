use rusqlite::Connection;
use schemaver_common::{Result, SchemaVersion};
use serde::Serialize;
use tracing::{info, warn};

use crate::migrations::{AppliedStep, Migration, MigrationRunner, execute_in_transaction};
use crate::version_store::VersionStore;

type UninstallFn<C> = Box<dyn Fn(&C) -> Result<()>>;

/// Outcome of an install or upgrade.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MigrationReport {
    pub from: SchemaVersion,
    pub to: SchemaVersion,
    pub applied: Vec<AppliedStep>,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PendingStep {
    pub version: SchemaVersion,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MigrationStatus {
    pub current: SchemaVersion,
    pub target: SchemaVersion,
    pub pending: Vec<PendingStep>,
}

/// Explicit install/upgrade/uninstall entry points for a host application.
///
/// The host decides when each is called. The manager never owns the
/// connection; it is passed in on every call.
pub struct SchemaManager<S, C = Connection> {
    store: S,
    steps: Vec<Migration<C>>,
    target: Option<SchemaVersion>,
    uninstall: Option<UninstallFn<C>>,
}

impl<S: VersionStore, C> SchemaManager<S, C> {
    pub fn new(store: S, steps: Vec<Migration<C>>) -> Self {
        Self {
            store,
            steps,
            target: None,
            uninstall: None,
        }
    }

    /// Pin the target version instead of using the highest step.
    pub fn with_target(mut self, target: SchemaVersion) -> Self {
        self.target = Some(target);
        self
    }

    /// Run `uninstall` (e.g. drop custom tables) before the version record is removed.
    pub fn with_uninstall(mut self, uninstall: impl Fn(&C) -> Result<()> + 'static) -> Self {
        self.uninstall = Some(Box::new(uninstall));
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn target(&self) -> SchemaVersion {
        self.target
            .unwrap_or_else(|| self.steps.iter().map(|s| s.version).max().unwrap_or(0))
    }

    pub fn status(&self) -> Result<MigrationStatus> {
        let current = self.store.read()?;
        let target = self.target();
        let pending = MigrationRunner::new(&self.store)
            .plan(current, target, &self.steps)?
            .into_iter()
            .map(|step| PendingStep {
                version: step.version,
                name: step.name.clone(),
            })
            .collect();
        Ok(MigrationStatus {
            current,
            target,
            pending,
        })
    }

    /// First activation. Behaves like an upgrade when a version is already recorded.
    pub fn on_install(&self, conn: &C) -> Result<MigrationReport> {
        let current = self.store.read()?;
        if current == 0 {
            info!(target_version = self.target(), "installing schema");
        } else {
            info!(current, "schema already installed, checking for upgrades");
        }
        self.migrate(conn, current)
    }

    pub fn on_upgrade(&self, conn: &C) -> Result<MigrationReport> {
        let current = self.store.read()?;
        self.migrate(conn, current)
    }

    /// Run the uninstall hook and delete the version record as one unit.
    pub fn on_uninstall(&self, conn: &C) -> Result<()> {
        self.store.atomically(&mut || {
            if let Some(uninstall) = &self.uninstall {
                uninstall(conn)?;
            }
            self.store.clear()
        })?;
        info!("schema uninstalled");
        Ok(())
    }

    fn migrate(&self, conn: &C, current: SchemaVersion) -> Result<MigrationReport> {
        let target = self.target();
        let applied =
            MigrationRunner::new(&self.store).apply_pending(conn, current, target, &self.steps)?;
        let to = applied.last().map(|step| step.version).unwrap_or(current);

        if to < target {
            warn!(
                to,
                target_version = target,
                "no migration steps available to reach target version"
            );
        }
        Ok(MigrationReport {
            from: current,
            to,
            applied,
        })
    }
}

impl<S: VersionStore> SchemaManager<S, Connection> {
    /// Execute `sql` in a transaction on uninstall.
    pub fn with_uninstall_sql(self, sql: impl Into<String>) -> Self {
        let sql = sql.into();
        self.with_uninstall(move |conn: &Connection| execute_in_transaction(conn, &sql))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::options_store::{MemoryOptionsStore, OptionsStore, SqliteOptionsStore};
    use crate::version_store::OptionVersionStore;
    use schemaver_common::Error;

    /// SQLite options that drop the nth write (counting from 1) or the next delete.
    struct DroppedWrites<'c> {
        inner: SqliteOptionsStore<'c>,
        fail_write: Cell<u32>,
        fail_delete: Cell<bool>,
    }

    impl<'c> DroppedWrites<'c> {
        fn new(conn: &'c Connection, fail_write: u32) -> Self {
            Self {
                inner: SqliteOptionsStore::open(conn, "").unwrap(),
                fail_write: Cell::new(fail_write),
                fail_delete: Cell::new(false),
            }
        }
    }

    impl OptionsStore for DroppedWrites<'_> {
        fn get_option(&self, name: &str) -> Result<Option<String>> {
            self.inner.get_option(name)
        }

        fn set_option(&self, name: &str, value: &str) -> Result<()> {
            match self.fail_write.get() {
                0 => self.inner.set_option(name, value),
                1 => {
                    self.fail_write.set(0);
                    Err(Error::Persistence("write dropped".into()))
                }
                n => {
                    self.fail_write.set(n - 1);
                    self.inner.set_option(name, value)
                }
            }
        }

        fn delete_option(&self, name: &str) -> Result<()> {
            if self.fail_delete.replace(false) {
                return Err(Error::Persistence("delete dropped".into()));
            }
            self.inner.delete_option(name)
        }

        fn atomically(&self, work: &mut dyn FnMut() -> Result<()>) -> Result<()> {
            self.inner.atomically(work)
        }
    }

    fn books_steps() -> Vec<Migration> {
        vec![
            Migration::sql(
                1,
                "create books",
                "CREATE TABLE books (id INTEGER PRIMARY KEY, title TEXT NOT NULL);",
            ),
            Migration::sql(2, "add isbn", "ALTER TABLE books ADD COLUMN isbn TEXT;"),
        ]
    }

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get::<_, i64>(0),
        )
        .unwrap()
            > 0
    }

    #[test]
    fn install_applies_everything_then_upgrade_is_noop() {
        let conn = Connection::open_in_memory().unwrap();
        let options = SqliteOptionsStore::open(&conn, "").unwrap();
        let manager = SchemaManager::new(
            OptionVersionStore::new(options, "schema_version"),
            books_steps(),
        );

        let report = manager.on_install(&conn).unwrap();
        assert_eq!(report.from, 0);
        assert_eq!(report.to, 2);
        assert_eq!(report.applied.len(), 2);
        assert_eq!(manager.store().read().unwrap(), 2);

        let again = manager.on_upgrade(&conn).unwrap();
        assert!(again.is_noop());
        assert_eq!(again.to, 2);
    }

    #[test]
    fn upgrade_picks_up_newly_added_steps() {
        let conn = Connection::open_in_memory().unwrap();
        let options = SqliteOptionsStore::open(&conn, "").unwrap();
        let store = OptionVersionStore::new(options, "schema_version");
        let mut steps = books_steps();
        steps.truncate(1);
        SchemaManager::new(store, steps).on_install(&conn).unwrap();

        let options = SqliteOptionsStore::open(&conn, "").unwrap();
        let manager = SchemaManager::new(
            OptionVersionStore::new(options, "schema_version"),
            books_steps(),
        );
        let status = manager.status().unwrap();
        assert_eq!(status.current, 1);
        assert_eq!(status.target, 2);
        assert_eq!(
            status.pending,
            vec![PendingStep {
                version: 2,
                name: "add isbn".into()
            }]
        );

        let report = manager.on_upgrade(&conn).unwrap();
        assert_eq!((report.from, report.to), (1, 2));
        conn.execute("INSERT INTO books (title, isbn) VALUES ('Dune', '978')", [])
            .unwrap();
    }

    #[test]
    fn pinned_target_stops_early() {
        let conn = Connection::open_in_memory().unwrap();
        let store = OptionVersionStore::new(MemoryOptionsStore::new(), "schema_version");
        let manager = SchemaManager::new(store, books_steps()).with_target(1);

        let report = manager.on_install(&conn).unwrap();
        assert_eq!(report.to, 1);
        assert!(manager.status().unwrap().pending.is_empty());
    }

    #[test]
    fn failed_upgrade_reports_last_good_version() {
        let conn = Connection::open_in_memory().unwrap();
        let store = OptionVersionStore::new(MemoryOptionsStore::new(), "schema_version");
        let mut steps = books_steps();
        steps.push(Migration::sql(3, "broken", "ALTER TABLE missing ADD COLUMN x TEXT;"));
        let manager = SchemaManager::new(store, steps);

        let err = manager.on_install(&conn).unwrap_err();
        match err {
            Error::Migration {
                failed_at,
                last_applied,
                ..
            } => assert_eq!((failed_at, last_applied), (3, 2)),
            other => panic!("expected migration error, got {other:?}"),
        }
        assert_eq!(manager.store().read().unwrap(), 2);
    }

    #[test]
    fn uninstall_drops_tables_and_clears_version() {
        let conn = Connection::open_in_memory().unwrap();
        let options = SqliteOptionsStore::open(&conn, "").unwrap();
        let manager = SchemaManager::new(
            OptionVersionStore::new(options, "schema_version"),
            books_steps(),
        )
        .with_uninstall_sql("DROP TABLE IF EXISTS books;");

        manager.on_install(&conn).unwrap();
        assert!(table_exists(&conn, "books"));

        manager.on_uninstall(&conn).unwrap();
        assert!(!table_exists(&conn, "books"));
        assert!(
            manager
                .store()
                .options()
                .get_option("schema_version")
                .unwrap()
                .is_none()
        );
        assert_eq!(manager.status().unwrap().current, 0);
    }

    #[test]
    fn dropped_version_write_rolls_back_its_step_and_retry_succeeds() {
        let conn = Connection::open_in_memory().unwrap();
        let manager = SchemaManager::new(
            OptionVersionStore::new(DroppedWrites::new(&conn, 2), "schema_version"),
            books_steps(),
        );

        let err = manager.on_install(&conn).unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
        assert_eq!(manager.store().read().unwrap(), 1);
        assert!(conn.prepare("SELECT isbn FROM books").is_err());
        assert!(conn.is_autocommit());

        let report = manager.on_upgrade(&conn).unwrap();
        assert_eq!((report.from, report.to), (1, 2));
        assert_eq!(manager.store().read().unwrap(), 2);
        conn.execute("INSERT INTO books (title, isbn) VALUES ('Dune', '978')", [])
            .unwrap();
    }

    #[test]
    fn failing_step_on_shared_connection_leaves_no_partial_changes() {
        let conn = Connection::open_in_memory().unwrap();
        let options = SqliteOptionsStore::open(&conn, "").unwrap();
        let mut steps = books_steps();
        steps.push(Migration::sql(
            3,
            "half done",
            "CREATE TABLE authors (id INTEGER PRIMARY KEY); ALTER TABLE missing ADD COLUMN x TEXT;",
        ));
        let manager =
            SchemaManager::new(OptionVersionStore::new(options, "schema_version"), steps);

        let err = manager.on_install(&conn).unwrap_err();
        assert_eq!(err.failed_at(), Some(3));
        assert_eq!(manager.store().read().unwrap(), 2);
        assert!(!table_exists(&conn, "authors"));
        assert!(table_exists(&conn, "books"));
    }

    #[test]
    fn dropped_clear_keeps_tables_and_version_together() {
        let conn = Connection::open_in_memory().unwrap();
        let manager = SchemaManager::new(
            OptionVersionStore::new(DroppedWrites::new(&conn, 0), "schema_version"),
            books_steps(),
        )
        .with_uninstall_sql("DROP TABLE IF EXISTS books;");
        manager.on_install(&conn).unwrap();

        manager.store().options().fail_delete.set(true);
        assert!(manager.on_uninstall(&conn).is_err());
        assert!(table_exists(&conn, "books"));
        assert_eq!(manager.store().read().unwrap(), 2);

        manager.on_uninstall(&conn).unwrap();
        assert!(!table_exists(&conn, "books"));
        assert_eq!(manager.store().read().unwrap(), 0);
    }

    #[test]
    fn unreachable_store_fails_install_before_any_step() {
        let conn = Connection::open_in_memory().unwrap();
        let options = MemoryOptionsStore::new();
        options.set_unreachable(true);
        let manager = SchemaManager::new(
            OptionVersionStore::new(options, "schema_version"),
            books_steps(),
        );

        assert!(matches!(manager.on_install(&conn), Err(Error::Persistence(_))));
        assert!(!table_exists(&conn, "books"));
    }

    #[test]
    fn empty_manager_targets_zero() {
        let store = OptionVersionStore::new(MemoryOptionsStore::new(), "schema_version");
        let manager: SchemaManager<_, ()> = SchemaManager::new(store, Vec::new());
        assert_eq!(manager.target(), 0);
        assert!(manager.on_upgrade(&()).unwrap().is_noop());
    }
}
