use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use schemaver_common::{Error, Result, SchemaVersion};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::version_store::VersionStore;

type ApplyFn<C> = Box<dyn Fn(&C) -> Result<()>>;

/// A single forward schema transformation.
///
/// Each migration has a target version and an apply function that receives
/// the host's connection. Migrations are applied in ascending version order
/// and the version store is advanced after each one succeeds. When the
/// version store lives on the same SQLite connection, the apply function
/// already runs inside a transaction and must not begin its own.
pub struct Migration<C = Connection> {
    pub version: SchemaVersion,
    pub name: String,
    apply: ApplyFn<C>,
}

impl<C> Migration<C> {
    pub fn new(
        version: SchemaVersion,
        name: impl Into<String>,
        apply: impl Fn(&C) -> Result<()> + 'static,
    ) -> Self {
        Self {
            version,
            name: name.into(),
            apply: Box::new(apply),
        }
    }

    pub fn apply(&self, conn: &C) -> Result<()> {
        (self.apply)(conn)
    }
}

impl Migration<Connection> {
    /// A migration that executes `sql` as one batch inside a transaction.
    pub fn sql(version: SchemaVersion, name: impl Into<String>, sql: impl Into<String>) -> Self {
        let sql = sql.into();
        Self::new(version, name, move |conn: &Connection| {
            execute_in_transaction(conn, &sql)
        })
    }
}

impl<C> fmt::Debug for Migration<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("version", &self.version)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Run `sql` as one batch, in its own transaction unless one is already open.
pub(crate) fn execute_in_transaction(conn: &Connection, sql: &str) -> Result<()> {
    if !conn.is_autocommit() {
        return conn
            .execute_batch(sql)
            .map_err(|e| Error::Database(e.to_string()));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::Database(format!("failed to begin transaction: {e}")))?;
    tx.execute_batch(sql)
        .map_err(|e| Error::Database(e.to_string()))?;
    tx.commit()
        .map_err(|e| Error::Database(format!("failed to commit transaction: {e}")))?;
    Ok(())
}

/// A step that was applied and recorded during a run.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AppliedStep {
    pub version: SchemaVersion,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// Applies pending migrations in order, recording each version as it lands.
pub struct MigrationRunner<'s, S: ?Sized> {
    store: &'s S,
}

impl<'s, S: VersionStore + ?Sized> MigrationRunner<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// The steps `run` would apply, in application order. No side effects.
    pub fn plan<'m, C>(
        &self,
        current: SchemaVersion,
        target: SchemaVersion,
        steps: &'m [Migration<C>],
    ) -> Result<Vec<&'m Migration<C>>> {
        if target < current {
            warn!(
                current,
                target_version = target,
                "target is below the current schema version, downgrades are not supported"
            );
            return Ok(Vec::new());
        }
        if target == current || steps.is_empty() {
            return Ok(Vec::new());
        }

        let mut seen = BTreeSet::new();
        for step in steps {
            if !seen.insert(step.version) {
                return Err(Error::InvalidPlan(format!(
                    "duplicate migration version {}",
                    step.version
                )));
            }
        }

        let mut pending: Vec<_> = steps
            .iter()
            .filter(|step| step.version > current && step.version <= target)
            .collect();
        pending.sort_by_key(|step| step.version);
        Ok(pending)
    }

    /// Bring the schema from `current` to `target` and return the version now
    /// recorded in the store.
    pub fn run<C>(
        &self,
        conn: &C,
        current: SchemaVersion,
        target: SchemaVersion,
        steps: &[Migration<C>],
    ) -> Result<SchemaVersion> {
        let applied = self.apply_pending(conn, current, target, steps)?;
        Ok(applied.last().map(|step| step.version).unwrap_or(current))
    }

    /// Like `run`, but returns every step that was applied.
    ///
    /// Each step and its version write go through `VersionStore::atomically`,
    /// so a store sharing the step's connection commits both or neither.
    /// Stops at the first failing step. Versions recorded before the failure
    /// stay recorded and nothing is retried.
    pub fn apply_pending<C>(
        &self,
        conn: &C,
        current: SchemaVersion,
        target: SchemaVersion,
        steps: &[Migration<C>],
    ) -> Result<Vec<AppliedStep>> {
        let pending = self.plan(current, target, steps)?;
        if pending.is_empty() {
            debug!(current, target_version = target, "schema is up to date");
            return Ok(Vec::new());
        }

        let mut last_applied = current;
        let mut applied = Vec::with_capacity(pending.len());
        for step in pending {
            debug!(version = step.version, name = %step.name, "applying migration");
            self.store.atomically(&mut || {
                step.apply(conn)
                    .map_err(|cause| Error::migration(step.version, last_applied, cause))?;
                self.store.write(step.version)
            })?;
            last_applied = step.version;

            info!(version = step.version, name = %step.name, "migration applied");
            applied.push(AppliedStep {
                version: step.version,
                name: step.name.clone(),
                applied_at: Utc::now(),
            });
        }
        Ok(applied)
    }
}
