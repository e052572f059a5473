use std::fs;
use std::path::Path;

use rusqlite::Connection;
use schemaver_common::{Error, Result, SchemaVersion};
use schemaver_security::IdentifierValidator;
use tracing::{debug, info};

use crate::migrations::Migration;

const UNINSTALL_FILE: &str = "uninstall.sql";
const PREFIX_PLACEHOLDER: &str = "{prefix}";

/// Migrations read from a directory of `{version}_{name}.sql` files.
#[derive(Debug, Default)]
pub struct SqlMigrationSet {
    pub steps: Vec<Migration<Connection>>,
    /// Contents of `uninstall.sql`, if present.
    pub uninstall_sql: Option<String>,
}

/// Load every `.sql` file in `dir`, substituting `{prefix}` with `table_prefix`.
///
/// A missing directory yields an empty set. Steps are returned sorted by version.
pub fn load_sql_migrations(dir: &Path, table_prefix: &str) -> Result<SqlMigrationSet> {
    IdentifierValidator::validate_table_prefix(table_prefix)?;

    if !dir.exists() {
        debug!("migrations directory {} does not exist", dir.display());
        return Ok(SqlMigrationSet::default());
    }

    let entries = fs::read_dir(dir).map_err(|e| {
        Error::Config(format!(
            "failed to read migrations directory {}: {e}",
            dir.display()
        ))
    })?;

    let mut set = SqlMigrationSet::default();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|s| s.to_str()) != Some("sql") {
            continue;
        }

        let sql = fs::read_to_string(&path)?.replace(PREFIX_PLACEHOLDER, table_prefix);
        let file_name = path.file_name().and_then(|s| s.to_str()).unwrap_or_default();
        if file_name == UNINSTALL_FILE {
            set.uninstall_sql = Some(sql);
            continue;
        }

        let stem = path.file_stem().and_then(|s| s.to_str()).ok_or_else(|| {
            Error::InvalidPlan(format!("invalid migration filename: {}", path.display()))
        })?;
        let (version, name) = parse_file_stem(stem)?;
        set.steps.push(Migration::sql(version, name, sql));
    }

    set.steps.sort_by_key(|step| step.version);
    info!(
        "loaded {} migration(s) from {}",
        set.steps.len(),
        dir.display()
    );
    Ok(set)
}

fn parse_file_stem(stem: &str) -> Result<(SchemaVersion, String)> {
    let (version, name) = stem.split_once('_').ok_or_else(|| {
        Error::InvalidPlan(format!(
            "migration filename must follow {{version}}_{{name}}.sql: {stem}"
        ))
    })?;

    let version: SchemaVersion = version
        .parse()
        .map_err(|_| Error::InvalidPlan(format!("invalid version in migration filename: {stem}")))?;
    if version == 0 {
        return Err(Error::InvalidPlan(format!(
            "migration versions start at 1: {stem}"
        )));
    }
    if name.is_empty() {
        return Err(Error::InvalidPlan(format!("migration name is empty: {stem}")));
    }

    Ok((version, name.replace('_', " ")))
}
