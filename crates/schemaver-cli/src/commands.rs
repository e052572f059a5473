use std::path::PathBuf;

use anyhow::{Context, Result};
use rusqlite::{Connection, OpenFlags};
use schemaver_common::SchemaVersion;
use schemaver_config::{AppConfig, ConfigLoader};
use schemaver_db::{OptionVersionStore, SchemaManager, SqliteOptionsStore, load_sql_migrations};
use tracing::{debug, info};

use crate::{output, prompt};

type SqliteManager<'c> = SchemaManager<OptionVersionStore<SqliteOptionsStore<'c>>>;

/// `ReadOnly` never creates the database file or the options table.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Access {
    ReadOnly,
    ReadWrite,
}

/// Config file values with command-line overrides applied.
#[derive(Debug)]
pub struct Settings {
    pub config: AppConfig,
}

impl Settings {
    pub fn resolve(
        config_path: Option<PathBuf>,
        database: Option<PathBuf>,
        migrations: Option<PathBuf>,
    ) -> Result<Self> {
        let path = config_path.unwrap_or_else(ConfigLoader::default_config_path);
        let mut config = ConfigLoader::load(&path)
            .with_context(|| format!("failed to load config {}", path.display()))?;

        if let Some(database) = database {
            config.database.path = database;
        }
        if let Some(migrations) = migrations {
            config.migrations.dir = migrations;
        }
        Ok(Self { config })
    }

    fn open_database(&self, access: Access) -> Result<Connection> {
        let path = &self.config.database.path;
        let conn = match access {
            Access::ReadWrite => {
                info!("opening database at {}", path.display());
                Connection::open(path)
            }
            Access::ReadOnly if !path.exists() => {
                debug!("{} does not exist, reading as empty", path.display());
                Connection::open_in_memory()
            }
            Access::ReadOnly => {
                debug!("opening database at {} read-only", path.display());
                Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            }
        };
        conn.with_context(|| format!("failed to open database {}", path.display()))
    }

    fn manager<'c>(
        &self,
        conn: &'c Connection,
        target: Option<SchemaVersion>,
        access: Access,
    ) -> Result<SqliteManager<'c>> {
        let prefix = &self.config.database.table_prefix;
        let set = load_sql_migrations(&self.config.migrations.dir, prefix).with_context(|| {
            format!(
                "failed to load migrations from {}",
                self.config.migrations.dir.display()
            )
        })?;
        let options = match access {
            Access::ReadWrite => SqliteOptionsStore::open(conn, prefix)?,
            Access::ReadOnly => SqliteOptionsStore::attach(conn, prefix)?,
        };
        let store = OptionVersionStore::new(options, self.config.migrations.version_key.clone());

        let mut manager = SchemaManager::new(store, set.steps);
        if let Some(target) = target.or(self.config.migrations.target) {
            manager = manager.with_target(target);
        }
        if let Some(sql) = set.uninstall_sql {
            manager = manager.with_uninstall_sql(sql);
        }
        Ok(manager)
    }
}

pub fn status(settings: &Settings, json: bool) -> Result<()> {
    print!("{}", render_status(settings, json)?);
    Ok(())
}

fn render_status(settings: &Settings, json: bool) -> Result<String> {
    let conn = settings.open_database(Access::ReadOnly)?;
    let status = settings.manager(&conn, None, Access::ReadOnly)?.status()?;

    if json {
        Ok(format!("{}\n", serde_json::to_string_pretty(&status)?))
    } else {
        Ok(output::format_status(&status))
    }
}

/// Print what would be applied without writing anything.
fn preview(settings: &Settings, target: Option<SchemaVersion>) -> Result<()> {
    let conn = settings.open_database(Access::ReadOnly)?;
    let status = settings.manager(&conn, target, Access::ReadOnly)?.status()?;
    print!("{}", output::format_plan(&status));
    Ok(())
}

pub fn install(settings: &Settings, dry_run: bool) -> Result<()> {
    if dry_run {
        return preview(settings, None);
    }
    let conn = settings.open_database(Access::ReadWrite)?;
    let manager = settings.manager(&conn, None, Access::ReadWrite)?;
    let report = manager.on_install(&conn).context("install failed")?;
    print!("{}", output::format_report(&report));
    Ok(())
}

pub fn upgrade(settings: &Settings, dry_run: bool, target: Option<SchemaVersion>) -> Result<()> {
    if dry_run {
        return preview(settings, target);
    }
    let conn = settings.open_database(Access::ReadWrite)?;
    let manager = settings.manager(&conn, target, Access::ReadWrite)?;
    let report = manager.on_upgrade(&conn).context("upgrade failed")?;
    print!("{}", output::format_report(&report));
    Ok(())
}

pub fn uninstall(settings: &Settings, yes: bool) -> Result<()> {
    let database = &settings.config.database.path;
    if !yes && !prompt::confirm_uninstall(database)? {
        println!("Uninstall cancelled.");
        return Ok(());
    }

    let conn = settings.open_database(Access::ReadWrite)?;
    settings
        .manager(&conn, None, Access::ReadWrite)?
        .on_uninstall(&conn)
        .context("uninstall failed")?;
    println!("Uninstalled schema from {}", database.display());
    Ok(())
}
