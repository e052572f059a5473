pub mod manager;
pub mod migrations;
pub mod options_store;
pub mod sql_source;
pub mod version_store;

pub use manager::{MigrationReport, MigrationStatus, PendingStep, SchemaManager};
pub use migrations::{AppliedStep, Migration, MigrationRunner};
pub use options_store::{MemoryOptionsStore, OptionsStore, SqliteOptionsStore};
pub use sql_source::{SqlMigrationSet, load_sql_migrations};
pub use version_store::{OptionVersionStore, VersionStore};
