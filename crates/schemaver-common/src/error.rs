use thiserror::Error;

use crate::SchemaVersion;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    /// A step's apply failed. `last_applied` is the version still recorded in
    /// the version store.
    #[error("migration to version {failed_at} failed (schema left at version {last_applied}): {cause}")]
    Migration {
        failed_at: SchemaVersion,
        last_applied: SchemaVersion,
        #[source]
        cause: Box<Error>,
    },

    #[error("invalid migration plan: {0}")]
    InvalidPlan(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn migration(failed_at: SchemaVersion, last_applied: SchemaVersion, cause: Error) -> Self {
        Self::Migration {
            failed_at,
            last_applied,
            cause: Box::new(cause),
        }
    }

    /// The step version that failed, if this is a migration failure.
    pub fn failed_at(&self) -> Option<SchemaVersion> {
        match self {
            Self::Migration { failed_at, .. } => Some(*failed_at),
            _ => None,
        }
    }
}
