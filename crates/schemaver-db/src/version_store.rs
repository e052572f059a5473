use schemaver_common::{Error, Result, SchemaVersion};

use crate::options_store::OptionsStore;

/// Persisted record of the currently applied schema version.
pub trait VersionStore {
    /// The recorded version, or `0` if nothing has been recorded.
    fn read(&self) -> Result<SchemaVersion>;
    /// Atomically record `version`. On error the version must be assumed unchanged.
    fn write(&self, version: SchemaVersion) -> Result<()>;
    /// Remove the record entirely.
    fn clear(&self) -> Result<()>;

    /// Run `work` (a step plus its `write`, or an uninstall plus `clear`) as
    /// one unit when the backing store can, so the record never disagrees
    /// with the schema it describes.
    fn atomically(&self, work: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        work()
    }
}

/// Stores the schema version as a single option in an [`OptionsStore`].
pub struct OptionVersionStore<S> {
    options: S,
    key: String,
}

impl<S: OptionsStore> OptionVersionStore<S> {
    pub fn new(options: S, key: impl Into<String>) -> Self {
        Self {
            options,
            key: key.into(),
        }
    }

    pub fn options(&self) -> &S {
        &self.options
    }
}

impl<S: OptionsStore> VersionStore for OptionVersionStore<S> {
    fn read(&self) -> Result<SchemaVersion> {
        match self.options.get_option(&self.key)? {
            None => Ok(0),
            Some(raw) => raw.trim().parse().map_err(|_| {
                Error::Persistence(format!(
                    "option {} holds '{raw}', expected a non-negative integer",
                    self.key
                ))
            }),
        }
    }

    fn write(&self, version: SchemaVersion) -> Result<()> {
        self.options.set_option(&self.key, &version.to_string())
    }

    fn clear(&self) -> Result<()> {
        self.options.delete_option(&self.key)
    }

    fn atomically(&self, work: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        self.options.atomically(work)
    }
}
