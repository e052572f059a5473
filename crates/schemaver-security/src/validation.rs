use std::sync::LazyLock;

use regex::Regex;
use schemaver_common::{Error, Result};

const MAX_PREFIX_LEN: usize = 32;
const MAX_OPTION_NAME_LEN: usize = 191;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]*$").expect("static identifier regex"));

/// Validation for names that end up spliced into SQL text.
///
/// Table prefixes are substituted into migration files verbatim, so they must
/// never contain anything but ASCII identifier characters.
pub struct IdentifierValidator;

impl IdentifierValidator {
    /// Validate a table prefix. An empty prefix is allowed.
    pub fn validate_table_prefix(prefix: &str) -> Result<()> {
        if prefix.len() > MAX_PREFIX_LEN {
            return Err(Error::Validation(format!(
                "table prefix too long (max {MAX_PREFIX_LEN} characters)"
            )));
        }
        if !IDENTIFIER.is_match(prefix) {
            return Err(Error::Validation(format!(
                "table prefix '{prefix}' may only contain letters, digits, and underscores"
            )));
        }
        Ok(())
    }

    /// Validate the name of an option in the host's options table.
    pub fn validate_option_name(name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::Validation("option name cannot be empty".into()));
        }
        if name.len() > MAX_OPTION_NAME_LEN {
            return Err(Error::Validation("option name too long".into()));
        }
        if !IDENTIFIER.is_match(name) {
            return Err(Error::Validation(format!(
                "option name '{name}' may only contain letters, digits, and underscores"
            )));
        }
        Ok(())
    }
}
