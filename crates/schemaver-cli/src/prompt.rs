use std::io::IsTerminal;
use std::path::Path;

use anyhow::{Context, Result, bail};
use dialoguer::Confirm;

/// Ask before dropping tables. Refuses outright when stdin is not a terminal.
pub fn confirm_uninstall(database: &Path) -> Result<bool> {
    if !std::io::stdin().is_terminal() {
        bail!(
            "refusing to uninstall from {} without confirmation; pass --yes in non-interactive environments",
            database.display()
        );
    }

    Confirm::new()
        .with_prompt(format!(
            "Run uninstall.sql and delete the schema version record in {}?",
            database.display()
        ))
        .default(false)
        .interact()
        .context("confirmation cancelled")
}
