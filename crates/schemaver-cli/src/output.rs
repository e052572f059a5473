use std::fmt::Write;

use schemaver_db::{MigrationReport, MigrationStatus};

/// Human-readable summary for `schemaver status`.
pub fn format_status(status: &MigrationStatus) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "  Current version   {}", version_label(status.current));
    let _ = writeln!(out, "  Target version    {}", version_label(status.target));

    if status.pending.is_empty() {
        let _ = writeln!(out, "  Pending           none");
    } else {
        let _ = writeln!(out, "  Pending           {}", status.pending.len());
        for step in &status.pending {
            let _ = writeln!(out, "    {:>4}  {}", step.version, step.name);
        }
    }
    out
}

/// What a `--dry-run` would apply.
pub fn format_plan(status: &MigrationStatus) -> String {
    if status.pending.is_empty() {
        return format!(
            "Nothing to apply, schema is at version {}.\n",
            status.current
        );
    }

    let mut out = format!(
        "Would migrate from version {} to {}:\n",
        status.current,
        status.pending.last().map(|s| s.version).unwrap_or(status.current)
    );
    for step in &status.pending {
        let _ = writeln!(out, "  {:>4}  {}", step.version, step.name);
    }
    out
}

pub fn format_report(report: &MigrationReport) -> String {
    if report.is_noop() {
        return format!("Schema is up to date at version {}.\n", report.to);
    }

    let count = report.applied.len();
    let mut out = format!(
        "Applied {count} migration{} ({} -> {}):\n",
        if count == 1 { "" } else { "s" },
        report.from,
        report.to
    );
    for step in &report.applied {
        let _ = writeln!(
            out,
            "  {:>4}  {}  ({})",
            step.version,
            step.name,
            step.applied_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    out
}

fn version_label(version: u32) -> String {
    if version == 0 {
        "0 (not installed)".to_string()
    } else {
        version.to_string()
    }
}
