use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;

mod commands;
mod logging;
mod output;
mod prompt;

use commands::Settings;

#[derive(Parser)]
#[command(name = "schemaver")]
#[command(about = "Track and apply versioned schema migrations for SQLite tables")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (YAML or TOML). Defaults to ~/.schemaver/config.yml
    #[arg(short, long, global = true, env = "SCHEMAVER_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database file, overrides `database.path`
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Directory of `{version}_{name}.sql` files, overrides `migrations.dir`
    #[arg(short, long, global = true)]
    migrations: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the recorded version, the target, and pending migrations
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// First-time install: create tables and record the schema version
    Install {
        /// List pending migrations without applying them
        #[arg(long)]
        dry_run: bool,
    },

    /// Apply migrations newer than the recorded version
    Upgrade {
        /// List pending migrations without applying them
        #[arg(long)]
        dry_run: bool,

        /// Stop at this version instead of the newest migration
        #[arg(long)]
        target: Option<u32>,
    },

    /// Run uninstall.sql and delete the version record
    Uninstall {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::resolve(cli.config, cli.database, cli.migrations)?;

    match cli.command {
        Commands::Status { json } => commands::status(&settings, json),
        Commands::Install { dry_run } => commands::install(&settings, dry_run),
        Commands::Upgrade { dry_run, target } => commands::upgrade(&settings, dry_run, target),
        Commands::Uninstall { yes } => commands::uninstall(&settings, yes),
    }
}
