//! Defines the CLI application

use dbartisan::MigratorError;
use dbartisan::RecipeError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(clap::Parser, Debug)]
#[command(version, about)]
pub struct Cli {
    /// Database URL (a file path or `sqlite:` URL for SQLite)
    #[arg(short = 'D', long, env = "DATABASE_URL")]
    pub db_url: Option<String>,

    /// Database driver: mysql, postgres, sqlite or sqlserver. Unknown values fall back to mysql
    #[arg(long, env = "DB_DRIVER")]
    pub driver: Option<String>,

    /// Migration files directory path
    #[arg(short = 'M', long, env = "MIGRATIONS_PATH")]
    pub migrations: Option<PathBuf>,

    /// Seeder files directory path
    #[arg(short = 'S', long, env = "SEEDERS_PATH")]
    pub seeders: Option<PathBuf>,

    /// TOML configuration file. Command line options take precedence
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Split statements on `;` only outside quotes, dollar quotes and comments
    #[arg(long, default_value = "false")]
    pub quote_aware: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Run all pending migrations as a new batch
    Migrate(MigrateArgs),

    /// Roll back the last batch of migrations
    #[command(visible_alias = "migrate:rollback")]
    Rollback(RollbackArgs),

    /// Roll back every batch, then run all migrations again
    #[command(visible_alias = "migrate:fresh")]
    Fresh(FreshArgs),

    /// Show every migration file and its batch, plus the lock state
    #[command(visible_alias = "migrate:status")]
    Status,

    /// Show pending migrations and their statements without running them
    #[command(visible_alias = "migrate:dry-run")]
    DryRun,

    /// Run seeder files
    #[command(visible_alias = "db:seed")]
    Seed(SeedArgs),

    /// Show which seeder files have been recorded as seeded
    #[command(visible_alias = "db:seed:status")]
    SeedStatus,

    /// Create a new migration file
    #[command(visible_alias = "make:migration")]
    MakeMigration(MakeMigrationArgs),

    /// Create a new seeder file
    #[command(visible_alias = "make:seeder")]
    MakeSeeder(MakeSeederArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct MigrateArgs {
    /// Run only this file's UP section, without recording it
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Run the seeders after migrating
    #[arg(long, default_value = "false")]
    pub seed: bool,
}

#[derive(clap::Args, Debug, Copy, Clone)]
pub struct RollbackArgs {
    /// Number of batches to roll back
    #[arg(long, default_value_t = 1)]
    pub step: usize,
}

#[derive(clap::Args, Debug, Copy, Clone)]
pub struct FreshArgs {
    /// Run the seeders after migrating
    #[arg(long, default_value = "false")]
    pub seed: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct SeedArgs {
    /// Run only this seeder file
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Run each seeder once, recording it in the `seeders` table
    #[arg(long, default_value = "false")]
    pub tracked: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct MakeMigrationArgs {
    /// Table the migration creates
    pub table: String,

    /// Migration name, `create_<table>_table` by default
    pub name: Option<String>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct MakeSeederArgs {
    /// Seeder name; `_seeder` is appended when missing
    pub name: String,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("unknown command")]
    UnknownCommand,

    #[error("database URL is required (use --db-url or DATABASE_URL)")]
    MissingDatabaseUrl,

    #[error(transparent)]
    IoError(std::io::Error),

    #[error(transparent)]
    MigratorError(MigratorError),

    #[error(transparent)]
    TimeError(time::Error),
}

impl From<MigratorError> for CliError {
    fn from(err: MigratorError) -> CliError {
        CliError::MigratorError(err)
    }
}

impl From<RecipeError> for CliError {
    fn from(err: RecipeError) -> CliError {
        CliError::MigratorError(MigratorError::RecipeError(err))
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> CliError {
        CliError::IoError(err)
    }
}

impl From<time::error::InvalidFormatDescription> for CliError {
    fn from(err: time::error::InvalidFormatDescription) -> CliError {
        CliError::TimeError(time::Error::InvalidFormatDescription(err))
    }
}

impl From<time::error::Format> for CliError {
    fn from(err: time::error::Format) -> CliError {
        CliError::TimeError(time::Error::Format(err))
    }
}
