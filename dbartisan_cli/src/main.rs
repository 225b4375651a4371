//! Main entry point for the dbartisan cli tool

mod cli;
mod report;

use crate::cli::{CliError, Command, MakeMigrationArgs, MakeSeederArgs};
use crate::report::ConsoleReporter;
use clap::Parser;
use cli::Cli;
use comfy_table::{Cell, CellAlignment, Table};
use console::Style;
use dbartisan::{
    AsyncDriver, Config, Dialect, LockRecord, MigrationStatus, Migrator, PendingMigration,
    Seeder, SeederStatus, SplitMode,
};
use indicatif::HumanDuration;
use std::time::Instant;
use time::OffsetDateTime;

fn main() {
    human_panic::setup_panic!(human_panic::Metadata::new(
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    ));

    if let Err(e) = crate::inner_main() {
        eprintln!("{} {e}", Style::new().red().bold().apply_to("error:"));
        std::process::exit(1)
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

/// Configuration file values, overridden by command line options and their
/// environment variables.
fn load_config(cli: &Cli) -> Result<Config, CliError> {
    let mut config = match cli.config {
        Some(ref path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(ref driver) = cli.driver {
        config.dialect = Dialect::from_driver(driver);
    }
    if let Some(ref path) = cli.migrations {
        config.migrations_path = path.clone();
    }
    if let Some(ref path) = cli.seeders {
        config.seeders_path = path.clone();
    }
    if cli.quote_aware {
        config.split_mode = SplitMode::QuoteAware;
    }
    Ok(config)
}

fn inner_main() -> Result<(), CliError> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = load_config(&cli)?;
    log::debug!("using {:?}", config);

    match cli.command {
        Some(Command::MakeMigration(ref args)) => make_migration(&config, args),
        Some(Command::MakeSeeder(ref args)) => make_seeder(&config, args),
        Some(ref command) => database_command(&cli, config, command),
        None => Err(CliError::UnknownCommand),
    }
}

fn table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(comfy_table::presets::UTF8_FULL_CONDENSED)
        .apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
    table
}

fn show_status(status: &[MigrationStatus], lock: &LockRecord) -> Result<(), CliError> {
    let format = time::format_description::parse("[year]-[month]-[day] [hour]:[minute]:[second]")?;
    let mut table = table();
    table.set_header(vec!["Migration", "Batch", "Ran", "Applied at"]);
    if status.is_empty() {
        table.add_row(vec![
            Cell::new("No migration files found.").fg(comfy_table::Color::Cyan),
            Cell::new(""),
            Cell::new(""),
            Cell::new(""),
        ]);
    }
    for migration in status {
        table.add_row(vec![
            Cell::new(&migration.name),
            match migration.batch {
                Some(batch) => Cell::new(batch).set_alignment(CellAlignment::Right),
                None => Cell::new("-").set_alignment(CellAlignment::Right),
            },
            if migration.is_applied() {
                Cell::new("Yes").fg(comfy_table::Color::Green)
            } else {
                Cell::new("Pending").fg(comfy_table::Color::Yellow)
            },
            match migration.applied_at {
                Some(ts) => Cell::new(ts.format(&format)?),
                None => Cell::new(""),
            },
        ]);
    }
    println!("{table}");

    let style = if lock.is_locked() {
        Style::new().red().bold()
    } else {
        Style::new().green().bold()
    };
    let state = match (lock.is_locked(), lock.locked_at()) {
        (true, Some(at)) => format!(
            "held by {} since {}",
            lock.locked_by().unwrap_or("unknown"),
            at.format(&format)?
        ),
        _ => lock.to_string(),
    };
    println!("{:>12} {}", style.apply_to("Lock"), state);
    Ok(())
}

fn show_dry_run(pending: &[PendingMigration]) {
    let cyan_bold = Style::new().cyan().bold();
    if pending.is_empty() {
        println!(
            "{:>12} Nothing to migrate.",
            Style::new().green().bold().apply_to("Finished")
        );
        return;
    }
    println!("Pending migrations:");
    for migration in pending {
        println!("{:>12} {}", cyan_bold.apply_to("Would run"), migration.name);
        for statement in &migration.statements {
            println!("{:>12} {}", "", statement);
        }
    }
}

fn show_seed_status(status: &[SeederStatus]) -> Result<(), CliError> {
    let format = time::format_description::parse("[year]-[month]-[day] [hour]:[minute]:[second]")?;
    let mut table = table();
    table.set_header(vec!["Seeder", "Status", "Seeded at"]);
    if status.is_empty() {
        table.add_row(vec![
            Cell::new("No seeder files found.").fg(comfy_table::Color::Cyan),
            Cell::new(""),
            Cell::new(""),
        ]);
    }
    for seeder in status {
        table.add_row(vec![
            Cell::new(&seeder.name),
            if seeder.seeded {
                Cell::new("Seeded").fg(comfy_table::Color::Green)
            } else {
                Cell::new("Pending").fg(comfy_table::Color::Yellow)
            },
            match seeder.seeded_at {
                Some(ts) => Cell::new(ts.format(&format)?),
                None => Cell::new(""),
            },
        ]);
    }
    println!("{table}");
    Ok(())
}

fn make_migration(config: &Config, args: &MakeMigrationArgs) -> Result<(), CliError> {
    let name = match args.name {
        Some(ref name) => name.clone(),
        None => format!("create_{}_table", args.table),
    };
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    let path = dbartisan::make_migration(
        &config.migrations_path,
        config.dialect,
        &args.table,
        &name,
        now,
    )?;
    println!(
        "{:>12} {}",
        Style::new().green().bold().apply_to("Created"),
        path.display()
    );
    Ok(())
}

fn make_seeder(config: &Config, args: &MakeSeederArgs) -> Result<(), CliError> {
    let path = dbartisan::make_seeder(&config.seeders_path, &args.name)?;
    println!(
        "{:>12} {}",
        Style::new().green().bold().apply_to("Created"),
        path.display()
    );
    Ok(())
}

fn database_command(cli: &Cli, config: Config, command: &Command) -> Result<(), CliError> {
    let start = Instant::now();
    let db_url = cli.db_url.as_deref().ok_or(CliError::MissingDatabaseUrl)?;
    let reporter = ConsoleReporter::new();
    let migrator = Migrator::new(config.clone()).with_reporter(reporter.clone());
    let seeder = Seeder::new(config.clone()).with_reporter(reporter.clone());

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(async {
        let mut driver = AsyncDriver::connect(config.dialect, db_url).await?;
        match command {
            Command::Migrate(args) => {
                match args.path {
                    Some(ref path) => {
                        migrator.migrate_file(&mut driver, path).await?;
                    }
                    None => {
                        migrator.migrate(&mut driver).await?;
                    }
                }
                if args.seed {
                    seeder.run(&mut driver).await?;
                }
            }
            Command::Rollback(args) => {
                migrator.rollback_steps(&mut driver, args.step).await?;
            }
            Command::Fresh(args) => {
                migrator.fresh(&mut driver).await?;
                if args.seed {
                    seeder.run(&mut driver).await?;
                }
            }
            Command::Status => {
                let status = migrator.status(&mut driver).await?;
                let lock = migrator.ledger().lock_state(&mut driver).await?;
                show_status(&status, &lock)?;
            }
            Command::DryRun => {
                let pending = migrator.dry_run(&mut driver).await?;
                show_dry_run(&pending);
            }
            Command::Seed(args) => match args.path {
                Some(ref path) => {
                    seeder.run_file(&mut driver, path).await?;
                }
                None if args.tracked => {
                    seeder.run_with_tracking(&mut driver).await?;
                }
                None => {
                    seeder.run(&mut driver).await?;
                }
            },
            Command::SeedStatus => {
                let status = seeder.status(&mut driver).await?;
                show_seed_status(&status)?;
            }
            Command::MakeMigration(_) | Command::MakeSeeder(_) => {
                return Err(CliError::UnknownCommand);
            }
        }
        Ok::<(), CliError>(())
    });
    reporter.clear();
    result?;

    if matches!(
        command,
        Command::Migrate(_) | Command::Rollback(_) | Command::Fresh(_) | Command::Seed(_)
    ) {
        log::info!("done in {}", HumanDuration(start.elapsed()));
    }
    Ok(())
}
