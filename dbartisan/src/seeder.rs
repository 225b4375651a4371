use crate::drivers::{AsyncClient, Statement};
use crate::ledger::Ledger;
use crate::migrator::{Config, MigratorError};
use crate::report::{Event, LogReporter, Reporter, Silent};
use dbartisan_core::recipe::{find_recipe_files, load_seed, recipe_name, SeedScript};
use std::collections::HashMap;
use std::path::Path;
use time::PrimitiveDateTime;

/// Tracking state of one seeder file.
#[derive(Clone, Debug, PartialEq)]
pub struct SeederStatus {
    pub name: String,
    pub seeded: bool,
    pub seeded_at: Option<PrimitiveDateTime>,
}

/// Runs data seed files from [`Config::seeders_path`].
///
/// Seeding is not locked. Each file runs in its own transaction.
pub struct Seeder {
    config: Config,
    ledger: Ledger,
    reporter: Box<dyn Reporter>,
}

impl Seeder {
    pub fn new(config: Config) -> Self {
        Seeder {
            ledger: Ledger::new(config.dialect),
            config,
            reporter: Box::new(LogReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: impl Reporter + 'static) -> Self {
        self.reporter = Box::new(reporter);
        self
    }

    async fn apply(
        &self,
        client: &mut impl AsyncClient,
        script: &SeedScript,
        track: bool,
    ) -> Result<(), MigratorError> {
        let mut statements: Vec<Statement> = script
            .statements()
            .iter()
            .map(|sql| Statement::new(sql.as_str()))
            .collect();
        if track {
            statements.push(self.ledger.record_seed_statement(script.name()));
        }
        client
            .execute_atomic(&statements)
            .await
            .map_err(|source| MigratorError::Seed {
                name: script.name().to_string(),
                source: Box::new(source),
            })
    }

    /// Runs every seeder file in order without any tracking, so files run
    /// again on each call.
    pub async fn run(&self, client: &mut impl AsyncClient) -> Result<Vec<String>, MigratorError> {
        let mut seeded = Vec::new();
        for path in find_recipe_files(&self.config.seeders_path)? {
            let script = load_seed(&path, self.config.split_mode)?;
            self.apply(client, &script, false).await?;
            self.reporter.report(Event::Seeded {
                name: script.name(),
            });
            seeded.push(script.name().to_string());
        }
        if seeded.is_empty() {
            self.reporter.report(Event::NothingToSeed);
        }
        Ok(seeded)
    }

    /// Runs a single seeder file without tracking.
    pub async fn run_file(
        &self,
        client: &mut impl AsyncClient,
        path: impl AsRef<Path>,
    ) -> Result<String, MigratorError> {
        let script = load_seed(path.as_ref(), self.config.split_mode)?;
        self.apply(client, &script, false).await?;
        self.reporter.report(Event::Seeded {
            name: script.name(),
        });
        Ok(script.name().to_string())
    }

    /// Runs each seeder file at most once, recording it in the `seeders`
    /// table in the same transaction as its statements.
    pub async fn run_with_tracking(
        &self,
        client: &mut impl AsyncClient,
    ) -> Result<Vec<String>, MigratorError> {
        self.run_tracked(client, self.reporter.as_ref()).await
    }

    /// Same as [`Seeder::run_with_tracking`] without any progress output.
    pub async fn auto_seed(&self, client: &mut impl AsyncClient) -> Result<Vec<String>, MigratorError> {
        self.run_tracked(client, &Silent).await
    }

    async fn run_tracked(
        &self,
        client: &mut impl AsyncClient,
        reporter: &dyn Reporter,
    ) -> Result<Vec<String>, MigratorError> {
        self.ledger.ensure_seeders_table(client).await?;
        let already = self.ledger.seeded_names(client).await?;

        let mut seeded = Vec::new();
        for path in find_recipe_files(&self.config.seeders_path)? {
            let name = recipe_name(&path)?;
            if already.contains(&name) {
                reporter.report(Event::AlreadySeeded { name: &name });
                continue;
            }
            let script = load_seed(&path, self.config.split_mode)?;
            self.apply(client, &script, true).await?;
            reporter.report(Event::Seeded { name: &name });
            seeded.push(name);
        }
        if seeded.is_empty() {
            reporter.report(Event::NothingToSeed);
        }
        Ok(seeded)
    }

    /// Every seeder file on disk with its tracking state.
    pub async fn status(
        &self,
        client: &mut impl AsyncClient,
    ) -> Result<Vec<SeederStatus>, MigratorError> {
        self.ledger.ensure_seeders_table(client).await?;
        let mut records: HashMap<String, _> = self
            .ledger
            .all_seeded(client)
            .await?
            .into_iter()
            .map(|record| (record.seeder().to_string(), record))
            .collect();

        let mut status = Vec::new();
        for path in find_recipe_files(&self.config.seeders_path)? {
            let name = recipe_name(&path)?;
            let record = records.remove(&name);
            status.push(SeederStatus {
                seeded: record.is_some(),
                seeded_at: record.and_then(|r| r.seeded_at()),
                name,
            });
        }
        Ok(status)
    }
}
