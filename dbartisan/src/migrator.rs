use crate::drivers::{AsyncClient, Statement};
use crate::ledger::{Ledger, LockGuard};
use crate::report::{Event, LogReporter, Reporter, Silent};
use dbartisan_core::recipe::{self, find_recipe_files, load_migration, recipe_name};
use dbartisan_core::{Dialect, RecipeError, SplitMode};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use time::PrimitiveDateTime;
#[cfg(feature = "tokio-postgres")]
use tokio_postgres::error::Error as PgError;

/// Width of the statement previews returned by [`Migrator::dry_run`].
pub const PREVIEW_WIDTH: usize = 80;

/// An Error occurred during a migration, rollback or seeding run
#[derive(Debug, Error)]
pub enum MigratorError {
    #[error(transparent)]
    RecipeError(RecipeError),

    #[error("migration is already running (locked by {})", .locked_by.as_deref().unwrap_or("unknown"))]
    AlreadyRunning { locked_by: Option<String> },

    #[error("failed to run migration `{name}`: {source}")]
    Execution {
        name: String,
        source: Box<MigratorError>,
    },

    #[error("failed to rollback migration `{name}`: {source}")]
    Rollback {
        name: String,
        source: Box<MigratorError>,
    },

    #[error("failed to run seeder `{name}`: {source}")]
    Seed {
        name: String,
        source: Box<MigratorError>,
    },

    #[error("invalid name `{0}`")]
    InvalidName(String),

    #[error("failed to write `{path}`")]
    Scaffold {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Template(handlebars::RenderError),

    #[error(transparent)]
    TimeFormat(time::error::Format),

    #[error("failed to read configuration `{path}`")]
    ConfigFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[cfg(feature = "toml")]
    #[error("invalid configuration: {0}")]
    Config(toml::de::Error),

    #[error("unexpected value in column `{column}` of table `{table}`")]
    UnexpectedValue {
        table: &'static str,
        column: &'static str,
    },

    #[error("no database client available for driver `{0}`")]
    UnsupportedDriver(Dialect),

    #[cfg(feature = "tokio-postgres")]
    #[error(transparent)]
    PgError(PgError),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(rusqlite::Error),
}

impl MigratorError {
    pub fn is_already_running(&self) -> bool {
        matches!(self, MigratorError::AlreadyRunning { .. })
    }
}

impl From<RecipeError> for MigratorError {
    fn from(err: RecipeError) -> MigratorError {
        MigratorError::RecipeError(err)
    }
}

impl From<handlebars::RenderError> for MigratorError {
    fn from(err: handlebars::RenderError) -> MigratorError {
        MigratorError::Template(err)
    }
}

impl From<time::error::Format> for MigratorError {
    fn from(err: time::error::Format) -> MigratorError {
        MigratorError::TimeFormat(err)
    }
}

#[cfg(feature = "tokio-postgres")]
impl From<PgError> for MigratorError {
    fn from(err: PgError) -> MigratorError {
        MigratorError::PgError(err)
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for MigratorError {
    fn from(err: rusqlite::Error) -> MigratorError {
        MigratorError::SqliteError(err)
    }
}

#[derive(Clone, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize, serde::Serialize),
    serde(default)
)]
pub struct Config {
    /// Target database; also accepted as `driver` in configuration files.
    #[cfg_attr(feature = "serde", serde(alias = "driver"))]
    pub dialect: Dialect,

    /// Directory holding `*.sql` migration files.
    pub migrations_path: PathBuf,

    /// Directory holding `*.sql` seeder files.
    pub seeders_path: PathBuf,

    /// Recorded in `migration_lock.locked_by` while a run holds the lock.
    pub lock_owner: Option<String>,

    pub split_mode: SplitMode,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            dialect: Dialect::default(),
            migrations_path: PathBuf::from("./database/migrations"),
            seeders_path: PathBuf::from("./database/seeders"),
            lock_owner: None,
            split_mode: SplitMode::default(),
        }
    }
}

impl Config {
    pub fn effective_lock_owner(&self) -> String {
        match self.lock_owner {
            Some(ref owner) => owner.clone(),
            None => format!(
                "{} {} (pid {})",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION"),
                std::process::id()
            ),
        }
    }
}

#[cfg(feature = "toml")]
impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self, MigratorError> {
        toml::from_str(text).map_err(MigratorError::Config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, MigratorError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| MigratorError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}

/// Ledger view of one migration file.
#[derive(Clone, Debug, PartialEq)]
pub struct MigrationStatus {
    pub name: String,
    /// `None` while the migration is pending.
    pub batch: Option<i64>,
    pub applied_at: Option<PrimitiveDateTime>,
}

impl MigrationStatus {
    pub fn is_applied(&self) -> bool {
        self.batch.is_some()
    }
}

/// A pending migration together with previews of its UP statements.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingMigration {
    pub name: String,
    pub statements: Vec<String>,
}

/// Releases the lock whatever the outcome of the guarded work. A release
/// failure is only surfaced when the work itself succeeded.
async fn release_after<T>(
    lock: LockGuard,
    client: &mut impl AsyncClient,
    result: Result<T, MigratorError>,
) -> Result<T, MigratorError> {
    let released = lock.release(client).await;
    match (result, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(release_err)) => {
            log::error!("failed to release migration lock: {}", release_err);
            Err(e)
        }
    }
}

/// Applies and rolls back SQL migrations in batches.
pub struct Migrator {
    config: Config,
    ledger: Ledger,
    reporter: Box<dyn Reporter>,
}

impl Migrator {
    pub fn new(config: Config) -> Self {
        Migrator {
            ledger: Ledger::new(config.dialect),
            config,
            reporter: Box::new(LogReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: impl Reporter + 'static) -> Self {
        self.reporter = Box::new(reporter);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Pending migration files in lexicographic order.
    fn pending_files(&self, applied: &HashSet<String>) -> Result<Vec<PathBuf>, MigratorError> {
        let mut pending = Vec::new();
        for path in find_recipe_files(&self.config.migrations_path)? {
            if !applied.contains(&recipe_name(&path)?) {
                pending.push(path);
            }
        }
        Ok(pending)
    }

    /// Applies every pending migration as one new batch.
    ///
    /// Each file runs in its own transaction together with its ledger row, so
    /// a failing file leaves neither partial schema changes nor a record. The
    /// run stops at the first failure; files applied before it stay applied.
    pub async fn migrate(&self, client: &mut impl AsyncClient) -> Result<Vec<String>, MigratorError> {
        self.run_migrate(client, self.reporter.as_ref()).await
    }

    /// Same as [`Migrator::migrate`] without any progress output, for
    /// embedding in application startup.
    pub async fn auto_migrate(
        &self,
        client: &mut impl AsyncClient,
    ) -> Result<Vec<String>, MigratorError> {
        self.run_migrate(client, &Silent).await
    }

    async fn run_migrate(
        &self,
        client: &mut impl AsyncClient,
        reporter: &dyn Reporter,
    ) -> Result<Vec<String>, MigratorError> {
        self.ledger.ensure_schema(client).await?;
        let lock = self
            .ledger
            .acquire_lock(client, &self.config.effective_lock_owner())
            .await?;
        let result = self.apply_pending(client, reporter).await;
        release_after(lock, client, result).await
    }

    async fn apply_pending(
        &self,
        client: &mut impl AsyncClient,
        reporter: &dyn Reporter,
    ) -> Result<Vec<String>, MigratorError> {
        let applied = self.ledger.applied_names(client).await?;
        let pending = self.pending_files(&applied)?;
        if pending.is_empty() {
            reporter.report(Event::NothingToMigrate);
            return Ok(Vec::new());
        }

        let batch = self.ledger.next_batch(client).await?;
        reporter.report(Event::Pending {
            count: pending.len(),
        });
        let mut migrated = Vec::with_capacity(pending.len());
        for path in pending {
            let script = load_migration(&path, self.config.split_mode)?;
            let mut statements: Vec<Statement> =
                script.up().iter().map(|sql| Statement::new(sql.as_str())).collect();
            statements.push(self.ledger.record_statement(script.name(), batch));

            log::debug!("applying {} ({} statements)", script, script.up().len());
            client
                .execute_atomic(&statements)
                .await
                .map_err(|source| MigratorError::Execution {
                    name: script.name().to_string(),
                    source: Box::new(source),
                })?;
            reporter.report(Event::Migrated {
                name: script.name(),
            });
            migrated.push(script.name().to_string());
        }
        log::info!("batch {} applied {} migration(s)", batch, migrated.len());
        Ok(migrated)
    }

    /// Rolls back the most recent batch, newest migration first.
    ///
    /// Returns the names removed from the ledger. A migration whose file is
    /// gone from disk is removed without running anything; any other failure
    /// to reach the file is an error. DOWN statements
    /// run one by one outside a transaction; on failure the ledger row stays
    /// and the error is returned.
    pub async fn rollback(&self, client: &mut impl AsyncClient) -> Result<Vec<String>, MigratorError> {
        self.ledger.ensure_schema(client).await?;
        let lock = self
            .ledger
            .acquire_lock(client, &self.config.effective_lock_owner())
            .await?;
        let result = self.rollback_last_batch(client).await;
        release_after(lock, client, result).await
    }

    async fn rollback_last_batch(
        &self,
        client: &mut impl AsyncClient,
    ) -> Result<Vec<String>, MigratorError> {
        let batch = self.ledger.last_batch(client).await?;
        if batch == 0 {
            self.reporter.report(Event::NothingToRollback);
            return Ok(Vec::new());
        }

        let names = self.ledger.batch_names(client, batch).await?;
        let mut rolled_back = Vec::with_capacity(names.len());
        for name in names.into_iter().rev() {
            let path = self.config.migrations_path.join(&name);
            match std::fs::metadata(&path) {
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    log::warn!("migration file {} not found, removing ledger entry", path.display());
                    self.ledger.unrecord(client, &name).await?;
                    self.reporter.report(Event::MissingFile { name: &name });
                    rolled_back.push(name);
                    continue;
                }
                Err(err) => {
                    return Err(RecipeError::InvalidRecipePath { path, source: err }.into());
                }
                Ok(metadata) if !metadata.is_file() => {
                    return Err(RecipeError::InvalidRecipePath {
                        path,
                        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a file"),
                    }
                    .into());
                }
                Ok(_) => {}
            }

            let script = load_migration(&path, self.config.split_mode)?;
            for statement in script.down() {
                log::debug!("{}: {}", name, recipe::preview(statement, PREVIEW_WIDTH));
                client
                    .execute(statement, &[])
                    .await
                    .map_err(|source| MigratorError::Rollback {
                        name: name.clone(),
                        source: Box::new(source),
                    })?;
            }
            self.ledger.unrecord(client, &name).await?;
            self.reporter.report(Event::RolledBack { name: &name });
            rolled_back.push(name);
        }
        log::info!("batch {} rolled back", batch);
        Ok(rolled_back)
    }

    /// Rolls back up to `steps` batches, stopping early once the ledger is
    /// empty.
    pub async fn rollback_steps(
        &self,
        client: &mut impl AsyncClient,
        steps: usize,
    ) -> Result<Vec<String>, MigratorError> {
        let mut rolled_back = Vec::new();
        for _ in 0..steps {
            let names = self.rollback(client).await?;
            if names.is_empty() {
                break;
            }
            rolled_back.extend(names);
        }
        Ok(rolled_back)
    }

    /// Rolls back every batch, then migrates from scratch.
    pub async fn fresh(&self, client: &mut impl AsyncClient) -> Result<Vec<String>, MigratorError> {
        self.ledger.ensure_schema(client).await?;
        while self.ledger.last_batch(client).await? > 0 {
            self.rollback(client).await?;
        }
        self.migrate(client).await
    }

    /// Runs the UP section of a single file atomically. Neither the lock nor
    /// the ledger is touched.
    pub async fn migrate_file(
        &self,
        client: &mut impl AsyncClient,
        path: impl AsRef<Path>,
    ) -> Result<String, MigratorError> {
        let script = load_migration(path.as_ref(), self.config.split_mode)?;
        let statements: Vec<Statement> =
            script.up().iter().map(|sql| Statement::new(sql.as_str())).collect();
        client
            .execute_atomic(&statements)
            .await
            .map_err(|source| MigratorError::Execution {
                name: script.name().to_string(),
                source: Box::new(source),
            })?;
        self.reporter.report(Event::Migrated {
            name: script.name(),
        });
        Ok(script.name().to_string())
    }

    /// Every migration file on disk with its ledger state.
    pub async fn status(
        &self,
        client: &mut impl AsyncClient,
    ) -> Result<Vec<MigrationStatus>, MigratorError> {
        self.ledger.ensure_schema(client).await?;
        let mut records: HashMap<String, _> = self
            .ledger
            .all_with_batch(client)
            .await?
            .into_iter()
            .map(|record| (record.migration().to_string(), record))
            .collect();

        let mut status = Vec::new();
        for path in find_recipe_files(&self.config.migrations_path)? {
            let name = recipe_name(&path)?;
            let record = records.remove(&name);
            status.push(MigrationStatus {
                batch: record.as_ref().map(|r| r.batch()),
                applied_at: record.as_ref().and_then(|r| r.created_at()),
                name,
            });
        }
        Ok(status)
    }

    /// Lists what [`Migrator::migrate`] would run. Apart from creating the
    /// ledger tables nothing is written.
    pub async fn dry_run(
        &self,
        client: &mut impl AsyncClient,
    ) -> Result<Vec<PendingMigration>, MigratorError> {
        self.ledger.ensure_schema(client).await?;
        let applied = self.ledger.applied_names(client).await?;
        let mut pending = Vec::new();
        for path in self.pending_files(&applied)? {
            let script = load_migration(&path, self.config.split_mode)?;
            pending.push(PendingMigration {
                name: script.name().to_string(),
                statements: script
                    .up()
                    .iter()
                    .map(|sql| recipe::preview(sql, PREVIEW_WIDTH))
                    .collect(),
            });
        }
        Ok(pending)
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::drivers::SqlValue;
    use crate::report::tests::Recorder;
    use rusqlite::Connection;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, up: &str, down: &str) {
        fs::write(
            dir.join(name),
            format!("-- {name}\n--UP--\n{up}\n--DOWN--\n{down}\n"),
        )
        .unwrap();
    }

    fn setup() -> (TempDir, Migrator, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            dialect: Dialect::Sqlite,
            migrations_path: dir.path().to_path_buf(),
            lock_owner: Some("tests".to_string()),
            ..Config::default()
        };
        let conn = Connection::open_in_memory().unwrap();
        (dir, Migrator::new(config), conn)
    }

    async fn tables(conn: &mut Connection) -> Vec<String> {
        AsyncClient::query(
            conn,
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE 't_%' ORDER BY name",
            &[],
        )
        .await
        .unwrap()
        .into_iter()
        .map(|row| row[0].as_str().unwrap().to_string())
        .collect()
    }

    #[tokio::test]
    async fn migrate_is_idempotent() {
        let (dir, migrator, mut conn) = setup();
        write(dir.path(), "001_a.sql", "CREATE TABLE t_a (id INTEGER);", "DROP TABLE t_a;");
        write(dir.path(), "002_b.sql", "CREATE TABLE t_b (id INTEGER);", "DROP TABLE t_b;");

        let migrated = migrator.migrate(&mut conn).await.unwrap();
        assert_eq!(migrated, vec!["001_a.sql", "002_b.sql"]);
        assert!(migrator.migrate(&mut conn).await.unwrap().is_empty());
        assert_eq!(tables(&mut conn).await, vec!["t_a", "t_b"]);
        assert!(!migrator
            .ledger()
            .lock_state(&mut conn)
            .await
            .unwrap()
            .is_locked());
    }

    #[tokio::test]
    async fn rollback_reverses_last_batch_only() {
        let (dir, migrator, mut conn) = setup();
        write(dir.path(), "001_a.sql", "CREATE TABLE t_a (id INTEGER);", "DROP TABLE t_a;");
        migrator.migrate(&mut conn).await.unwrap();
        write(dir.path(), "002_b.sql", "CREATE TABLE t_b (id INTEGER);", "DROP TABLE t_b;");
        write(dir.path(), "003_c.sql", "CREATE TABLE t_c (id INTEGER);", "DROP TABLE t_c;");
        migrator.migrate(&mut conn).await.unwrap();

        let status = migrator.status(&mut conn).await.unwrap();
        let batches: Vec<_> = status.iter().map(|s| s.batch).collect();
        assert_eq!(batches, vec![Some(1), Some(2), Some(2)]);

        let rolled_back = migrator.rollback(&mut conn).await.unwrap();
        assert_eq!(rolled_back, vec!["003_c.sql", "002_b.sql"]);
        assert_eq!(tables(&mut conn).await, vec!["t_a"]);
        assert_eq!(migrator.ledger().last_batch(&mut conn).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_migration_leaves_no_trace() {
        let (dir, migrator, mut conn) = setup();
        write(dir.path(), "001_ok.sql", "CREATE TABLE t_ok (id INTEGER);", "");
        write(
            dir.path(),
            "002_bad.sql",
            "CREATE TABLE t_bad (id INTEGER); INVALID SQL;",
            "",
        );
        write(dir.path(), "003_never.sql", "CREATE TABLE t_never (id INTEGER);", "");

        let err = migrator.migrate(&mut conn).await.unwrap_err();
        match err {
            MigratorError::Execution { ref name, .. } => assert_eq!(name, "002_bad.sql"),
            ref other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().starts_with("failed to run migration `002_bad.sql`"));
        assert_eq!(tables(&mut conn).await, vec!["t_ok"]);
        let applied = migrator.ledger().applied_names(&mut conn).await.unwrap();
        assert_eq!(applied.len(), 1);
        assert!(!migrator
            .ledger()
            .lock_state(&mut conn)
            .await
            .unwrap()
            .is_locked());
    }

    #[tokio::test]
    async fn held_lock_blocks_migrate_and_rollback() {
        let (dir, migrator, mut conn) = setup();
        write(dir.path(), "001_a.sql", "CREATE TABLE t_a (id INTEGER);", "DROP TABLE t_a;");
        migrator.ledger().ensure_schema(&mut conn).await.unwrap();
        let guard = migrator
            .ledger()
            .acquire_lock(&mut conn, "other host")
            .await
            .unwrap();

        let err = migrator.migrate(&mut conn).await.unwrap_err();
        assert!(err.is_already_running());
        assert_eq!(err.to_string(), "migration is already running (locked by other host)");
        assert!(migrator.rollback(&mut conn).await.unwrap_err().is_already_running());
        assert!(tables(&mut conn).await.is_empty());

        guard.release(&mut conn).await.unwrap();
        assert_eq!(migrator.migrate(&mut conn).await.unwrap(), vec!["001_a.sql"]);
    }

    #[tokio::test]
    async fn rollback_tolerates_missing_files() {
        let (dir, migrator, mut conn) = setup();
        write(dir.path(), "001_a.sql", "CREATE TABLE t_a (id INTEGER);", "DROP TABLE t_a;");
        write(dir.path(), "002_b.sql", "CREATE TABLE t_b (id INTEGER);", "DROP TABLE t_b;");
        migrator.migrate(&mut conn).await.unwrap();
        fs::remove_file(dir.path().join("002_b.sql")).unwrap();

        let recorder = Arc::new(Recorder::default());
        let migrator = migrator.with_reporter(recorder.clone());
        let rolled_back = migrator.rollback(&mut conn).await.unwrap();
        assert_eq!(rolled_back, vec!["002_b.sql", "001_a.sql"]);
        assert_eq!(tables(&mut conn).await, vec!["t_b"]);
        assert!(migrator
            .ledger()
            .applied_names(&mut conn)
            .await
            .unwrap()
            .is_empty());
        let events = recorder.0.lock().unwrap();
        assert_eq!(
            events.as_slice(),
            [
                "Migration file not found, removed from ledger: 002_b.sql",
                "Rolled back: 001_a.sql"
            ]
        );
    }

    #[tokio::test]
    async fn failed_down_statement_keeps_ledger_row() {
        let (dir, migrator, mut conn) = setup();
        write(dir.path(), "001_a.sql", "CREATE TABLE t_a (id INTEGER);", "DROP TABLE t_missing;");
        migrator.migrate(&mut conn).await.unwrap();

        let err = migrator.rollback(&mut conn).await.unwrap_err();
        assert!(matches!(err, MigratorError::Rollback { ref name, .. } if name == "001_a.sql"));
        assert_eq!(migrator.ledger().last_batch(&mut conn).await.unwrap(), 1);
        assert!(!migrator
            .ledger()
            .lock_state(&mut conn)
            .await
            .unwrap()
            .is_locked());
    }

    #[tokio::test]
    async fn empty_ledger_has_nothing_to_rollback() {
        let (_dir, migrator, mut conn) = setup();
        assert!(migrator.rollback(&mut conn).await.unwrap().is_empty());
        assert!(migrator.rollback_steps(&mut conn, 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rollback_steps() {
        let (dir, migrator, mut conn) = setup();
        for (idx, table) in ["t_a", "t_b", "t_c"].iter().enumerate() {
            write(
                dir.path(),
                &format!("00{idx}_{table}.sql"),
                &format!("CREATE TABLE {table} (id INTEGER);"),
                &format!("DROP TABLE {table};"),
            );
            migrator.migrate(&mut conn).await.unwrap();
        }
        let rolled_back = migrator.rollback_steps(&mut conn, 2).await.unwrap();
        assert_eq!(rolled_back, vec!["002_t_c.sql", "001_t_b.sql"]);
        assert_eq!(tables(&mut conn).await, vec!["t_a"]);
    }

    #[tokio::test]
    async fn test_fresh() {
        let (dir, migrator, mut conn) = setup();
        write(dir.path(), "001_a.sql", "CREATE TABLE t_a (id INTEGER);", "DROP TABLE t_a;");
        migrator.migrate(&mut conn).await.unwrap();
        write(dir.path(), "002_b.sql", "CREATE TABLE t_b (id INTEGER);", "DROP TABLE t_b;");
        migrator.migrate(&mut conn).await.unwrap();
        AsyncClient::execute(&mut conn, "INSERT INTO t_a (id) VALUES (1)", &[])
            .await
            .unwrap();

        let migrated = migrator.fresh(&mut conn).await.unwrap();
        assert_eq!(migrated, vec!["001_a.sql", "002_b.sql"]);
        let rows = AsyncClient::query(&mut conn, "SELECT COUNT(*) FROM t_a", &[])
            .await
            .unwrap();
        assert_eq!(rows[0][0], SqlValue::Int(0));
        assert_eq!(migrator.ledger().last_batch(&mut conn).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn dry_run_writes_nothing() {
        let (dir, migrator, mut conn) = setup();
        write(dir.path(), "001_a.sql", "CREATE TABLE t_a (id INTEGER);", "DROP TABLE t_a;");
        migrator.migrate(&mut conn).await.unwrap();
        write(
            dir.path(),
            "002_b.sql",
            "CREATE TABLE t_b (id INTEGER); INSERT INTO t_b (id) VALUES (1);",
            "DROP TABLE t_b;",
        );
        write(dir.path(), "003_c.sql", "CREATE TABLE t_c (id INTEGER);", "DROP TABLE t_c;");
        AsyncClient::execute(&mut conn, "INSERT INTO t_a (id) VALUES (1)", &[])
            .await
            .unwrap();

        let pending = migrator.dry_run(&mut conn).await.unwrap();
        assert_eq!(
            pending,
            vec![
                PendingMigration {
                    name: "002_b.sql".to_string(),
                    statements: vec![
                        "CREATE TABLE t_b (id INTEGER)".to_string(),
                        "INSERT INTO t_b (id) VALUES (1)".to_string(),
                    ],
                },
                PendingMigration {
                    name: "003_c.sql".to_string(),
                    statements: vec!["CREATE TABLE t_c (id INTEGER)".to_string()],
                },
            ]
        );
        assert_eq!(tables(&mut conn).await, vec!["t_a"]);
        let rows = AsyncClient::query(&mut conn, "SELECT COUNT(*) FROM t_a", &[])
            .await
            .unwrap();
        assert_eq!(rows[0][0], SqlValue::Int(1));
        let rows = AsyncClient::query(&mut conn, "SELECT COUNT(*) FROM migrations", &[])
            .await
            .unwrap();
        assert_eq!(rows[0][0], SqlValue::Int(1));
        assert_eq!(migrator.ledger().last_batch(&mut conn).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn comment_only_fragment_is_skipped() {
        let (dir, migrator, mut conn) = setup();
        write(
            dir.path(),
            "001_a.sql",
            "/* create table a */;\nCREATE TABLE t_a (id INTEGER);",
            "DROP TABLE t_a;\n/* done */;",
        );
        assert_eq!(migrator.migrate(&mut conn).await.unwrap(), vec!["001_a.sql"]);
        assert_eq!(tables(&mut conn).await, vec!["t_a"]);
        assert_eq!(migrator.rollback(&mut conn).await.unwrap(), vec!["001_a.sql"]);
        assert!(tables(&mut conn).await.is_empty());
    }

    #[tokio::test]
    async fn rollback_fails_when_migration_path_is_not_a_file() {
        let (dir, migrator, mut conn) = setup();
        fs::create_dir(dir.path().join("001_dir.sql")).unwrap();
        migrator.ledger().ensure_schema(&mut conn).await.unwrap();
        migrator
            .ledger()
            .record(&mut conn, "001_dir.sql", 1)
            .await
            .unwrap();

        let err = migrator.rollback(&mut conn).await.unwrap_err();
        assert!(matches!(
            err,
            MigratorError::RecipeError(RecipeError::InvalidRecipePath { .. })
        ));
        assert_eq!(
            migrator.ledger().applied_names(&mut conn).await.unwrap().len(),
            1
        );
        assert!(!migrator
            .ledger()
            .lock_state(&mut conn)
            .await
            .unwrap()
            .is_locked());
    }

    #[tokio::test]
    async fn migrate_file_skips_ledger() {
        let (dir, migrator, mut conn) = setup();
        write(dir.path(), "001_a.sql", "CREATE TABLE t_a (id INTEGER);", "DROP TABLE t_a;");
        let name = migrator
            .migrate_file(&mut conn, dir.path().join("001_a.sql"))
            .await
            .unwrap();
        assert_eq!(name, "001_a.sql");
        assert_eq!(tables(&mut conn).await, vec!["t_a"]);

        migrator.ledger().ensure_schema(&mut conn).await.unwrap();
        assert!(migrator
            .ledger()
            .applied_names(&mut conn)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn auto_migrate_reports_nothing() {
        let (dir, migrator, mut conn) = setup();
        write(dir.path(), "001_a.sql", "CREATE TABLE t_a (id INTEGER);", "DROP TABLE t_a;");
        let recorder = Arc::new(Recorder::default());
        let migrator = migrator.with_reporter(recorder.clone());
        assert_eq!(migrator.auto_migrate(&mut conn).await.unwrap(), vec!["001_a.sql"]);
        assert!(recorder.0.lock().unwrap().is_empty());

        assert!(migrator.migrate(&mut conn).await.unwrap().is_empty());
        assert_eq!(
            recorder.0.lock().unwrap().as_slice(),
            ["Nothing to migrate."]
        );
    }

    #[cfg(feature = "toml")]
    #[test]
    fn test_config_from_toml() {
        let config = Config::from_toml_str(
            r#"
            driver = "postgresql"
            migrations_path = "db/migrations"
            split_mode = "quote_aware"
            "#,
        )
        .unwrap();
        assert_eq!(config.dialect, Dialect::Postgres);
        assert_eq!(config.migrations_path, PathBuf::from("db/migrations"));
        assert_eq!(config.seeders_path, PathBuf::from("./database/seeders"));
        assert_eq!(config.split_mode, SplitMode::QuoteAware);
        assert!(config.effective_lock_owner().starts_with("dbartisan "));
    }
}
