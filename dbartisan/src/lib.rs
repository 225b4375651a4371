/*!
SQL migration and seeding toolkit with batch rollback.

`dbartisan` applies plain `.sql` migration files in file-name order, groups every
run into a numbered batch and can roll the most recent batch back. Applied
migrations are tracked in a `migrations` table, and a single-row
`migration_lock` table keeps two runs from migrating the same database at once.

## Usage

- Migration files live in one directory (default `./database/migrations`) and are
  applied in lexicographic order of their names, e.g.
  `2024_01_15_143052_create_users_table.sql`.
- Each file holds a `--UP--` section and a `--DOWN--` section. Statements are
  separated by `;`.
- Seed files (default `./database/seeders`) are plain SQL. They run either every
  time or, with tracking, once per database.
- PostgreSQL (feature `tokio-postgres`) and SQLite (feature `sqlite`) clients are
  bundled. Other databases can be driven by implementing [`AsyncClient`].

### Example
```rust,ignore
use dbartisan::{Config, Dialect, Migrator};

let config = Config {
    dialect: Dialect::Sqlite,
    ..Config::default()
};
let mut conn = rusqlite::Connection::open("app.db")?;
let migrator = Migrator::new(config);
migrator.auto_migrate(&mut conn).await?;
```

The `dbartisan_cli` crate exposes the same operations as a command-line tool.
*/

mod drivers;
mod ledger;
mod migrator;
mod records;
mod report;
mod scaffold;
mod seeder;

pub use dbartisan_core::recipe;

#[cfg(any(feature = "tokio-postgres", feature = "sqlite"))]
pub use drivers::AsyncDriver;
pub use drivers::{AsyncClient, Row, SqlValue, Statement};
pub use ledger::{Ledger, LockGuard};
pub use migrator::{Config, MigrationStatus, Migrator, MigratorError, PendingMigration};
pub use migrator::PREVIEW_WIDTH;
pub use records::{LockRecord, MigrationRecord, SeederRecord};
pub use recipe::{MigrationScript, RecipeError, SeedScript, SplitMode};
pub use report::{Event, LogReporter, Reporter, Silent};
pub use scaffold::{make_migration, make_seeder};
pub use seeder::{Seeder, SeederStatus};
pub use dbartisan_core::Dialect;
