//! SQL dialect resolution.
//!
//! Every dialect-specific fragment used by the ledger and the scaffolding lives
//! here, so the rest of the crate never compares driver strings.

use std::borrow::Cow;

/// Supported target databases.
///
/// Unknown driver identifiers resolve to [`Dialect::MySql`], which is also the
/// default. See [`Dialect::from_driver`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize, serde::Serialize),
    serde(from = "String", into = "String")
)]
pub enum Dialect {
    #[default]
    MySql,
    Postgres,
    Sqlite,
    SqlServer,
}

impl Dialect {
    /// Maps a driver identifier to a dialect.
    ///
    /// Matching is case-insensitive. Anything unrecognised falls back to MySQL
    /// instead of failing.
    pub fn from_driver(driver: &str) -> Dialect {
        match driver.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Dialect::Postgres,
            "sqlite" | "sqlite3" => Dialect::Sqlite,
            "sqlserver" | "mssql" => Dialect::SqlServer,
            _ => Dialect::MySql,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::MySql => "mysql",
            Dialect::Postgres => "postgres",
            Dialect::Sqlite => "sqlite",
            Dialect::SqlServer => "sqlserver",
        }
    }

    /// Positional parameter placeholder for the 1-based `position`.
    pub fn placeholder(&self, position: usize) -> Cow<'static, str> {
        match self {
            Dialect::MySql | Dialect::Sqlite => Cow::Borrowed("?"),
            Dialect::Postgres => Cow::Owned(format!("${position}")),
            Dialect::SqlServer => Cow::Owned(format!("@p{position}")),
        }
    }

    pub fn bool_literal(&self, value: bool) -> &'static str {
        match (self, value) {
            (Dialect::Postgres, true) => "TRUE",
            (Dialect::Postgres, false) => "FALSE",
            (_, true) => "1",
            (_, false) => "0",
        }
    }

    fn id_column(&self) -> &'static str {
        match self {
            Dialect::MySql => "id INTEGER PRIMARY KEY AUTO_INCREMENT",
            Dialect::Postgres => "id SERIAL PRIMARY KEY",
            Dialect::Sqlite => "id INTEGER PRIMARY KEY AUTOINCREMENT",
            Dialect::SqlServer => "id INT IDENTITY(1,1) PRIMARY KEY",
        }
    }

    fn timestamp_column(&self, column: &str) -> String {
        match self {
            Dialect::SqlServer => format!("{column} DATETIME DEFAULT GETDATE()"),
            _ => format!("{column} TIMESTAMP DEFAULT CURRENT_TIMESTAMP"),
        }
    }

    /// Wraps a `CREATE TABLE` body so it only runs when the table is absent.
    fn create_if_absent(&self, table: &str, columns: &[String]) -> String {
        let body = columns.join(",\n    ");
        match self {
            Dialect::SqlServer => format!(
                "IF NOT EXISTS (SELECT * FROM sysobjects WHERE name='{table}' AND xtype='U')\n\
                 CREATE TABLE {table} (\n    {body}\n)"
            ),
            _ => format!("CREATE TABLE IF NOT EXISTS {table} (\n    {body}\n)"),
        }
    }

    /// DDL of the `migrations` ledger table.
    pub fn migrations_table_ddl(&self) -> String {
        let integer = match self {
            Dialect::SqlServer => "INT",
            _ => "INTEGER",
        };
        self.create_if_absent(
            "migrations",
            &[
                self.id_column().to_string(),
                "migration VARCHAR(255) NOT NULL".to_string(),
                format!("batch {integer} NOT NULL"),
                self.timestamp_column("created_at"),
            ],
        )
    }

    /// DDL of the single-row `migration_lock` table.
    pub fn lock_table_ddl(&self) -> String {
        let (boolean, timestamp) = match self {
            Dialect::SqlServer => ("BIT", "DATETIME"),
            _ => ("BOOLEAN", "TIMESTAMP"),
        };
        self.create_if_absent(
            "migration_lock",
            &[
                "id INTEGER PRIMARY KEY".to_string(),
                format!(
                    "locked {boolean} NOT NULL DEFAULT {}",
                    self.bool_literal(false)
                ),
                format!("locked_at {timestamp} NULL"),
                "locked_by VARCHAR(255) NULL".to_string(),
            ],
        )
    }

    /// Inserts the lock row `id = 1` unless it already exists.
    pub fn lock_row_seed_sql(&self) -> String {
        let unlocked = self.bool_literal(false);
        match self {
            Dialect::MySql => {
                format!("INSERT IGNORE INTO migration_lock (id, locked) VALUES (1, {unlocked})")
            }
            Dialect::Postgres => format!(
                "INSERT INTO migration_lock (id, locked) VALUES (1, {unlocked}) ON CONFLICT (id) DO NOTHING"
            ),
            Dialect::Sqlite => {
                format!("INSERT OR IGNORE INTO migration_lock (id, locked) VALUES (1, {unlocked})")
            }
            Dialect::SqlServer => format!(
                "IF NOT EXISTS (SELECT 1 FROM migration_lock WHERE id = 1) \
                 INSERT INTO migration_lock (id, locked) VALUES (1, {unlocked})"
            ),
        }
    }

    /// DDL of a table tracking executed entities by unique name, such as `seeders`.
    pub fn tracked_table_ddl(&self, table: &str, name_column: &str, stamp_column: &str) -> String {
        self.create_if_absent(
            table,
            &[
                self.id_column().to_string(),
                format!("{name_column} VARCHAR(255) NOT NULL UNIQUE"),
                self.timestamp_column(stamp_column),
            ],
        )
    }

    /// UP body of a scaffolded migration.
    pub fn create_table_template(&self, table: &str) -> String {
        match self {
            Dialect::MySql => format!(
                "CREATE TABLE IF NOT EXISTS {table} (\n    \
                 id INTEGER PRIMARY KEY AUTO_INCREMENT,\n    \
                 created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,\n    \
                 updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP\n);"
            ),
            Dialect::Postgres | Dialect::Sqlite => format!(
                "CREATE TABLE IF NOT EXISTS {table} (\n    \
                 {},\n    \
                 created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,\n    \
                 updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP\n);",
                self.id_column()
            ),
            Dialect::SqlServer => format!(
                "IF NOT EXISTS (SELECT * FROM sysobjects WHERE name='{table}' AND xtype='U')\n    \
                 CREATE TABLE {table} (\n        \
                 id INT IDENTITY(1,1) PRIMARY KEY,\n        \
                 created_at DATETIME DEFAULT GETDATE(),\n        \
                 updated_at DATETIME DEFAULT GETDATE()\n    );"
            ),
        }
    }

    /// DOWN body of a scaffolded migration.
    pub fn drop_table_template(&self, table: &str) -> String {
        match self {
            Dialect::SqlServer => format!(
                "IF EXISTS (SELECT * FROM sysobjects WHERE name='{table}' AND xtype='U') DROP TABLE {table};"
            ),
            _ => format!("DROP TABLE IF EXISTS {table};"),
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl From<&str> for Dialect {
    fn from(driver: &str) -> Self {
        Dialect::from_driver(driver)
    }
}

impl From<String> for Dialect {
    fn from(driver: String) -> Self {
        Dialect::from_driver(&driver)
    }
}

impl From<Dialect> for String {
    fn from(dialect: Dialect) -> Self {
        dialect.name().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_driver() {
        assert_eq!(Dialect::from_driver("postgres"), Dialect::Postgres);
        assert_eq!(Dialect::from_driver("PostgreSQL"), Dialect::Postgres);
        assert_eq!(Dialect::from_driver("sqlite3"), Dialect::Sqlite);
        assert_eq!(Dialect::from_driver("mssql"), Dialect::SqlServer);
        assert_eq!(Dialect::from_driver("sqlserver"), Dialect::SqlServer);
        assert_eq!(Dialect::from_driver("mysql"), Dialect::MySql);
    }

    #[test]
    fn unknown_driver_falls_back_to_mysql() {
        assert_eq!(Dialect::from_driver("oracle"), Dialect::MySql);
        assert_eq!(Dialect::from_driver(""), Dialect::MySql);
        assert_eq!(Dialect::default(), Dialect::MySql);
    }

    #[test]
    fn test_placeholder() {
        assert_eq!(Dialect::MySql.placeholder(1), "?");
        assert_eq!(Dialect::Sqlite.placeholder(3), "?");
        assert_eq!(Dialect::Postgres.placeholder(1), "$1");
        assert_eq!(Dialect::Postgres.placeholder(2), "$2");
        assert_eq!(Dialect::SqlServer.placeholder(2), "@p2");
    }

    #[test]
    fn migrations_ddl_uses_dialect_id_strategy() {
        assert!(Dialect::MySql
            .migrations_table_ddl()
            .contains("AUTO_INCREMENT"));
        assert!(Dialect::Postgres.migrations_table_ddl().contains("SERIAL"));
        assert!(Dialect::Sqlite
            .migrations_table_ddl()
            .contains("AUTOINCREMENT"));
        let mssql = Dialect::SqlServer.migrations_table_ddl();
        assert!(mssql.starts_with("IF NOT EXISTS"));
        assert!(mssql.contains("IDENTITY(1,1)"));
        assert!(mssql.contains("GETDATE()"));
    }

    #[test]
    fn lock_ddl_defaults_to_unlocked() {
        assert!(Dialect::Postgres
            .lock_table_ddl()
            .contains("locked BOOLEAN NOT NULL DEFAULT FALSE"));
        assert!(Dialect::SqlServer
            .lock_table_ddl()
            .contains("locked BIT NOT NULL DEFAULT 0"));
        assert!(Dialect::Sqlite
            .lock_row_seed_sql()
            .starts_with("INSERT OR IGNORE"));
    }

    #[test]
    fn tracked_table_has_unique_name() {
        let ddl = Dialect::Sqlite.tracked_table_ddl("seeders", "seeder", "seeded_at");
        assert!(ddl.contains("CREATE TABLE IF NOT EXISTS seeders"));
        assert!(ddl.contains("seeder VARCHAR(255) NOT NULL UNIQUE"));
        assert!(ddl.contains("seeded_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP"));
    }

    #[test]
    fn test_templates() {
        let up = Dialect::MySql.create_table_template("users");
        assert!(up.contains("ON UPDATE CURRENT_TIMESTAMP"));
        assert_eq!(
            Dialect::Postgres.drop_table_template("users"),
            "DROP TABLE IF EXISTS users;"
        );
        assert!(Dialect::SqlServer
            .drop_table_template("users")
            .starts_with("IF EXISTS"));
    }
}
