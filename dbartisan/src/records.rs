use crate::drivers::{Row, SqlValue};
use crate::migrator::MigratorError;
use std::fmt;
use time::PrimitiveDateTime;

fn column<'a>(
    row: &'a Row,
    idx: usize,
    table: &'static str,
    name: &'static str,
) -> Result<&'a SqlValue, MigratorError> {
    row.get(idx)
        .ok_or(MigratorError::UnexpectedValue { table, column: name })
}

pub(crate) fn text(
    row: &Row,
    idx: usize,
    table: &'static str,
    name: &'static str,
) -> Result<String, MigratorError> {
    match column(row, idx, table, name)? {
        SqlValue::Text(v) => Ok(v.clone()),
        _ => Err(MigratorError::UnexpectedValue { table, column: name }),
    }
}

pub(crate) fn optional_int(
    row: &Row,
    idx: usize,
    table: &'static str,
    name: &'static str,
) -> Result<Option<i64>, MigratorError> {
    match column(row, idx, table, name)? {
        SqlValue::Null => Ok(None),
        value => value
            .as_i64()
            .map(Some)
            .ok_or(MigratorError::UnexpectedValue { table, column: name }),
    }
}

fn optional_text(
    row: &Row,
    idx: usize,
    table: &'static str,
    name: &'static str,
) -> Result<Option<String>, MigratorError> {
    match column(row, idx, table, name)? {
        SqlValue::Null => Ok(None),
        SqlValue::Text(v) => Ok(Some(v.clone())),
        _ => Err(MigratorError::UnexpectedValue { table, column: name }),
    }
}

fn optional_timestamp(
    row: &Row,
    idx: usize,
    table: &'static str,
    name: &'static str,
) -> Result<Option<PrimitiveDateTime>, MigratorError> {
    match column(row, idx, table, name)? {
        SqlValue::Null => Ok(None),
        value => value
            .as_timestamp()
            .map(Some)
            .ok_or(MigratorError::UnexpectedValue { table, column: name }),
    }
}

/// A row of the `migrations` ledger table.
#[derive(Clone, Debug, PartialEq)]
pub struct MigrationRecord {
    id: i64,
    migration: String,
    batch: i64,
    created_at: Option<PrimitiveDateTime>,
}

impl MigrationRecord {
    pub fn new(
        id: i64,
        migration: String,
        batch: i64,
        created_at: Option<PrimitiveDateTime>,
    ) -> Self {
        MigrationRecord {
            id,
            migration,
            batch,
            created_at,
        }
    }

    /// Expects the columns `id, migration, batch, created_at`.
    pub(crate) fn from_row(row: &Row) -> Result<Self, MigratorError> {
        const TABLE: &str = "migrations";
        Ok(MigrationRecord {
            id: optional_int(row, 0, TABLE, "id")?.unwrap_or_default(),
            migration: text(row, 1, TABLE, "migration")?,
            batch: optional_int(row, 2, TABLE, "batch")?
                .ok_or(MigratorError::UnexpectedValue {
                    table: TABLE,
                    column: "batch",
                })?,
            created_at: optional_timestamp(row, 3, TABLE, "created_at")?,
        })
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn migration(&self) -> &str {
        &self.migration
    }

    pub fn batch(&self) -> i64 {
        self.batch
    }

    pub fn created_at(&self) -> Option<PrimitiveDateTime> {
        self.created_at
    }
}

impl fmt::Display for MigrationRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{} {} (batch {})", self.id, self.migration, self.batch)?;
        if let Some(ref created_at) = self.created_at {
            write!(f, ", applied: {}", created_at)?;
        }
        Ok(())
    }
}

/// A row of the `seeders` tracking table.
#[derive(Clone, Debug, PartialEq)]
pub struct SeederRecord {
    seeder: String,
    seeded_at: Option<PrimitiveDateTime>,
}

impl SeederRecord {
    /// Expects the columns `seeder, seeded_at`.
    pub(crate) fn from_row(row: &Row) -> Result<Self, MigratorError> {
        const TABLE: &str = "seeders";
        Ok(SeederRecord {
            seeder: text(row, 0, TABLE, "seeder")?,
            seeded_at: optional_timestamp(row, 1, TABLE, "seeded_at")?,
        })
    }

    pub fn seeder(&self) -> &str {
        &self.seeder
    }

    pub fn seeded_at(&self) -> Option<PrimitiveDateTime> {
        self.seeded_at
    }
}

/// State of the single `migration_lock` row.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LockRecord {
    locked: bool,
    locked_at: Option<PrimitiveDateTime>,
    locked_by: Option<String>,
}

impl LockRecord {
    /// Expects the columns `locked, locked_at, locked_by`.
    pub(crate) fn from_row(row: &Row) -> Result<Self, MigratorError> {
        const TABLE: &str = "migration_lock";
        let locked = column(row, 0, TABLE, "locked")?
            .as_bool()
            .ok_or(MigratorError::UnexpectedValue {
                table: TABLE,
                column: "locked",
            })?;
        Ok(LockRecord {
            locked,
            locked_at: optional_timestamp(row, 1, TABLE, "locked_at")?,
            locked_by: optional_text(row, 2, TABLE, "locked_by")?,
        })
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn locked_at(&self) -> Option<PrimitiveDateTime> {
        self.locked_at
    }

    pub fn locked_by(&self) -> Option<&str> {
        self.locked_by.as_deref()
    }
}

impl fmt::Display for LockRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if !self.locked {
            return f.write_str("free");
        }
        write!(f, "held by {}", self.locked_by.as_deref().unwrap_or("unknown"))?;
        if let Some(ref locked_at) = self.locked_at {
            write!(f, " since {}", locked_at)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn migration_record_from_sqlite_row() {
        let row = vec![
            SqlValue::Int(4),
            SqlValue::from("2024_01_01_000000_create_users_table.sql"),
            SqlValue::Int(2),
            SqlValue::from("2024-01-01 10:00:00"),
        ];
        let record = MigrationRecord::from_row(&row).unwrap();
        assert_eq!(record.id(), 4);
        assert_eq!(record.batch(), 2);
        assert_eq!(record.created_at(), Some(datetime!(2024-01-01 10:00:00)));
        assert!(record
            .to_string()
            .starts_with("#4 2024_01_01_000000_create_users_table.sql (batch 2), applied: 2024-01-01"));
    }

    #[test]
    fn missing_batch_is_rejected() {
        let row = vec![SqlValue::Int(1), SqlValue::from("a.sql"), SqlValue::Null];
        assert!(matches!(
            MigrationRecord::from_row(&row),
            Err(MigratorError::UnexpectedValue {
                column: "batch",
                ..
            })
        ));
    }

    #[test]
    fn lock_record_display() {
        assert_eq!(LockRecord::default().to_string(), "free");
        let row = vec![SqlValue::Int(1), SqlValue::Null, SqlValue::from("ci-runner")];
        let lock = LockRecord::from_row(&row).unwrap();
        assert!(lock.is_locked());
        assert_eq!(lock.to_string(), "held by ci-runner");
    }
}
