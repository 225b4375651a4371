//! Persistent bookkeeping: the `migrations` ledger, the `migration_lock` row
//! and the optional `seeders` tracking table.

use crate::drivers::{AsyncClient, SqlValue, Statement};
use crate::migrator::MigratorError;
use crate::records::{self, LockRecord, MigrationRecord, SeederRecord};
use dbartisan_core::Dialect;
use std::collections::HashSet;

pub const MIGRATIONS_TABLE: &str = "migrations";
pub const LOCK_TABLE: &str = "migration_lock";
pub const SEEDERS_TABLE: &str = "seeders";

/// Ledger queries rendered for one dialect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ledger {
    dialect: Dialect,
}

impl Ledger {
    pub fn new(dialect: Dialect) -> Self {
        Ledger { dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Creates the ledger and lock tables if absent and seeds the lock row.
    /// Safe to call on every run.
    pub async fn ensure_schema(&self, client: &mut impl AsyncClient) -> Result<(), MigratorError> {
        client
            .execute(&self.dialect.migrations_table_ddl(), &[])
            .await?;
        client.execute(&self.dialect.lock_table_ddl(), &[]).await?;
        client.execute(&self.dialect.lock_row_seed_sql(), &[]).await?;
        Ok(())
    }

    pub async fn applied_names(
        &self,
        client: &mut impl AsyncClient,
    ) -> Result<HashSet<String>, MigratorError> {
        let rows = client
            .query(&format!("SELECT migration FROM {MIGRATIONS_TABLE}"), &[])
            .await?;
        rows.iter()
            .map(|row| records::text(row, 0, MIGRATIONS_TABLE, "migration"))
            .collect()
    }

    async fn max_batch(&self, client: &mut impl AsyncClient) -> Result<Option<i64>, MigratorError> {
        let rows = client
            .query(&format!("SELECT MAX(batch) FROM {MIGRATIONS_TABLE}"), &[])
            .await?;
        match rows.first() {
            Some(row) => records::optional_int(row, 0, MIGRATIONS_TABLE, "batch"),
            None => Ok(None),
        }
    }

    /// Batch number the next migrate run records: `max(batch) + 1`, or 1 on an
    /// empty ledger.
    pub async fn next_batch(&self, client: &mut impl AsyncClient) -> Result<i64, MigratorError> {
        Ok(self.max_batch(client).await?.map_or(1, |batch| batch + 1))
    }

    /// Highest recorded batch, 0 when the ledger is empty.
    pub async fn last_batch(&self, client: &mut impl AsyncClient) -> Result<i64, MigratorError> {
        Ok(self.max_batch(client).await?.unwrap_or(0))
    }

    /// Names recorded in `batch`, in application order.
    pub async fn batch_names(
        &self,
        client: &mut impl AsyncClient,
        batch: i64,
    ) -> Result<Vec<String>, MigratorError> {
        let sql = format!(
            "SELECT migration FROM {MIGRATIONS_TABLE} WHERE batch = {} ORDER BY id ASC",
            self.dialect.placeholder(1)
        );
        let rows = client.query(&sql, &[SqlValue::Int(batch)]).await?;
        rows.iter()
            .map(|row| records::text(row, 0, MIGRATIONS_TABLE, "migration"))
            .collect()
    }

    pub async fn all_with_batch(
        &self,
        client: &mut impl AsyncClient,
    ) -> Result<Vec<MigrationRecord>, MigratorError> {
        let rows = client
            .query(
                &format!(
                    "SELECT id, migration, batch, created_at FROM {MIGRATIONS_TABLE} ORDER BY id ASC"
                ),
                &[],
            )
            .await?;
        rows.iter().map(MigrationRecord::from_row).collect()
    }

    /// Ledger insert for `name`, meant to run in the same transaction as the
    /// migration body.
    pub fn record_statement(&self, name: &str, batch: i64) -> Statement {
        Statement::with_params(
            format!(
                "INSERT INTO {MIGRATIONS_TABLE} (migration, batch) VALUES ({}, {})",
                self.dialect.placeholder(1),
                self.dialect.placeholder(2)
            ),
            vec![SqlValue::from(name), SqlValue::Int(batch)],
        )
    }

    pub async fn record(
        &self,
        client: &mut impl AsyncClient,
        name: &str,
        batch: i64,
    ) -> Result<(), MigratorError> {
        let statement = self.record_statement(name, batch);
        client.execute(&statement.sql, &statement.params).await?;
        Ok(())
    }

    pub async fn unrecord(
        &self,
        client: &mut impl AsyncClient,
        name: &str,
    ) -> Result<(), MigratorError> {
        let sql = format!(
            "DELETE FROM {MIGRATIONS_TABLE} WHERE migration = {}",
            self.dialect.placeholder(1)
        );
        client.execute(&sql, &[SqlValue::from(name)]).await?;
        Ok(())
    }

    /// Takes the lock with a single conditional update. Exactly one affected
    /// row means this caller now owns the lock.
    pub async fn acquire_lock(
        &self,
        client: &mut impl AsyncClient,
        owner: &str,
    ) -> Result<LockGuard, MigratorError> {
        let sql = format!(
            "UPDATE {LOCK_TABLE} SET locked = {}, locked_at = CURRENT_TIMESTAMP, locked_by = {} \
             WHERE id = 1 AND locked = {}",
            self.dialect.bool_literal(true),
            self.dialect.placeholder(1),
            self.dialect.bool_literal(false),
        );
        let affected = client.execute(&sql, &[SqlValue::from(owner)]).await?;
        if affected == 1 {
            log::debug!("migration lock acquired by {}", owner);
            return Ok(LockGuard {
                ledger: *self,
                owner: owner.to_string(),
            });
        }

        let state = self.lock_state(client).await?;
        Err(MigratorError::AlreadyRunning {
            locked_by: state.locked_by().map(str::to_string),
        })
    }

    pub async fn lock_state(&self, client: &mut impl AsyncClient) -> Result<LockRecord, MigratorError> {
        let rows = client
            .query(
                &format!("SELECT locked, locked_at, locked_by FROM {LOCK_TABLE} WHERE id = 1"),
                &[],
            )
            .await?;
        match rows.first() {
            Some(row) => LockRecord::from_row(row),
            None => Ok(LockRecord::default()),
        }
    }

    pub async fn ensure_seeders_table(
        &self,
        client: &mut impl AsyncClient,
    ) -> Result<(), MigratorError> {
        client
            .execute(
                &self
                    .dialect
                    .tracked_table_ddl(SEEDERS_TABLE, "seeder", "seeded_at"),
                &[],
            )
            .await?;
        Ok(())
    }

    pub async fn seeded_names(
        &self,
        client: &mut impl AsyncClient,
    ) -> Result<HashSet<String>, MigratorError> {
        let rows = client
            .query(&format!("SELECT seeder FROM {SEEDERS_TABLE}"), &[])
            .await?;
        rows.iter()
            .map(|row| records::text(row, 0, SEEDERS_TABLE, "seeder"))
            .collect()
    }

    pub async fn all_seeded(
        &self,
        client: &mut impl AsyncClient,
    ) -> Result<Vec<SeederRecord>, MigratorError> {
        let rows = client
            .query(
                &format!("SELECT seeder, seeded_at FROM {SEEDERS_TABLE} ORDER BY id ASC"),
                &[],
            )
            .await?;
        rows.iter().map(SeederRecord::from_row).collect()
    }

    pub fn record_seed_statement(&self, name: &str) -> Statement {
        Statement::with_params(
            format!(
                "INSERT INTO {SEEDERS_TABLE} (seeder) VALUES ({})",
                self.dialect.placeholder(1)
            ),
            vec![SqlValue::from(name)],
        )
    }
}

/// Proof of lock ownership. Must be handed back with [`LockGuard::release`].
#[must_use = "the migration lock stays held until released"]
#[derive(Debug)]
pub struct LockGuard {
    ledger: Ledger,
    owner: String,
}

impl LockGuard {
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub async fn release(self, client: &mut impl AsyncClient) -> Result<(), MigratorError> {
        let dialect = self.ledger.dialect;
        let sql = format!(
            "UPDATE {LOCK_TABLE} SET locked = {}, locked_at = NULL, locked_by = NULL WHERE id = 1",
            dialect.bool_literal(false)
        );
        client.execute(&sql, &[]).await?;
        log::debug!("migration lock released by {}", self.owner);
        Ok(())
    }
}
