use super::{AsyncClient, Row, SqlValue, Statement};
use crate::migrator::MigratorError;
use async_trait::async_trait;
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql};
use time::macros::format_description;

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Int(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            SqlValue::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            SqlValue::Timestamp(v) => {
                let text = v
                    .format(format_description!(
                        "[year]-[month]-[day] [hour]:[minute]:[second]"
                    ))
                    .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
                ToSqlOutput::Owned(Value::Text(text))
            }
        })
    }
}

fn read_value(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(v) => SqlValue::Int(v),
        ValueRef::Real(v) => SqlValue::Text(v.to_string()),
        ValueRef::Text(v) | ValueRef::Blob(v) => {
            SqlValue::Text(String::from_utf8_lossy(v).into_owned())
        }
    }
}

/// Statements returning rows (`PRAGMA`, `SELECT`, `RETURNING`) are drained
/// instead of executed. Unbound statements go through `execute_batch`, which
/// accepts comment-only text.
fn run(conn: &Connection, sql: &str, params: &[SqlValue]) -> rusqlite::Result<usize> {
    let mut statement = conn.prepare(sql)?;
    if statement.column_count() == 0 && params.is_empty() {
        drop(statement);
        conn.execute_batch(sql)?;
        Ok(conn.changes() as usize)
    } else if statement.column_count() == 0 {
        statement.execute(params_from_iter(params.iter()))
    } else {
        let mut rows = statement.query(params_from_iter(params.iter()))?;
        while rows.next()?.is_some() {}
        Ok(0)
    }
}

fn fetch(conn: &Connection, sql: &str, params: &[SqlValue]) -> rusqlite::Result<Vec<Row>> {
    let mut statement = conn.prepare(sql)?;
    let columns = statement.column_count();
    let mut rows = statement.query(params_from_iter(params.iter()))?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(columns);
        for idx in 0..columns {
            values.push(read_value(row.get_ref(idx)?));
        }
        result.push(values);
    }
    Ok(result)
}

fn run_atomic(conn: &mut Connection, statements: &[Statement]) -> rusqlite::Result<()> {
    let transaction = conn.transaction()?;
    for statement in statements {
        if let Err(e) = run(&transaction, &statement.sql, &statement.params) {
            if let Err(rollback_err) = transaction.rollback() {
                log::warn!("rollback failed: {}", rollback_err);
            }
            return Err(e);
        }
    }
    transaction.commit()
}

#[async_trait]
impl AsyncClient for Connection {
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, MigratorError> {
        let affected = run(self, sql, params)?;
        Ok(affected as u64)
    }

    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, MigratorError> {
        Ok(fetch(self, sql, params)?)
    }

    async fn execute_atomic(&mut self, statements: &[Statement]) -> Result<(), MigratorError> {
        Ok(run_atomic(self, statements)?)
    }
}
