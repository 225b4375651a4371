#[cfg(feature = "tokio-postgres")]
mod tokio_postgres;

#[cfg(feature = "sqlite")]
mod rusqlite;

use crate::migrator::MigratorError;
use async_trait::async_trait;
use dbartisan_core::Dialect;
use time::macros::format_description;
use time::PrimitiveDateTime;

/// A parameter or column value exchanged with the database.
#[derive(Clone, Debug, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    Text(String),
    Timestamp(PrimitiveDateTime),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(v) => Some(*v),
            SqlValue::Text(v) => v.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Int(v) => Some(*v != 0),
            SqlValue::Text(v) => match v.as_str() {
                "1" | "t" | "true" | "TRUE" => Some(true),
                "0" | "f" | "false" | "FALSE" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Timestamps come back typed from PostgreSQL and as text from SQLite.
    pub fn as_timestamp(&self) -> Option<PrimitiveDateTime> {
        match self {
            SqlValue::Timestamp(v) => Some(*v),
            SqlValue::Text(v) => PrimitiveDateTime::parse(
                v,
                format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
            )
            .or_else(|_| {
                PrimitiveDateTime::parse(
                    v,
                    format_description!(
                        "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"
                    ),
                )
            })
            .ok(),
            _ => None,
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlValue::Null, Into::into)
    }
}

pub type Row = Vec<SqlValue>;

/// A single SQL statement with its positional parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Statement {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Statement {
            sql: sql.into(),
            params,
        }
    }
}

impl std::fmt::Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Database access used by the ledger and the engines.
///
/// Statements are issued one at a time, never concurrently.
#[async_trait]
pub trait AsyncClient: Send {
    /// Executes one statement and returns the number of affected rows.
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, MigratorError>;

    /// Runs a query and returns every row.
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, MigratorError>;

    /// Executes all statements in one transaction. If any statement fails the
    /// transaction is rolled back before the error is returned.
    async fn execute_atomic(&mut self, statements: &[Statement]) -> Result<(), MigratorError>;
}

/// A connected client for one of the bundled drivers.
#[cfg(any(feature = "tokio-postgres", feature = "sqlite"))]
pub enum AsyncDriver {
    #[cfg(feature = "tokio-postgres")]
    Postgres(::tokio_postgres::Client),
    #[cfg(feature = "sqlite")]
    Sqlite(::rusqlite::Connection),
}

#[cfg(any(feature = "tokio-postgres", feature = "sqlite"))]
impl AsyncDriver {
    pub async fn connect(dialect: Dialect, db_url: &str) -> Result<Self, MigratorError> {
        match dialect {
            #[cfg(feature = "tokio-postgres")]
            Dialect::Postgres => {
                let (client, connection) =
                    ::tokio_postgres::connect(db_url, ::tokio_postgres::NoTls).await?;
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        log::error!("connection error: {}", e);
                    }
                });
                Ok(AsyncDriver::Postgres(client))
            }
            #[cfg(feature = "sqlite")]
            Dialect::Sqlite => Ok(AsyncDriver::Sqlite(::rusqlite::Connection::open(
                sqlite_path(db_url),
            )?)),
            other => Err(MigratorError::UnsupportedDriver(other)),
        }
    }
}

/// Accepts both plain paths and `sqlite:` URLs.
#[cfg(feature = "sqlite")]
fn sqlite_path(db_url: &str) -> &str {
    db_url
        .strip_prefix("sqlite://")
        .or_else(|| db_url.strip_prefix("sqlite:"))
        .unwrap_or(db_url)
}

#[cfg(any(feature = "tokio-postgres", feature = "sqlite"))]
#[async_trait]
impl AsyncClient for AsyncDriver {
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, MigratorError> {
        match self {
            #[cfg(feature = "tokio-postgres")]
            AsyncDriver::Postgres(client) => AsyncClient::execute(client, sql, params).await,
            #[cfg(feature = "sqlite")]
            AsyncDriver::Sqlite(conn) => AsyncClient::execute(conn, sql, params).await,
        }
    }

    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, MigratorError> {
        match self {
            #[cfg(feature = "tokio-postgres")]
            AsyncDriver::Postgres(client) => AsyncClient::query(client, sql, params).await,
            #[cfg(feature = "sqlite")]
            AsyncDriver::Sqlite(conn) => AsyncClient::query(conn, sql, params).await,
        }
    }

    async fn execute_atomic(&mut self, statements: &[Statement]) -> Result<(), MigratorError> {
        match self {
            #[cfg(feature = "tokio-postgres")]
            AsyncDriver::Postgres(client) => AsyncClient::execute_atomic(client, statements).await,
            #[cfg(feature = "sqlite")]
            AsyncDriver::Sqlite(conn) => AsyncClient::execute_atomic(conn, statements).await,
        }
    }
}
