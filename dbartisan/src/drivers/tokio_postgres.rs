use super::{AsyncClient, Row, SqlValue, Statement};
use crate::migrator::MigratorError;
use async_trait::async_trait;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, GenericClient};

type BoxedParam = Box<dyn ToSql + Sync + Send>;

/// Converts parameters to the types the server inferred for the prepared
/// statement. Integer columns narrower than `BIGINT` need narrower values.
fn bind(types: &[Type], params: &[SqlValue]) -> Vec<BoxedParam> {
    params
        .iter()
        .enumerate()
        .map(|(idx, value)| {
            let ty = types.get(idx).unwrap_or(&Type::TEXT);
            let boxed: BoxedParam = match value {
                SqlValue::Null => Box::new(None::<String>),
                SqlValue::Int(v) if *ty == Type::INT2 => match i16::try_from(*v) {
                    Ok(v) => Box::new(v),
                    Err(_) => Box::new(*v),
                },
                SqlValue::Int(v) if *ty == Type::INT4 => match i32::try_from(*v) {
                    Ok(v) => Box::new(v),
                    Err(_) => Box::new(*v),
                },
                SqlValue::Int(v) if *ty == Type::BOOL => Box::new(*v != 0),
                SqlValue::Int(v) => Box::new(*v),
                SqlValue::Text(v) => Box::new(v.clone()),
                SqlValue::Timestamp(v) => Box::new(*v),
            };
            boxed
        })
        .collect()
}

async fn run<C: GenericClient + Sync>(
    client: &C,
    sql: &str,
    params: &[SqlValue],
) -> Result<u64, tokio_postgres::Error> {
    if params.is_empty() {
        return client.execute(sql, &[]).await;
    }
    let statement = client.prepare(sql).await?;
    let bound = bind(statement.params(), params);
    let refs: Vec<&(dyn ToSql + Sync)> = bound
        .iter()
        .map(|p| p.as_ref() as &(dyn ToSql + Sync))
        .collect();
    client.execute(&statement, &refs).await
}

fn read_value(row: &tokio_postgres::Row, idx: usize) -> Result<SqlValue, tokio_postgres::Error> {
    let ty = row.columns()[idx].type_();
    let value = if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(idx)?
            .map(|v| SqlValue::Int(v.into()))
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(idx)?
            .map(|v| SqlValue::Int(v.into()))
    } else if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(idx)?.map(SqlValue::Int)
    } else if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(idx)?
            .map(|v| SqlValue::Int(v.into()))
    } else if *ty == Type::TIMESTAMP {
        row.try_get::<_, Option<PrimitiveDateTime>>(idx)?
            .map(SqlValue::Timestamp)
    } else if *ty == Type::TIMESTAMPTZ {
        row.try_get::<_, Option<OffsetDateTime>>(idx)?.map(|v| {
            let utc = v.to_offset(UtcOffset::UTC);
            SqlValue::Timestamp(PrimitiveDateTime::new(utc.date(), utc.time()))
        })
    } else {
        row.try_get::<_, Option<String>>(idx)?.map(SqlValue::Text)
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

#[async_trait]
impl AsyncClient for Client {
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, MigratorError> {
        Ok(run(&*self, sql, params).await?)
    }

    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, MigratorError> {
        let statement = self.prepare(sql).await?;
        let bound = bind(statement.params(), params);
        let refs: Vec<&(dyn ToSql + Sync)> = bound
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();
        let rows = Client::query(self, &statement, &refs).await?;
        let mut result = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            let mut values = Vec::with_capacity(row.len());
            for idx in 0..row.len() {
                values.push(read_value(row, idx)?);
            }
            result.push(values);
        }
        Ok(result)
    }

    async fn execute_atomic(&mut self, statements: &[Statement]) -> Result<(), MigratorError> {
        let transaction = self.transaction().await?;
        for statement in statements {
            if let Err(e) = run(&transaction, &statement.sql, &statement.params).await {
                if let Err(rollback_err) = transaction.rollback().await {
                    log::warn!("rollback failed: {}", rollback_err);
                }
                return Err(e.into());
            }
        }
        transaction.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_narrows_integers_to_parameter_type() {
        let bound = bind(
            &[Type::INT4, Type::VARCHAR, Type::INT8],
            &[SqlValue::Int(7), SqlValue::from("name"), SqlValue::Int(9)],
        );
        assert_eq!(bound.len(), 3);
        assert_eq!(format!("{:?}", bound[0]), "7");
        assert_eq!(format!("{:?}", bound[1]), "\"name\"");
    }

    #[test]
    fn bind_defaults_missing_types_to_text() {
        let bound = bind(&[], &[SqlValue::Null]);
        assert_eq!(format!("{:?}", bound[0]), "None");
    }
}
