use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_postgres::types::Type;
use tokio_postgres::{Client, NoTls, SimpleQueryMessage, Statement};
use crate::error::ExecutionError;
use crate::models::{ColumnInfo, Row, SchemaContext, TableSchema};

// Runs SQL against the warehouse
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn run(&self, sql: &str) -> Result<Vec<Row>, ExecutionError>;
    async fn describe_schema(&self) -> Result<SchemaContext, ExecutionError>;
    /// Best-effort connectivity probe, never errors.
    async fn is_connected(&self) -> bool;
}

const PING_TIMEOUT: Duration = Duration::from_secs(5);

// information_schema columns are domain types, cast so they decode as String
const DESCRIBE_SQL: &str = "SELECT table_name::text, column_name::text, data_type::text \
     FROM information_schema.columns \
     WHERE table_schema = $1 \
     ORDER BY table_name, ordinal_position";

/// Postgres wire executor (Redshift, Postgres).
///
/// The connection is opened lazily and reopened on the next call once the
/// server side has closed it.
pub struct PostgresExecutor {
    dsn: String,
    schema: String,
    client: Mutex<Option<Arc<Client>>>,
}

impl PostgresExecutor {
    pub fn new(dsn: &str, schema: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            schema: schema.to_string(),
            client: Mutex::new(None),
        }
    }

    /// Open the connection now instead of on first use.
    pub async fn connect(&self) -> Result<(), ExecutionError> {
        self.client().await.map(|_| ())
    }

    async fn client(&self) -> Result<Arc<Client>, ExecutionError> {
        let mut guard = self.client.lock().await;
        if let Some(client) = guard.as_ref() {
            if !client.is_closed() {
                return Ok(Arc::clone(client));
            }
            tracing::warn!("warehouse connection closed, reconnecting");
        }

        let (client, connection) = tokio_postgres::connect(&self.dsn, NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "warehouse connection error");
            }
        });
        tracing::info!("warehouse connection established");

        let client = Arc::new(client);
        *guard = Some(Arc::clone(&client));
        Ok(client)
    }
}

#[async_trait]
impl QueryExecutor for PostgresExecutor {
    async fn run(&self, sql: &str) -> Result<Vec<Row>, ExecutionError> {
        let client = self.client().await?;
        let statement = client.prepare(sql).await?;

        if statement.columns().iter().all(|c| is_typed(c.type_())) {
            let rows = client.query(&statement, &[]).await?;
            rows.iter().map(|r| typed_row(&statement, r)).collect()
        } else {
            // NUMERIC and friends have no lossless JSON mapping, take the server's text form
            let messages = client.simple_query(sql).await?;
            Ok(text_rows(messages))
        }
    }

    async fn describe_schema(&self) -> Result<SchemaContext, ExecutionError> {
        let client = self.client().await?;
        let rows = client.query(DESCRIBE_SQL, &[&self.schema]).await?;

        let mut tables: Vec<TableSchema> = Vec::new();
        for row in rows {
            let table: String = row.try_get(0)?;
            let column = ColumnInfo {
                name: row.try_get(1)?,
                data_type: row.try_get(2)?,
            };
            match tables.last_mut() {
                Some(last) if last.name == table => last.columns.push(column),
                _ => tables.push(TableSchema {
                    name: table,
                    columns: vec![column],
                }),
            }
        }
        Ok(SchemaContext { tables })
    }

    async fn is_connected(&self) -> bool {
        let probe = async {
            let client = self.client().await?;
            client.simple_query("SELECT 1").await?;
            Ok::<_, ExecutionError>(())
        };
        matches!(tokio::time::timeout(PING_TIMEOUT, probe).await, Ok(Ok(())))
    }
}

fn is_typed(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::BOOL
            | Type::INT2
            | Type::INT4
            | Type::INT8
            | Type::FLOAT4
            | Type::FLOAT8
            | Type::TEXT
            | Type::VARCHAR
            | Type::BPCHAR
            | Type::NAME
            | Type::JSON
            | Type::JSONB
            | Type::DATE
            | Type::TIMESTAMP
            | Type::TIMESTAMPTZ
    )
}

fn typed_row(statement: &Statement, row: &tokio_postgres::Row) -> Result<Row, ExecutionError> {
    let mut out = Row::new();
    for (idx, column) in statement.columns().iter().enumerate() {
        let value = typed_value(row, idx, column.type_()).ok_or_else(|| {
            ExecutionError::UnsupportedType {
                column: column.name().to_string(),
                type_name: column.type_().name().to_string(),
            }
        })??;
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

// None when the type has no mapping
fn typed_value(
    row: &tokio_postgres::Row,
    idx: usize,
    ty: &Type,
) -> Option<Result<Value, ExecutionError>> {
    fn get<'a, T>(row: &'a tokio_postgres::Row, idx: usize) -> Result<Value, ExecutionError>
    where
        T: tokio_postgres::types::FromSql<'a> + serde::Serialize,
    {
        let v: Option<T> = row.try_get(idx)?;
        Ok(json!(v))
    }

    let value = match *ty {
        Type::BOOL => get::<bool>(row, idx),
        Type::INT2 => get::<i16>(row, idx),
        Type::INT4 => get::<i32>(row, idx),
        Type::INT8 => get::<i64>(row, idx),
        Type::FLOAT4 => get::<f32>(row, idx),
        Type::FLOAT8 => get::<f64>(row, idx),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => get::<String>(row, idx),
        Type::JSON | Type::JSONB => get::<Value>(row, idx),
        Type::DATE => get::<chrono::NaiveDate>(row, idx),
        Type::TIMESTAMP => get::<chrono::NaiveDateTime>(row, idx),
        Type::TIMESTAMPTZ => get::<chrono::DateTime<chrono::Utc>>(row, idx),
        _ => return None,
    };
    Some(value)
}

fn text_rows(messages: Vec<SimpleQueryMessage>) -> Vec<Row> {
    messages
        .into_iter()
        .filter_map(|m| match m {
            SimpleQueryMessage::Row(row) => Some(row),
            _ => None,
        })
        .map(|row| {
            let mut out = Row::new();
            for (idx, column) in row.columns().iter().enumerate() {
                let value = row
                    .get(idx)
                    .map(|s| Value::String(s.to_string()))
                    .unwrap_or(Value::Null);
                out.insert(column.name().to_string(), value);
            }
            out
        })
        .collect()
}
