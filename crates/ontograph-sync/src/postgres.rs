//! PostgreSQL source connector.
//!
//! Rows are extracted as `row_to_json` documents through one server-side
//! cursor per run and handed out in batches of `FETCH FORWARD n`. When the
//! mapping declares a change column and the engine passes a watermark, only
//! rows whose change column is past the watermark are read.

use async_trait::async_trait;
use chrono::SecondsFormat;
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Connection, Executor, PgConnection, PgPool, Postgres, Row, Transaction};

use ontograph_core::{ConnectorConfig, Identifier, OntologyError};

use crate::connector::{
    Batch, BatchStream, Connector, DetectedColumn, DetectedSchema, FetchRequest,
};
use crate::error::SourceError;

const DEFAULT_SCHEMA: &str = "public";
const CURSOR_NAME: &str = "ontograph_extract";

/// Connection parameters read from `connection_params`.
#[derive(Debug, Clone, Deserialize)]
pub struct PgSourceParams {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database: String,
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_max_connections() -> u32 {
    2
}

impl PgSourceParams {
    fn connect_options(&self) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user);
        match &self.password {
            Some(password) => options.password(password),
            None => options,
        }
    }
}

/// A validated, quotable table reference.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TableRef {
    schema: Identifier,
    table: Identifier,
}

impl TableRef {
    fn parse(raw: &str) -> Result<Self, SourceError> {
        let invalid = |e: OntologyError| SourceError::Config(format!("source_table: {e}"));
        match raw.split_once('.') {
            Some((schema, table)) => Ok(Self {
                schema: Identifier::parse(schema).map_err(invalid)?,
                table: Identifier::parse(table).map_err(invalid)?,
            }),
            None => Ok(Self {
                schema: Identifier::parse(DEFAULT_SCHEMA).map_err(invalid)?,
                table: Identifier::parse(raw).map_err(invalid)?,
            }),
        }
    }

    fn quoted(&self) -> String {
        format!("\"{}\".\"{}\"", self.schema, self.table)
    }
}

/// Connector for one PostgreSQL table.
pub struct PostgresConnector {
    connector_id: String,
    params: PgSourceParams,
    table: TableRef,
    change_column: Option<Identifier>,
    pool: Option<PgPool>,
}

impl PostgresConnector {
    pub fn from_config(config: &ConnectorConfig) -> Result<Self, SourceError> {
        let params: PgSourceParams =
            serde_json::from_value(Value::Object(config.connection_params.clone()))
                .map_err(|e| SourceError::Config(format!("connection_params: {e}")))?;
        let source_table = config
            .source_table
            .as_deref()
            .ok_or_else(|| SourceError::Config("source_table is required".to_string()))?;
        let change_column = config
            .field_mapping
            .change_column
            .as_deref()
            .map(Identifier::parse)
            .transpose()
            .map_err(|e| SourceError::Config(format!("change_column: {e}")))?;

        Ok(Self {
            connector_id: config.connector_id.clone(),
            params,
            table: TableRef::parse(source_table)?,
            change_column,
            pool: None,
        })
    }

    /// Build the extraction query: one statement whose result set the cursor
    /// walks. The watermark is rendered as a typed literal; it is a value we
    /// produced, never source input.
    fn extract_query(&self, request: &FetchRequest) -> String {
        let table = self.table.quoted();
        match (&self.change_column, request.since) {
            (Some(column), Some(since)) if !request.full_sync => format!(
                "SELECT row_to_json(t) AS record FROM {table} t \
                 WHERE t.\"{column}\" > '{}'::timestamptz ORDER BY t.\"{column}\"",
                since.to_rfc3339_opts(SecondsFormat::Micros, true)
            ),
            (Some(column), _) => format!(
                "SELECT row_to_json(t) AS record FROM {table} t ORDER BY t.\"{column}\""
            ),
            (None, _) => format!("SELECT row_to_json(t) AS record FROM {table} t"),
        }
    }
}

/// Cursor state threaded through the batch stream.
///
/// Every batch is a `FETCH` from one server-side cursor declared inside a
/// single read-only, repeatable-read transaction, so a run reads one snapshot
/// and each row exactly once regardless of ties in the sort column.
struct Pager {
    pool: PgPool,
    declare: String,
    fetch: String,
    tx: Option<Transaction<'static, Postgres>>,
    done: bool,
}

impl Pager {
    fn new(pool: PgPool, query: &str, batch_size: usize) -> Self {
        Self {
            pool,
            declare: format!("DECLARE {CURSOR_NAME} NO SCROLL CURSOR FOR {query}"),
            fetch: format!("FETCH FORWARD {} FROM {CURSOR_NAME}", batch_size.max(1)),
            tx: None,
            done: false,
        }
    }

    fn open(&self) -> BoxFuture<'_, Result<Transaction<'static, Postgres>, sqlx::Error>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            (&mut *tx)
                .execute(sqlx::raw_sql(
                    "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY",
                ))
                .await?;
            (&mut *tx).execute(sqlx::raw_sql(&self.declare)).await?;
            Ok(tx)
        })
    }

    fn next_page(&mut self) -> BoxFuture<'_, Option<Result<Batch, SourceError>>> {
        Box::pin(async move {
            if self.done {
                return None;
            }

            let mut tx = match self.tx.take() {
                Some(tx) => tx,
                None => match self.open().await {
                    Ok(tx) => tx,
                    Err(e) => {
                        self.done = true;
                        return Some(Err(SourceError::Extraction(e.to_string())));
                    }
                },
            };

            let rows = match sqlx::query(&self.fetch).fetch_all(&mut *tx).await {
                Ok(rows) => rows,
                Err(e) => {
                    self.done = true;
                    return Some(Err(SourceError::Extraction(e.to_string())));
                }
            };

            if rows.is_empty() {
                self.done = true;
                // Read-only; ending it releases the snapshot and the cursor.
                if let Err(e) = tx.rollback().await {
                    tracing::debug!(error = %e, "Failed to close extraction transaction");
                }
                return None;
            }
            self.tx = Some(tx);

            let size = rows.len() as u64;
            let decoded: Result<Batch, sqlx::Error> = rows
                .iter()
                .map(|row| row.try_get::<Value, _>("record"))
                .collect();
            Some(decoded.map_err(|e| SourceError::MalformedBatch {
                size,
                reason: e.to_string(),
            }))
        })
    }
}

#[async_trait]
impl Connector for PostgresConnector {
    fn source_kind(&self) -> &str {
        "postgresql"
    }

    async fn connect(&mut self) -> Result<(), SourceError> {
        let pool = PgPoolOptions::new()
            .max_connections(self.params.max_connections)
            .connect_with(self.params.connect_options())
            .await
            .map_err(|e| SourceError::Connect(e.to_string()))?;
        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|e| SourceError::Connect(e.to_string()))?;

        tracing::info!(
            connector_id = %self.connector_id,
            host = %self.params.host,
            database = %self.params.database,
            "Connected to PostgreSQL source"
        );
        self.pool = Some(pool);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), SourceError> {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
            tracing::info!(connector_id = %self.connector_id, "Disconnected from PostgreSQL source");
        }
        Ok(())
    }

    async fn test_connection(&self) -> Result<(), SourceError> {
        let conn = PgConnection::connect_with(&self.params.connect_options())
            .await
            .map_err(|e| SourceError::Connect(e.to_string()))?;
        conn.close().await?;
        Ok(())
    }

    async fn detect_schema(&self) -> Result<DetectedSchema, SourceError> {
        let pool = self.pool.as_ref().ok_or(SourceError::NotConnected)?;
        let rows = sqlx::query(
            "SELECT column_name::text AS column_name, data_type::text AS data_type,
                    is_nullable::text AS is_nullable
             FROM information_schema.columns
             WHERE table_schema = $1 AND table_name = $2
             ORDER BY ordinal_position",
        )
        .bind(self.table.schema.as_str())
        .bind(self.table.table.as_str())
        .fetch_all(pool)
        .await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let nullable: String = row.try_get("is_nullable")?;
            columns.push(DetectedColumn {
                name: row.try_get("column_name")?,
                data_type: row.try_get("data_type")?,
                nullable: nullable == "YES",
            });
        }

        tracing::info!(
            connector_id = %self.connector_id,
            table = %self.table.table,
            columns = columns.len(),
            "Detected source schema"
        );
        Ok(DetectedSchema {
            table: format!("{}.{}", self.table.schema, self.table.table),
            columns,
        })
    }

    fn fetch_data(&self, request: FetchRequest) -> BatchStream<'_> {
        let Some(pool) = self.pool.clone() else {
            return stream::once(async { Err(SourceError::NotConnected) }).boxed();
        };

        let sql = self.extract_query(&request);
        tracing::debug!(connector_id = %self.connector_id, sql = %sql, "Fetching source rows");
        let pager = Pager::new(pool, &sql, request.batch_size);

        stream::unfold(pager, |mut pager| async move {
            let item = pager.next_page().await?;
            Some((item, pager))
        })
        .boxed()
    }
}
