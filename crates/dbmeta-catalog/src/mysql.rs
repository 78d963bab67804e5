//! MySQL catalog
//!
//! Reads `information_schema` over a dedicated connection per session.
//! Every statement is a parameterized SELECT; identifiers are always bound,
//! never spliced into SQL text. Text columns are cast to CHAR and numeric
//! columns to SIGNED so decoding does not depend on server version.

use crate::error::{CatalogError, CatalogResult};
use crate::source::{
    CatalogSession, CatalogSource, CheckConstraintRow, ColumnRow, ForeignKeyColumnRow,
    IndexColumnRow, KeyColumnRow, KeyConstraintType, RelationshipRow, SYSTEM_SCHEMAS, TableRow,
    TableScope,
};
use async_trait::async_trait;
use dbmeta_core::DatabaseConfig;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow, MySqlSslMode};
use sqlx::{ConnectOptions, Connection, Row};
use std::fmt;
use std::future::Future;
use std::time::Duration;

const TABLE_COLUMNS: &str = r#"
    CAST(TABLE_SCHEMA AS CHAR) AS table_schema,
    CAST(TABLE_NAME AS CHAR) AS table_name,
    CAST(TABLE_COMMENT AS CHAR) AS table_comment,
    CAST(ENGINE AS CHAR) AS engine,
    CAST(TABLE_COLLATION AS CHAR) AS table_collation,
    CAST(ROW_FORMAT AS CHAR) AS row_format
"#;

const SCHEMA_TABLES_SQL: &str = r#"
    FROM information_schema.TABLES
    WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE'
    ORDER BY TABLE_SCHEMA, TABLE_NAME
"#;

const USER_TABLES_SQL: &str = r#"
    FROM information_schema.TABLES
    WHERE TABLE_SCHEMA NOT IN (?, ?, ?, ?) AND TABLE_TYPE = 'BASE TABLE'
    ORDER BY TABLE_SCHEMA, TABLE_NAME
"#;

const FIND_TABLE_SQL: &str = r#"
    FROM information_schema.TABLES
    WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND TABLE_TYPE = 'BASE TABLE'
"#;

const COLUMNS_SQL: &str = r#"
    SELECT
        CAST(COLUMN_NAME AS CHAR) AS column_name,
        CAST(COLUMN_TYPE AS CHAR) AS column_type,
        CAST(IS_NULLABLE AS CHAR) AS is_nullable,
        CAST(COLUMN_DEFAULT AS CHAR) AS column_default,
        CAST(EXTRA AS CHAR) AS extra,
        CAST(COLUMN_COMMENT AS CHAR) AS column_comment
    FROM information_schema.COLUMNS
    WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
    ORDER BY ORDINAL_POSITION
"#;

const KEY_COLUMNS_SQL: &str = r#"
    SELECT
        CAST(kcu.CONSTRAINT_NAME AS CHAR) AS constraint_name,
        CAST(tc.CONSTRAINT_TYPE AS CHAR) AS constraint_type,
        CAST(kcu.COLUMN_NAME AS CHAR) AS column_name,
        CAST(kcu.ORDINAL_POSITION AS SIGNED) AS ordinal_position
    FROM information_schema.KEY_COLUMN_USAGE kcu
    JOIN information_schema.TABLE_CONSTRAINTS tc
      ON kcu.TABLE_SCHEMA = tc.TABLE_SCHEMA
     AND kcu.TABLE_NAME = tc.TABLE_NAME
     AND kcu.CONSTRAINT_NAME = tc.CONSTRAINT_NAME
    WHERE kcu.TABLE_SCHEMA = ? AND kcu.TABLE_NAME = ?
      AND tc.CONSTRAINT_TYPE IN ('PRIMARY KEY', 'UNIQUE')
    ORDER BY tc.CONSTRAINT_TYPE, kcu.CONSTRAINT_NAME, kcu.ORDINAL_POSITION
"#;

const INDEX_COLUMNS_SQL: &str = r#"
    SELECT
        CAST(INDEX_NAME AS CHAR) AS index_name,
        CAST(COLUMN_NAME AS CHAR) AS column_name,
        CAST(SEQ_IN_INDEX AS SIGNED) AS seq_in_index,
        CAST(NON_UNIQUE AS SIGNED) AS non_unique
    FROM information_schema.STATISTICS
    WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
    ORDER BY INDEX_NAME, SEQ_IN_INDEX
"#;

const FOREIGN_KEY_COLUMNS_SQL: &str = r#"
    SELECT
        CAST(kcu.CONSTRAINT_NAME AS CHAR) AS constraint_name,
        CAST(kcu.COLUMN_NAME AS CHAR) AS column_name,
        CAST(kcu.ORDINAL_POSITION AS SIGNED) AS ordinal_position,
        CAST(kcu.REFERENCED_TABLE_SCHEMA AS CHAR) AS referenced_schema,
        CAST(kcu.REFERENCED_TABLE_NAME AS CHAR) AS referenced_table,
        CAST(kcu.REFERENCED_COLUMN_NAME AS CHAR) AS referenced_column,
        CAST(rc.UPDATE_RULE AS CHAR) AS update_rule,
        CAST(rc.DELETE_RULE AS CHAR) AS delete_rule
    FROM information_schema.KEY_COLUMN_USAGE kcu
    JOIN information_schema.REFERENTIAL_CONSTRAINTS rc
      ON kcu.CONSTRAINT_NAME = rc.CONSTRAINT_NAME
     AND kcu.TABLE_SCHEMA = rc.CONSTRAINT_SCHEMA
    WHERE kcu.TABLE_SCHEMA = ? AND kcu.TABLE_NAME = ?
      AND kcu.REFERENCED_TABLE_NAME IS NOT NULL
    ORDER BY kcu.CONSTRAINT_NAME, kcu.ORDINAL_POSITION
"#;

const CHECK_VIEW_PROBE_SQL: &str = r#"
    SELECT CAST(COUNT(*) AS SIGNED) AS present
    FROM information_schema.TABLES
    WHERE TABLE_SCHEMA = 'information_schema' AND TABLE_NAME = 'CHECK_CONSTRAINTS'
"#;

const CHECK_CONSTRAINTS_SQL: &str = r#"
    SELECT
        CAST(CONSTRAINT_NAME AS CHAR) AS constraint_name,
        CAST(CHECK_CLAUSE AS CHAR) AS check_clause
    FROM information_schema.CHECK_CONSTRAINTS
    WHERE CONSTRAINT_SCHEMA = ? AND CONSTRAINT_NAME IN (
        SELECT CONSTRAINT_NAME FROM information_schema.TABLE_CONSTRAINTS
        WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND CONSTRAINT_TYPE = 'CHECK'
    )
    ORDER BY CONSTRAINT_NAME
"#;

const RELATIONSHIPS_SQL: &str = r#"
    SELECT
        CAST(kcu.TABLE_NAME AS CHAR) AS from_table,
        CAST(kcu.COLUMN_NAME AS CHAR) AS from_column,
        CAST(kcu.REFERENCED_TABLE_NAME AS CHAR) AS to_table,
        CAST(kcu.REFERENCED_COLUMN_NAME AS CHAR) AS to_column,
        CAST(kcu.CONSTRAINT_NAME AS CHAR) AS constraint_name
    FROM information_schema.KEY_COLUMN_USAGE kcu
    WHERE kcu.TABLE_SCHEMA = ? AND kcu.REFERENCED_TABLE_NAME IS NOT NULL
    ORDER BY kcu.TABLE_NAME, kcu.CONSTRAINT_NAME, kcu.ORDINAL_POSITION
"#;

fn table_query(filter: &str) -> String {
    format!("SELECT {} {}", TABLE_COLUMNS, filter)
}

/// Catalog source opening one MySQL connection per session
#[derive(Clone)]
pub struct MySqlCatalog {
    options: MySqlConnectOptions,
    connect_timeout: Duration,
    query_timeout: Duration,
}

impl MySqlCatalog {
    pub fn new(config: &DatabaseConfig) -> Self {
        let ssl_mode = if config.ssl {
            MySqlSslMode::Required
        } else {
            MySqlSslMode::Disabled
        };

        let mut options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .charset("utf8mb4")
            .ssl_mode(ssl_mode)
            .disable_statement_logging();
        if let Some(database) = &config.name {
            options = options.database(database);
        }

        Self {
            options,
            connect_timeout: config.connect_timeout(),
            query_timeout: config.query_timeout(),
        }
    }
}

impl fmt::Debug for MySqlCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MySqlCatalog")
            .field("host", &self.options.get_host())
            .field("port", &self.options.get_port())
            .field("connect_timeout", &self.connect_timeout)
            .field("query_timeout", &self.query_timeout)
            .finish()
    }
}

#[async_trait]
impl CatalogSource for MySqlCatalog {
    async fn open(&self) -> CatalogResult<Box<dyn CatalogSession>> {
        let conn = match tokio::time::timeout(self.connect_timeout, self.options.connect()).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(err)) => return Err(classify_connect_error(err)),
            Err(_) => {
                return Err(CatalogError::Timeout(format!(
                    "connect exceeded {}s",
                    self.connect_timeout.as_secs()
                )));
            }
        };

        tracing::debug!(
            host = %self.options.get_host(),
            port = self.options.get_port(),
            "Opened catalog connection"
        );

        Ok(Box::new(MySqlSession {
            conn,
            query_timeout: self.query_timeout,
        }))
    }
}

struct MySqlSession {
    conn: MySqlConnection,
    query_timeout: Duration,
}

impl MySqlSession {
    async fn fetch_rows(&mut self, label: &str, sql: &str, binds: &[&str]) -> CatalogResult<Vec<MySqlRow>> {
        let mut query = sqlx::query(sql);
        for value in binds {
            query = query.bind(*value);
        }
        tracing::debug!(query = label, "Querying catalog");
        bounded(self.query_timeout, label, query.fetch_all(&mut self.conn)).await
    }
}

/// Apply the query timeout to one statement
async fn bounded<T, F>(limit: Duration, label: &str, statement: F) -> CatalogResult<T>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(limit, statement).await {
        Ok(result) => result.map_err(classify_query_error),
        Err(_) => Err(CatalogError::Timeout(format!(
            "{} exceeded {}s",
            label,
            limit.as_secs()
        ))),
    }
}

fn mentions_timeout(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("timed out") || message.contains("timeout")
}

fn classify_query_error(err: sqlx::Error) -> CatalogError {
    match &err {
        sqlx::Error::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => {
            CatalogError::Timeout(err.to_string())
        }
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) => CatalogError::Connect(err.to_string()),
        sqlx::Error::PoolTimedOut => CatalogError::Timeout(err.to_string()),
        _ => {
            let message = err.to_string();
            if mentions_timeout(&message) {
                CatalogError::Timeout(message)
            } else {
                CatalogError::Query(message)
            }
        }
    }
}

/// Anything that is not a timeout while connecting is a connection failure
fn classify_connect_error(err: sqlx::Error) -> CatalogError {
    match classify_query_error(err) {
        CatalogError::Query(message) => CatalogError::Connect(message),
        other => other,
    }
}

fn decode_error(column: &str, err: sqlx::Error) -> CatalogError {
    CatalogError::Query(format!("failed to decode column {}: {}", column, err))
}

fn opt_text(row: &MySqlRow, column: &str) -> CatalogResult<Option<String>> {
    row.try_get::<Option<String>, _>(column)
        .map_err(|e| decode_error(column, e))
}

/// NULL reads as an empty string
fn text(row: &MySqlRow, column: &str) -> CatalogResult<String> {
    Ok(opt_text(row, column)?.unwrap_or_default())
}

fn int(row: &MySqlRow, column: &str) -> CatalogResult<i64> {
    row.try_get::<Option<i64>, _>(column)
        .map(|value| value.unwrap_or_default())
        .map_err(|e| decode_error(column, e))
}

fn table_row(row: &MySqlRow) -> CatalogResult<TableRow> {
    Ok(TableRow {
        schema: text(row, "table_schema")?,
        table_name: text(row, "table_name")?,
        table_comment: text(row, "table_comment")?,
        engine: opt_text(row, "engine")?,
        table_collation: opt_text(row, "table_collation")?,
        row_format: opt_text(row, "row_format")?,
    })
}

#[async_trait]
impl CatalogSession for MySqlSession {
    async fn base_tables(&mut self, scope: &TableScope) -> CatalogResult<Vec<TableRow>> {
        let rows = match scope {
            TableScope::Schema(schema) => {
                let sql = table_query(SCHEMA_TABLES_SQL);
                self.fetch_rows("base_tables", &sql, &[schema.as_str()]).await?
            }
            TableScope::UserSchemas => {
                let sql = table_query(USER_TABLES_SQL);
                self.fetch_rows("base_tables", &sql, &SYSTEM_SCHEMAS).await?
            }
        };
        rows.iter().map(table_row).collect()
    }

    async fn find_base_table(&mut self, schema: &str, table: &str) -> CatalogResult<Option<TableRow>> {
        let sql = table_query(FIND_TABLE_SQL);
        let rows = self.fetch_rows("find_base_table", &sql, &[schema, table]).await?;
        rows.first().map(table_row).transpose()
    }

    async fn columns(&mut self, schema: &str, table: &str) -> CatalogResult<Vec<ColumnRow>> {
        let rows = self.fetch_rows("columns", COLUMNS_SQL, &[schema, table]).await?;
        rows.iter()
            .map(|row| {
                Ok(ColumnRow {
                    column_name: text(row, "column_name")?,
                    column_type: text(row, "column_type")?,
                    is_nullable: text(row, "is_nullable")?,
                    column_default: opt_text(row, "column_default")?,
                    extra: text(row, "extra")?,
                    column_comment: text(row, "column_comment")?,
                })
            })
            .collect()
    }

    async fn key_columns(&mut self, schema: &str, table: &str) -> CatalogResult<Vec<KeyColumnRow>> {
        let rows = self.fetch_rows("key_columns", KEY_COLUMNS_SQL, &[schema, table]).await?;
        let mut keys = Vec::with_capacity(rows.len());
        for row in &rows {
            let raw_type = text(row, "constraint_type")?;
            let Some(constraint_type) = KeyConstraintType::parse(&raw_type) else {
                continue;
            };
            keys.push(KeyColumnRow {
                constraint_name: text(row, "constraint_name")?,
                constraint_type,
                column_name: text(row, "column_name")?,
                ordinal_position: int(row, "ordinal_position")?,
            });
        }
        Ok(keys)
    }

    async fn index_columns(&mut self, schema: &str, table: &str) -> CatalogResult<Vec<IndexColumnRow>> {
        let rows = self
            .fetch_rows("index_columns", INDEX_COLUMNS_SQL, &[schema, table])
            .await?;
        rows.iter()
            .map(|row| {
                Ok(IndexColumnRow {
                    index_name: text(row, "index_name")?,
                    column_name: text(row, "column_name")?,
                    seq_in_index: int(row, "seq_in_index")?,
                    non_unique: int(row, "non_unique")? != 0,
                })
            })
            .collect()
    }

    async fn foreign_key_columns(
        &mut self,
        schema: &str,
        table: &str,
    ) -> CatalogResult<Vec<ForeignKeyColumnRow>> {
        let rows = self
            .fetch_rows("foreign_key_columns", FOREIGN_KEY_COLUMNS_SQL, &[schema, table])
            .await?;
        rows.iter()
            .map(|row| {
                Ok(ForeignKeyColumnRow {
                    constraint_name: text(row, "constraint_name")?,
                    column_name: text(row, "column_name")?,
                    ordinal_position: int(row, "ordinal_position")?,
                    referenced_schema: text(row, "referenced_schema")?,
                    referenced_table: text(row, "referenced_table")?,
                    referenced_column: text(row, "referenced_column")?,
                    update_rule: text(row, "update_rule")?,
                    delete_rule: text(row, "delete_rule")?,
                })
            })
            .collect()
    }

    async fn supports_check_constraints(&mut self) -> CatalogResult<bool> {
        let rows = self
            .fetch_rows("check_constraints_probe", CHECK_VIEW_PROBE_SQL, &[])
            .await?;
        match rows.first() {
            Some(row) => Ok(int(row, "present")? > 0),
            None => Ok(false),
        }
    }

    async fn check_constraints(
        &mut self,
        schema: &str,
        table: &str,
    ) -> CatalogResult<Vec<CheckConstraintRow>> {
        let rows = self
            .fetch_rows("check_constraints", CHECK_CONSTRAINTS_SQL, &[schema, schema, table])
            .await?;
        rows.iter()
            .map(|row| {
                Ok(CheckConstraintRow {
                    constraint_name: text(row, "constraint_name")?,
                    check_clause: text(row, "check_clause")?,
                })
            })
            .collect()
    }

    async fn schema_relationships(&mut self, schema: &str) -> CatalogResult<Vec<RelationshipRow>> {
        let rows = self.fetch_rows("relationships", RELATIONSHIPS_SQL, &[schema]).await?;
        rows.iter()
            .map(|row| {
                Ok(RelationshipRow {
                    from_table: text(row, "from_table")?,
                    from_column: text(row, "from_column")?,
                    to_table: text(row, "to_table")?,
                    to_column: text(row, "to_column")?,
                    constraint_name: text(row, "constraint_name")?,
                })
            })
            .collect()
    }

    async fn close(self: Box<Self>) {
        let session = *self;
        if let Err(err) = session.conn.close().await {
            tracing::debug!(error = %err, "Error closing catalog connection");
        }
    }
}
