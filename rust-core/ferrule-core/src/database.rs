//! # Database Module
//!
//! The connection gateway: one database connection, opened at process
//! start and shared by every record and query through an explicit handle.
//!
//! All statements are prepared with positional `?` placeholders and bound
//! from [`DbValue`] parameters; values are never interpolated into SQL text.
//! The gateway counts executed statements and accumulates the time spent in
//! the driver so the request handler can report a `db` / `app` split.

use crate::config::{DatabaseConfig, Driver};
use crate::error::{Error, Result};
use serde::Serialize;
use sqlx::mysql::{MySql, MySqlArguments, MySqlConnection, MySqlRow};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnection, SqliteRow};
use sqlx::{Column, Connection, Row as _, TypeInfo, ValueRef};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// One result row, keyed by column name
pub type Row = HashMap<String, DbValue>;

/// Scalar value bound to a placeholder or read from a result column
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DbValue {
    /// Null value
    Null,
    /// Integer value
    Int(i64),
    /// Float value
    Float(f64),
    /// String value
    String(String),
    /// Boolean value
    Bool(bool),
    /// Binary data
    Bytes(Vec<u8>),
}

impl DbValue {
    /// Short type label used in error messages
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bool(_) => "boolean",
            Self::Bytes(_) => "bytes",
        }
    }

    /// Check for SQL NULL
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<i64> for DbValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for DbValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for DbValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for DbValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for DbValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for DbValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<u8>> for DbValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl<T: Into<Self>> From<Option<T>> for DbValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Outcome of an executed statement
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    /// Fetched rows (empty for writes)
    pub rows: Vec<Row>,
    /// Rows changed by a write
    pub rows_affected: u64,
    /// Identifier generated by the last insert, when the store assigned one
    pub last_insert_id: Option<i64>,
}

enum Handle {
    Sqlite(SqliteConnection),
    MySql(MySqlConnection),
}

/// The single shared database connection
///
/// Statements are executed one at a time; concurrent callers queue on the
/// connection lock. There is no pooling and no retry: a failed statement is
/// logged and surfaced as `Error::Database`.
pub struct Database {
    driver: Driver,
    handle: Mutex<Option<Handle>>,
    query_count: AtomicU64,
    execution_nanos: AtomicU64,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("driver", &self.driver)
            .field("query_count", &self.query_count())
            .field("execution_time", &self.execution_time())
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Open the connection described by the configuration
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` if the connection cannot be established.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        debug!(target_db = %config.describe(), "Opening database connection");
        match config.driver {
            Driver::Sqlite => {
                let conn = SqliteConnection::connect_with(&config.sqlite_options())
                    .await
                    .map_err(|e| connect_error("SQLite", &e))?;
                Ok(Self::opened(Driver::Sqlite, Handle::Sqlite(conn)))
            }
            Driver::Mysql => {
                let conn = MySqlConnection::connect_with(&config.mysql_options())
                    .await
                    .map_err(|e| connect_error("MySQL", &e))?;
                Ok(Self::opened(Driver::Mysql, Handle::MySql(conn)))
            }
        }
    }

    /// Connect to a SQLite database
    ///
    /// # Example
    ///
    /// ```ignore
    /// let db = Database::connect_sqlite("sqlite::memory:").await?;
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` if the file cannot be opened.
    pub async fn connect_sqlite(url: &str) -> Result<Self> {
        let conn = SqliteConnection::connect(url)
            .await
            .map_err(|e| connect_error("SQLite", &e))?;
        Ok(Self::opened(Driver::Sqlite, Handle::Sqlite(conn)))
    }

    /// Connect to a MySQL database by URL; components must be percent-encoded
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` if the server is unreachable or rejects the
    /// credentials.
    pub async fn connect_mysql(url: &str) -> Result<Self> {
        let conn = MySqlConnection::connect(url)
            .await
            .map_err(|e| connect_error("MySQL", &e))?;
        Ok(Self::opened(Driver::Mysql, Handle::MySql(conn)))
    }

    fn opened(driver: Driver, handle: Handle) -> Self {
        info!(driver = ?driver, "Database connection established");
        Self::from_handle(driver, handle)
    }

    fn from_handle(driver: Driver, handle: Handle) -> Self {
        Self {
            driver,
            handle: Mutex::new(Some(handle)),
            query_count: AtomicU64::new(0),
            execution_nanos: AtomicU64::new(0),
        }
    }

    /// SQL dialect of the open connection
    #[must_use]
    pub const fn driver(&self) -> Driver {
        self.driver
    }

    /// Number of statements sent to the driver so far
    #[must_use]
    pub fn query_count(&self) -> u64 {
        self.query_count.load(Ordering::Relaxed)
    }

    /// Total time spent executing statements
    #[must_use]
    pub fn execution_time(&self) -> Duration {
        Duration::from_nanos(self.execution_nanos.load(Ordering::Relaxed))
    }

    /// Execute a statement that doesn't return rows (INSERT, UPDATE, DELETE, DDL)
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` if the statement fails to prepare or execute.
    pub async fn execute(&self, sql: &str, params: &[DbValue]) -> Result<ResultSet> {
        let mut guard = self.handle.lock().await;
        let started = Instant::now();
        let result = match guard.as_mut() {
            Some(Handle::Sqlite(conn)) => bind_sqlite(sqlx::query(sql), params)
                .execute(&mut *conn)
                .await
                .map(|done| ResultSet {
                    rows: Vec::new(),
                    rows_affected: done.rows_affected(),
                    last_insert_id: Some(done.last_insert_rowid()).filter(|id| *id != 0),
                }),
            Some(Handle::MySql(conn)) => bind_mysql(sqlx::query(sql), params)
                .execute(&mut *conn)
                .await
                .map(|done| ResultSet {
                    rows: Vec::new(),
                    rows_affected: done.rows_affected(),
                    last_insert_id: i64::try_from(done.last_insert_id())
                        .ok()
                        .filter(|id| *id != 0),
                }),
            None => return Err(closed()),
        };
        drop(guard);
        self.finish(sql, params.len(), started, result)
    }

    /// Fetch all rows from a query
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` if the statement fails to prepare or execute.
    pub async fn fetch_all(&self, sql: &str, params: &[DbValue]) -> Result<Vec<Row>> {
        let mut guard = self.handle.lock().await;
        let started = Instant::now();
        let result = match guard.as_mut() {
            Some(Handle::Sqlite(conn)) => bind_sqlite(sqlx::query(sql), params)
                .fetch_all(&mut *conn)
                .await
                .map(|rows| rows.iter().map(sqlite_row_to_map).collect()),
            Some(Handle::MySql(conn)) => bind_mysql(sqlx::query(sql), params)
                .fetch_all(&mut *conn)
                .await
                .map(|rows| rows.iter().map(mysql_row_to_map).collect()),
            None => return Err(closed()),
        };
        drop(guard);
        self.finish(sql, params.len(), started, result)
    }

    /// Fetch the first row, if any
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` if the statement fails to prepare or execute.
    pub async fn fetch_optional(&self, sql: &str, params: &[DbValue]) -> Result<Option<Row>> {
        Ok(self.fetch_all(sql, params).await?.into_iter().next())
    }

    /// Run any statement, choosing fetch or execute by its leading keyword
    ///
    /// Returns `None` when a row-returning statement matched nothing.
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` if the statement fails to prepare or execute.
    pub async fn query(&self, sql: &str, params: &[DbValue]) -> Result<Option<ResultSet>> {
        if returns_rows(sql) {
            let rows = self.fetch_all(sql, params).await?;
            if rows.is_empty() {
                return Ok(None);
            }
            Ok(Some(ResultSet {
                rows,
                ..ResultSet::default()
            }))
        } else {
            self.execute(sql, params).await.map(Some)
        }
    }

    /// Close the connection; later statements fail with `Error::Database`
    pub async fn close(&self) {
        let handle = self.handle.lock().await.take();
        let result = match handle {
            Some(Handle::Sqlite(conn)) => conn.close().await,
            Some(Handle::MySql(conn)) => conn.close().await,
            None => Ok(()),
        };
        if let Err(e) = result {
            error!(error = %e, "Error while closing database connection");
        }
    }

    fn finish<T>(
        &self,
        sql: &str,
        param_count: usize,
        started: Instant,
        result: std::result::Result<T, sqlx::Error>,
    ) -> Result<T> {
        let elapsed = started.elapsed();
        self.query_count.fetch_add(1, Ordering::Relaxed);
        self.execution_nanos.fetch_add(
            u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );

        match result {
            Ok(value) => {
                debug!(sql, params = param_count, elapsed_us = %elapsed.as_micros(), "Query executed");
                Ok(value)
            }
            Err(e) => {
                error!(sql, params = param_count, error = %e, "Query failed");
                Err(Error::Database {
                    message: format!("Query error: {e}"),
                })
            }
        }
    }
}

fn connect_error(driver: &str, e: &sqlx::Error) -> Error {
    error!(driver, error = %e, "Database connection failed");
    Error::Database {
        message: format!("{driver} connection failed: {e}"),
    }
}

fn closed() -> Error {
    Error::Database {
        message: "Database connection is closed".to_string(),
    }
}

fn returns_rows(sql: &str) -> bool {
    let keyword = sql
        .trim_start()
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    matches!(
        keyword.as_str(),
        "SELECT" | "WITH" | "PRAGMA" | "SHOW" | "EXPLAIN" | "DESCRIBE" | "VALUES"
    )
}

fn bind_sqlite<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &[DbValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            DbValue::Null => query.bind(None::<i64>),
            DbValue::Int(v) => query.bind(*v),
            DbValue::Float(v) => query.bind(*v),
            DbValue::String(v) => query.bind(v.clone()),
            DbValue::Bool(v) => query.bind(*v),
            DbValue::Bytes(v) => query.bind(v.clone()),
        };
    }
    query
}

fn bind_mysql<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    params: &[DbValue],
) -> Query<'q, MySql, MySqlArguments> {
    for param in params {
        query = match param {
            DbValue::Null => query.bind(None::<i64>),
            DbValue::Int(v) => query.bind(*v),
            DbValue::Float(v) => query.bind(*v),
            DbValue::String(v) => query.bind(v.clone()),
            DbValue::Bool(v) => query.bind(*v),
            DbValue::Bytes(v) => query.bind(v.clone()),
        };
    }
    query
}

/// Convert SQLite row to HashMap
fn sqlite_row_to_map(row: &SqliteRow) -> Row {
    let mut map = HashMap::new();

    for (i, column) in row.columns().iter().enumerate() {
        let name = column.name().to_string();
        if row.try_get_raw(i).map_or(true, |raw| raw.is_null()) {
            map.insert(name, DbValue::Null);
            continue;
        }

        let value = match column.type_info().name() {
            "INTEGER" => row.try_get::<i64, _>(i).map(DbValue::Int).ok(),
            "REAL" => row.try_get::<f64, _>(i).map(DbValue::Float).ok(),
            "BOOLEAN" => row.try_get::<bool, _>(i).map(DbValue::Bool).ok(),
            "TEXT" => row.try_get::<String, _>(i).map(DbValue::String).ok(),
            "BLOB" => row.try_get::<Vec<u8>, _>(i).map(DbValue::Bytes).ok(),
            _ => None,
        };

        let value = value
            .or_else(|| row.try_get::<i64, _>(i).map(DbValue::Int).ok())
            .or_else(|| row.try_get::<f64, _>(i).map(DbValue::Float).ok())
            .or_else(|| row.try_get::<String, _>(i).map(DbValue::String).ok())
            .or_else(|| row.try_get::<Vec<u8>, _>(i).map(DbValue::Bytes).ok())
            .unwrap_or(DbValue::Null);

        map.insert(name, value);
    }

    map
}

/// Convert MySQL row to HashMap
fn mysql_row_to_map(row: &MySqlRow) -> Row {
    let mut map = HashMap::new();

    for (i, column) in row.columns().iter().enumerate() {
        let name = column.name().to_string();
        if row.try_get_raw(i).map_or(true, |raw| raw.is_null()) {
            map.insert(name, DbValue::Null);
            continue;
        }

        let type_name = column.type_info().name();
        let value = if type_name == "BOOLEAN" {
            row.try_get::<bool, _>(i).map(DbValue::Bool).ok()
        } else if type_name.contains("INT") {
            row.try_get::<i64, _>(i)
                .map(DbValue::Int)
                .ok()
                .or_else(|| {
                    row.try_get::<u64, _>(i)
                        .ok()
                        .and_then(|v| i64::try_from(v).ok())
                        .map(DbValue::Int)
                })
        } else if matches!(type_name, "FLOAT" | "DOUBLE") {
            row.try_get::<f64, _>(i).map(DbValue::Float).ok()
        } else if type_name.contains("BLOB") || type_name.contains("BINARY") {
            row.try_get::<Vec<u8>, _>(i).map(DbValue::Bytes).ok()
        } else {
            row.try_get::<String, _>(i).map(DbValue::String).ok()
        };

        map.insert(name, value.unwrap_or(DbValue::Null));
    }

    map
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory() -> Database {
        Database::connect_sqlite("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_sqlite_memory_connection() {
        let db = Database::connect(&DatabaseConfig::sqlite_memory()).await;
        assert!(db.is_ok());
        let db = db.unwrap();
        assert_eq!(db.driver(), Driver::Sqlite);
        assert_eq!(db.fetch_all("SELECT 1 AS one", &[]).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_file_name_is_not_parsed_as_url() {
        let path = std::env::temp_dir().join(format!("ferrule-{}-a#b?c.db", std::process::id()));
        let config = DatabaseConfig {
            name: path.to_string_lossy().into_owned(),
            ..DatabaseConfig::default()
        };

        let db = Database::connect(&config).await.unwrap();
        db.execute("CREATE TABLE t (id INTEGER)", &[]).await.unwrap();
        db.close().await;

        assert!(path.exists());
        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_insert_reports_generated_id() {
        let db = memory().await;
        db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)", &[])
            .await
            .unwrap();

        let first = db
            .execute("INSERT INTO users (id, name) VALUES (?, ?)", &[DbValue::Null, "Alice".into()])
            .await
            .unwrap();
        let second = db
            .execute("INSERT INTO users (id, name) VALUES (?, ?)", &[DbValue::Null, "Bob".into()])
            .await
            .unwrap();

        assert_eq!(first.last_insert_id, Some(1));
        assert_eq!(second.last_insert_id, Some(2));
        assert_eq!(second.rows_affected, 1);
    }

    #[tokio::test]
    async fn test_fetch_maps_columns_and_nulls() {
        let db = memory().await;
        db.execute(
            "CREATE TABLE config (key TEXT, value TEXT, weight REAL, hits INTEGER)",
            &[],
        )
        .await
        .unwrap();
        db.execute(
            "INSERT INTO config VALUES (?, ?, ?, ?)",
            &["debug".into(), DbValue::Null, DbValue::Float(1.5), DbValue::Int(3)],
        )
        .await
        .unwrap();

        let row = db
            .fetch_optional("SELECT * FROM config WHERE key = ?", &["debug".into()])
            .await
            .unwrap()
            .unwrap();

        assert_eq!(row.get("key"), Some(&DbValue::String("debug".to_string())));
        assert_eq!(row.get("value"), Some(&DbValue::Null));
        assert_eq!(row.get("weight"), Some(&DbValue::Float(1.5)));
        assert_eq!(row.get("hits"), Some(&DbValue::Int(3)));
    }

    #[tokio::test]
    async fn test_query_returns_none_for_empty_select() {
        let db = memory().await;
        db.execute("CREATE TABLE t (id INTEGER PRIMARY KEY)", &[])
            .await
            .unwrap();

        let result = db.query("SELECT * FROM t", &[]).await.unwrap();
        assert!(result.is_none());

        let result = db.query("INSERT INTO t (id) VALUES (?)", &[DbValue::Int(7)]).await.unwrap();
        assert_eq!(result.unwrap().last_insert_id, Some(7));

        let result = db.query("SELECT id FROM t", &[]).await.unwrap().unwrap();
        assert_eq!(result.rows.len(), 1);
    }

    #[tokio::test]
    async fn test_counters_track_every_statement() {
        let db = memory().await;
        assert_eq!(db.query_count(), 0);

        db.execute("CREATE TABLE t (id INTEGER)", &[]).await.unwrap();
        db.fetch_all("SELECT * FROM t", &[]).await.unwrap();
        let failed = db.fetch_all("SELECT * FROM missing", &[]).await;

        assert!(matches!(failed, Err(Error::Database { .. })));
        assert_eq!(db.query_count(), 3);
        assert!(db.execution_time() > Duration::ZERO);
    }

    #[tokio::test]
    async fn test_closed_connection_fails() {
        let db = memory().await;
        db.close().await;

        let result = db.execute("SELECT 1", &[]).await;
        assert!(matches!(result, Err(Error::Database { .. })));
    }

    #[test]
    fn test_returns_rows_detection() {
        assert!(returns_rows("SELECT * FROM t;"));
        assert!(returns_rows("  with x as (select 1) select * from x"));
        assert!(!returns_rows("INSERT INTO t VALUES (1)"));
        assert!(!returns_rows("DELETE FROM t"));
    }

    #[test]
    fn test_db_value_conversions() {
        assert_eq!(DbValue::from(Some(5i64)), DbValue::Int(5));
        assert_eq!(DbValue::from(None::<String>), DbValue::Null);
        assert_eq!(DbValue::from("x").type_name(), "string");
    }
}
