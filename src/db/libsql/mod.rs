//! Embedded libSQL backend shared by the master directory and tenant stores.
//!
//! Every operation opens its own connection through [`LibSqlBackend::connect`]
//! and drops it on return, so no connection outlives a single unit of work.

mod glossary;
pub mod master;
pub mod tenant;

pub use master::MasterStore;
pub use tenant::{StoreBootstrap, TenantStore};

use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, Value};

use crate::db::libsql_migrations::SeedStatement;
use crate::error::DatabaseError;

/// Milliseconds a connection waits on a locked store before failing.
const BUSY_TIMEOUT_MS: u64 = 5_000;

pub struct LibSqlBackend {
    db: LibSqlDatabase,
    path: PathBuf,
}

impl std::fmt::Debug for LibSqlBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibSqlBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl LibSqlBackend {
    /// Open (or create) a local database file. The parent directory must exist.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("failed to open libSQL database {path:?}: {e}"))
            })?;
        Ok(Self {
            db,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A fresh connection with foreign keys enforced and a busy timeout set.
    pub async fn connect(&self) -> Result<Connection, DatabaseError> {
        let conn = self
            .db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("failed to create connection: {e}")))?;
        // PRAGMA setters may report a row; query() tolerates that where execute() may not.
        conn.query("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(|e| DatabaseError::Pool(format!("failed to enable foreign keys: {e}")))?;
        conn.query(&format!("PRAGMA busy_timeout = {BUSY_TIMEOUT_MS}"), ())
            .await
            .map_err(|e| DatabaseError::Pool(format!("failed to set busy timeout: {e}")))?;
        Ok(conn)
    }

    pub async fn schema_version(&self) -> Result<i64, DatabaseError> {
        let conn = self.connect().await?;
        read_user_version(&conn).await
    }

    /// Apply `ddl`, run `seed`, and stamp `version` in one `BEGIN IMMEDIATE`
    /// transaction. Returns false when the store was already at `version`.
    pub(crate) async fn bootstrap_schema(
        &self,
        version: i64,
        ddl: &str,
        seed: &[SeedStatement],
    ) -> Result<bool, DatabaseError> {
        let conn = self.connect().await?;
        conn.execute("BEGIN IMMEDIATE", ()).await?;
        let result = async {
            // Re-read under the write lock: a concurrent bootstrap may have won.
            if read_user_version(&conn).await? >= version {
                return Ok(false);
            }
            conn.execute_batch(ddl)
                .await
                .map_err(|e| DatabaseError::Migration(e.to_string()))?;
            for statement in seed {
                conn.execute(
                    statement.sql,
                    libsql::params::Params::Positional(statement.values.clone()),
                )
                .await
                .map_err(|e| DatabaseError::Migration(e.to_string()))?;
            }
            conn.execute(&format!("PRAGMA user_version = {version}"), ())
                .await
                .map_err(|e| DatabaseError::Migration(e.to_string()))?;
            Ok::<_, DatabaseError>(true)
        }
        .await;

        match result {
            Ok(applied) => {
                conn.execute("COMMIT", ()).await?;
                Ok(applied)
            }
            Err(err) => {
                let _ = conn.execute("ROLLBACK", ()).await;
                Err(err)
            }
        }
    }
}

async fn read_user_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let row = conn
        .query("PRAGMA user_version", ())
        .await?
        .next()
        .await?
        .ok_or_else(|| DatabaseError::Query("PRAGMA user_version returned no row".to_string()))?;
    Ok(row.get::<i64>(0)?)
}

// ==================== Row helpers ====================

pub(crate) fn get_text(row: &libsql::Row, idx: i32) -> String {
    row.get::<String>(idx).unwrap_or_default()
}

pub(crate) fn get_opt_text(row: &libsql::Row, idx: i32) -> Option<String> {
    match row.get_value(idx) {
        Ok(Value::Text(s)) => Some(s),
        _ => None,
    }
}

pub(crate) fn get_i64(row: &libsql::Row, idx: i32) -> i64 {
    row.get::<i64>(idx).unwrap_or_default()
}

pub(crate) fn opt_text(value: Option<&str>) -> Value {
    match value {
        Some(s) => Value::Text(s.to_string()),
        None => Value::Null,
    }
}

pub(crate) fn fmt_ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Accepts RFC 3339 and SQLite's `datetime('now')` format.
pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, DatabaseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| DatabaseError::Serialization(format!("invalid timestamp '{raw}': {e}")))
}

pub(crate) fn get_ts(row: &libsql::Row, idx: i32) -> Result<DateTime<Utc>, DatabaseError> {
    parse_timestamp(&get_text(row, idx))
}

pub(crate) fn get_opt_ts(
    row: &libsql::Row,
    idx: i32,
) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    get_opt_text(row, idx)
        .map(|raw| parse_timestamp(&raw))
        .transpose()
}

/// Convert a cell to JSON for table exports. Blobs are base64-encoded.
pub(crate) fn value_to_json(value: Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(i) => serde_json::Value::from(i),
        Value::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(s) => serde_json::Value::String(s),
        Value::Blob(bytes) => serde_json::Value::String(STANDARD.encode(bytes)),
    }
}

/// Read every row of an allow-listed table.
///
/// `table` and `columns` must come from a fixed enumeration, never from
/// caller input.
pub(crate) async fn dump_table(
    conn: &Connection,
    table: &'static str,
    columns: &'static [&'static str],
) -> Result<crate::db::TableDump, DatabaseError> {
    let sql = format!("SELECT {} FROM {table} ORDER BY id", columns.join(", "));
    let mut rows = conn.query(&sql, ()).await?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().await? {
        let mut cells = Vec::with_capacity(columns.len());
        for idx in 0..columns.len() {
            let idx = i32::try_from(idx)
                .map_err(|_| DatabaseError::Query("column index overflow".to_string()))?;
            cells.push(value_to_json(row.get_value(idx)?));
        }
        out.push(cells);
    }
    Ok(crate::db::TableDump {
        table: table.to_string(),
        columns: columns.iter().map(|c| (*c).to_string()).collect(),
        rows: out,
    })
}
