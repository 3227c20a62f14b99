// src/duck/mod.rs

use arrow::json::{writer::JsonArray, WriterBuilder};
use arrow::record_batch::RecordBatch;
use duckdb::Connection;
use std::{
    fs::File,
    io,
    path::Path,
    sync::Mutex,
};
use tracing::{info, instrument};

use crate::error::{QueryError, StoreError};
use crate::model::Record;

pub mod query;

pub use query::Query;

/// Anything that can run one of the fixed query templates.
///
/// The HTTP layer only talks to this trait, so tests can hand it a double.
pub trait QueryExecutor: Send + Sync {
    fn execute(&self, query: Query) -> Result<Vec<Record>, QueryError>;
}

/// Names of the tables the store writes to and reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tables {
    /// Created from the source CSV on first start.
    pub ingest: String,
    /// Read by every query template.
    pub query: String,
}

impl Tables {
    /// Both roles pointing at the same table.
    pub fn single(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            ingest: name.clone(),
            query: name,
        }
    }
}

/// DuckDB-backed store holding the materialized dataset.
pub struct AnalyticalStore {
    conn: Mutex<Connection>,
    tables: Tables,
}

impl AnalyticalStore {
    /// Open (or create) the DuckDB file at `storage_path` and materialize
    /// `source_path` into the ingest table unless it is already there.
    ///
    /// Running this twice against the same store file is a no-op the second time.
    #[instrument(level = "info", skip_all, fields(source = %source_path.as_ref().display(), store = %storage_path.as_ref().display()))]
    pub fn initialize<P: AsRef<Path>, Q: AsRef<Path>>(
        source_path: P,
        storage_path: Q,
        tables: Tables,
    ) -> Result<Self, StoreError> {
        let source_path = source_path.as_ref();
        let storage_path = storage_path.as_ref();

        // A fresh store is useless without its source, so fail before
        // DuckDB creates an empty file.
        if !storage_path.exists() {
            check_source(source_path)?;
        }

        let conn = Connection::open(storage_path).map_err(|source| {
            StoreError::StorageUnavailable {
                path: storage_path.to_path_buf(),
                source,
            }
        })?;

        let exists = table_exists(&conn, &tables.ingest).map_err(|source| {
            StoreError::StorageUnavailable {
                path: storage_path.to_path_buf(),
                source,
            }
        })?;

        if exists {
            info!(table = %tables.ingest, "table already materialized, skipping load");
        } else {
            // existing store without the table: the source is needed now
            check_source(source_path)?;

            // CREATE TABLE .. AS runs in one implicit transaction, so a load
            // that fails leaves no table behind.
            let sql = query::materialize_sql(&tables.ingest, source_path);
            conn.execute_batch(&sql).map_err(|source| StoreError::Load {
                path: source_path.to_path_buf(),
                table: tables.ingest.clone(),
                source,
            })?;
            info!(table = %tables.ingest, "materialized table from source");
        }

        Ok(Self::from_connection(conn, tables))
    }

    /// Wrap an already opened connection, e.g. an in-memory database.
    pub fn from_connection(conn: Connection, tables: Tables) -> Self {
        Self {
            conn: Mutex::new(conn),
            tables,
        }
    }

    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    /// Number of rows in the ingest table.
    pub fn row_count(&self) -> Result<u64, QueryError> {
        let conn = self.connection()?;
        let sql = format!("SELECT count(*) FROM {}", query::quote_ident(&self.tables.ingest));
        let count: i64 = conn.query_row(&sql, [], |r| r.get(0))?;
        Ok(count as u64)
    }

    /// A fresh connection to the same database, so callers never hold the
    /// lock while a query runs.
    fn connection(&self) -> Result<Connection, QueryError> {
        let guard = self.conn.lock().map_err(|_| QueryError::Poisoned)?;
        Ok(guard.try_clone()?)
    }
}

impl QueryExecutor for AnalyticalStore {
    fn execute(&self, query: Query) -> Result<Vec<Record>, QueryError> {
        let conn = self.connection()?;
        let sql = query.sql(&self.tables.query);
        let mut stmt = conn.prepare(&sql)?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([])?.collect();
        batches_to_records(&batches)
    }
}

/// The source must be a regular file we can open.
fn check_source(path: &Path) -> Result<(), StoreError> {
    let unreadable = |source| StoreError::SourceUnreadable {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(unreadable)?;
    let meta = file.metadata().map_err(unreadable)?;
    if !meta.is_file() {
        return Err(unreadable(io::Error::new(
            io::ErrorKind::InvalidInput,
            "not a regular file",
        )));
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> duckdb::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT count(*) FROM information_schema.tables WHERE table_name = ?",
        duckdb::params![table],
        |r| r.get(0),
    )?;
    Ok(count > 0)
}

/// Flatten Arrow batches into JSON records, keeping nulls as explicit `null`s.
pub fn batches_to_records(batches: &[RecordBatch]) -> Result<Vec<Record>, QueryError> {
    let mut writer = WriterBuilder::new()
        .with_explicit_nulls(true)
        .build::<_, JsonArray>(Vec::new());
    let refs: Vec<&RecordBatch> = batches.iter().collect();
    writer.write_batches(&refs)?;
    writer.finish()?;
    let buf = writer.into_inner();
    Ok(serde_json::from_slice(&buf)?)
}

/// Open a DuckDB in‐memory database
pub fn open_mem_db() -> duckdb::Result<Connection> {
    Connection::open_in_memory()
}
