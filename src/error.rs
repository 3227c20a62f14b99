// src/error.rs

use std::path::PathBuf;
use thiserror::Error;
use warp::http::StatusCode;
use warp::reply::{self, Reply, Response};

/// Failures while materializing the store at startup. Fatal: the process
/// must not serve traffic after one of these.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("source file `{path}` is not readable: {source}")]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot open store `{path}`: {source}")]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: duckdb::Error,
    },

    #[error("loading `{path}` into table `{table}` failed: {source}")]
    Load {
        path: PathBuf,
        table: String,
        #[source]
        source: duckdb::Error,
    },
}

/// A query against the materialized table failed, most commonly because the
/// table or one of its columns does not exist.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query engine error: {0}")]
    Engine(#[from] duckdb::Error),

    #[error("converting result batches: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("decoding result records: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("store connection lock poisoned")]
    Poisoned,
}

/// Errors surfaced by the HTTP handlers.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("analytical store is not initialized")]
    Unavailable,

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("query task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Query(_) | ServiceError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message. Never includes paths or SQL.
    fn public_message(&self) -> &'static str {
        match self {
            ServiceError::Unavailable => "service unavailable",
            ServiceError::Query(_) | ServiceError::Task(_) => "internal server error",
        }
    }
}

impl Reply for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = serde_json::json!({ "error": self.public_message() });
        reply::with_status(reply::json(&body), status).into_response()
    }
}
