// src/server/handlers.rs

use serde_json::Value;
use tokio::task;
use tracing::{error, warn};
use warp::{
    reject::Rejection,
    reply::{self, Reply, Response},
};

use super::StoreGate;
use crate::duck::Query;
use crate::error::ServiceError;
use crate::model::{Record, TEST_YEAR};

pub async fn health(gate: StoreGate) -> Result<impl Reply, Rejection> {
    Ok(reply::json(&serde_json::json!({
        "status": "healthy",
        "service": "saberpro-analytics",
        "ready": gate.is_ready(),
    })))
}

/// `GET /years`: plain JSON array of the distinct exam years.
pub async fn years(gate: StoreGate) -> Result<Response, Rejection> {
    Ok(match run(&gate, Query::DistinctYears).await {
        Ok(records) => {
            let years: Vec<Value> = records
                .into_iter()
                .filter_map(|mut r| r.remove(TEST_YEAR))
                .collect();
            reply::json(&years).into_response()
        }
        Err(e) => failure(Query::DistinctYears, e),
    })
}

/// `GET /average-by-year-and-departamento`: one object per (year, department).
pub async fn average_by_year_and_departamento(gate: StoreGate) -> Result<Response, Rejection> {
    let query = Query::AverageByYearAndDepartamento;
    Ok(match run(&gate, query).await {
        Ok(records) => reply::json(&records).into_response(),
        Err(e) => failure(query, e),
    })
}

/// Execute `query` on the blocking pool.
async fn run(gate: &StoreGate, query: Query) -> Result<Vec<Record>, ServiceError> {
    let executor = gate.get().ok_or(ServiceError::Unavailable)?;
    let records = task::spawn_blocking(move || executor.execute(query)).await??;
    Ok(records)
}

fn failure(query: Query, e: ServiceError) -> Response {
    match &e {
        ServiceError::Unavailable => warn!(query = query.as_str(), "request before store was ready"),
        _ => error!(query = query.as_str(), "query failed: {}", e),
    }
    e.into_response()
}
