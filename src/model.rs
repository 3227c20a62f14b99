// src/model.rs

use serde::{Deserialize, Serialize};

/// One query result row: column name → value, in select-list order.
pub type Record = serde_json::Map<String, serde_json::Value>;

pub const TEST_YEAR: &str = "test_year";
pub const RESIDENCE_DEPTO_CODE: &str = "residence_depto_code";
pub const RESIDENCE_DEPTO_NAME: &str = "residence_depto_name";
pub const SCORE_MATH: &str = "score_math";
pub const AVG_SCORE: &str = "avg_score";

/// Department code used for candidates living abroad.
pub const FOREIGN_DEPTO_CODE: &str = "0000";
/// Group label that replaces the name of every abroad row.
pub const FOREIGN_LABEL: &str = "extranjero";

/// A single exam result as it appears in the source CSV.
///
/// The real dataset carries many more columns; these are the ones the
/// aggregates read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRow {
    pub test_year: i64,
    pub residence_depto_code: String,
    pub residence_depto_name: String,
    pub score_math: f64,
}

/// Output row of `/average-by-year-and-departamento`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartamentoAverage {
    pub test_year: i64,
    pub residence_depto_name: String,
    pub avg_score: f64,
}
