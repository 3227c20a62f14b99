// src/duck/query.rs

use std::path::Path;

use crate::model::{
    AVG_SCORE, FOREIGN_DEPTO_CODE, FOREIGN_LABEL, RESIDENCE_DEPTO_CODE, RESIDENCE_DEPTO_NAME,
    SCORE_MATH, TEST_YEAR,
};

/// The fixed, parameterless queries the service can run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Query {
    /// Every `test_year` present, ascending, no duplicates.
    DistinctYears,
    /// Mean `score_math` per (year, normalized department name).
    AverageByYearAndDepartamento,
}

impl Query {
    pub fn as_str(&self) -> &'static str {
        match self {
            Query::DistinctYears => "distinct_years",
            Query::AverageByYearAndDepartamento => "average_by_year_and_departamento",
        }
    }

    /// Render the template against `table`.
    pub fn sql(&self, table: &str) -> String {
        let table = quote_ident(table);
        match self {
            Query::DistinctYears => format!(
                "SELECT DISTINCT {TEST_YEAR} FROM {table} \
                 WHERE {TEST_YEAR} IS NOT NULL \
                 ORDER BY {TEST_YEAR}"
            ),
            // Abroad rows collapse to one label whatever their name says;
            // everything else groups case-insensitively.
            Query::AverageByYearAndDepartamento => format!(
                "SELECT {TEST_YEAR}, \
                    CASE WHEN {RESIDENCE_DEPTO_CODE} = '{FOREIGN_DEPTO_CODE}' \
                        THEN '{FOREIGN_LABEL}' \
                        ELSE lower({RESIDENCE_DEPTO_NAME}) \
                    END AS {RESIDENCE_DEPTO_NAME}, \
                    avg({SCORE_MATH}) AS {AVG_SCORE} \
                 FROM {table} \
                 WHERE {TEST_YEAR} IS NOT NULL \
                 GROUP BY 1, 2 \
                 ORDER BY 1, 2"
            ),
        }
    }
}

/// Columns the templates read, pinned so a header-only file still yields
/// numeric columns. Everything else keeps its inferred type.
const PINNED_TYPES: &[(&str, &str)] = &[
    (TEST_YEAR, "BIGINT"),
    (RESIDENCE_DEPTO_CODE, "VARCHAR"),
    (RESIDENCE_DEPTO_NAME, "VARCHAR"),
    (SCORE_MATH, "DOUBLE"),
];

/// `CREATE TABLE IF NOT EXISTS` statement loading a CSV with inferred column types.
pub fn materialize_sql(table: &str, source: &Path) -> String {
    let types = PINNED_TYPES
        .iter()
        .map(|(col, ty)| format!("{}: {}", quote_literal(col), quote_literal(ty)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE TABLE IF NOT EXISTS {table} AS SELECT * FROM read_csv_auto({source}, header = true, types = {{{types}}});",
        table = quote_ident(table),
        source = quote_literal(&source.to_string_lossy()),
    )
}

/// Double-quote an identifier so any table name is safe to splice in.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
