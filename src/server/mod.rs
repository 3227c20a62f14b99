// src/server/mod.rs

use once_cell::sync::OnceCell;
use std::sync::Arc;
use warp::{
    http::Method,
    reject::Rejection,
    reply::{Reply, Response},
    Filter,
};

use crate::duck::QueryExecutor;

pub mod cors;
pub mod handlers;

/// One-shot slot for the store. Empty until initialization finishes; every
/// request that finds it empty is answered with 503.
#[derive(Clone, Default)]
pub struct StoreGate {
    cell: Arc<OnceCell<Arc<dyn QueryExecutor>>>,
}

impl StoreGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// A gate that is open from the start.
    pub fn ready(executor: Arc<dyn QueryExecutor>) -> Self {
        let gate = Self::new();
        gate.open(executor);
        gate
    }

    /// Publish the store. Returns `false` if it was already published.
    pub fn open(&self, executor: Arc<dyn QueryExecutor>) -> bool {
        self.cell.set(executor).is_ok()
    }

    pub fn get(&self) -> Option<Arc<dyn QueryExecutor>> {
        self.cell.get().cloned()
    }

    pub fn is_ready(&self) -> bool {
        self.cell.get().is_some()
    }
}

/// All endpoints, without CORS or request tracing.
pub fn routes(gate: StoreGate) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let with_gate = warp::any().map(move || gate.clone());

    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_gate.clone())
        .and_then(handlers::health);

    let years = warp::path("years")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_gate.clone())
        .and_then(handlers::years);

    let average = warp::path("average-by-year-and-departamento")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_gate)
        .and_then(handlers::average_by_year_and_departamento);

    health.or(years).or(average)
}

/// Endpoints plus the development CORS posture: preflights are answered
/// for any origin, method and header; other responses carry the origin headers.
pub fn api(gate: StoreGate) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    // A plain `warp::options()` would turn every unmatched path into a 405.
    let preflight = warp::method()
        .and_then(|method: Method| async move {
            if method == Method::OPTIONS {
                Ok(())
            } else {
                Err(warp::reject::not_found())
            }
        })
        .untuple_one()
        .and(warp::header::optional::<String>("origin"))
        .and(warp::header::optional::<String>("access-control-request-headers"))
        .map(cors::preflight);

    let actual = warp::header::optional::<String>("origin")
        .and(routes(gate))
        .map(|origin: Option<String>, reply| cors::decorate(origin, reply));

    preflight.or(actual).unify()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duck::tests::{empty_store, row, scenario_rows, write_csv};
    use crate::duck::{AnalyticalStore, Query, Tables};
    use crate::error::QueryError;
    use crate::model::{DepartamentoAverage, Record};
    use serde_json::{json, Value};
    use tempfile::{tempdir, TempDir};
    use warp::http::StatusCode;
    use warp::test::request;

    struct FailingExecutor;

    impl QueryExecutor for FailingExecutor {
        fn execute(&self, _query: Query) -> Result<Vec<Record>, QueryError> {
            Err(QueryError::Poisoned)
        }
    }

    fn store_with(rows: &[crate::model::DatasetRow], tables: Tables) -> (TempDir, StoreGate) {
        let tmp = tempdir().unwrap();
        let csv_path = tmp.path().join("saber_pro.csv");
        write_csv(&csv_path, rows).unwrap();
        let store =
            AnalyticalStore::initialize(&csv_path, tmp.path().join("saber_pro.duckdb"), tables)
                .unwrap();
        (tmp, StoreGate::ready(Arc::new(store)))
    }

    fn body_json(body: &[u8]) -> Value {
        serde_json::from_slice(body).unwrap()
    }

    #[tokio::test]
    async fn test_years_ascending_and_unique() {
        let (_tmp, gate) = store_with(
            &[
                row(2022, "05", "Antioquia", 10.0),
                row(2020, "05", "Antioquia", 20.0),
                row(2022, "11", "Bogotá", 30.0),
                row(2021, "0000", "Extranjero", 40.0),
                row(2020, "11", "Bogotá", 50.0),
            ],
            Tables::single("resultados"),
        );
        let api = routes(gate);

        let res = request().method("GET").path("/years").reply(&api).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res.body()), json!([2020, 2021, 2022]));
    }

    #[tokio::test]
    async fn test_average_scenario() {
        let (_tmp, gate) = store_with(&scenario_rows(), Tables::single("resultados"));
        let api = routes(gate);

        let res = request()
            .method("GET")
            .path("/average-by-year-and-departamento")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);

        let got: Vec<DepartamentoAverage> = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(
            got,
            vec![
                DepartamentoAverage {
                    test_year: 2020,
                    residence_depto_name: "antioquia".into(),
                    avg_score: 70.0,
                },
                DepartamentoAverage {
                    test_year: 2020,
                    residence_depto_name: "extranjero".into(),
                    avg_score: 85.0,
                },
            ]
        );

        // field order follows the select list
        let raw = body_json(res.body());
        let keys: Vec<&str> = raw[0]
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, vec!["test_year", "residence_depto_name", "avg_score"]);
    }

    #[tokio::test]
    async fn test_average_sorted_by_year_then_name() {
        let (_tmp, gate) = store_with(
            &[
                row(2021, "76", "VALLE", 60.0),
                row(2020, "76", "Valle", 50.0),
                row(2021, "05", "antioquia", 70.0),
                row(2021, "05", "ANTIOQUIA", 90.0),
                row(2020, "0000", "Venezuela", 30.0),
            ],
            Tables::single("resultados"),
        );
        let api = routes(gate);

        let res = request()
            .method("GET")
            .path("/average-by-year-and-departamento")
            .reply(&api)
            .await;
        let got: Vec<DepartamentoAverage> = serde_json::from_slice(res.body()).unwrap();
        let keys: Vec<(i64, &str, f64)> = got
            .iter()
            .map(|a| (a.test_year, a.residence_depto_name.as_str(), a.avg_score))
            .collect();
        assert_eq!(
            keys,
            vec![
                (2020, "extranjero", 30.0),
                (2020, "valle", 50.0),
                (2021, "antioquia", 80.0),
                (2021, "valle", 60.0),
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_table() {
        let api = routes(StoreGate::ready(Arc::new(empty_store())));

        let res = request().method("GET").path("/years").reply(&api).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res.body()), json!([]));

        let res = request()
            .method("GET")
            .path("/average-by-year-and-departamento")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res.body()), json!([]));
    }

    #[tokio::test]
    async fn test_unavailable_before_initialization() {
        let gate = StoreGate::new();
        let api = routes(gate.clone());

        for path in ["/years", "/average-by-year-and-departamento"] {
            let res = request().method("GET").path(path).reply(&api).await;
            assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE, "{}", path);
            assert_eq!(body_json(res.body()), json!({ "error": "service unavailable" }));
        }

        let res = request().method("GET").path("/health").reply(&api).await;
        assert_eq!(body_json(res.body())["ready"], json!(false));

        // the same filter starts answering once the store is published
        assert!(gate.open(Arc::new(empty_store())));
        assert!(!gate.open(Arc::new(empty_store())));
        let res = request().method("GET").path("/years").reply(&api).await;
        assert_eq!(res.status(), StatusCode::OK);

        let res = request().method("GET").path("/health").reply(&api).await;
        assert_eq!(body_json(res.body())["ready"], json!(true));
    }

    /// The loader creates `resultados_saber_pro` while the endpoints read
    /// `resultados_mini`. With those defaults every query hits a missing table.
    #[tokio::test]
    async fn regression_default_table_names_do_not_match() {
        let (tmp, gate) = store_with(
            &scenario_rows(),
            Tables {
                ingest: "resultados_saber_pro".into(),
                query: "resultados_mini".into(),
            },
        );
        let api = routes(gate);

        for path in ["/years", "/average-by-year-and-departamento"] {
            let res = request().method("GET").path(path).reply(&api).await;
            assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR, "{}", path);

            let body = String::from_utf8_lossy(res.body()).to_string();
            assert!(!body.contains("resultados_mini"));
            assert!(!body.contains(&*tmp.path().to_string_lossy()));
        }
    }

    #[tokio::test]
    async fn test_query_failure_is_server_error() {
        let api = routes(StoreGate::ready(Arc::new(FailingExecutor)));

        let res = request().method("GET").path("/years").reply(&api).await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(res.body()), json!({ "error": "internal server error" }));
    }

    #[tokio::test]
    async fn test_unknown_path() {
        let api = routes(StoreGate::ready(Arc::new(empty_store())));

        let res = request().method("GET").path("/nope").reply(&api).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cors_preflight_allows_any_header() {
        let filter = api(StoreGate::new());

        let res = request()
            .method("OPTIONS")
            .path("/years")
            .header("origin", "http://localhost:3000")
            .header("access-control-request-method", "GET")
            .header("access-control-request-headers", "x-client-version")
            .reply(&filter)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers()["access-control-allow-origin"],
            "http://localhost:3000"
        );
        assert_eq!(
            res.headers()["access-control-allow-headers"],
            "x-client-version"
        );
        assert_eq!(res.headers()["access-control-allow-credentials"], "true");
    }

    #[tokio::test]
    async fn test_cors_headers_on_regular_response() {
        let filter = api(StoreGate::ready(Arc::new(empty_store())));

        let res = request()
            .method("GET")
            .path("/years")
            .header("origin", "http://localhost:3000")
            .reply(&filter)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers()["access-control-allow-origin"],
            "http://localhost:3000"
        );

        // errors are decorated as well, so browsers can read the status
        let res = request()
            .method("GET")
            .path("/years")
            .header("origin", "http://localhost:3000")
            .reply(&api(StoreGate::new()))
            .await;
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(res.headers().contains_key("access-control-allow-origin"));
    }

    #[tokio::test]
    async fn test_unknown_path_stays_not_found_with_cors() {
        let filter = api(StoreGate::ready(Arc::new(empty_store())));

        let res = request().method("GET").path("/nope").reply(&filter).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_header_only_source_returns_empty_arrays() {
        let tmp = tempdir().unwrap();
        let csv_path = tmp.path().join("saber_pro.csv");
        std::fs::write(
            &csv_path,
            "test_year,residence_depto_code,residence_depto_name,score_math\n",
        )
        .unwrap();
        let store = AnalyticalStore::initialize(
            &csv_path,
            tmp.path().join("saber_pro.duckdb"),
            Tables::single("resultados"),
        )
        .unwrap();
        let api = routes(StoreGate::ready(Arc::new(store)));

        for path in ["/years", "/average-by-year-and-departamento"] {
            let res = request().method("GET").path(path).reply(&api).await;
            assert_eq!(res.status(), StatusCode::OK, "{}", path);
            assert_eq!(body_json(res.body()), json!([]), "{}", path);
        }
    }

    #[tokio::test]
    async fn test_rows_without_year_are_skipped() {
        let tmp = tempdir().unwrap();
        let csv_path = tmp.path().join("saber_pro.csv");
        std::fs::write(
            &csv_path,
            "test_year,residence_depto_code,residence_depto_name,score_math\n\
             2020,05,Antioquia,70\n\
             ,05,Antioquia,10\n",
        )
        .unwrap();
        let store = AnalyticalStore::initialize(
            &csv_path,
            tmp.path().join("saber_pro.duckdb"),
            Tables::single("resultados"),
        )
        .unwrap();
        let api = routes(StoreGate::ready(Arc::new(store)));

        let res = request().method("GET").path("/years").reply(&api).await;
        assert_eq!(body_json(res.body()), json!([2020]));

        let res = request()
            .method("GET")
            .path("/average-by-year-and-departamento")
            .reply(&api)
            .await;
        let got: Vec<DepartamentoAverage> = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(
            got,
            vec![DepartamentoAverage {
                test_year: 2020,
                residence_depto_name: "antioquia".into(),
                avg_score: 70.0,
            }]
        );
    }
}
