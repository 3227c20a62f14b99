use anyhow::{Context, Result};
use clap::Parser;
use saberpro_analytics::{config::Config, duck::AnalyticalStore, server};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};
use warp::Filter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    // ─── 1) init logging ─────────────────────────────────────────────
    fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(config.log_level.parse().unwrap_or(Level::INFO.into())),
        )
        .init();
    info!("startup");

    // ─── 2) materialize the table before accepting traffic ───────────
    let gate = server::StoreGate::new();
    let store = tokio::task::spawn_blocking({
        let source = config.source_csv.clone();
        let store_path = config.store_path.clone();
        let tables = config.tables();
        move || AnalyticalStore::initialize(source, store_path, tables)
    })
    .await?
    .context("initializing analytical store")?;

    match store.row_count() {
        Ok(rows) => info!(rows, table = %store.tables().ingest, "store ready"),
        Err(e) => warn!("could not count rows in {}: {}", store.tables().ingest, e),
    }
    gate.open(Arc::new(store));

    // ─── 3) serve ────────────────────────────────────────────────────
    let routes = server::api(gate).with(warp::trace::request());

    let (addr, serving) = warp::serve(routes)
        .try_bind_with_graceful_shutdown(config.addr(), async {
            tokio::signal::ctrl_c().await.ok();
        })
        .with_context(|| format!("binding {}", config.addr()))?;

    info!("listening on http://{}", addr);
    info!("years:    http://{}/years", addr);
    info!("averages: http://{}/average-by-year-and-departamento", addr);

    serving.await;
    info!("shutdown");
    Ok(())
}
