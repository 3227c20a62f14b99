// src/config.rs

use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::duck::Tables;

/// Exam results analytics API.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Saber Pro aggregate statistics over HTTP")]
pub struct Config {
    /// CSV file the table is materialized from on first start
    #[arg(long, env = "ANALYTICS_SOURCE_CSV")]
    pub source_csv: PathBuf,

    /// DuckDB database file
    #[arg(long, env = "ANALYTICS_STORE_PATH")]
    pub store_path: PathBuf,

    /// Table created from the source CSV
    #[arg(long, env = "ANALYTICS_INGEST_TABLE", default_value = "resultados_saber_pro")]
    pub ingest_table: String,

    /// Table the endpoints read from
    #[arg(long, env = "ANALYTICS_QUERY_TABLE", default_value = "resultados_mini")]
    pub query_table: String,

    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn tables(&self) -> Tables {
        Tables {
            ingest: self.ingest_table.clone(),
            query: self.query_table.clone(),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
