pub mod config;
pub mod duck;
pub mod error;
pub mod model;
pub mod server;
