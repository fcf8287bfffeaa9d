pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod query;
pub mod rows;
pub mod server;
pub mod state;
pub mod telemetry;
pub mod training;

use crate::{config::AppConfig, server::Server};

/// Bootstraps the service using environment configuration.
pub async fn run() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    Server::new(config).await?.run().await
}
