use crate::config::AppConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use bb8::{ManageConnection, Pool};
use tokio_postgres::{Client, Config as PgConfig, NoTls};
use tracing::{error, info};

pub type PgPool = Pool<PgConnectionManager>;

/// Builds the pool without touching the database. Connections are established
/// lazily on first checkout.
pub async fn build_pool(config: &AppConfig) -> Result<PgPool> {
    let manager = PgConnectionManager::new(&config.database_url)?;
    Pool::builder()
        .max_size(config.max_pool_size)
        .connection_timeout(config.connect_timeout)
        .build(manager)
        .await
        .context("failed to build PostgreSQL connection pool")
}

/// Builds the pool and performs a one-time connectivity probe. A failed probe
/// is logged, not fatal: the service starts and reports query-time errors.
pub async fn connect_pool(config: &AppConfig) -> Result<(PgPool, bool)> {
    let pool = build_pool(config).await?;

    let connected = match pool.get().await {
        Ok(_) => {
            info!("database connectivity check succeeded");
            true
        }
        Err(err) => {
            error!(error = ?err, "initial database connectivity check failed");
            false
        }
    };

    Ok((pool, connected))
}

#[derive(Clone)]
pub struct PgConnectionManager {
    config: PgConfig,
}

impl PgConnectionManager {
    fn new(database_url: &str) -> Result<Self> {
        let config = database_url
            .parse::<PgConfig>()
            .context("invalid DATABASE_URL")?;
        Ok(Self { config })
    }
}

#[async_trait]
impl ManageConnection for PgConnectionManager {
    type Connection = Client;
    type Error = anyhow::Error;

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let (client, connection) = self.config.connect(NoTls).await?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                error!(error = %err, "database connection closed");
            }
        });
        Ok(client)
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.batch_execute("SELECT 1").await?;
        Ok(())
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.is_closed()
    }
}
