use crate::postgres::PostgresConfig;
use anyhow::{Context, Result};
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;
use tracing::{debug, info};

/// Pooled PostgreSQL access shared by the repositories
#[derive(Clone)]
pub struct PostgresClient {
    pool: Pool,
}

impl PostgresClient {
    pub fn from_config(config: &PostgresConfig) -> Result<Self> {
        let mut cfg = Config::new();
        cfg.host = Some(config.host.clone());
        cfg.port = Some(config.port);
        cfg.dbname = Some(config.database.clone());
        cfg.user = Some(config.username.clone());
        cfg.password = Some(config.password.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(PoolConfig::new(config.max_pool_size));

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .context("Failed to create PostgreSQL pool")?;

        info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            max_pool_size = config.max_pool_size,
            "PostgreSQL pool created"
        );
        Ok(Self { pool })
    }

    pub fn new(
        host: &str,
        port: u16,
        database: &str,
        username: &str,
        password: &str,
        max_pool_size: usize,
    ) -> Result<Self> {
        Self::from_config(&PostgresConfig {
            host: host.to_string(),
            port,
            database: database.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            max_pool_size,
        })
    }

    /// Round-trip `SELECT 1` on a pooled connection
    pub async fn ping(&self) -> Result<()> {
        let conn = self.get_connection().await?;
        conn.execute("SELECT 1", &[])
            .await
            .context("PostgreSQL ping failed")?;
        debug!("PostgreSQL connection verified");
        Ok(())
    }

    pub async fn get_connection(&self) -> Result<deadpool_postgres::Client> {
        self.pool
            .get()
            .await
            .context("Failed to get PostgreSQL connection from pool")
    }
}
