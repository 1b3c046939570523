// Database connection management
use crate::error::StoreResult;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Connection pool wrapper for the billing database.
#[derive(Clone)]
pub struct DatabasePool {
    pool: Arc<PgPool>,
}

impl DatabasePool {
    /// Create a new pool from a connection string.
    pub async fn new(connection_string: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(connection_string)
            .await?;

        info!("billing database pool created");
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Wrap an existing pool (tests, shared servers).
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Get the underlying PgPool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending schema migrations.
    pub async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(self.pool.as_ref())
            .await
            .map_err(sqlx::Error::from)?;
        info!("billing schema migrations applied");
        Ok(())
    }

    /// Check if the pool is healthy.
    pub async fn is_healthy(&self) -> bool {
        match sqlx::query("SELECT 1").fetch_one(self.pool.as_ref()).await {
            Ok(_) => true,
            Err(e) => {
                warn!("billing database health check failed: {}", e);
                false
            }
        }
    }

    /// Close the pool.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("billing database pool closed");
    }
}
