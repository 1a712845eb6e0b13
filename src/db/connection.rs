//! Database connection management using sqlx

use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use std::time::Duration;
use tracing::info;

pub type DbPool = MySqlPool;

/// Initialize the database connection pool
pub async fn init_pool(database_url: &str, max_connections: u32) -> Result<MySqlPool, sqlx::Error> {
    let max_connections = max_connections.max(1);
    let pool = MySqlPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await?;

    // Test the connection
    sqlx::query("SELECT 1").execute(&pool).await?;

    info!("MySQL pool ready ({} max connections)", max_connections);
    Ok(pool)
}
