//! PostgreSQL access for reading-goal badge criteria.
//!
//! Renders core predicate trees to SQL, executes them through `sqlx`, and
//! reads/writes the host's stored criterion parameters.

pub mod config;
pub mod models;
pub mod repositories;
pub mod sql;

use sqlx::postgres::PgPoolOptions;

use crate::config::DbConfig;

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from configuration.
pub async fn create_pool(config: &DbConfig) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
}

/// Verify the pool can reach the database.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
