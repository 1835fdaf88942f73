//! Durable video catalog for SkyGuard.
//!
//! The catalog records one row per uploaded video (the job's durable
//! metadata) plus the detection history used by the stats endpoints. It is
//! exposed through the [`catalog::VideoCatalog`] trait with two
//! implementations: [`catalog::PgCatalog`] over Postgres for deployments,
//! and [`catalog::MemoryCatalog`] for tests and database-less operation.

pub mod catalog;
pub mod models;
pub mod repositories;

/// Convenience alias used across the workspace.
pub type DbPool = sqlx::PgPool;

/// Create a connection pool against the given Postgres URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Verify the database answers a trivial query.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply pending migrations from `crates/db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
