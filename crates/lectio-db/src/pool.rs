use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use tracing::info;

use crate::config::DbConfig;

/// Migrations embedded at compile time from `crates/lectio-db/migrations/`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// Pool size for the CLI and the HTTP server. Day generation holds at most
/// one connection per in-flight writer, so this comfortably covers the
/// default concurrency.
const MAX_CONNECTIONS: u32 = 8;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Open a pool of `max_connections` against `url`.
pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(url)
        .await
        .with_context(|| format!("failed to connect to database at {url}"))
}

pub async fn create_pool(config: &DbConfig) -> Result<PgPool> {
    connect(&config.database_url, MAX_CONNECTIONS).await
}

/// Apply all pending embedded migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    MIGRATOR
        .run(pool)
        .await
        .context("failed to run database migrations")?;
    info!("migrations applied");
    Ok(())
}

/// Reject names that cannot be spliced into DDL unquoted.
///
/// `CREATE DATABASE` does not accept bind parameters, so the name is
/// restricted to ASCII alphanumerics and underscores.
pub fn check_identifier(name: &str) -> Result<&str> {
    let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        anyhow::bail!("database name {name:?} contains invalid characters");
    }
    Ok(name)
}

/// Create the configured database through the maintenance database when it
/// does not exist yet.
pub async fn ensure_database_exists(config: &DbConfig) -> Result<()> {
    let db_name = config
        .database_name()
        .context("could not determine database name from URL")?;
    let db_name = check_identifier(db_name)?;

    let maintenance = connect(&config.maintenance_url(), 1).await?;

    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(db_name)
        .fetch_one(&maintenance)
        .await
        .context("failed to query pg_database")?;

    if exists {
        info!(db = db_name, "database already exists");
    } else {
        maintenance
            .execute(format!("CREATE DATABASE {db_name}").as_str())
            .await
            .with_context(|| format!("failed to create database {db_name}"))?;
        info!(db = db_name, "database created");
    }

    maintenance.close().await;
    Ok(())
}

/// Row counts for the lectio tables, in name order.
pub async fn table_counts(pool: &PgPool) -> Result<Vec<(String, i64)>> {
    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT tablename::text FROM pg_tables \
         WHERE schemaname = 'public' AND tablename NOT LIKE '\\_sqlx%' \
         ORDER BY tablename",
    )
    .fetch_all(pool)
    .await
    .context("failed to list tables")?;

    let mut counts = Vec::with_capacity(tables.len());
    for table in tables {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(pool)
            .await
            .with_context(|| format!("failed to count rows in {table}"))?;
        counts.push((table, count));
    }
    Ok(counts)
}
