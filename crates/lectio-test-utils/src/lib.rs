//! PostgreSQL fixtures for the lectio integration tests.
//!
//! Every test gets a fresh, migrated database on a server shared by the
//! whole test binary. The server is `LECTIO_TEST_PG_URL` when that is set,
//! otherwise a PostgreSQL 16 container started on first use.

use sqlx::{Executor, PgPool};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

use lectio_db::pool;

pub const TEST_PG_URL_VAR: &str = "LECTIO_TEST_PG_URL";

struct Server {
    base_url: String,
    // Held so the container lives as long as the test binary.
    _container: Option<ContainerAsync<Postgres>>,
}

static SERVER: OnceCell<Server> = OnceCell::const_new();

async fn start_server() -> Server {
    if let Ok(url) = std::env::var(TEST_PG_URL_VAR) {
        return Server {
            base_url: url.trim_end_matches('/').to_string(),
            _container: None,
        };
    }

    let container = Postgres::default()
        .with_tag("16")
        .start()
        .await
        .expect("failed to start PostgreSQL container");
    let host = container.get_host().await.expect("container host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("container port");

    Server {
        base_url: format!("postgresql://postgres:postgres@{host}:{port}"),
        _container: Some(container),
    }
}

/// Server URL without a database name.
pub async fn pg_url() -> &'static str {
    &SERVER.get_or_init(start_server).await.base_url
}

async fn maintenance_pool() -> PgPool {
    let url = format!("{}/postgres", pg_url().await);
    pool::connect(&url, 1)
        .await
        .expect("maintenance database should accept connections")
}

/// Create a uniquely named database and apply the lectio migrations.
///
/// Returns `(pool, db_name)`; pass `db_name` to [`drop_test_db`] afterwards.
pub async fn create_test_db() -> (PgPool, String) {
    let db_name = format!("lectio_test_{}", Uuid::new_v4().simple());

    let maintenance = maintenance_pool().await;
    maintenance
        .execute(format!("CREATE DATABASE {db_name}").as_str())
        .await
        .unwrap_or_else(|e| panic!("failed to create {db_name}: {e}"));
    maintenance.close().await;

    let url = format!("{}/{db_name}", pg_url().await);
    let test_pool = pool::connect(&url, 5)
        .await
        .unwrap_or_else(|e| panic!("failed to connect to {db_name}: {e}"));
    pool::run_migrations(&test_pool)
        .await
        .expect("migrations should apply to a fresh database");

    (test_pool, db_name)
}

/// Drop a database created by [`create_test_db`], disconnecting stragglers
/// first. Dropping an already dropped database is a no-op.
pub async fn drop_test_db(db_name: &str) {
    let maintenance = maintenance_pool().await;
    let _ = sqlx::query(
        "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
         WHERE datname = $1 AND pid <> pg_backend_pid()",
    )
    .bind(db_name)
    .execute(&maintenance)
    .await;
    let _ = maintenance
        .execute(format!("DROP DATABASE IF EXISTS {db_name}").as_str())
        .await;
    maintenance.close().await;
}
