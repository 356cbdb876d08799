//! Database Test Utilities
//!
//! Provides helpers for database testing including testcontainer management
//! and connection pooling for integration tests.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// A wrapper around a PostgreSQL test container
///
/// The container lives as long as this value does; dropping it tears the
/// database down.
pub struct TestDatabase {
    _container: ContainerAsync<Postgres>,
    /// Connection string for the containerized server
    pub url: String,
    /// Pool connected to the containerized server
    pub pool: PgPool,
}

impl TestDatabase {
    /// Starts a fresh PostgreSQL container and connects a pool to it.
    ///
    /// # Errors
    ///
    /// Returns an error if the container fails to start or the pool cannot
    /// connect.
    pub async fn new() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let container = Postgres::default().start().await?;

        let host = container.get_host().await?;
        let port = container.get_host_port_ipv4(5432).await?;
        let url = format!("postgres://postgres:postgres@{host}:{port}/postgres");

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&url)
            .await?;

        Ok(Self {
            _container: container,
            url,
            pool,
        })
    }

    /// Returns a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the `people` scratch table used by transaction tests.
    pub async fn create_people_table(&self) -> Result<(), sqlx::Error> {
        sqlx::query("CREATE TABLE IF NOT EXISTS people (name varchar(255) NOT NULL)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Counts rows in the `people` scratch table.
    pub async fn count_people(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT count(*) FROM people")
            .fetch_one(&self.pool)
            .await
    }
}

/// Global test database for shared integration tests
static SHARED_TEST_DB: OnceCell<Arc<TestDatabase>> = OnceCell::const_new();

/// Gets or creates a shared test database instance
///
/// Reduces container startup overhead when many tests can tolerate sharing
/// one server. Tests that mutate global state (e.g. the migration ledger)
/// should start their own [`TestDatabase`] instead.
///
/// # Panics
///
/// Panics if the database fails to initialize.
pub async fn get_shared_test_database() -> Arc<TestDatabase> {
    SHARED_TEST_DB
        .get_or_init(|| async {
            Arc::new(
                TestDatabase::new()
                    .await
                    .expect("Failed to create shared test database"),
            )
        })
        .await
        .clone()
}

/// Helper trait for test assertions on database results
pub trait DatabaseTestAssertions {
    /// Asserts that a specific number of rows were affected
    fn assert_rows_affected(&self, expected: u64);
}

impl DatabaseTestAssertions for sqlx::postgres::PgQueryResult {
    fn assert_rows_affected(&self, expected: u64) {
        assert_eq!(
            self.rows_affected(),
            expected,
            "Expected {} rows affected, got {}",
            expected,
            self.rows_affected()
        );
    }
}
