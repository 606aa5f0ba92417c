//! PostgreSQL benchmark store.

use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};

use crate::domain::{AppError, BenchmarkRow, BenchmarkStore, DatabaseError};

/// PostgreSQL connection pool configuration
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(3),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

/// PostgreSQL client with connection pooling
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    /// Create a new PostgreSQL client with custom configuration
    pub async fn new(database_url: &str, config: PostgresConfig) -> Result<Self, AppError> {
        info!("Connecting to PostgreSQL...");
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .connect(database_url)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Connection(e.to_string())))?;
        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Run database migrations using sqlx migrate
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Migration(e.to_string())))?;
        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Most recently inserted rows first
    #[instrument(skip(self))]
    pub async fn fetch_benchmark_rows(&self, limit: i64) -> Result<Vec<BenchmarkRow>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT label, no_samples, average, min, max, std_dev, error_per,
                   throughput, received_kb_per_sec, sent_kb_per_sec, avg_bytes
            FROM benchmark_results
            ORDER BY id DESC
            LIMIT $1
            "#,
        )
        .bind(limit.clamp(1, 1000))
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from)?;

        Ok(rows.iter().map(Self::row_to_benchmark_row).collect())
    }

    fn row_to_benchmark_row(row: &sqlx::postgres::PgRow) -> BenchmarkRow {
        BenchmarkRow {
            label: row.get("label"),
            no_samples: row.get("no_samples"),
            average: row.get("average"),
            min: row.get("min"),
            max: row.get("max"),
            std_dev: row.get("std_dev"),
            error_per: row.get("error_per"),
            throughput: row.get("throughput"),
            received_kb_per_sec: row.get("received_kb_per_sec"),
            sent_kb_per_sec: row.get("sent_kb_per_sec"),
            avg_bytes: row.get("avg_bytes"),
        }
    }
}

#[async_trait]
impl BenchmarkStore for PostgresClient {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Connection(e.to_string())))?;
        Ok(())
    }

    #[instrument(skip(self, row), fields(label = %row.label))]
    async fn insert_benchmark_row(&self, row: &BenchmarkRow) -> Result<i64, AppError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO benchmark_results (
                label, no_samples, average, min, max, std_dev, error_per,
                throughput, received_kb_per_sec, sent_kb_per_sec, avg_bytes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id
            "#,
        )
        .bind(&row.label)
        .bind(row.no_samples)
        .bind(row.average)
        .bind(row.min)
        .bind(row.max)
        .bind(row.std_dev)
        .bind(row.error_per)
        .bind(row.throughput)
        .bind(row.received_kb_per_sec)
        .bind(row.sent_kb_per_sec)
        .bind(row.avg_bytes)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from)?;

        Ok(id)
    }

    #[instrument(skip(self))]
    async fn count_benchmark_rows(&self) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM benchmark_results")
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from)?;
        Ok(count)
    }
}
