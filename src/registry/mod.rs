//! Persistent registry for mirror assignments.
//!
//! Provides async SQLite access using SQLx for:
//! - Tracked voice channels and their status mirrors
//! - Per-guild aggregate occupancy mirrors
//!
//! Every query is time-boxed so a stuck database can never stall a
//! reconcile pass. The bot runs without persistence if the database
//! fails to open; assignments then live only in memory.

mod aggregate;
mod models;
mod tracked;

pub use aggregate::AggregateRepository;
pub use models::{AggregateRecord, TrackedRecord};
pub use tracked::TrackedRepository;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

static MEMDB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Upper bound for a single registry query.
const QUERY_TIMEOUT: Duration = Duration::from_secs(15);

/// Registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("database error: {0}")]
    Sqlx(sqlx::Error),
    #[error("migration error: {0}")]
    Migration(sqlx::migrate::MigrateError),
    #[error("database query timed out")]
    Timeout,
}

/// Time-box a single query so a wedged database cannot stall the caller.
pub(crate) async fn timed<T>(
    fut: impl Future<Output = Result<T, sqlx::Error>>,
) -> Result<T, RegistryError> {
    match tokio::time::timeout(QUERY_TIMEOUT, fut).await {
        Ok(result) => result.map_err(RegistryError::Sqlx),
        Err(_) => Err(RegistryError::Timeout),
    }
}

/// Database handle with connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connection acquire timeout - prevents connection storms from blocking indefinitely.
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Maximum time a connection can remain idle before being closed.
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Create a new database connection, running migrations if needed.
    pub async fn new(path: &str) -> Result<Self, RegistryError> {
        let pool = if path == ":memory:" {
            // In-memory database - use proper SQLx in-memory mode
            // Use a uniquely named shared-cache memory database per call.
            // `file::memory:` is global-ish and will collide across parallel tests.
            let id = MEMDB_COUNTER.fetch_add(1, Ordering::Relaxed);
            let memdb_uri = format!(
                "file:mirrorcat-memdb-{}-{}?mode=memory&cache=shared",
                std::process::id(),
                id
            );

            let options = SqliteConnectOptions::new()
                .filename(&memdb_uri)
                .shared_cache(true)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(1)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        } else {
            // File-based database
            // Create parent directory if it doesn't exist
            if let Some(parent) = Path::new(path).parent()
                && !parent.as_os_str().is_empty()
                && let Err(e) = std::fs::create_dir_all(parent)
            {
                tracing::warn!(path = %parent.display(), error = %e, "Failed to create database directory");
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        };

        info!(path = %path, "Registry database connected");

        // Run embedded migrations
        Self::run_migrations(&pool).await?;

        // Enable WAL mode for better concurrency (reduces lock contention)
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await?;

        // Enable foreign key constraints
        sqlx::query("PRAGMA foreign_keys=ON").execute(&pool).await?;

        // Use NORMAL synchronous mode instead of FULL for better performance
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&pool)
            .await?;

        // Check database integrity on startup (prevents silent corruption from crashes)
        let integrity_result: String = sqlx::query_scalar("PRAGMA integrity_check")
            .fetch_one(&pool)
            .await?;

        if integrity_result != "ok" {
            tracing::error!(
                integrity_check = %integrity_result,
                "Registry integrity check FAILED - corruption detected!"
            );
            return Err(RegistryError::Sqlx(sqlx::Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Registry integrity check failed: {}", integrity_result),
            ))));
        }

        info!("Registry integrity check passed");

        Ok(Self { pool })
    }

    /// Get reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run embedded migrations.
    async fn run_migrations(pool: &SqlitePool) -> Result<(), RegistryError> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(RegistryError::Migration)?;

        info!("Registry migrations checked/applied");
        Ok(())
    }

    /// Get tracked channel repository.
    pub fn tracked(&self) -> TrackedRepository<'_> {
        TrackedRepository::new(&self.pool)
    }

    /// Get aggregate mirror repository.
    pub fn aggregates(&self) -> AggregateRepository<'_> {
        AggregateRepository::new(&self.pool)
    }
}

impl From<sqlx::Error> for RegistryError {
    fn from(err: sqlx::Error) -> Self {
        RegistryError::Sqlx(err)
    }
}

impl From<sqlx::migrate::MigrateError> for RegistryError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        RegistryError::Migration(err)
    }
}
