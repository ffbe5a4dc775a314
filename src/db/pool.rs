//! Database connection pools
//!
//! `DatabasePool` hides whether expenses live in SQLite or MySQL.
//! Repositories match on `driver()` and borrow the concrete pool through
//! `sqlite()` or `mysql()`.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlx::{
    mysql::{MySqlPool, MySqlPoolOptions},
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions},
};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{DatabaseConfig, DatabaseDriver};

const DEFAULT_SQLITE_CONNECTIONS: u32 = 5;
const DEFAULT_MYSQL_CONNECTIONS: u32 = 10;
const SQLITE_BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// A connected database of either supported kind
#[async_trait]
pub trait DatabasePool: Send + Sync {
    fn driver(&self) -> DatabaseDriver;

    fn as_sqlite(&self) -> Option<&SqlitePool>;

    fn as_mysql(&self) -> Option<&MySqlPool>;

    /// Close every connection; further queries fail
    async fn close(&self);

    /// The SQLite pool, or an error when the driver says otherwise
    fn sqlite(&self) -> Result<&SqlitePool> {
        self.as_sqlite()
            .ok_or_else(|| anyhow!("Database pool is not backed by SQLite"))
    }

    /// The MySQL pool, or an error when the driver says otherwise
    fn mysql(&self) -> Result<&MySqlPool> {
        self.as_mysql()
            .ok_or_else(|| anyhow!("Database pool is not backed by MySQL"))
    }

    /// Run one statement that returns no rows; yields the affected row count
    async fn execute(&self, sql: &str) -> Result<u64> {
        let affected = match self.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .execute(self.sqlite()?)
                .await
                .map(|r| r.rows_affected()),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .execute(self.mysql()?)
                .await
                .map(|r| r.rows_affected()),
        };
        affected.with_context(|| format!("Failed to execute: {}", sql.trim()))
    }

    /// Round-trip a trivial query
    async fn ping(&self) -> Result<()> {
        let reply = match self.driver() {
            DatabaseDriver::Sqlite => sqlx::query("SELECT 1")
                .execute(self.sqlite()?)
                .await
                .map(drop),
            DatabaseDriver::Mysql => sqlx::query("SELECT 1")
                .execute(self.mysql()?)
                .await
                .map(drop),
        };
        reply.context("Database ping failed")
    }
}

/// Shared handle to the application's database
pub type DynDatabasePool = Arc<dyn DatabasePool>;

/// Where a SQLite URL points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SqliteTarget<'a> {
    Memory,
    File(&'a Path),
}

/// Accepts `:memory:`, `sqlite::memory:`, `sqlite://path`, `sqlite:path`
/// or a bare path. Query parameters are ignored.
fn sqlite_target(url: &str) -> SqliteTarget<'_> {
    let url = url.trim();
    if url == ":memory:" || url.starts_with("sqlite::memory:") {
        return SqliteTarget::Memory;
    }
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    let path = path.split('?').next().unwrap_or(path);
    SqliteTarget::File(Path::new(path))
}

/// SQLite-backed storage
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// Open (creating if needed) the database at `url`.
    ///
    /// An in-memory database exists only as long as its connection, so it
    /// is pinned to a single connection that never expires.
    pub async fn connect(url: &str, max_connections: Option<u32>) -> Result<Self> {
        let pool = match sqlite_target(url) {
            SqliteTarget::Memory => {
                let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
                    .connect_with(options)
                    .await
                    .context("Failed to open in-memory SQLite database")?
            }
            SqliteTarget::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create database directory {}", parent.display())
                    })?;
                }

                let options = SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true)
                    .foreign_keys(true)
                    .journal_mode(SqliteJournalMode::Wal)
                    .busy_timeout(SQLITE_BUSY_TIMEOUT);
                SqlitePoolOptions::new()
                    .max_connections(max_connections.unwrap_or(DEFAULT_SQLITE_CONNECTIONS))
                    .acquire_timeout(ACQUIRE_TIMEOUT)
                    .connect_with(options)
                    .await
                    .with_context(|| format!("Failed to open SQLite database {}", path.display()))?
            }
        };

        Ok(Self { pool })
    }
}

#[async_trait]
impl DatabasePool for SqliteDatabase {
    fn driver(&self) -> DatabaseDriver {
        DatabaseDriver::Sqlite
    }

    fn as_sqlite(&self) -> Option<&SqlitePool> {
        Some(&self.pool)
    }

    fn as_mysql(&self) -> Option<&MySqlPool> {
        None
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// MySQL-backed storage
pub struct MysqlDatabase {
    pool: MySqlPool,
}

impl MysqlDatabase {
    /// Connect to `url`; the `mysql://` scheme is optional
    pub async fn connect(url: &str, max_connections: Option<u32>) -> Result<Self> {
        let url = url.trim();
        let url = if url.starts_with("mysql://") {
            url.to_string()
        } else {
            format!("mysql://{}", url)
        };

        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections.unwrap_or(DEFAULT_MYSQL_CONNECTIONS))
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(&url)
            .await
            .context("Failed to connect to MySQL database")?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl DatabasePool for MysqlDatabase {
    fn driver(&self) -> DatabaseDriver {
        DatabaseDriver::Mysql
    }

    fn as_sqlite(&self) -> Option<&SqlitePool> {
        None
    }

    fn as_mysql(&self) -> Option<&MySqlPool> {
        Some(&self.pool)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Connect to the configured database.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn create_pool(config: &DatabaseConfig) -> Result<DynDatabasePool> {
    let pool: DynDatabasePool = match config.driver {
        DatabaseDriver::Sqlite => {
            Arc::new(SqliteDatabase::connect(&config.url, config.max_connections).await?)
        }
        DatabaseDriver::Mysql => {
            Arc::new(MysqlDatabase::connect(&config.url, config.max_connections).await?)
        }
    };
    Ok(pool)
}

/// Fresh in-memory SQLite database, without migrations
pub async fn create_test_pool() -> Result<DynDatabasePool> {
    Ok(Arc::new(SqliteDatabase::connect(":memory:", None).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;

    #[test]
    fn test_sqlite_target() {
        assert_eq!(sqlite_target(":memory:"), SqliteTarget::Memory);
        assert_eq!(sqlite_target("sqlite::memory:?cache=shared"), SqliteTarget::Memory);
        assert_eq!(
            sqlite_target("sqlite://data/expenses.db?mode=rwc"),
            SqliteTarget::File(Path::new("data/expenses.db"))
        );
        assert_eq!(
            sqlite_target("sqlite:expenses.db"),
            SqliteTarget::File(Path::new("expenses.db"))
        );
        assert_eq!(
            sqlite_target("/var/lib/expenses.db"),
            SqliteTarget::File(Path::new("/var/lib/expenses.db"))
        );
    }

    #[tokio::test]
    async fn test_memory_pool() {
        let pool = create_test_pool().await.expect("Failed to create pool");
        assert_eq!(pool.driver(), DatabaseDriver::Sqlite);
        assert!(pool.sqlite().is_ok());
        assert!(pool.mysql().is_err());
        pool.ping().await.expect("Ping should succeed");

        // Tables persist across queries on the single connection
        pool.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)")
            .await
            .unwrap();
        let affected = pool.execute("INSERT INTO t (name) VALUES ('x')").await.unwrap();
        assert_eq!(affected, 1);
    }

    #[tokio::test]
    async fn test_file_pool_settings() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let db_path = dir.path().join("nested").join("expenses.db");

        let config = DatabaseConfig {
            driver: DatabaseDriver::Sqlite,
            url: db_path.to_string_lossy().to_string(),
            max_connections: Some(2),
        };
        let pool = create_pool(&config).await.expect("Failed to create pool");
        assert!(db_path.exists());

        let sqlite = pool.sqlite().unwrap();
        let journal: String = sqlx::query("PRAGMA journal_mode")
            .fetch_one(sqlite)
            .await
            .unwrap()
            .get(0);
        assert_eq!(journal.to_lowercase(), "wal");

        let foreign_keys: i64 = sqlx::query("PRAGMA foreign_keys")
            .fetch_one(sqlite)
            .await
            .unwrap()
            .get(0);
        assert_eq!(foreign_keys, 1);

        pool.close().await;
        assert!(pool.ping().await.is_err());
    }

    #[tokio::test]
    #[ignore = "Requires MySQL server"]
    async fn test_mysql_pool_ping() {
        let url = std::env::var("MYSQL_TEST_URL")
            .unwrap_or_else(|_| "mysql://root@localhost/test".to_string());

        let config = DatabaseConfig {
            driver: DatabaseDriver::Mysql,
            url,
            max_connections: None,
        };
        let pool = create_pool(&config).await.expect("Failed to create pool");
        assert_eq!(pool.driver(), DatabaseDriver::Mysql);
        pool.ping().await.expect("Ping should succeed");
    }
}
