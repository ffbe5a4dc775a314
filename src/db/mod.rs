//! Database layer
//!
//! Storage for users and expenses. Two backends are supported:
//! - SQLite (default, file or in-memory)
//! - MySQL
//!
//! The driver is selected from configuration and hidden behind the
//! `DatabasePool` trait, so repositories dispatch on `pool.driver()` and the
//! rest of the application never names a backend.
//!
//! # Usage
//!
//! ```ignore
//! use expense_tracker::config::DatabaseConfig;
//! use expense_tracker::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};
