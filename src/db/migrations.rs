//! Database migrations module
//!
//! Migrations are embedded directly in Rust code as SQL strings, one variant
//! for SQLite and one for MySQL, so the binary carries its own schema.
//!
//! # Usage
//!
//! ```ignore
//! use expense_tracker::db::{create_pool, migrations};
//!
//! let pool = create_pool(&config).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

use anyhow::{bail, Context, Result};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::collections::BTreeSet;

use super::DynDatabasePool;
use crate::config::DatabaseDriver;

/// A database migration with SQL for both SQLite and MySQL
#[derive(Debug, Clone)]
pub struct Migration {
    /// Strictly increasing across `MIGRATIONS`
    pub version: i32,
    /// Human-readable migration name
    pub name: &'static str,
    /// SQL statements for SQLite
    pub up_sqlite: &'static str,
    /// SQL statements for MySQL
    pub up_mysql: &'static str,
}

/// All migrations, in order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_users",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(255) NOT NULL,
                email VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255),
                google_id VARCHAR(255),
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                name VARCHAR(255) NOT NULL,
                email VARCHAR(255) CHARACTER SET utf8mb4 COLLATE utf8mb4_bin NOT NULL UNIQUE,
                password_hash VARCHAR(255) NULL,
                google_id VARCHAR(255) NULL,
                created_at DATETIME(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6),
                updated_at DATETIME(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6)
            )
        "#,
    },
    Migration {
        version: 2,
        name: "create_expenses",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS expenses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                amount REAL NOT NULL,
                category VARCHAR(100) NOT NULL,
                date TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_expenses_user_date ON expenses(user_id, date);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS expenses (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                user_id BIGINT NOT NULL,
                title TEXT NOT NULL,
                amount DOUBLE NOT NULL,
                category VARCHAR(100) NOT NULL,
                date DATETIME(6) NOT NULL,
                created_at DATETIME(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6),
                updated_at DATETIME(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_expenses_user_date ON expenses(user_id, date);
        "#,
    },
];

/// Bring the schema up to date.
///
/// Returns the number of migrations applied.
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    ensure_ordered(MIGRATIONS)?;
    create_migrations_table(pool).await?;

    let applied = applied_versions(pool).await?;
    if let Some(newest) = applied.iter().next_back() {
        let known = MIGRATIONS.last().map_or(0, |m| m.version);
        if *newest > known {
            tracing::warn!(
                "Database schema version {} is newer than this build knows ({})",
                newest,
                known
            );
        }
    }

    let mut count = 0;
    for migration in MIGRATIONS.iter().filter(|m| !applied.contains(&m.version)) {
        tracing::info!("Applying migration {}: {}", migration.version, migration.name);
        apply_migration(pool, migration)
            .await
            .with_context(|| format!("Migration {} ({}) failed", migration.version, migration.name))?;
        count += 1;
    }

    if count == 0 {
        tracing::debug!("Schema is current");
    }
    Ok(count)
}

/// Migrations not yet recorded in the database, in order
pub async fn pending_migrations(pool: &DynDatabasePool) -> Result<Vec<&'static Migration>> {
    create_migrations_table(pool).await?;
    let applied = applied_versions(pool).await?;
    Ok(MIGRATIONS
        .iter()
        .filter(|m| !applied.contains(&m.version))
        .collect())
}

/// Whether every known migration has been applied
pub async fn is_up_to_date(pool: &DynDatabasePool) -> Result<bool> {
    Ok(pending_migrations(pool).await?.is_empty())
}

fn ensure_ordered(migrations: &[Migration]) -> Result<()> {
    for pair in migrations.windows(2) {
        if pair[1].version <= pair[0].version {
            bail!(
                "Migration {} ({}) is out of order after {}",
                pair[1].version,
                pair[1].name,
                pair[0].version
            );
        }
    }
    Ok(())
}

async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    let version_type = match pool.driver() {
        DatabaseDriver::Sqlite => "INTEGER",
        DatabaseDriver::Mysql => "INT",
    };
    let sql = format!(
        "CREATE TABLE IF NOT EXISTS _migrations (\
            version {} PRIMARY KEY, \
            name VARCHAR(255) NOT NULL, \
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP)",
        version_type
    );
    pool.execute(&sql).await?;
    Ok(())
}

async fn applied_versions(pool: &DynDatabasePool) -> Result<BTreeSet<i32>> {
    const SQL: &str = "SELECT version FROM _migrations";
    let versions = match pool.driver() {
        DatabaseDriver::Sqlite => sqlx::query(SQL)
            .fetch_all(pool.sqlite()?)
            .await?
            .iter()
            .map(|row| row.try_get::<i64, _>("version").map(|v| v as i32))
            .collect::<Result<BTreeSet<_>, _>>()?,
        DatabaseDriver::Mysql => sqlx::query(SQL)
            .fetch_all(pool.mysql()?)
            .await?
            .iter()
            .map(|row| row.try_get::<i32, _>("version"))
            .collect::<Result<BTreeSet<_>, _>>()?,
    };
    Ok(versions)
}

async fn apply_migration(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    match pool.driver() {
        DatabaseDriver::Sqlite => apply_migration_sqlite(pool.sqlite()?, migration).await,
        DatabaseDriver::Mysql => apply_migration_mysql(pool.mysql()?, migration).await,
    }
}

/// SQLite runs DDL inside a transaction, so a failed migration leaves no trace
async fn apply_migration_sqlite(pool: &SqlitePool, migration: &Migration) -> Result<()> {
    let mut tx = pool.begin().await?;
    for statement in split_sql_statements(migration.up_sqlite) {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }
    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

/// MySQL commits each DDL statement implicitly; statements run one by one
/// and the version is recorded last.
async fn apply_migration_mysql(pool: &MySqlPool, migration: &Migration) -> Result<()> {
    for statement in split_sql_statements(migration.up_mysql) {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }
    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(pool)
        .await?;
    Ok(())
}

fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(80) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split a script on `;`, dropping empty and comment-only pieces
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| {
            stmt.lines()
                .map(str::trim)
                .any(|line| !line.is_empty() && !line.starts_with("--"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    #[tokio::test]
    async fn test_run_migrations() {
        let pool = create_test_pool().await.expect("Failed to create test pool");

        let applied = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(applied, MIGRATIONS.len());

        // Running again is a no-op
        let applied = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(applied, 0);
    }

    #[tokio::test]
    async fn test_pending_and_up_to_date() {
        let pool = create_test_pool().await.expect("Failed to create test pool");

        let pending: Vec<i32> = pending_migrations(&pool)
            .await
            .unwrap()
            .iter()
            .map(|m| m.version)
            .collect();
        assert_eq!(pending, vec![1, 2]);
        assert!(!is_up_to_date(&pool).await.unwrap());

        run_migrations(&pool).await.unwrap();
        assert!(pending_migrations(&pool).await.unwrap().is_empty());
        assert!(is_up_to_date(&pool).await.unwrap());
    }

    #[test]
    fn test_migrations_are_ordered() {
        assert!(ensure_ordered(MIGRATIONS).is_ok());

        let shuffled = [MIGRATIONS[1].clone(), MIGRATIONS[0].clone()];
        assert!(ensure_ordered(&shuffled).is_err());
    }

    #[tokio::test]
    async fn test_email_unique_constraint() {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();

        pool.execute("INSERT INTO users (name, email) VALUES ('A', 'a@example.com')")
            .await
            .unwrap();
        let duplicate = pool
            .execute("INSERT INTO users (name, email) VALUES ('B', 'a@example.com')")
            .await;
        assert!(duplicate.is_err());

        // Case-sensitive: a differently-cased address is another account
        pool.execute("INSERT INTO users (name, email) VALUES ('C', 'A@example.com')")
            .await
            .expect("emails differing in case are distinct");
    }

    #[tokio::test]
    async fn test_expense_requires_existing_user() {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();

        let orphan = pool
            .execute(
                "INSERT INTO expenses (user_id, title, amount, category, date) \
                 VALUES (999, 'Lunch', 12.5, 'Food', CURRENT_TIMESTAMP)",
            )
            .await;
        assert!(orphan.is_err());
    }

    #[test]
    fn test_split_sql_statements() {
        let sql = "CREATE TABLE a (id INT);\n-- comment only\n;\nCREATE INDEX i ON a(id);\n";
        let statements = split_sql_statements(sql);
        assert_eq!(statements, vec!["CREATE TABLE a (id INT)", "CREATE INDEX i ON a(id)"]);
    }
}
