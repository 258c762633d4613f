// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
pub mod catalog;
pub mod tasks;
pub mod users;

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{migrate::MigrateDatabase, Sqlite, SqlitePool, Transaction};
use tracing::{debug, info};

/// Tables in creation order; every reference points to an earlier table.
const SCHEMA: [(&str, &str); 5] = [
    (
        "users",
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            first_name TEXT NOT NULL DEFAULT '',
            last_name TEXT NOT NULL DEFAULT '',
            email TEXT NOT NULL DEFAULT '',
            password_hash TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL
        );
        "#,
    ),
    (
        "statuses",
        r#"
        CREATE TABLE IF NOT EXISTS statuses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            created_at TIMESTAMP NOT NULL
        );
        "#,
    ),
    (
        "labels",
        r#"
        CREATE TABLE IF NOT EXISTS labels (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            created_at TIMESTAMP NOT NULL
        );
        "#,
    ),
    (
        "tasks",
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            status_id INTEGER NOT NULL REFERENCES statuses (id) ON DELETE RESTRICT,
            author_id INTEGER NOT NULL REFERENCES users (id) ON DELETE RESTRICT,
            executor_id INTEGER NULL REFERENCES users (id) ON DELETE RESTRICT,
            created_at TIMESTAMP NOT NULL
        );
        "#,
    ),
    (
        "task_labels",
        r#"
        CREATE TABLE IF NOT EXISTS task_labels (
            task_id INTEGER NOT NULL REFERENCES tasks (id) ON DELETE CASCADE,
            label_id INTEGER NOT NULL REFERENCES labels (id) ON DELETE RESTRICT,
            PRIMARY KEY (task_id, label_id)
        );
        "#,
    ),
];

/// Result of deleting a row other rows may still point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// At least one task still references the row; nothing was removed.
    InUse,
    NotFound,
}

/// Establishes the database connection pool.
/// If the database does not exist, it creates it (and its directory),
/// then makes sure every table exists.
pub async fn establish_connection_pool(database_url: &str) -> Result<SqlitePool> {
    if !Sqlite::database_exists(database_url).await.unwrap_or(false) {
        if let Some(dir) = database_dir(database_url) {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        }
        info!("Creating database {}", database_url);
        Sqlite::create_database(database_url)
            .await
            .context("Failed to create database")?;
    } else {
        info!("Database already exists.");
    }

    let options = SqliteConnectOptions::from_str(database_url)
        .context("Invalid database URL")?
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .connect_with(options)
        .await
        .context("Failed to connect to database")?;

    init_schema(&pool).await?;
    Ok(pool)
}

/// A private in-memory database with the full schema.
///
/// The pool holds a single connection that never expires: an in-memory
/// SQLite database lives exactly as long as its connections.
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .context("Invalid in-memory database URL")?
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .context("Failed to open in-memory database")?;

    init_schema(&pool).await?;
    Ok(pool)
}

/// Creates any missing table. Safe to run on every start.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    for (table, ddl) in SCHEMA {
        sqlx::query(ddl)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to create '{table}' table"))?;
        debug!("'{}' table is ready.", table);
    }
    info!("Database schema is ready.");
    Ok(())
}

/// Opens a transaction holding SQLite's write lock from its first statement.
/// Checks run inside it (uniqueness, references) cannot interleave with
/// another writer; a second writer waits for the lock.
pub async fn begin_write(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>> {
    pool.begin_with("BEGIN IMMEDIATE")
        .await
        .context("Failed to open write transaction")
}

/// Deletes one row unless `usage_sql` (a `SELECT COUNT(*)` bound to the same
/// id) reports references to it. Check and delete share one transaction.
pub(crate) async fn delete_guarded(
    pool: &SqlitePool,
    usage_sql: &str,
    delete_sql: &str,
    id: i64,
) -> Result<DeleteOutcome> {
    let mut tx = begin_write(pool).await?;

    let references: i64 = sqlx::query_scalar(usage_sql)
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .with_context(|| format!("Failed to count references to row {id}"))?;
    if references > 0 {
        debug!("Row {} is referenced {} time(s); keeping it.", id, references);
        return Ok(DeleteOutcome::InUse);
    }

    let result = match sqlx::query(delete_sql).bind(id).execute(&mut *tx).await {
        Ok(result) => result,
        // A reference that slipped past the count, e.g. added by a
        // concurrent writer: the store refuses, and so do we.
        Err(err) if is_foreign_key_violation(&err) => return Ok(DeleteOutcome::InUse),
        Err(err) => return Err(err).with_context(|| format!("Failed to delete row {id}")),
    };

    tx.commit().await.context("Failed to commit delete")?;

    Ok(if result.rows_affected() > 0 {
        DeleteOutcome::Deleted
    } else {
        DeleteOutcome::NotFound
    })
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db_err| db_err.is_foreign_key_violation())
}

/// Whether a store failure, context included, is a UNIQUE constraint
/// refusing the write.
pub(crate) fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<sqlx::Error>()
        .and_then(|err| err.as_database_error())
        .is_some_and(|db_err| db_err.is_unique_violation())
}

// "sqlite://database/sqlite.db?mode=rwc" -> "database"
fn database_dir(database_url: &str) -> Option<&Path> {
    let path = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))?;
    let path = path.split('?').next()?;
    if path.is_empty() || path.starts_with(":memory:") {
        return None;
    }
    Path::new(path)
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
}
