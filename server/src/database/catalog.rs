// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
//! Statuses and labels: small named entries that tasks point at.
//! Both live in a table of `(id, name UNIQUE, created_at)` and differ only
//! in how tasks reference them, so one set of queries serves both.
use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use task_manager_common::{Label, Status};
use tracing::{debug, info};

use super::{DeleteOutcome, delete_guarded};

/// A named entry stored in its own table.
pub trait Catalog:
    for<'r> FromRow<'r, SqliteRow> + Serialize + Send + Sync + Unpin + 'static
{
    /// Table name; also the URL segment the entries are served under.
    const TABLE: &'static str;
    /// Human name used in notices, e.g. "Status".
    const VERBOSE_NAME: &'static str;
    /// `SELECT COUNT(*)` of tasks referencing the entry bound to `?`.
    const USAGE_QUERY: &'static str;

    fn id(&self) -> i64;
    fn name(&self) -> &str;
}

impl Catalog for Status {
    const TABLE: &'static str = "statuses";
    const VERBOSE_NAME: &'static str = "Status";
    const USAGE_QUERY: &'static str = "SELECT COUNT(*) FROM tasks WHERE status_id = ?";

    fn id(&self) -> i64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Catalog for Label {
    const TABLE: &'static str = "labels";
    const VERBOSE_NAME: &'static str = "Label";
    const USAGE_QUERY: &'static str = "SELECT COUNT(*) FROM task_labels WHERE label_id = ?";

    fn id(&self) -> i64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Entries in creation order.
pub async fn list<T: Catalog>(pool: &SqlitePool) -> Result<Vec<T>> {
    let sql = format!(
        "SELECT id, name, created_at FROM {} ORDER BY created_at ASC, id ASC",
        T::TABLE
    );
    sqlx::query_as::<_, T>(&sql)
        .fetch_all(pool)
        .await
        .with_context(|| format!("Failed to retrieve {} from DB", T::TABLE))
}

pub async fn get<T: Catalog>(pool: &SqlitePool, id: i64) -> Result<Option<T>> {
    let sql = format!("SELECT id, name, created_at FROM {} WHERE id = ?", T::TABLE);
    sqlx::query_as::<_, T>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("Failed to retrieve {} entry with ID: {}", T::TABLE, id))
}

pub async fn exists<T: Catalog>(conn: &mut SqliteConnection, id: i64) -> Result<bool> {
    let sql = format!("SELECT id FROM {} WHERE id = ?", T::TABLE);
    let found: Option<i64> = sqlx::query_scalar(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await
        .with_context(|| format!("Failed to check {} entry with ID: {}", T::TABLE, id))?;
    Ok(found.is_some())
}

/// Whether an entry other than `exclude` already carries `name`.
/// The comparison is exact, so "Bug" and "bug" are different names.
pub async fn name_taken<T: Catalog>(
    conn: &mut SqliteConnection,
    name: &str,
    exclude: Option<i64>,
) -> Result<bool> {
    let sql = format!("SELECT id FROM {} WHERE name = ? AND id IS NOT ?", T::TABLE);
    let found: Option<i64> = sqlx::query_scalar(&sql)
        .bind(name)
        .bind(exclude)
        .fetch_optional(conn)
        .await
        .with_context(|| format!("Failed to check {} name uniqueness", T::TABLE))?;
    Ok(found.is_some())
}

pub async fn insert<T: Catalog>(conn: &mut SqliteConnection, name: &str) -> Result<T> {
    debug!("Insert into {}: name={}", T::TABLE, name);
    let sql = format!(
        "INSERT INTO {} (name, created_at) VALUES (?, ?) RETURNING id, name, created_at",
        T::TABLE
    );
    sqlx::query_as::<_, T>(&sql)
        .bind(name)
        .bind(Utc::now())
        .fetch_one(conn)
        .await
        .with_context(|| format!("Failed to insert into {}", T::TABLE))
}

/// Returns false when no entry has this id.
pub async fn rename<T: Catalog>(conn: &mut SqliteConnection, id: i64, name: &str) -> Result<bool> {
    let sql = format!("UPDATE {} SET name = ? WHERE id = ?", T::TABLE);
    let result = sqlx::query(&sql)
        .bind(name)
        .bind(id)
        .execute(conn)
        .await
        .with_context(|| format!("Failed to update {} entry with ID: {}", T::TABLE, id))?;

    info!("Updated {} rows in {} for ID: {}", result.rows_affected(), T::TABLE, id);
    Ok(result.rows_affected() > 0)
}

/// Deletes an entry no task refers to.
pub async fn delete<T: Catalog>(pool: &SqlitePool, id: i64) -> Result<DeleteOutcome> {
    debug!("Attempting to delete {} entry with ID: {}", T::TABLE, id);
    let delete_sql = format!("DELETE FROM {} WHERE id = ?", T::TABLE);
    delete_guarded(pool, T::USAGE_QUERY, &delete_sql, id).await
}
