// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use task_manager_common::User;
use tracing::{debug, info};

use super::{DeleteOutcome, delete_guarded};

const USER_COLUMNS: &str = "id, username, first_name, last_name, email, created_at";

/// What a validated registration or profile form writes.
#[derive(Debug, Clone)]
pub struct UserFields {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
}

/// The stored hash for a username, used only to verify a login.
#[derive(Debug, sqlx::FromRow)]
pub struct Credentials {
    pub id: i64,
    pub password_hash: String,
}

/// All users, oldest account first.
pub async fn list_users(pool: &SqlitePool) -> Result<Vec<User>> {
    sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id ASC"))
        .fetch_all(pool)
        .await
        .context("Failed to retrieve users from DB")
}

pub async fn get_user(pool: &SqlitePool, user_id: i64) -> Result<Option<User>> {
    sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("Failed to retrieve user with ID: {user_id}"))
}

pub async fn find_credentials(pool: &SqlitePool, username: &str) -> Result<Option<Credentials>> {
    sqlx::query_as::<_, Credentials>("SELECT id, password_hash FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await
        .context("Failed to look up user credentials")
}

pub async fn user_exists(conn: &mut SqliteConnection, user_id: i64) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(conn)
        .await
        .with_context(|| format!("Failed to check user with ID: {user_id}"))?;
    Ok(found.is_some())
}

/// Whether another account (not `exclude`) already uses `username`.
pub async fn username_taken(
    conn: &mut SqliteConnection,
    username: &str,
    exclude: Option<i64>,
) -> Result<bool> {
    let found: Option<i64> =
        sqlx::query_scalar("SELECT id FROM users WHERE username = ? AND id IS NOT ?")
            .bind(username)
            .bind(exclude)
            .fetch_optional(conn)
            .await
            .context("Failed to check username uniqueness")?;
    Ok(found.is_some())
}

pub async fn insert_user(conn: &mut SqliteConnection, fields: UserFields) -> Result<User> {
    let created_at = Utc::now();
    debug!("Insert user: username={}", fields.username);

    let id = sqlx::query(
        "INSERT INTO users (username, first_name, last_name, email, password_hash, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&fields.username)
    .bind(&fields.first_name)
    .bind(&fields.last_name)
    .bind(&fields.email)
    .bind(&fields.password_hash)
    .bind(created_at)
    .execute(conn)
    .await
    .context("Failed to insert user into DB")?
    .last_insert_rowid();

    Ok(User {
        id,
        username: fields.username,
        first_name: fields.first_name,
        last_name: fields.last_name,
        email: fields.email,
        created_at,
    })
}

/// Returns false when no user has this id.
pub async fn update_user(
    conn: &mut SqliteConnection,
    user_id: i64,
    fields: UserFields,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE users SET username = ?, first_name = ?, last_name = ?, email = ?, password_hash = ? WHERE id = ?",
    )
    .bind(&fields.username)
    .bind(&fields.first_name)
    .bind(&fields.last_name)
    .bind(&fields.email)
    .bind(&fields.password_hash)
    .bind(user_id)
    .execute(conn)
    .await
    .with_context(|| format!("Failed to update user with ID: {user_id}"))?;

    info!("Updated {} rows for user ID: {}", result.rows_affected(), user_id);
    Ok(result.rows_affected() > 0)
}

/// Removes an account that neither authored nor is assigned to any task.
pub async fn delete_user(pool: &SqlitePool, user_id: i64) -> Result<DeleteOutcome> {
    debug!("Attempting to delete user with ID: {}", user_id);
    delete_guarded(
        pool,
        "SELECT COUNT(*) FROM tasks WHERE ? IN (author_id, executor_id)",
        "DELETE FROM users WHERE id = ?",
        user_id,
    )
    .await
}
