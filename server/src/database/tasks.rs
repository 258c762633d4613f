// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use task_manager_common::{Label, Task, TaskDetail};
use tracing::{debug, info};

/// Joins a task with its status, author and executor names.
/// Callers append `WHERE`/`ORDER BY` clauses; the task table is aliased `t`.
pub(crate) const TASK_DETAIL_SELECT: &str = r#"
    SELECT t.id, t.name, t.description,
           t.status_id, s.name AS status_name,
           t.author_id,
           COALESCE(NULLIF(TRIM(a.first_name || ' ' || a.last_name), ''), a.username) AS author_name,
           t.executor_id,
           COALESCE(NULLIF(TRIM(e.first_name || ' ' || e.last_name), ''), e.username) AS executor_name,
           t.created_at
    FROM tasks t
    JOIN statuses s ON s.id = t.status_id
    JOIN users a ON a.id = t.author_id
    LEFT JOIN users e ON e.id = t.executor_id
"#;

/// What a validated task form writes. The author is not part of it:
/// it is fixed when the task is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFields {
    pub name: String,
    pub description: String,
    pub status_id: i64,
    pub executor_id: Option<i64>,
    pub label_ids: Vec<i64>,
}

#[derive(sqlx::FromRow)]
struct TaskLabelRow {
    task_id: i64,
    #[sqlx(flatten)]
    label: Label,
}

pub async fn get_task(pool: &SqlitePool, task_id: i64) -> Result<Option<Task>> {
    sqlx::query_as::<_, Task>(
        "SELECT id, name, description, status_id, author_id, executor_id, created_at FROM tasks WHERE id = ?",
    )
    .bind(task_id)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("Failed to retrieve task with ID: {task_id}"))
}

/// A task with referenced names and its labels, as the detail page shows it.
pub async fn get_task_detail(pool: &SqlitePool, task_id: i64) -> Result<Option<TaskDetail>> {
    let sql = format!("{TASK_DETAIL_SELECT} WHERE t.id = ?");
    let task = sqlx::query_as::<_, TaskDetail>(&sql)
        .bind(task_id)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("Failed to retrieve task detail with ID: {task_id}"))?;

    match task {
        Some(task) => {
            let mut tasks = vec![task];
            attach_labels(pool, &mut tasks).await?;
            Ok(tasks.pop())
        }
        None => Ok(None),
    }
}

/// Ids of the labels attached to a task, in label creation order.
pub async fn label_ids(pool: &SqlitePool, task_id: i64) -> Result<Vec<i64>> {
    sqlx::query_scalar(
        "SELECT l.id FROM task_labels tl JOIN labels l ON l.id = tl.label_id WHERE tl.task_id = ? ORDER BY l.created_at ASC, l.id ASC",
    )
    .bind(task_id)
    .fetch_all(pool)
    .await
    .with_context(|| format!("Failed to retrieve labels of task ID: {task_id}"))
}

/// Fills `labels` of every task with one query.
pub async fn attach_labels(pool: &SqlitePool, tasks: &mut [TaskDetail]) -> Result<()> {
    if tasks.is_empty() {
        return Ok(());
    }

    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT tl.task_id, l.id, l.name, l.created_at FROM task_labels tl JOIN labels l ON l.id = tl.label_id WHERE tl.task_id IN (",
    );
    let mut ids = query.separated(", ");
    for task in tasks.iter() {
        ids.push_bind(task.id);
    }
    ids.push_unseparated(") ORDER BY l.created_at ASC, l.id ASC");

    let rows = query
        .build_query_as::<TaskLabelRow>()
        .fetch_all(pool)
        .await
        .context("Failed to retrieve task labels from DB")?;

    let mut by_task: HashMap<i64, Vec<Label>> = HashMap::new();
    for row in rows {
        by_task.entry(row.task_id).or_default().push(row.label);
    }
    for task in tasks.iter_mut() {
        task.labels = by_task.remove(&task.id).unwrap_or_default();
    }
    Ok(())
}

/// Inserts a task and its label links. Run it inside a transaction so the
/// links never exist without the task or the other way round.
pub async fn insert_task(
    conn: &mut SqliteConnection,
    fields: TaskFields,
    author_id: i64,
) -> Result<Task> {
    let created_at = Utc::now();
    debug!(
        "Insert task: name={}, status_id={}, author_id={}, executor_id={:?}, labels={:?}",
        fields.name, fields.status_id, author_id, fields.executor_id, fields.label_ids
    );

    let id = sqlx::query(
        "INSERT INTO tasks (name, description, status_id, author_id, executor_id, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&fields.name)
    .bind(&fields.description)
    .bind(fields.status_id)
    .bind(author_id)
    .bind(fields.executor_id)
    .bind(created_at)
    .execute(&mut *conn)
    .await
    .context("Failed to insert task into DB")?
    .last_insert_rowid();

    replace_labels(conn, id, &fields.label_ids).await?;

    Ok(Task {
        id,
        name: fields.name,
        description: fields.description,
        status_id: fields.status_id,
        author_id,
        executor_id: fields.executor_id,
        created_at,
    })
}

/// Rewrites everything but the author and creation time, label set
/// included. Returns false when no task has this id.
pub async fn update_task(
    conn: &mut SqliteConnection,
    task_id: i64,
    fields: TaskFields,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE tasks SET name = ?, description = ?, status_id = ?, executor_id = ? WHERE id = ?",
    )
    .bind(&fields.name)
    .bind(&fields.description)
    .bind(fields.status_id)
    .bind(fields.executor_id)
    .bind(task_id)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("Failed to update task with ID: {task_id}"))?;

    if result.rows_affected() == 0 {
        return Ok(false);
    }

    replace_labels(conn, task_id, &fields.label_ids).await?;
    info!("Updated task ID: {}", task_id);
    Ok(true)
}

async fn replace_labels(conn: &mut SqliteConnection, task_id: i64, label_ids: &[i64]) -> Result<()> {
    sqlx::query("DELETE FROM task_labels WHERE task_id = ?")
        .bind(task_id)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("Failed to clear labels of task ID: {task_id}"))?;

    if label_ids.is_empty() {
        return Ok(());
    }

    let mut query: QueryBuilder<Sqlite> =
        QueryBuilder::new("INSERT INTO task_labels (task_id, label_id) ");
    query.push_values(label_ids, |mut row, label_id| {
        row.push_bind(task_id).push_bind(*label_id);
    });
    query
        .build()
        .execute(&mut *conn)
        .await
        .with_context(|| format!("Failed to link labels to task ID: {task_id}"))?;
    Ok(())
}

/// Deletes a task; its label links go with it. Returns false when no task
/// has this id.
pub async fn delete_task(pool: &SqlitePool, task_id: i64) -> Result<bool> {
    debug!("Attempting to delete task with ID: {}", task_id);
    let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
        .bind(task_id)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to delete task with ID: {task_id}"))?;

    info!("Deleted {} rows for task ID: {}", result.rows_affected(), task_id);
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{DeleteOutcome, catalog, connect_in_memory, users};
    use task_manager_common::Status;

    struct Fixture {
        pool: SqlitePool,
        author: i64,
        executor: i64,
        status: i64,
        bug: i64,
        feature: i64,
    }

    async fn fixture() -> Fixture {
        let pool = connect_in_memory().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let user = |name: &str| users::UserFields {
            username: name.to_string(),
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            password_hash: "x".to_string(),
        };
        let author = users::insert_user(&mut conn, user("author")).await.unwrap().id;
        let executor = users::insert_user(&mut conn, user("executor")).await.unwrap().id;
        let status = catalog::insert::<Status>(&mut conn, "New").await.unwrap().id;
        let bug = catalog::insert::<Label>(&mut conn, "Bug").await.unwrap().id;
        let feature = catalog::insert::<Label>(&mut conn, "Feature").await.unwrap().id;
        drop(conn);
        Fixture { pool, author, executor, status, bug, feature }
    }

    #[tokio::test]
    async fn test_insert_task_with_labels() {
        let f = fixture().await;
        let mut tx = f.pool.begin().await.unwrap();
        let task = insert_task(
            &mut tx,
            TaskFields {
                name: "Write docs".to_string(),
                description: "All of them".to_string(),
                status_id: f.status,
                executor_id: Some(f.executor),
                label_ids: vec![f.feature, f.bug],
            },
            f.author,
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let detail = get_task_detail(&f.pool, task.id).await.unwrap().unwrap();
        assert_eq!(detail.name, "Write docs");
        assert_eq!(detail.status_name, "New");
        assert_eq!(detail.author_name, "author");
        assert_eq!(detail.executor_name.as_deref(), Some("executor"));
        // Labels come back in creation order, not submission order.
        let names: Vec<&str> = detail.labels.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["Bug", "Feature"]);
    }

    #[tokio::test]
    async fn test_update_replaces_label_set() {
        let f = fixture().await;
        let mut conn = f.pool.acquire().await.unwrap();
        let mut fields = TaskFields {
            name: "Fix login".to_string(),
            description: String::new(),
            status_id: f.status,
            executor_id: None,
            label_ids: vec![f.bug],
        };
        let task = insert_task(&mut conn, fields.clone(), f.author).await.unwrap();

        fields.label_ids = vec![f.feature];
        fields.executor_id = Some(f.executor);
        assert!(update_task(&mut conn, task.id, fields.clone()).await.unwrap());
        assert!(!update_task(&mut conn, 999, fields).await.unwrap());
        drop(conn);

        assert_eq!(label_ids(&f.pool, task.id).await.unwrap(), vec![f.feature]);
        let stored = get_task(&f.pool, task.id).await.unwrap().unwrap();
        assert_eq!(stored.author_id, f.author);
        assert_eq!(stored.executor_id, Some(f.executor));
    }

    #[tokio::test]
    async fn test_referenced_rows_cannot_be_deleted() {
        let f = fixture().await;
        let mut conn = f.pool.acquire().await.unwrap();
        let task = insert_task(
            &mut conn,
            TaskFields {
                name: "Pinned".to_string(),
                description: String::new(),
                status_id: f.status,
                executor_id: Some(f.executor),
                label_ids: vec![f.bug],
            },
            f.author,
        )
        .await
        .unwrap();
        drop(conn);

        assert_eq!(catalog::delete::<Status>(&f.pool, f.status).await.unwrap(), DeleteOutcome::InUse);
        assert_eq!(catalog::delete::<Label>(&f.pool, f.bug).await.unwrap(), DeleteOutcome::InUse);
        assert_eq!(users::delete_user(&f.pool, f.author).await.unwrap(), DeleteOutcome::InUse);
        assert_eq!(users::delete_user(&f.pool, f.executor).await.unwrap(), DeleteOutcome::InUse);
        // An unused label goes away without trouble.
        assert_eq!(catalog::delete::<Label>(&f.pool, f.feature).await.unwrap(), DeleteOutcome::Deleted);

        assert!(delete_task(&f.pool, task.id).await.unwrap());
        assert!(!delete_task(&f.pool, task.id).await.unwrap());

        // With the task gone, its references are released.
        assert!(label_ids(&f.pool, task.id).await.unwrap().is_empty());
        assert_eq!(catalog::delete::<Label>(&f.pool, f.bug).await.unwrap(), DeleteOutcome::Deleted);
        assert_eq!(catalog::delete::<Status>(&f.pool, f.status).await.unwrap(), DeleteOutcome::Deleted);
        assert_eq!(users::delete_user(&f.pool, f.executor).await.unwrap(), DeleteOutcome::Deleted);
    }
}
