// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use anyhow::{Context, Result};
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sqlx::SqlitePool;
use task_manager_common::{
    FormErrors, Label, Page, Status, TaskChoices, TaskDetail, TaskFilter, TaskFormPage,
    TaskListPage, TaskPayload,
};
use tracing::{debug, info};

use super::{AppError, see_other};
use crate::database::{begin_write, catalog, tasks, users};
use crate::filters::filter_tasks;
use crate::forms;
use crate::session::{CurrentUser, Session};

const TASKS_PATH: &str = "/tasks";
const DELETE_DENIED: &str = "A task can only be deleted by its author";

async fn task_choices(pool: &SqlitePool) -> Result<TaskChoices> {
    Ok(TaskChoices {
        statuses: catalog::list::<Status>(pool).await?,
        executors: users::list_users(pool).await?,
        labels: catalog::list::<Label>(pool).await?,
    })
}

async fn task_form(
    pool: &SqlitePool,
    session: &Session,
    status: StatusCode,
    errors: FormErrors,
    data: TaskPayload,
) -> Result<Response, AppError> {
    let page = TaskFormPage {
        messages: session.take_notices(),
        errors,
        data,
        choices: task_choices(pool).await?,
    };
    Ok((status, Json(page)).into_response())
}

/// Handler for the task list with its optional filters.
pub async fn list_tasks(
    State(pool): State<SqlitePool>,
    CurrentUser(user): CurrentUser,
    session: Session,
    Query(filter): Query<TaskFilter>,
) -> Result<Json<TaskListPage>, AppError> {
    debug!("Listing tasks for user {} with filter {:?}", user.id, filter);
    let tasks = filter_tasks(&pool, &filter, Some(user.id)).await?;
    info!("Successfully retrieved {} tasks.", tasks.len());

    Ok(Json(TaskListPage {
        messages: session.take_notices(),
        filtered: !filter.is_empty(),
        filter,
        tasks,
        choices: task_choices(&pool).await?,
    }))
}

pub async fn task_detail(
    State(pool): State<SqlitePool>,
    _user: CurrentUser,
    session: Session,
    Path(task_id): Path<i64>,
) -> Result<Json<Page<TaskDetail>>, AppError> {
    let task = tasks::get_task_detail(&pool, task_id)
        .await?
        .ok_or_else(|| AppError::not_found("Task", task_id))?;
    Ok(Json(Page {
        messages: session.take_notices(),
        content: task,
    }))
}

pub async fn create_form(
    State(pool): State<SqlitePool>,
    _user: CurrentUser,
    session: Session,
) -> Result<Response, AppError> {
    task_form(&pool, &session, StatusCode::OK, FormErrors::default(), TaskPayload::default()).await
}

/// Handler for creating a task authored by the acting user.
pub async fn create_task(
    State(pool): State<SqlitePool>,
    CurrentUser(user): CurrentUser,
    session: Session,
    Json(payload): Json<TaskPayload>,
) -> Result<Response, AppError> {
    debug!("Received request to create task: {}", payload.name);

    let mut tx = begin_write(&pool).await?;
    let fields = match forms::clean_task(&mut tx, &payload).await? {
        Ok(fields) => fields,
        Err(errors) => {
            tx.rollback().await.context("Failed to roll back transaction")?;
            return task_form(&pool, &session, StatusCode::UNPROCESSABLE_ENTITY, errors, payload)
                .await;
        }
    };
    let task = tasks::insert_task(&mut tx, fields, user.id).await?;
    tx.commit().await.context("Failed to commit transaction")?;

    info!("Task created successfully with ID: {}", task.id);
    session.success("Task successfully created");
    Ok(see_other(TASKS_PATH))
}

pub async fn update_form(
    State(pool): State<SqlitePool>,
    _user: CurrentUser,
    session: Session,
    Path(task_id): Path<i64>,
) -> Result<Response, AppError> {
    let task = tasks::get_task(&pool, task_id)
        .await?
        .ok_or_else(|| AppError::not_found("Task", task_id))?;
    let data = TaskPayload {
        name: task.name,
        description: task.description,
        status: Some(task.status_id),
        executor: task.executor_id,
        labels: tasks::label_ids(&pool, task_id).await?,
    };
    task_form(&pool, &session, StatusCode::OK, FormErrors::default(), data).await
}

/// Handler for editing a task; any logged-in user may do it, the author
/// stays the same.
pub async fn update_task(
    State(pool): State<SqlitePool>,
    _user: CurrentUser,
    session: Session,
    Path(task_id): Path<i64>,
    Json(payload): Json<TaskPayload>,
) -> Result<Response, AppError> {
    debug!("Received request to update task {}: {}", task_id, payload.name);
    if tasks::get_task(&pool, task_id).await?.is_none() {
        return Err(AppError::not_found("Task", task_id));
    }

    let mut tx = begin_write(&pool).await?;
    let fields = match forms::clean_task(&mut tx, &payload).await? {
        Ok(fields) => fields,
        Err(errors) => {
            tx.rollback().await.context("Failed to roll back transaction")?;
            return task_form(&pool, &session, StatusCode::UNPROCESSABLE_ENTITY, errors, payload)
                .await;
        }
    };
    // Deleted by someone else since the check above.
    if !tasks::update_task(&mut tx, task_id, fields).await? {
        return Err(AppError::not_found("Task", task_id));
    }
    tx.commit().await.context("Failed to commit transaction")?;

    session.success("Task successfully updated");
    Ok(see_other(TASKS_PATH))
}

pub async fn delete_form(
    State(pool): State<SqlitePool>,
    CurrentUser(user): CurrentUser,
    session: Session,
    Path(task_id): Path<i64>,
) -> Result<Response, AppError> {
    let task = tasks::get_task_detail(&pool, task_id)
        .await?
        .ok_or_else(|| AppError::not_found("Task", task_id))?;
    if task.author_id != user.id {
        session.error(DELETE_DENIED);
        return Ok(see_other(TASKS_PATH));
    }
    Ok(Json(Page {
        messages: session.take_notices(),
        content: task,
    })
    .into_response())
}

/// Handler for deleting a task; only its author may.
pub async fn delete_task(
    State(pool): State<SqlitePool>,
    CurrentUser(user): CurrentUser,
    session: Session,
    Path(task_id): Path<i64>,
) -> Result<Response, AppError> {
    debug!("Attempting to delete task with ID: {}", task_id);
    let task = tasks::get_task(&pool, task_id)
        .await?
        .ok_or_else(|| AppError::not_found("Task", task_id))?;

    if task.author_id != user.id {
        info!(
            "User {} is not the author of task {}; not deleted.",
            user.id, task_id
        );
        session.error(DELETE_DENIED);
        return Ok(see_other(TASKS_PATH));
    }

    if tasks::delete_task(&pool, task_id).await? {
        info!("Task with ID {} deleted successfully.", task_id);
        session.success("Task successfully deleted");
        Ok(see_other(TASKS_PATH))
    } else {
        Err(AppError::not_found("Task", task_id))
    }
}
