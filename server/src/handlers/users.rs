// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use anyhow::Context;
use axum::{
    extract::{Json, Path, State},
    response::{IntoResponse, Response},
};
use sqlx::SqlitePool;
use task_manager_common::{FormErrors, FormPage, Page, User, UserPayload};
use tracing::{debug, info};

use super::{AppError, form_rejected, see_other};
use crate::database::{DeleteOutcome, begin_write, users};
use crate::forms;
use crate::session::{CurrentUser, Session};

const USERS_PATH: &str = "/users";
const EDIT_DENIED: &str = "You do not have permission to edit this user";
const DELETE_DENIED: &str = "You do not have permission to delete this user";

/// Handler for the public user directory.
pub async fn list_users(
    State(pool): State<SqlitePool>,
    session: Session,
) -> Result<Json<Page<Vec<User>>>, AppError> {
    let users = users::list_users(&pool).await?;
    info!("Successfully retrieved {} users.", users.len());
    Ok(Json(Page {
        messages: session.take_notices(),
        content: users,
    }))
}

pub async fn register_form(session: Session) -> Json<FormPage<UserPayload>> {
    Json(FormPage {
        messages: session.take_notices(),
        errors: FormErrors::default(),
        data: UserPayload::default(),
    })
}

/// Sign-up; open to anonymous visitors.
pub async fn register(
    State(pool): State<SqlitePool>,
    session: Session,
    Json(payload): Json<UserPayload>,
) -> Result<Response, AppError> {
    debug!("Received registration for username: {}", payload.username);

    let mut tx = begin_write(&pool).await?;
    let fields = match forms::clean_user(&mut tx, &payload, None).await? {
        Ok(fields) => fields,
        Err(errors) => return Ok(form_rejected(&session, errors, payload)),
    };
    let written = users::insert_user(&mut tx, fields).await;
    let user = match forms::unique_write(written, "username", forms::USERNAME_TAKEN)? {
        Ok(user) => user,
        Err(errors) => return Ok(form_rejected(&session, errors, payload)),
    };
    tx.commit().await.context("Failed to commit transaction")?;

    info!("User registered with ID: {}", user.id);
    session.success("User successfully registered");
    Ok(see_other("/login"))
}

// Accounts are edited and deleted by their owner only.
fn deny_other(session: &Session, actor: &User, target_id: i64, message: &str) -> Option<Response> {
    if actor.id == target_id {
        return None;
    }
    info!("User {} was refused access to account {}.", actor.id, target_id);
    session.error(message);
    Some(see_other(USERS_PATH))
}

pub async fn update_form(
    CurrentUser(user): CurrentUser,
    session: Session,
    Path(user_id): Path<i64>,
) -> Result<Response, AppError> {
    if let Some(denied) = deny_other(&session, &user, user_id, EDIT_DENIED) {
        return Ok(denied);
    }
    Ok(Json(FormPage {
        messages: session.take_notices(),
        errors: FormErrors::default(),
        data: UserPayload::from(&user),
    })
    .into_response())
}

pub async fn update_user(
    State(pool): State<SqlitePool>,
    CurrentUser(user): CurrentUser,
    session: Session,
    Path(user_id): Path<i64>,
    Json(payload): Json<UserPayload>,
) -> Result<Response, AppError> {
    if let Some(denied) = deny_other(&session, &user, user_id, EDIT_DENIED) {
        return Ok(denied);
    }

    let mut tx = begin_write(&pool).await?;
    let fields = match forms::clean_user(&mut tx, &payload, Some(user_id)).await? {
        Ok(fields) => fields,
        Err(errors) => return Ok(form_rejected(&session, errors, payload)),
    };
    let written = users::update_user(&mut tx, user_id, fields).await;
    match forms::unique_write(written, "username", forms::USERNAME_TAKEN)? {
        Ok(true) => {}
        Ok(false) => return Err(AppError::not_found("User", user_id)),
        Err(errors) => return Ok(form_rejected(&session, errors, payload)),
    }
    tx.commit().await.context("Failed to commit transaction")?;

    info!("User {} updated their account.", user_id);
    session.success("User successfully updated");
    Ok(see_other(USERS_PATH))
}

pub async fn delete_form(
    CurrentUser(user): CurrentUser,
    session: Session,
    Path(user_id): Path<i64>,
) -> Result<Response, AppError> {
    if let Some(denied) = deny_other(&session, &user, user_id, DELETE_DENIED) {
        return Ok(denied);
    }
    Ok(Json(Page {
        messages: session.take_notices(),
        content: user,
    })
    .into_response())
}

/// Deletes the actor's own account unless a task still references it,
/// then ends the session.
pub async fn delete_user(
    State(pool): State<SqlitePool>,
    CurrentUser(user): CurrentUser,
    session: Session,
    Path(user_id): Path<i64>,
) -> Result<Response, AppError> {
    if let Some(denied) = deny_other(&session, &user, user_id, DELETE_DENIED) {
        return Ok(denied);
    }

    match users::delete_user(&pool, user_id).await? {
        DeleteOutcome::Deleted => {
            info!("User with ID {} deleted successfully.", user_id);
            session.logout();
            session.success("User successfully deleted");
        }
        DeleteOutcome::InUse => {
            info!("User with ID {} is in use; not deleted.", user_id);
            session.error("Cannot delete user because it is in use");
        }
        DeleteOutcome::NotFound => return Err(AppError::not_found("User", user_id)),
    }
    Ok(see_other(USERS_PATH))
}
