// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use axum::{
    extract::{Json, Query, State},
    response::Response,
};
use serde::Deserialize;
use sqlx::SqlitePool;
use task_manager_common::{FormErrors, FormPage, LoginPayload, Page, User};
use tracing::{debug, info};

use super::{AppError, form_rejected, see_other};
use crate::database::users;
use crate::password::verify_password;
use crate::session::Session;

pub const LOGIN_FAILED: &str = "Please enter a correct username and password.";

#[derive(Deserialize, Debug, Default)]
pub struct LoginQuery {
    pub next: Option<String>,
}

/// Home page: notices and the logged-in user, if any.
pub async fn index(
    State(pool): State<SqlitePool>,
    session: Session,
) -> Result<Json<Page<Option<User>>>, AppError> {
    let user = match session.user_id() {
        Some(user_id) => users::get_user(&pool, user_id).await?,
        None => None,
    };
    Ok(Json(Page {
        messages: session.take_notices(),
        content: user,
    }))
}

pub async fn login_form(session: Session) -> Json<FormPage<LoginPayload>> {
    Json(FormPage {
        messages: session.take_notices(),
        errors: FormErrors::default(),
        data: LoginPayload::default(),
    })
}

/// Starts an authenticated session and goes back to `next` when it is a
/// local path.
pub async fn login(
    State(pool): State<SqlitePool>,
    session: Session,
    Query(query): Query<LoginQuery>,
    Json(payload): Json<LoginPayload>,
) -> Result<Response, AppError> {
    debug!("Login attempt for username: {}", payload.username);

    let credentials = users::find_credentials(&pool, payload.username.trim()).await?;
    let user_id = credentials
        .filter(|c| verify_password(&payload.password, &c.password_hash))
        .map(|c| c.id);

    let Some(user_id) = user_id else {
        info!("Login failed for username: {}", payload.username);
        let mut errors = FormErrors::default();
        errors.add(FormErrors::NON_FIELD, LOGIN_FAILED);
        return Ok(form_rejected(&session, errors, payload));
    };

    session.login(user_id);
    session.success("You are logged in");
    info!("User {} logged in.", user_id);
    Ok(see_other(safe_next(query.next.as_deref())))
}

pub async fn logout(session: Session) -> Response {
    if let Some(user_id) = session.user_id() {
        info!("User {} logged out.", user_id);
    }
    session.logout();
    session.info("You are logged out");
    see_other("/")
}

// Only same-site paths; "//host" and "/\host" would leave the site.
fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
            path
        }
        _ => "/",
    }
}
