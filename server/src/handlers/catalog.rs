// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
//! Pages for statuses and labels. Every handler is generic over the entry
//! type and is mounted once per type by the router.
use anyhow::Context;
use axum::{
    extract::{Json, Path, State},
    response::Response,
};
use sqlx::SqlitePool;
use task_manager_common::{FormErrors, FormPage, NamePayload, Page};
use tracing::{debug, info};

use super::{AppError, form_rejected, see_other};
use crate::database::{DeleteOutcome, begin_write};
use crate::database::catalog::{self, Catalog};
use crate::forms;
use crate::session::{CurrentUser, Session};

fn index_path<T: Catalog>() -> String {
    format!("/{}", T::TABLE)
}

/// Handler for listing entries in creation order.
pub async fn list<T: Catalog>(
    State(pool): State<SqlitePool>,
    _user: CurrentUser,
    session: Session,
) -> Result<Json<Page<Vec<T>>>, AppError> {
    let entries = catalog::list::<T>(&pool).await?;
    info!("Successfully retrieved {} {}.", entries.len(), T::TABLE);
    Ok(Json(Page {
        messages: session.take_notices(),
        content: entries,
    }))
}

pub async fn create_form<T: Catalog>(
    _user: CurrentUser,
    session: Session,
) -> Json<FormPage<NamePayload>> {
    Json(FormPage {
        messages: session.take_notices(),
        errors: FormErrors::default(),
        data: NamePayload::default(),
    })
}

pub async fn create<T: Catalog>(
    State(pool): State<SqlitePool>,
    CurrentUser(user): CurrentUser,
    session: Session,
    Json(payload): Json<NamePayload>,
) -> Result<Response, AppError> {
    debug!("Received request to create {} entry: {}", T::TABLE, payload.name);

    let mut tx = begin_write(&pool).await?;
    let name = match forms::clean_name::<T>(&mut tx, &payload.name, None).await? {
        Ok(name) => name,
        Err(errors) => return Ok(form_rejected(&session, errors, payload)),
    };
    let written = catalog::insert::<T>(&mut tx, &name).await;
    let entry = match forms::unique_write(written, "name", &forms::name_taken_message::<T>())? {
        Ok(entry) => entry,
        Err(errors) => return Ok(form_rejected(&session, errors, payload)),
    };
    tx.commit().await.context("Failed to commit transaction")?;

    info!(
        "{} '{}' created by user {} with ID: {}",
        T::VERBOSE_NAME,
        entry.name(),
        user.id,
        entry.id()
    );
    session.success(format!("{} successfully created", T::VERBOSE_NAME));
    Ok(see_other(&index_path::<T>()))
}

pub async fn update_form<T: Catalog>(
    State(pool): State<SqlitePool>,
    _user: CurrentUser,
    session: Session,
    Path(id): Path<i64>,
) -> Result<Json<FormPage<NamePayload>>, AppError> {
    let entry = catalog::get::<T>(&pool, id)
        .await?
        .ok_or_else(|| AppError::not_found(T::VERBOSE_NAME, id))?;
    Ok(Json(FormPage {
        messages: session.take_notices(),
        errors: FormErrors::default(),
        data: NamePayload {
            name: entry.name().to_string(),
        },
    }))
}

pub async fn update<T: Catalog>(
    State(pool): State<SqlitePool>,
    _user: CurrentUser,
    session: Session,
    Path(id): Path<i64>,
    Json(payload): Json<NamePayload>,
) -> Result<Response, AppError> {
    debug!("Received request to update {} entry {}: {}", T::TABLE, id, payload.name);

    let mut tx = begin_write(&pool).await?;
    if !catalog::exists::<T>(&mut tx, id).await? {
        return Err(AppError::not_found(T::VERBOSE_NAME, id));
    }
    let name = match forms::clean_name::<T>(&mut tx, &payload.name, Some(id)).await? {
        Ok(name) => name,
        Err(errors) => return Ok(form_rejected(&session, errors, payload)),
    };
    let written = catalog::rename::<T>(&mut tx, id, &name).await;
    if let Err(errors) = forms::unique_write(written, "name", &forms::name_taken_message::<T>())? {
        return Ok(form_rejected(&session, errors, payload));
    }
    tx.commit().await.context("Failed to commit transaction")?;

    session.success(format!("{} successfully updated", T::VERBOSE_NAME));
    Ok(see_other(&index_path::<T>()))
}

/// Confirmation page before a delete.
pub async fn delete_form<T: Catalog>(
    State(pool): State<SqlitePool>,
    _user: CurrentUser,
    session: Session,
    Path(id): Path<i64>,
) -> Result<Json<Page<T>>, AppError> {
    let entry = catalog::get::<T>(&pool, id)
        .await?
        .ok_or_else(|| AppError::not_found(T::VERBOSE_NAME, id))?;
    Ok(Json(Page {
        messages: session.take_notices(),
        content: entry,
    }))
}

/// Deletes an entry unless a task still uses it.
pub async fn delete<T: Catalog>(
    State(pool): State<SqlitePool>,
    _user: CurrentUser,
    session: Session,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    match catalog::delete::<T>(&pool, id).await? {
        DeleteOutcome::Deleted => {
            info!("{} with ID {} deleted successfully.", T::VERBOSE_NAME, id);
            session.success(format!("{} successfully deleted", T::VERBOSE_NAME));
        }
        DeleteOutcome::InUse => {
            info!("{} with ID {} is in use; not deleted.", T::VERBOSE_NAME, id);
            session.error(format!(
                "Cannot delete {} because it is in use",
                T::VERBOSE_NAME.to_lowercase()
            ));
        }
        DeleteOutcome::NotFound => return Err(AppError::not_found(T::VERBOSE_NAME, id)),
    }
    Ok(see_other(&index_path::<T>()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::connect_in_memory;
    use crate::session::SessionStore;
    use axum::http::StatusCode;
    use chrono::Utc;
    use task_manager_common::{Label, Status, User};

    fn actor() -> CurrentUser {
        CurrentUser(User {
            id: 1,
            username: "tester".to_string(),
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            created_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_create_rejects_blank_name() {
        let pool = connect_in_memory().await.unwrap();
        let session = Session::new(SessionStore::default(), None);
        let payload = Json(NamePayload { name: "  ".to_string() });

        let response = create::<Status>(State(pool.clone()), actor(), session.clone(), payload)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(catalog::list::<Status>(&pool).await.unwrap().is_empty());
        assert!(session.take_notices().is_empty());
    }

    #[tokio::test]
    async fn test_create_then_redirect_with_notice() {
        let pool = connect_in_memory().await.unwrap();
        let session = Session::new(SessionStore::default(), None);
        let payload = Json(NamePayload { name: "Bug".to_string() });

        let response = create::<Label>(State(pool.clone()), actor(), session.clone(), payload)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()["location"], "/labels");
        assert_eq!(catalog::list::<Label>(&pool).await.unwrap()[0].name, "Bug");
        assert_eq!(session.take_notices()[0].message, "Label successfully created");
    }

    #[tokio::test]
    async fn test_update_unknown_entry_is_not_found() {
        let pool = connect_in_memory().await.unwrap();
        let session = Session::new(SessionStore::default(), None);
        let payload = Json(NamePayload { name: "Renamed".to_string() });

        let err = update::<Status>(State(pool), actor(), session, Path(404), payload)
            .await
            .unwrap_err();
        assert_eq!(err.code, StatusCode::NOT_FOUND);
    }
}
