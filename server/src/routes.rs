// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use crate::database::catalog::Catalog;
use crate::handlers::{auth, catalog, tasks, users};
use crate::session::{self, SessionStore};
use axum::{
    extract::FromRef,
    middleware,
    routing::{get, post},
    Router,
};
use sqlx::SqlitePool;
use task_manager_common::{Label, Status};
use tower_http::trace::TraceLayer;

/// Everything handlers can extract with `State`.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub sessions: SessionStore,
}

impl FromRef<AppState> for SqlitePool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for SessionStore {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}

/// Creates and configures the application router.
pub fn create_router(pool: SqlitePool) -> Router {
    let state = AppState {
        pool,
        sessions: SessionStore::default(),
    };

    Router::new()
        // Home page and session start/end
        .route("/", get(auth::index))
        .route("/login", get(auth::login_form).post(auth::login))
        .route("/logout", post(auth::logout))
        // Public directory, registration, and self-service account pages
        .route("/users", get(users::list_users))
        .route("/users/create", get(users::register_form).post(users::register))
        .route(
            "/users/{id}/update",
            get(users::update_form).post(users::update_user),
        )
        .route(
            "/users/{id}/delete",
            get(users::delete_form).post(users::delete_user),
        )
        // `/statuses/...` and `/labels/...`
        .merge(catalog_routes::<Status>())
        .merge(catalog_routes::<Label>())
        // Tasks; the list takes the `status`, `executor`, `labels` and
        // `self_tasks` query parameters
        .route("/tasks", get(tasks::list_tasks))
        .route(
            "/tasks/create",
            get(tasks::create_form).post(tasks::create_task),
        )
        .route("/tasks/{id}", get(tasks::task_detail))
        .route(
            "/tasks/{id}/update",
            get(tasks::update_form).post(tasks::update_task),
        )
        .route(
            "/tasks/{id}/delete",
            get(tasks::delete_form).post(tasks::delete_task),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            session::session_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        // Adds the database pool and the session store to the application state
        .with_state(state)
}

/// List, create, update and delete pages for one kind of catalog entry.
fn catalog_routes<T: Catalog>() -> Router<AppState> {
    let index = format!("/{}", T::TABLE);
    Router::new()
        .route(&index, get(catalog::list::<T>))
        .route(
            &format!("{index}/create"),
            get(catalog::create_form::<T>).post(catalog::create::<T>),
        )
        .route(
            &format!("{index}/{{id}}/update"),
            get(catalog::update_form::<T>).post(catalog::update::<T>),
        )
        .route(
            &format!("{index}/{{id}}/delete"),
            get(catalog::delete_form::<T>).post(catalog::delete::<T>),
        )
}
