// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
pub mod auth;
pub mod catalog;
pub mod tasks;
pub mod users;

use axum::{
    extract::Json,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::Serialize;
use task_manager_common::{FormErrors, FormPage};

use crate::session::Session;

/// 303 to `path`; the next page shows whatever notices were queued.
pub(crate) fn see_other(path: &str) -> Response {
    Redirect::to(path).into_response()
}

/// Sends a failed submission back with its errors and the submitted data.
pub(crate) fn form_rejected<P: Serialize>(session: &Session, errors: FormErrors, data: P) -> Response {
    tracing::debug!("Form rejected: {:?}", errors);
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(FormPage {
            messages: session.take_notices(),
            errors,
            data,
        }),
    )
        .into_response()
}

// --- Custom Error Handling ---
// Anticipated failures (validation, permissions, rows in use) are answered
// by the handlers themselves; whatever reaches this type is either a
// missing resource or a fault of the store.

/// Our custom error type for the application.
#[derive(Debug)]
pub struct AppError {
    code: StatusCode,
    message: String,
}

impl AppError {
    pub(crate) fn new(code: StatusCode, message: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
        }
    }

    pub(crate) fn not_found(what: &str, id: i64) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            &format!("{what} with ID {id} not found."),
        )
    }
}

/// Allows converting an `anyhow::Error` (coming from the database module)
/// into our `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        // Log the internal error for debugging.
        tracing::error!("Internal server error: {:?}", err);
        Self {
            code: StatusCode::INTERNAL_SERVER_ERROR,
            message: "An internal error occurred.".to_string(),
        }
    }
}

/// Allows Axum to convert our `AppError` into an HTTP `Response`.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(
            "Responding with error: status_code={}, message={}",
            self.code.as_u16(),
            self.message
        );
        (
            self.code,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}
