// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
//! Form validation.
//!
//! Each `clean_*` function turns a submitted payload into the fields a store
//! function writes, or into field-level errors. Checks that read the store
//! (uniqueness, references) take the connection of the transaction that
//! will perform the write.
//!
//! The outer `Result` carries store failures; the inner one is the
//! validation outcome.
use anyhow::Result;
use sqlx::SqliteConnection;
use task_manager_common::{FormErrors, Label, Status, TaskPayload, UserPayload};

use crate::database::catalog::{self, Catalog};
use crate::database::is_unique_violation;
use crate::database::tasks::TaskFields;
use crate::database::users::{self, UserFields};
use crate::password::hash_password;

pub type Cleaned<T> = std::result::Result<T, FormErrors>;

pub const REQUIRED: &str = "This field is required.";
pub const INVALID_CHOICE: &str =
    "Select a valid choice. That choice is not one of the available choices.";

const CATALOG_NAME_MAX: usize = 100;
const TASK_NAME_MAX: usize = 150;
const USERNAME_MAX: usize = 150;
const PERSON_NAME_MAX: usize = 150;
const PASSWORD_MIN: usize = 3;

pub const USERNAME_TAKEN: &str = "A user with that username already exists.";

pub fn name_taken_message<T: Catalog>() -> String {
    format!("{} with this Name already exists.", T::VERBOSE_NAME)
}

/// Outcome of a write whose uniqueness was checked beforehand. Should the
/// store still refuse it as a duplicate, the refusal is reported on `field`
/// like the check itself; any other failure stays an error.
pub fn unique_write<T>(written: Result<T>, field: &str, message: &str) -> Result<Cleaned<T>> {
    match written {
        Ok(value) => Ok(Ok(value)),
        Err(err) if is_unique_violation(&err) => {
            tracing::debug!("Duplicate refused by the store on '{}': {:?}", field, err);
            let mut errors = FormErrors::default();
            errors.add(field, message);
            Ok(Err(errors))
        }
        Err(err) => Err(err),
    }
}

fn finish<T>(errors: FormErrors, fields: impl FnOnce() -> T) -> Cleaned<T> {
    if errors.is_empty() {
        Ok(fields())
    } else {
        Err(errors)
    }
}

fn check_max_length(errors: &mut FormErrors, field: &str, value: &str, limit: usize) {
    let length = value.chars().count();
    if length > limit {
        errors.add(
            field,
            format!("Ensure this value has at most {limit} characters (it has {length})."),
        );
    }
}

/// Name of a status or label: required, trimmed, unique within its table.
/// `instance` is the entry being edited, which may keep its own name.
pub async fn clean_name<T: Catalog>(
    conn: &mut SqliteConnection,
    name: &str,
    instance: Option<i64>,
) -> Result<Cleaned<String>> {
    let name = name.trim();
    let mut errors = FormErrors::default();

    if name.is_empty() {
        errors.add("name", REQUIRED);
    } else {
        check_max_length(&mut errors, "name", name, CATALOG_NAME_MAX);
        if catalog::name_taken::<T>(conn, name, instance).await? {
            errors.add("name", name_taken_message::<T>());
        }
    }

    Ok(finish(errors, || name.to_string()))
}

/// Task form: name and status are required; status, executor and every
/// label must exist. Repeated label ids collapse into one.
pub async fn clean_task(
    conn: &mut SqliteConnection,
    payload: &TaskPayload,
) -> Result<Cleaned<TaskFields>> {
    let mut errors = FormErrors::default();

    let name = payload.name.trim();
    if name.is_empty() {
        errors.add("name", REQUIRED);
    } else {
        check_max_length(&mut errors, "name", name, TASK_NAME_MAX);
    }

    let status_id = match payload.status {
        None => {
            errors.add("status", REQUIRED);
            None
        }
        Some(id) => {
            if catalog::exists::<Status>(&mut *conn, id).await? {
                Some(id)
            } else {
                errors.add("status", INVALID_CHOICE);
                None
            }
        }
    };

    if let Some(id) = payload.executor {
        if !users::user_exists(&mut *conn, id).await? {
            errors.add("executor", INVALID_CHOICE);
        }
    }

    let mut label_ids: Vec<i64> = Vec::with_capacity(payload.labels.len());
    for &id in &payload.labels {
        if label_ids.contains(&id) {
            continue;
        }
        if catalog::exists::<Label>(&mut *conn, id).await? {
            label_ids.push(id);
        } else {
            errors.add(
                "labels",
                format!("Select a valid choice. {id} is not one of the available choices."),
            );
        }
    }

    Ok(match status_id {
        Some(status_id) => finish(errors, || TaskFields {
            name: name.to_string(),
            description: payload.description.trim().to_string(),
            status_id,
            executor_id: payload.executor,
            label_ids,
        }),
        None => Err(errors),
    })
}

/// Registration and profile form. Both require a new password twice;
/// `instance` is the account being edited.
pub async fn clean_user(
    conn: &mut SqliteConnection,
    payload: &UserPayload,
    instance: Option<i64>,
) -> Result<Cleaned<UserFields>> {
    let mut errors = FormErrors::default();

    let username = payload.username.trim();
    if username.is_empty() {
        errors.add("username", REQUIRED);
    } else {
        check_max_length(&mut errors, "username", username, USERNAME_MAX);
        if !username.chars().all(is_username_char) {
            errors.add(
                "username",
                "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
            );
        }
        if users::username_taken(conn, username, instance).await? {
            errors.add("username", USERNAME_TAKEN);
        }
    }

    let first_name = payload.first_name.trim();
    let last_name = payload.last_name.trim();
    check_max_length(&mut errors, "first_name", first_name, PERSON_NAME_MAX);
    check_max_length(&mut errors, "last_name", last_name, PERSON_NAME_MAX);

    let email = payload.email.trim();
    if !email.is_empty() && !looks_like_email(email) {
        errors.add("email", "Enter a valid email address.");
    }

    // Passwords are taken verbatim, surrounding spaces included.
    if payload.password1.is_empty() {
        errors.add("password1", REQUIRED);
    }
    if payload.password2.is_empty() {
        errors.add("password2", REQUIRED);
    } else if payload.password1 != payload.password2 {
        errors.add("password2", "The two password fields didn't match.");
    } else if payload.password2.chars().count() < PASSWORD_MIN {
        errors.add(
            "password2",
            format!("This password is too short. It must contain at least {PASSWORD_MIN} characters."),
        );
    }

    if !errors.is_empty() {
        return Ok(Err(errors));
    }
    Ok(Ok(UserFields {
        username: username.to_string(),
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        email: email.to_string(),
        password_hash: hash_password(&payload.password1)?,
    }))
}

fn is_username_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_')
}

fn looks_like_email(email: &str) -> bool {
    match email.rsplit_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && domain.contains('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}
