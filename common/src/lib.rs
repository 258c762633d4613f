// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, de};

/// A registered account.
///
/// The credential hash never leaves the server, so it is not part of this
/// structure; see `server::database::users::Credentials`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// "First Last", or the username when both names are blank.
    pub fn full_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }
}

/// A named workflow state assignable to tasks.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Status {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A named tag; a task carries any number of them.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Label {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A task row as stored, references only.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Task {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub status_id: i64,
    pub author_id: i64,
    pub executor_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// A task joined with the names of everything it references.
/// This is what list and detail pages show.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct TaskDetail {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub status_id: i64,
    pub status_name: String,
    pub author_id: i64,
    pub author_name: String,
    pub executor_id: Option<i64>,
    pub executor_name: Option<String>,
    pub created_at: DateTime<Utc>,

    // Filled from `task_labels` in a second query.
    #[sqlx(skip)]
    #[serde(default)]
    pub labels: Vec<Label>,
}

/// Body of the status and label create/update forms.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct NamePayload {
    #[serde(default)]
    pub name: String,
}

pub type StatusPayload = NamePayload;
pub type LabelPayload = NamePayload;

/// Body of the task create/update forms.
/// `executor` and `labels` are optional; the author is never submitted,
/// it is always the acting user.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct TaskPayload {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub status: Option<i64>,
    pub executor: Option<i64>,
    #[serde(default)]
    pub labels: Vec<i64>,
}

/// Body of the registration and profile update forms.
/// Passwords are accepted but never echoed back in a form context.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct UserPayload {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing)]
    pub password1: String,
    #[serde(default, skip_serializing)]
    pub password2: String,
}

impl From<&User> for UserPayload {
    fn from(user: &User) -> Self {
        Self {
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            ..Self::default()
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct LoginPayload {
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: String,
}

/// Criteria of the task list, read from the query string
/// (`?status=1&executor=2&labels=3&self_tasks=on`).
///
/// An empty value (`status=`) is the same as leaving the parameter out:
/// the criterion is absent, it does not mean "match nothing".
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub status: Option<i64>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub executor: Option<i64>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub labels: Option<i64>,
    #[serde(default, deserialize_with = "checkbox")]
    pub self_tasks: bool,
}

impl TaskFilter {
    /// True when no criterion was supplied at all.
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.executor.is_none() && self.labels.is_none() && !self.self_tasks
    }
}

// Query strings carry every value as text ("12"); the JSON page context
// echoes the filter back with real numbers and booleans.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawValue {
    Number(i64),
    Flag(bool),
    Text(String),
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawValue>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawValue::Number(id)) => Ok(Some(id)),
        Some(RawValue::Flag(flag)) => Err(de::Error::custom(format!(
            "'{flag}' is not a valid identifier"
        ))),
        Some(RawValue::Text(text)) => match text.trim() {
            "" => Ok(None),
            value => value
                .parse::<i64>()
                .map(Some)
                .map_err(|_| de::Error::custom(format!("'{value}' is not a valid identifier"))),
        },
    }
}

// HTML checkboxes post "on"; only an empty value or "false" unchecks.
fn checkbox<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<RawValue>::deserialize(deserializer)? {
        None => false,
        Some(RawValue::Flag(flag)) => flag,
        Some(RawValue::Number(number)) => number != 0,
        Some(RawValue::Text(text)) => !(text.is_empty() || text.eq_ignore_ascii_case("false")),
    })
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Info,
    Error,
}

/// A one-shot message shown on the next page the user opens.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

/// Field name -> validation messages. Errors that belong to no single field
/// are filed under [`FormErrors::NON_FIELD`].
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct FormErrors(BTreeMap<String, Vec<String>>);

impl FormErrors {
    pub const NON_FIELD: &'static str = "__all__";

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn field(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }
}

/// Context of any read-only page: pending notices plus the page content.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Page<T> {
    pub messages: Vec<Notice>,
    pub content: T,
}

/// Context of a form page, both when it is first shown and when a
/// submission is sent back because it failed validation.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FormPage<P> {
    pub messages: Vec<Notice>,
    pub errors: FormErrors,
    pub data: P,
}

/// Everything a task form offers to pick from.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct TaskChoices {
    pub statuses: Vec<Status>,
    pub executors: Vec<User>,
    pub labels: Vec<Label>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TaskFormPage {
    pub messages: Vec<Notice>,
    pub errors: FormErrors,
    pub data: TaskPayload,
    pub choices: TaskChoices,
}

/// Context of the task list. `filtered` is false only when no criterion was
/// applied, so an empty `tasks` under a filter reads differently from an
/// empty task table.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TaskListPage {
    pub messages: Vec<Notice>,
    pub filter: TaskFilter,
    pub filtered: bool,
    pub tasks: Vec<TaskDetail>,
    pub choices: TaskChoices,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(query: &str) -> TaskFilter {
        // The query-string format is plain `key=value&...`; JSON objects
        // of strings exercise the same deserializers.
        let mut map = serde_json::Map::new();
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            map.insert(key.to_string(), serde_json::Value::String(value.to_string()));
        }
        serde_json::from_value(serde_json::Value::Object(map)).unwrap()
    }

    #[test]
    fn test_blank_criteria_are_absent() {
        let filter = parse("status=&executor=&labels=");
        assert_eq!(filter, TaskFilter::default());
        assert!(filter.is_empty());
    }

    #[test]
    fn test_criteria_parse_identifiers() {
        let filter = parse("status=3&executor=7&labels=12&self_tasks=on");
        assert_eq!(filter.status, Some(3));
        assert_eq!(filter.executor, Some(7));
        assert_eq!(filter.labels, Some(12));
        assert!(filter.self_tasks);
        assert!(!filter.is_empty());
    }

    #[test]
    fn test_checkbox_values() {
        assert!(!parse("self_tasks=").self_tasks);
        assert!(!parse("self_tasks=false").self_tasks);
        assert!(parse("self_tasks=true").self_tasks);
        assert!(!parse("").self_tasks);
    }

    #[test]
    fn test_non_numeric_identifier_is_rejected() {
        let value = serde_json::json!({ "status": "new" });
        assert!(serde_json::from_value::<TaskFilter>(value).is_err());
    }

    #[test]
    fn test_filter_round_trips_through_page_context() {
        let filter = parse("status=3&self_tasks=on");
        let echoed = serde_json::to_value(&filter).unwrap();
        assert_eq!(echoed["status"], 3);
        assert_eq!(serde_json::from_value::<TaskFilter>(echoed).unwrap(), filter);
    }

    #[test]
    fn test_passwords_are_not_echoed() {
        let payload = UserPayload {
            username: "alice".to_string(),
            password1: "secret".to_string(),
            password2: "secret".to_string(),
            ..UserPayload::default()
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["username"], "alice");
        assert!(json.get("password1").is_none());
        assert!(json.get("password2").is_none());
    }

    #[test]
    fn test_form_errors_group_by_field() {
        let mut errors = FormErrors::default();
        assert!(errors.is_empty());
        errors.add("name", "This field is required.");
        errors.add("name", "Second problem.");
        assert_eq!(errors.field("name").len(), 2);
        assert!(errors.field("status").is_empty());
        assert!(errors.has("name"));
    }

    #[test]
    fn test_full_name_falls_back_to_username() {
        let mut user = User {
            id: 1,
            username: "jdoe".to_string(),
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            created_at: Utc::now(),
        };
        assert_eq!(user.full_name(), "jdoe");
        user.first_name = "John".to_string();
        user.last_name = "Doe".to_string();
        assert_eq!(user.full_name(), "John Doe");
    }
}
