// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
//! Cookie sessions: who is logged in, plus one-shot notices.
//!
//! Sessions live in process memory. A request without a known `sessionid`
//! cookie gets an anonymous handle; the session itself is only created, and
//! the cookie only sent, once something is stored in it. Idle sessions
//! expire: anonymous ones after minutes, logged-in ones after days.
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::anyhow;
use axum::extract::{FromRef, FromRequestParts, Request, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::{Mutex, RwLock};
use sqlx::SqlitePool;
use task_manager_common::{Notice, NoticeLevel, User};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::database::users;
use crate::handlers::AppError;

pub const SESSION_COOKIE: &str = "sessionid";

/// Idle lifetime of a session with a logged-in user.
const USER_IDLE_DAYS: i64 = 14;
/// Idle lifetime of an anonymous session; it only carries notices to the
/// next page.
const ANONYMOUS_IDLE_MINUTES: i64 = 10;
/// Expired sessions are swept once per this many new sessions.
const SWEEP_EVERY: usize = 256;

#[derive(Debug)]
struct SessionData {
    user_id: Option<i64>,
    notices: Vec<Notice>,
    last_seen: DateTime<Utc>,
}

impl SessionData {
    fn new() -> Self {
        Self {
            user_id: None,
            notices: Vec::new(),
            last_seen: Utc::now(),
        }
    }

    fn expired(&self, now: DateTime<Utc>) -> bool {
        let idle = if self.user_id.is_some() {
            TimeDelta::days(USER_IDLE_DAYS)
        } else {
            TimeDelta::minutes(ANONYMOUS_IDLE_MINUTES)
        };
        now - self.last_seen > idle
    }
}

/// All live sessions, keyed by the cookie value.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionData>>>,
    created: Arc<AtomicUsize>,
}

impl SessionStore {
    /// Whether `id` names a live session, which is then marked as seen.
    /// An expired session is dropped on the spot.
    fn touch(&self, id: &str) -> bool {
        let now = Utc::now();
        let mut sessions = self.sessions.write();
        let expired = match sessions.get_mut(id) {
            None => return false,
            Some(data) if data.expired(now) => true,
            Some(data) => {
                data.last_seen = now;
                false
            }
        };
        if expired {
            sessions.remove(id);
            debug!("Session {} expired", id);
        }
        !expired
    }

    fn create(&self) -> String {
        if self.created.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.purge_expired(Utc::now());
        }
        let id = new_session_id();
        self.sessions.write().insert(id.clone(), SessionData::new());
        debug!("Created session {}", id);
        id
    }

    /// Drops every session idle for longer than its lifetime and returns
    /// how many went.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, data| !data.expired(now));
        let removed = before - sessions.len();
        if removed > 0 {
            info!("Dropped {} expired sessions, {} left.", removed, sessions.len());
        }
        removed
    }
}

#[derive(Debug, Default)]
struct SessionKey {
    id: Option<String>,
    // The client does not know `id` yet.
    issued: bool,
}

/// The session of the current request.
#[derive(Clone)]
pub struct Session {
    store: SessionStore,
    key: Arc<Mutex<SessionKey>>,
}

impl Session {
    pub(crate) fn new(store: SessionStore, id: Option<String>) -> Self {
        Self {
            store,
            key: Arc::new(Mutex::new(SessionKey { id, issued: false })),
        }
    }

    fn id(&self) -> Option<String> {
        self.key.lock().id.clone()
    }

    fn ensure_id(&self) -> String {
        let mut key = self.key.lock();
        match &key.id {
            Some(id) => id.clone(),
            None => {
                let id = self.store.create();
                key.id = Some(id.clone());
                key.issued = true;
                id
            }
        }
    }

    /// Id the response has to hand out in a cookie, if any.
    fn issued_id(&self) -> Option<String> {
        let key = self.key.lock();
        if key.issued { key.id.clone() } else { None }
    }

    pub fn user_id(&self) -> Option<i64> {
        let id = self.id()?;
        self.store.sessions.read().get(&id).and_then(|data| data.user_id)
    }

    /// Binds the user to a fresh session id; pending notices carry over.
    pub fn login(&self, user_id: i64) {
        self.rotate(|data| data.user_id = Some(user_id));
    }

    /// Forgets the user under a fresh session id; pending notices carry over.
    pub fn logout(&self) {
        self.rotate(|data| data.user_id = None);
    }

    fn rotate(&self, update: impl FnOnce(&mut SessionData)) {
        let mut key = self.key.lock();
        let mut sessions = self.store.sessions.write();
        let mut data = key
            .id
            .take()
            .and_then(|old| sessions.remove(&old))
            .unwrap_or_else(SessionData::new);
        update(&mut data);
        data.last_seen = Utc::now();
        let id = new_session_id();
        sessions.insert(id.clone(), data);
        key.id = Some(id);
        key.issued = true;
    }

    pub fn notify(&self, level: NoticeLevel, message: impl Into<String>) {
        let id = self.ensure_id();
        let notice = Notice {
            level,
            message: message.into(),
        };
        let mut sessions = self.store.sessions.write();
        sessions
            .entry(id)
            .or_insert_with(SessionData::new)
            .notices
            .push(notice);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.notify(NoticeLevel::Success, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.notify(NoticeLevel::Info, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.notify(NoticeLevel::Error, message);
    }

    /// Pending notices, oldest first. Each one is returned only once.
    pub fn take_notices(&self) -> Vec<Notice> {
        let Some(id) = self.id() else {
            return Vec::new();
        };
        self.store
            .sessions
            .write()
            .get_mut(&id)
            .map(|data| std::mem::take(&mut data.notices))
            .unwrap_or_default()
    }
}

fn new_session_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

/// Attaches a [`Session`] to every request and sets the cookie when the
/// handler created or rotated the session.
pub async fn session_middleware(
    State(store): State<SessionStore>,
    mut request: Request,
    next: Next,
) -> Response {
    let id = cookie_value(request.headers(), SESSION_COOKIE).filter(|id| store.touch(id));
    let session = Session::new(store, id);
    request.extensions_mut().insert(session.clone());

    let mut response = next.run(request).await;

    if let Some(id) = session.issued_id() {
        let cookie = format!("{SESSION_COOKIE}={id}; HttpOnly; Path=/; SameSite=Lax");
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
            }
            Err(err) => warn!("Could not encode session cookie: {}", err),
        }
    }
    response
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(|| AppError::from(anyhow!("Session middleware is not installed")))
    }
}

/// The logged-in user. Handlers taking it are closed to anonymous visitors:
/// they are sent to `/login?next=<where they wanted to go>` with a notice.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl<S> FromRequestParts<S> for CurrentUser
where
    SqlitePool: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(IntoResponse::into_response)?;

        if let Some(user_id) = session.user_id() {
            let pool = SqlitePool::from_ref(state);
            match users::get_user(&pool, user_id).await {
                Ok(Some(user)) => return Ok(CurrentUser(user)),
                Ok(None) => {
                    debug!("Session user {} no longer exists.", user_id);
                    session.logout();
                }
                Err(err) => return Err(AppError::from(err).into_response()),
            }
        }

        session.error("You are not logged in! Please log in.");
        let next = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let login = format!("/login?next={}", urlencoding::encode(next));
        Err(Redirect::to(&login).into_response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_session_stays_unissued_until_written() {
        let store = SessionStore::default();
        let session = Session::new(store.clone(), None);
        assert_eq!(session.user_id(), None);
        assert!(session.take_notices().is_empty());
        assert!(session.issued_id().is_none());

        session.info("hello");
        let id = session.issued_id().unwrap();
        assert!(store.touch(&id));
    }

    #[test]
    fn test_notices_are_shown_once() {
        let session = Session::new(SessionStore::default(), None);
        session.success("Status successfully created");
        session.error("Cannot delete status because it is in use");

        let notices = session.take_notices();
        assert_eq!(notices.len(), 2);
        assert_eq!(notices[0].level, NoticeLevel::Success);
        assert_eq!(notices[1].message, "Cannot delete status because it is in use");
        assert!(session.take_notices().is_empty());
    }

    #[test]
    fn test_login_rotates_id_and_keeps_notices() {
        let store = SessionStore::default();
        let session = Session::new(store.clone(), None);
        session.info("before login");
        let anonymous_id = session.issued_id().unwrap();

        session.login(7);
        let logged_in_id = session.issued_id().unwrap();
        assert_ne!(anonymous_id, logged_in_id);
        assert!(!store.touch(&anonymous_id));
        assert_eq!(session.user_id(), Some(7));
        assert_eq!(session.take_notices().len(), 1);

        // A second handle on the same cookie sees the same user.
        let same = Session::new(store.clone(), Some(logged_in_id));
        assert_eq!(same.user_id(), Some(7));

        session.logout();
        assert_eq!(session.user_id(), None);
    }

    fn age(store: &SessionStore, id: &str, by: TimeDelta) {
        let mut sessions = store.sessions.write();
        let data = sessions.get_mut(id).unwrap();
        data.last_seen = data.last_seen - by;
    }

    #[test]
    fn test_idle_sessions_expire() {
        let store = SessionStore::default();
        let visitor = Session::new(store.clone(), None);
        visitor.error("You are not logged in! Please log in.");
        let member = Session::new(store.clone(), None);
        member.login(3);
        let member_id = member.issued_id().unwrap();
        assert_eq!(store.sessions.read().len(), 2);

        // Anonymous sessions go first; logged-in ones last for days.
        assert_eq!(store.purge_expired(Utc::now() + TimeDelta::hours(1)), 1);
        assert!(store.touch(&member_id));
        assert_eq!(store.purge_expired(Utc::now() + TimeDelta::days(30)), 1);
        assert!(store.sessions.read().is_empty());
    }

    #[test]
    fn test_expired_cookie_is_unknown() {
        let store = SessionStore::default();
        let session = Session::new(store.clone(), None);
        session.login(5);
        let id = session.issued_id().unwrap();

        age(&store, &id, TimeDelta::days(USER_IDLE_DAYS) + TimeDelta::minutes(1));
        assert!(!store.touch(&id));
        assert!(store.sessions.read().is_empty());
    }

    #[test]
    fn test_cookieless_visitors_do_not_pile_up() {
        let store = SessionStore::default();
        // One anonymous session per cookieless request to a protected page.
        for _ in 0..SWEEP_EVERY - 1 {
            let session = Session::new(store.clone(), None);
            session.error("You are not logged in! Please log in.");
            let id = session.issued_id().unwrap();
            age(&store, &id, TimeDelta::minutes(ANONYMOUS_IDLE_MINUTES + 1));
        }
        assert_eq!(store.sessions.read().len(), SWEEP_EVERY - 1);

        Session::new(store.clone(), None).info("one more");
        assert_eq!(store.sessions.read().len(), 1);
    }

    #[test]
    fn test_cookie_value_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; sessionid=abc123; lang=en"),
        );
        assert_eq!(cookie_value(&headers, SESSION_COOKIE).as_deref(), Some("abc123"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }
}
