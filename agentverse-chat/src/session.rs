//! Per-browser chat sessions, keyed by an opaque cookie.
//!
//! Sessions live in process memory only. An idle session expires after the
//! configured TTL and is purged lazily on the next access to the store.

use std::collections::HashMap;
use std::sync::Arc;

use agentverse_core::{ChatMessage, UserProfile};
use axum::http::HeaderMap;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "agentverse_sid";

/// `state`/`nonce` pair issued by `/login`, consumed by the callback.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingLogin {
    pub state: String,
    pub nonce: String,
}

impl PendingLogin {
    pub fn generate() -> Self {
        Self {
            state: Uuid::new_v4().simple().to_string(),
            nonce: Uuid::new_v4().simple().to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatSession {
    pub user: Option<UserProfile>,
    pub transcript: Vec<ChatMessage>,
    pub pending_login: Option<PendingLogin>,
    /// One-shot error shown on the next page render.
    pub flash: Option<String>,
    last_seen: DateTime<Utc>,
}

impl ChatSession {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            user: None,
            transcript: Vec::new(),
            pending_login: None,
            flash: None,
            last_seen: now,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, ChatSession>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    pub fn from_minutes(minutes: i64) -> Self {
        Self::new(Duration::minutes(minutes.max(1)))
    }

    /// Return the live session for `id`, or start a fresh one.
    pub async fn resolve(&self, id: Option<Uuid>) -> Uuid {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let ttl = self.ttl;
        sessions.retain(|_, s| now - s.last_seen < ttl);

        if let Some(id) = id {
            if let Some(session) = sessions.get_mut(&id) {
                session.last_seen = now;
                return id;
            }
        }

        let id = Uuid::new_v4();
        sessions.insert(id, ChatSession::new(now));
        tracing::debug!(session = %id, active = sessions.len(), "Started chat session");
        id
    }

    /// Run `f` against the session under the write lock.
    pub async fn update<R>(&self, id: Uuid, f: impl FnOnce(&mut ChatSession) -> R) -> Option<R> {
        let mut sessions = self.sessions.write().await;
        sessions.get_mut(&id).map(f)
    }

    pub async fn snapshot(&self, id: Uuid) -> Option<ChatSession> {
        self.sessions.read().await.get(&id).cloned()
    }

    pub async fn remove(&self, id: Uuid) {
        self.sessions.write().await.remove(&id);
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

// ============================================================================
// Cookie helpers
// ============================================================================

pub fn session_id_from(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get_all(axum::http::header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value).ok())
}

pub fn session_cookie(id: Uuid) -> String {
    format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, id)
}
