//! Where live sessions are kept between requests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use super::live::{LiveConfig, LiveConnection};
use crate::error::VendorError;
use crate::models::Focus;

/// Lifecycle of a live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Just opened, no turn yet.
    Connected,
    /// Waiting for the next audio frame.
    Idle,
    /// A turn is in progress.
    Streaming,
    Closed,
}

#[derive(Debug, Clone, Copy)]
struct Activity {
    state: SessionState,
    last_activity: DateTime<Utc>,
}

/// An open live session.
///
/// The connection sits behind an async mutex held for a whole turn, so turns
/// on one session run one at a time. Activity is tracked under a separate
/// lock and can be read while a turn is running.
pub struct LiveSession {
    id: String,
    focus: Focus,
    config: LiveConfig,
    created_at: DateTime<Utc>,
    activity: Mutex<Activity>,
    pub(crate) connection: tokio::sync::Mutex<Box<dyn LiveConnection>>,
}

impl LiveSession {
    pub fn new(
        id: impl Into<String>,
        focus: Focus,
        config: LiveConfig,
        connection: Box<dyn LiveConnection>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            focus,
            config,
            created_at: now,
            activity: Mutex::new(Activity {
                state: SessionState::Connected,
                last_activity: now,
            }),
            connection: tokio::sync::Mutex::new(connection),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub const fn focus(&self) -> Focus {
        self.focus
    }

    pub const fn config(&self) -> &LiveConfig {
        &self.config
    }

    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn activity(&self) -> MutexGuard<'_, Activity> {
        self.activity.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> SessionState {
        self.activity().state
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.activity().last_activity
    }

    /// Record activity now and move to `state`. A closed session stays closed.
    pub fn touch(&self, state: SessionState) {
        let mut activity = self.activity();
        if activity.state != SessionState::Closed {
            activity.state = state;
        }
        activity.last_activity = Utc::now();
    }

    #[cfg(test)]
    pub(crate) fn set_last_activity(&self, at: DateTime<Utc>) {
        self.activity().last_activity = at;
    }

    /// Close the vendor connection. Safe to call more than once.
    pub async fn close(&self) -> Result<(), VendorError> {
        if self.state() == SessionState::Closed {
            return Ok(());
        }
        let mut connection = self.connection.lock().await;
        self.activity().state = SessionState::Closed;
        connection.close().await
    }
}

/// Storage for live sessions, keyed by session id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, id: &str) -> Option<Arc<LiveSession>>;

    /// Insert a session, returning the one it replaced.
    async fn put(&self, session: Arc<LiveSession>) -> Option<Arc<LiveSession>>;

    async fn delete(&self, id: &str) -> Option<Arc<LiveSession>>;

    /// Remove `id` only while it still maps to `session`. Returns whether it did.
    async fn delete_if(&self, id: &str, session: &Arc<LiveSession>) -> bool;

    /// Remove and return every session whose last activity is before `cutoff`.
    async fn sweep(&self, cutoff: DateTime<Utc>) -> Vec<Arc<LiveSession>>;

    async fn count(&self) -> usize;
}

/// In-process session table.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Arc<LiveSession>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, id: &str) -> Option<Arc<LiveSession>> {
        self.sessions.read().await.get(id).cloned()
    }

    async fn put(&self, session: Arc<LiveSession>) -> Option<Arc<LiveSession>> {
        self.sessions
            .write()
            .await
            .insert(session.id().to_string(), session)
    }

    async fn delete(&self, id: &str) -> Option<Arc<LiveSession>> {
        self.sessions.write().await.remove(id)
    }

    async fn delete_if(&self, id: &str, session: &Arc<LiveSession>) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get(id) {
            Some(current) if Arc::ptr_eq(current, session) => {
                sessions.remove(id);
                true
            }
            _ => false,
        }
    }

    async fn sweep(&self, cutoff: DateTime<Utc>) -> Vec<Arc<LiveSession>> {
        let mut sessions = self.sessions.write().await;
        let expired: Vec<String> = sessions
            .values()
            .filter(|s| s.last_activity() < cutoff)
            .map(|s| s.id().to_string())
            .collect();
        expired
            .iter()
            .filter_map(|id| sessions.remove(id))
            .collect()
    }

    async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::live::{AudioFrame, LiveEvent};
    use chrono::Duration;

    struct NullConnection;

    #[async_trait]
    impl LiveConnection for NullConnection {
        async fn send_audio(&mut self, _frame: &AudioFrame) -> Result<(), VendorError> {
            Ok(())
        }

        async fn next_event(&mut self) -> Result<Option<LiveEvent>, VendorError> {
            Ok(None)
        }

        async fn close(&mut self) -> Result<(), VendorError> {
            Ok(())
        }
    }

    fn session(id: &str) -> Arc<LiveSession> {
        Arc::new(LiveSession::new(
            id,
            Focus::All,
            LiveConfig::for_focus(Focus::All),
            Box::new(NullConnection),
        ))
    }

    #[tokio::test]
    async fn put_replaces_and_returns_previous() {
        let store = MemorySessionStore::new();
        assert!(store.put(session("a")).await.is_none());
        let replaced = store.put(session("a")).await;
        assert_eq!(replaced.map(|s| s.id().to_string()), Some("a".to_string()));
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn sweep_only_takes_stale_sessions() {
        let store = MemorySessionStore::new();
        let stale = session("stale");
        stale.set_last_activity(Utc::now() - Duration::hours(1));
        store.put(stale).await;
        store.put(session("fresh")).await;

        let removed = store.sweep(Utc::now() - Duration::minutes(30)).await;

        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id(), "stale");
        assert!(store.get("fresh").await.is_some());
        assert!(store.get("stale").await.is_none());
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let s = session("x");
        s.close().await.unwrap();
        s.close().await.unwrap();
        assert_eq!(s.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn delete_if_leaves_a_replacement_alone() {
        let store = MemorySessionStore::new();
        let first = session("a");
        store.put(Arc::clone(&first)).await;
        let second = session("a");
        store.put(Arc::clone(&second)).await;

        assert!(!store.delete_if("a", &first).await);
        assert!(Arc::ptr_eq(&store.get("a").await.unwrap(), &second));

        assert!(store.delete_if("a", &second).await);
        assert!(store.get("a").await.is_none());
    }

    #[tokio::test]
    async fn touch_does_not_reopen_a_closed_session() {
        let s = session("x");
        s.close().await.unwrap();
        s.touch(SessionState::Idle);
        assert_eq!(s.state(), SessionState::Closed);
    }
}
