//! Realtime voice sessions.
//!
//! The manager opens live vendor connections, runs one request/response
//! turn per audio frame and closes sessions that have gone quiet.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::live::{AudioFrame, LiveConfig, LiveEvent, LiveVendor, Modality};
use super::store::{LiveSession, SessionState, SessionStore};
use crate::error::{CompanionError, Result};
use crate::models::Focus;
use crate::vendor::Vendor;

const OPERATION: &str = "start a live session";
const CREDENTIALS_HINT: &str = "GEMINI_API_KEY";
const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// What the vendor said during one turn.
///
/// When a kind arrives more than once the last one is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnReply {
    /// Base64 audio.
    pub audio_response: Option<String>,
    pub text_response: Option<String>,
}

/// Snapshot of a session for status queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub session_id: String,
    pub focus: Focus,
    pub modality: Modality,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl SessionStatus {
    fn of(session: &LiveSession) -> Self {
        Self {
            session_id: session.id().to_string(),
            focus: session.focus(),
            modality: session.config().modality,
            state: session.state(),
            created_at: session.created_at(),
            last_activity: session.last_activity(),
        }
    }
}

/// How a turn's event loop ended.
enum TurnEnd {
    Complete,
    StreamClosed,
    Failed,
}

pub struct RealtimeManager {
    vendor: Option<Arc<dyn LiveVendor>>,
    store: Arc<dyn SessionStore>,
    idle_timeout: Duration,
    turn_timeout: Duration,
}

impl RealtimeManager {
    /// Without a vendor every `connect` fails with a configuration error.
    pub fn new(
        vendor: Option<Arc<dyn LiveVendor>>,
        store: Arc<dyn SessionStore>,
        idle_timeout: Duration,
        turn_timeout: Duration,
    ) -> Self {
        Self {
            vendor,
            store,
            idle_timeout,
            turn_timeout,
        }
    }

    pub fn vendor_name(&self) -> Option<&'static str> {
        self.vendor.as_ref().map(|v| v.name())
    }

    /// Open a live session and return its id.
    ///
    /// A blank or absent `requested_id` gets a fresh `session_<uuid>` id. An
    /// existing session under the same id is replaced and its connection
    /// closed.
    pub async fn connect(&self, focus: Focus, requested_id: Option<String>) -> Result<String> {
        let vendor = self.vendor.as_ref().ok_or(CompanionError::Configuration {
            operation: OPERATION,
            hint: CREDENTIALS_HINT,
        })?;

        let config = LiveConfig::for_focus(focus);
        let connection = vendor.connect(&config).await?;

        let id = requested_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("session_{}", Uuid::now_v7().simple()));

        let session = Arc::new(LiveSession::new(id.clone(), focus, config, connection));
        if let Some(previous) = self.store.put(session).await {
            tracing::info!(session_id = %id, "replacing existing live session");
            if let Err(error) = previous.close().await {
                tracing::warn!(session_id = %id, %error, "failed to close replaced session");
            }
        }

        tracing::info!(session_id = %id, %focus, vendor = vendor.name(), "live session connected");
        Ok(id)
    }

    /// Send one audio frame and collect the vendor's reply.
    ///
    /// Events are read until the turn completes, the stream ends, an error
    /// occurs or the turn timeout passes. Whatever arrived before that is
    /// returned.
    pub async fn send_audio(&self, id: &str, frame: AudioFrame) -> Result<TurnReply> {
        let session = self
            .store
            .get(id)
            .await
            .ok_or_else(|| CompanionError::SessionNotFound(id.to_string()))?;

        session.touch(SessionState::Streaming);
        let mut connection = session.connection.lock().await;

        if let Err(error) = connection.send_audio(&frame).await {
            drop(connection);
            session.touch(SessionState::Idle);
            return Err(error.into());
        }

        let mut reply = TurnReply::default();
        let drain = async {
            loop {
                match connection.next_event().await {
                    Ok(Some(LiveEvent::Audio { data, mime })) => {
                        tracing::trace!(
                            session_id = %id,
                            %mime,
                            len = data.len(),
                            "live audio chunk"
                        );
                        reply.audio_response = Some(data);
                    }
                    Ok(Some(LiveEvent::Text(text))) => reply.text_response = Some(text),
                    Ok(Some(LiveEvent::TurnComplete)) => break TurnEnd::Complete,
                    Ok(None) => break TurnEnd::StreamClosed,
                    Err(error) => {
                        tracing::warn!(session_id = %id, %error, "live turn failed");
                        break TurnEnd::Failed;
                    }
                }
            }
        };
        let end = tokio::time::timeout(self.turn_timeout, drain).await;
        drop(connection);

        match end {
            Ok(TurnEnd::StreamClosed) => {
                tracing::info!(session_id = %id, "live vendor closed the session");
                session.touch(SessionState::Closed);
                if !self.store.delete_if(id, &session).await {
                    tracing::debug!(session_id = %id, "session was replaced during the turn");
                }
            }
            Ok(TurnEnd::Complete | TurnEnd::Failed) => session.touch(SessionState::Idle),
            Err(_) => {
                tracing::warn!(
                    session_id = %id,
                    timeout = ?self.turn_timeout,
                    "live turn timed out"
                );
                session.touch(SessionState::Idle);
            }
        }

        Ok(reply)
    }

    /// Close and forget a session. Unknown ids are ignored.
    pub async fn disconnect(&self, id: &str) -> Result<()> {
        let Some(session) = self.store.delete(id).await else {
            tracing::debug!(session_id = %id, "disconnect for unknown session");
            return Ok(());
        };

        if let Err(error) = session.close().await {
            tracing::warn!(session_id = %id, %error, "error closing live connection");
        }
        tracing::info!(session_id = %id, "live session disconnected");
        Ok(())
    }

    pub async fn status(&self, id: &str) -> Option<SessionStatus> {
        self.store.get(id).await.map(|s| SessionStatus::of(&s))
    }

    pub async fn session_count(&self) -> usize {
        self.store.count().await
    }

    /// Close every session idle for longer than the idle timeout, as of `now`.
    pub async fn reap_idle(&self, now: DateTime<Utc>) -> usize {
        let idle = TimeDelta::from_std(self.idle_timeout).unwrap_or(TimeDelta::MAX);
        let cutoff = now.checked_sub_signed(idle).unwrap_or(DateTime::<Utc>::MIN_UTC);

        let expired = self.store.sweep(cutoff).await;
        for session in &expired {
            if let Err(error) = session.close().await {
                tracing::warn!(
                    session_id = %session.id(),
                    %error,
                    "error closing idle session"
                );
            }
            tracing::info!(session_id = %session.id(), "closed idle live session");
        }
        expired.len()
    }

    /// Sweep idle sessions every `interval` until the task is aborted.
    ///
    /// Intervals shorter than one second are raised to one second.
    pub fn spawn_reaper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        if interval < MIN_SWEEP_INTERVAL {
            tracing::warn!(?interval, "sweep interval too short, using one second");
        }
        let interval = interval.max(MIN_SWEEP_INTERVAL);
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let reaped = manager.reap_idle(Utc::now()).await;
                if reaped > 0 {
                    tracing::debug!(reaped, "idle sweep finished");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VendorError;
    use crate::realtime::live::LiveConnection;
    use crate::realtime::store::MemorySessionStore;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Notify;

    type Script = VecDeque<Result<Option<LiveEvent>, VendorError>>;

    /// What a scripted connection does once its events run out.
    #[derive(Default)]
    enum Ending {
        /// The stream ends.
        #[default]
        Close,
        /// Nothing more ever arrives.
        Hang,
        /// The stream ends once the gate is notified.
        Gate(Arc<Notify>),
    }

    /// Connection that plays back a script, then follows its `Ending`.
    struct ScriptedConnection {
        events: Script,
        ending: Ending,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl LiveConnection for ScriptedConnection {
        async fn send_audio(
            &mut self,
            _frame: &AudioFrame,
        ) -> std::result::Result<(), VendorError> {
            Ok(())
        }

        async fn next_event(&mut self) -> std::result::Result<Option<LiveEvent>, VendorError> {
            if let Some(event) = self.events.pop_front() {
                return event;
            }
            match &self.ending {
                Ending::Close => Ok(None),
                Ending::Hang => std::future::pending().await,
                Ending::Gate(gate) => {
                    gate.notified().await;
                    Ok(None)
                }
            }
        }

        async fn close(&mut self) -> std::result::Result<(), VendorError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Vendor that hands out one scripted connection per connect call.
    #[derive(Default)]
    struct FakeLive {
        scripts: Mutex<VecDeque<(Script, Ending)>>,
        closed_flags: Mutex<Vec<Arc<AtomicBool>>>,
        connects: AtomicUsize,
    }

    impl FakeLive {
        fn script(self: &Arc<Self>, events: Vec<LiveEvent>, ending: Ending) -> Arc<Self> {
            let script = events.into_iter().map(|e| Ok(Some(e))).collect();
            self.scripts.lock().unwrap().push_back((script, ending));
            Arc::clone(self)
        }

        fn closed(&self, index: usize) -> bool {
            self.closed_flags.lock().unwrap()[index].load(Ordering::SeqCst)
        }
    }

    impl Vendor for FakeLive {
        fn name(&self) -> &'static str {
            "fake-live"
        }
    }

    #[async_trait]
    impl LiveVendor for FakeLive {
        async fn connect(
            &self,
            _config: &LiveConfig,
        ) -> std::result::Result<Box<dyn LiveConnection>, VendorError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let (events, ending) = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_default();
            let closed = Arc::new(AtomicBool::new(false));
            self.closed_flags.lock().unwrap().push(Arc::clone(&closed));
            Ok(Box::new(ScriptedConnection {
                events,
                ending,
                closed,
            }))
        }
    }

    fn manager(vendor: &Arc<FakeLive>) -> RealtimeManager {
        RealtimeManager::new(
            Some(Arc::clone(vendor) as Arc<dyn LiveVendor>),
            Arc::new(MemorySessionStore::new()),
            Duration::from_secs(30 * 60),
            Duration::from_millis(200),
        )
    }

    fn audio(data: &str) -> LiveEvent {
        LiveEvent::Audio {
            data: data.into(),
            mime: "audio/pcm;rate=24000".into(),
        }
    }

    #[tokio::test]
    async fn connect_generates_prefixed_id() {
        let vendor = Arc::new(FakeLive::default());
        let manager = manager(&vendor);

        let id = manager.connect(Focus::Emotion, None).await.unwrap();

        assert!(id.starts_with("session_"));
        let status = manager.status(&id).await.unwrap();
        assert_eq!(status.focus, Focus::Emotion);
        assert_eq!(status.state, SessionState::Connected);
    }

    #[tokio::test]
    async fn connect_without_vendor_is_configuration_error() {
        let manager = RealtimeManager::new(
            None,
            Arc::new(MemorySessionStore::new()),
            Duration::from_secs(60),
            Duration::from_secs(1),
        );
        let err = manager.connect(Focus::All, None).await.unwrap_err();
        assert!(matches!(err, CompanionError::Configuration { .. }));
    }

    #[tokio::test]
    async fn unknown_session_is_not_found_and_table_untouched() {
        let vendor = Arc::new(FakeLive::default());
        let manager = manager(&vendor);
        manager.connect(Focus::All, Some("known".into())).await.unwrap();

        let err = manager
            .send_audio("missing", AudioFrame::pcm16k("AAAA"))
            .await
            .unwrap_err();

        assert!(matches!(err, CompanionError::SessionNotFound(id) if id == "missing"));
        assert_eq!(manager.session_count().await, 1);
    }

    #[tokio::test]
    async fn text_only_turn_leaves_audio_empty() {
        let vendor = Arc::new(FakeLive::default()).script(
            vec![LiveEvent::Text("嗯，我在听".into()), LiveEvent::TurnComplete],
            Ending::Close,
        );
        let manager = manager(&vendor);
        let id = manager.connect(Focus::All, None).await.unwrap();

        let reply = manager.send_audio(&id, AudioFrame::pcm16k("AAAA")).await.unwrap();

        assert_eq!(reply.audio_response, None);
        assert_eq!(reply.text_response.as_deref(), Some("嗯，我在听"));
        assert_eq!(manager.status(&id).await.unwrap().state, SessionState::Idle);
    }

    #[tokio::test]
    async fn last_write_wins_per_kind() {
        let vendor = Arc::new(FakeLive::default()).script(
            vec![
                audio("first"),
                LiveEvent::Text("a".into()),
                audio("second"),
                LiveEvent::TurnComplete,
                audio("next-turn"),
            ],
            Ending::Close,
        );
        let manager = manager(&vendor);
        let id = manager.connect(Focus::All, None).await.unwrap();

        let reply = manager.send_audio(&id, AudioFrame::pcm16k("AAAA")).await.unwrap();

        assert_eq!(reply.audio_response.as_deref(), Some("second"));
        assert_eq!(reply.text_response.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn turn_timeout_returns_partial_reply() {
        let vendor = Arc::new(FakeLive::default()).script(vec![audio("partial")], Ending::Hang);
        let manager = manager(&vendor);
        let id = manager.connect(Focus::All, None).await.unwrap();

        let reply = manager.send_audio(&id, AudioFrame::pcm16k("AAAA")).await.unwrap();

        assert_eq!(reply.audio_response.as_deref(), Some("partial"));
        assert!(manager.status(&id).await.is_some());
    }

    #[tokio::test]
    async fn closed_stream_drops_session() {
        let vendor = Arc::new(FakeLive::default())
            .script(vec![LiveEvent::Text("bye".into())], Ending::Close);
        let manager = manager(&vendor);
        let id = manager.connect(Focus::All, None).await.unwrap();

        let reply = manager.send_audio(&id, AudioFrame::pcm16k("AAAA")).await.unwrap();

        assert_eq!(reply.text_response.as_deref(), Some("bye"));
        assert!(manager.status(&id).await.is_none());
    }

    #[tokio::test]
    async fn reconnect_with_same_id_closes_previous() {
        let vendor = Arc::new(FakeLive::default());
        let manager = manager(&vendor);

        manager.connect(Focus::Event, Some("s1".into())).await.unwrap();
        manager.connect(Focus::Growth, Some("s1".into())).await.unwrap();

        assert!(vendor.closed(0));
        assert!(!vendor.closed(1));
        assert_eq!(manager.session_count().await, 1);
        assert_eq!(manager.status("s1").await.unwrap().focus, Focus::Growth);
    }

    #[tokio::test]
    async fn stream_closing_after_reconnect_keeps_the_new_session() {
        let gate = Arc::new(Notify::new());
        let vendor = Arc::new(FakeLive::default()).script(vec![], Ending::Gate(Arc::clone(&gate)));
        let manager = Arc::new(RealtimeManager::new(
            Some(Arc::clone(&vendor) as Arc<dyn LiveVendor>),
            Arc::new(MemorySessionStore::new()),
            Duration::from_secs(30 * 60),
            Duration::from_secs(5),
        ));
        manager.connect(Focus::Event, Some("s1".into())).await.unwrap();

        let turn = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                manager
                    .send_audio("s1", AudioFrame::pcm16k("AAAA"))
                    .await
            })
        };
        tokio::time::timeout(Duration::from_secs(2), async {
            while manager.status("s1").await.map(|s| s.state) != Some(SessionState::Streaming) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        let reconnect = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.connect(Focus::Growth, Some("s1".into())).await })
        };
        tokio::time::timeout(Duration::from_secs(2), async {
            while manager.status("s1").await.map(|s| s.focus) != Some(Focus::Growth) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        // The old vendor stream ends after the replacement is stored.
        gate.notify_one();
        turn.await.unwrap().unwrap();
        reconnect.await.unwrap().unwrap();

        let status = manager.status("s1").await.unwrap();
        assert_eq!(status.focus, Focus::Growth);
        assert_eq!(status.state, SessionState::Connected);
        assert!(!vendor.closed(1));
        assert_eq!(manager.session_count().await, 1);
    }

    #[tokio::test]
    async fn disconnect_closes_and_ignores_unknown() {
        let vendor = Arc::new(FakeLive::default());
        let manager = manager(&vendor);
        let id = manager.connect(Focus::All, None).await.unwrap();

        manager.disconnect("nope").await.unwrap();
        assert_eq!(manager.session_count().await, 1);

        manager.disconnect(&id).await.unwrap();
        assert!(vendor.closed(0));
        assert_eq!(manager.session_count().await, 0);
    }

    #[tokio::test]
    async fn reap_closes_only_idle_sessions() {
        let vendor = Arc::new(FakeLive::default());
        let manager = manager(&vendor);
        let stale = manager.connect(Focus::All, Some("stale".into())).await.unwrap();
        let fresh = manager.connect(Focus::All, Some("fresh".into())).await.unwrap();

        let now = Utc::now();
        manager
            .store
            .get(&stale)
            .await
            .unwrap()
            .set_last_activity(now - TimeDelta::minutes(31));

        assert_eq!(manager.reap_idle(now).await, 1);
        assert!(vendor.closed(0));
        assert!(!vendor.closed(1));
        assert!(manager.status(&stale).await.is_none());
        assert!(manager.status(&fresh).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn reaper_closes_idle_sessions_on_each_interval() {
        let vendor = Arc::new(FakeLive::default());
        let manager = Arc::new(manager(&vendor));
        let id = manager.connect(Focus::All, None).await.unwrap();
        manager
            .store
            .get(&id)
            .await
            .unwrap()
            .set_last_activity(Utc::now() - TimeDelta::minutes(31));

        let reaper = manager.spawn_reaper(Duration::from_secs(300));

        tokio::time::sleep(Duration::from_secs(299)).await;
        assert_eq!(manager.session_count().await, 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(manager.session_count().await, 0);
        assert!(vendor.closed(0));

        reaper.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn zero_sweep_interval_keeps_the_reaper_running() {
        let vendor = Arc::new(FakeLive::default());
        let manager = Arc::new(manager(&vendor));
        let id = manager.connect(Focus::All, None).await.unwrap();
        manager
            .store
            .get(&id)
            .await
            .unwrap()
            .set_last_activity(Utc::now() - TimeDelta::minutes(31));

        let reaper = manager.spawn_reaper(Duration::ZERO);
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(!reaper.is_finished());
        assert_eq!(manager.session_count().await, 0);
        reaper.abort();
    }
}
