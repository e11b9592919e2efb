//! Session management
//!
//! A session outlives its transport connection: on disconnect the history
//! and buffered state stick around for a grace period so the client can
//! reattach after a network blip. At most one live connection per session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tracing::{info, warn};

use echoai_agent::{AgentConfig, ConversationAgent};
use echoai_config::Settings;
use echoai_core::{AudioChunk, Result, SessionState, Turn, Utterance, UtteranceBuffer};
use echoai_providers::{ProviderChains, ResponseCache};

use crate::ServerError;

/// One conversation session.
pub struct Session {
    pub id: String,
    pub agent: Arc<ConversationAgent>,
    pub created_at: Instant,
    state: RwLock<SessionState>,
    buffer: Mutex<UtteranceBuffer>,
    last_activity: RwLock<Instant>,
    disconnected_at: RwLock<Option<Instant>>,
    connected: AtomicBool,
    cancel_tx: watch::Sender<bool>,
}

impl Session {
    fn new(id: String, agent: Arc<ConversationAgent>) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            id,
            agent,
            created_at: Instant::now(),
            state: RwLock::new(SessionState::Connecting),
            buffer: Mutex::new(UtteranceBuffer::new()),
            last_activity: RwLock::new(Instant::now()),
            disconnected_at: RwLock::new(None),
            connected: AtomicBool::new(false),
            cancel_tx,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Transition, enforcing the lifecycle graph. Illegal transitions are
    /// logged and dropped rather than applied.
    pub fn set_state(&self, target: SessionState) {
        let mut state = self.state.write();
        if state.can_transition_to(target) {
            *state = target;
        } else if *state != target {
            warn!(
                session_id = %self.id,
                from = %*state,
                to = %target,
                "ignoring illegal session state transition"
            );
        }
    }

    pub fn touch(&self) {
        *self.last_activity.write() = Instant::now();
    }

    /// Append one inbound audio chunk. A sequence gap is a protocol error
    /// that the transport treats as fatal to the connection.
    pub fn push_chunk(&self, chunk: &AudioChunk) -> Result<()> {
        self.buffer.lock().push(chunk)
    }

    /// Finalize the utterance being captured.
    pub fn take_utterance(&self) -> Utterance {
        self.buffer.lock().take()
    }

    pub fn expected_seq(&self) -> u64 {
        self.buffer.lock().expected_seq()
    }

    /// Attach a transport connection. A session accepts one connection at
    /// a time; reattaching after a disconnect resets both directions'
    /// sequence numbering and discards any partially captured utterance.
    pub fn attach(&self) -> std::result::Result<(), ServerError> {
        if self.connected.swap(true, Ordering::SeqCst) {
            return Err(ServerError::ConnectionConflict);
        }
        let was_disconnected = self.disconnected_at.write().take().is_some();
        if was_disconnected {
            self.buffer.lock().reset();
            self.agent.reset_outbound_seq();
            info!(session_id = %self.id, "client reattached, sequence numbering reset");
        }
        self.set_state(SessionState::Active);
        self.touch();
        Ok(())
    }

    /// Detach the transport. The session enters its grace period.
    pub fn detach(&self) {
        self.connected.store(false, Ordering::SeqCst);
        *self.disconnected_at.write() = Some(Instant::now());
        self.touch();
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn is_idle_expired(&self, idle_timeout: Duration) -> bool {
        self.last_activity.read().elapsed() > idle_timeout
    }

    /// True once a disconnected session has outlived its grace period.
    pub fn is_grace_expired(&self, grace_period: Duration) -> bool {
        !self.is_connected()
            && self
                .disconnected_at
                .read()
                .map(|t| t.elapsed() > grace_period)
                .unwrap_or(false)
    }

    /// Cancel any in-flight turn and mark the session closed.
    pub fn close(&self) {
        self.set_state(SessionState::Closing);
        let _ = self.cancel_tx.send(true);
        self.set_state(SessionState::Closed);
    }

    /// Receiver observed by the agent between pipeline phases.
    pub fn cancel_handle(&self) -> watch::Receiver<bool> {
        self.cancel_tx.subscribe()
    }

    pub fn history(&self) -> Vec<Turn> {
        self.agent.history_snapshot()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Registry of live sessions, capacity-bounded.
pub struct SessionManager {
    sessions: DashMap<String, Arc<Session>>,
    chains: Arc<ProviderChains>,
    cache: Arc<ResponseCache>,
    agent_config: AgentConfig,
    max_sessions: usize,
    idle_timeout: Duration,
    grace_period: Duration,
    cleanup_interval: Duration,
}

impl SessionManager {
    pub fn new(settings: &Settings, chains: Arc<ProviderChains>) -> Self {
        Self {
            sessions: DashMap::new(),
            chains,
            cache: Arc::new(ResponseCache::new(settings.cache.capacity)),
            agent_config: AgentConfig::from_settings(settings),
            max_sessions: settings.server.max_sessions,
            idle_timeout: Duration::from_secs(settings.session.idle_timeout_secs),
            grace_period: Duration::from_secs(settings.session.grace_period_secs),
            cleanup_interval: Duration::from_secs(settings.session.cleanup_interval_secs),
        }
    }

    /// Create a session with a fresh id.
    pub fn create(&self) -> std::result::Result<Arc<Session>, ServerError> {
        self.create_with_id(uuid::Uuid::new_v4().to_string())
    }

    /// Create a session under a caller-supplied id. Used when a client
    /// opens a socket with an id the server no longer knows.
    pub fn create_with_id(
        &self,
        id: String,
    ) -> std::result::Result<Arc<Session>, ServerError> {
        if id.is_empty() || id.len() > 128 {
            return Err(ServerError::InvalidRequest("invalid session id".to_string()));
        }

        if self.sessions.len() >= self.max_sessions {
            // A full registry may just be carrying dead weight.
            self.cleanup_expired();
            if self.sessions.len() >= self.max_sessions {
                metrics::counter!("echoai_sessions_rejected_total").increment(1);
                return Err(ServerError::Capacity);
            }
        }

        let agent = Arc::new(ConversationAgent::new(
            id.clone(),
            self.agent_config.clone(),
            Arc::clone(&self.chains),
            Arc::clone(&self.cache),
        ));
        let session = Arc::new(Session::new(id.clone(), agent));
        self.sessions.insert(id.clone(), Arc::clone(&session));
        metrics::gauge!("echoai_sessions_active").set(self.sessions.len() as f64);
        info!(session_id = %id, total = self.sessions.len(), "session created");
        Ok(session)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Keyed chunk ingestion for callers that do not hold the session.
    /// The transport path holds an `Arc<Session>` and appends directly.
    pub fn append_audio(&self, id: &str, chunk: &AudioChunk) -> Result<()> {
        let session = self
            .get(id)
            .ok_or_else(|| echoai_core::Error::UnknownSession(id.to_string()))?;
        session.touch();
        session.push_chunk(chunk)
    }

    /// Remove and close a session, cancelling any in-flight turn.
    pub fn remove(&self, id: &str) -> bool {
        match self.sessions.remove(id) {
            Some((_, session)) => {
                session.close();
                metrics::gauge!("echoai_sessions_active").set(self.sessions.len() as f64);
                info!(session_id = %id, "session removed");
                true
            }
            None => false,
        }
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    pub fn has_capacity(&self) -> bool {
        self.sessions.len() < self.max_sessions
    }

    pub fn list(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    /// Drop sessions that have been idle past the idle timeout or
    /// disconnected past the grace period.
    pub fn cleanup_expired(&self) {
        let idle = self.idle_timeout;
        let grace = self.grace_period;
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|e| e.value().is_idle_expired(idle) || e.value().is_grace_expired(grace))
            .map(|e| e.key().clone())
            .collect();

        for id in expired {
            if let Some((_, session)) = self.sessions.remove(&id) {
                session.close();
                metrics::counter!("echoai_sessions_expired_total").increment(1);
                info!(session_id = %id, "session expired");
            }
        }
        metrics::gauge!("echoai_sessions_active").set(self.sessions.len() as f64);
    }

    /// Periodic cleanup task. Returns the shutdown sender.
    pub fn start_cleanup_task(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let manager = Arc::clone(self);
        let interval = manager.cleanup_interval;

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        let before = manager.count();
                        manager.cleanup_expired();
                        let after = manager.count();
                        if before != after {
                            info!(removed = before - after, remaining = after, "session cleanup pass");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("session cleanup task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    use echoai_core::Capability;
    use echoai_providers::FallbackChain;

    fn empty_chains() -> Arc<ProviderChains> {
        let timeout = StdDuration::from_secs(1);
        Arc::new(ProviderChains {
            stt: FallbackChain::new(Capability::Stt, timeout),
            llm: FallbackChain::new(Capability::Llm, timeout),
            tts: FallbackChain::new(Capability::Tts, timeout),
            retriever: None,
        })
    }

    fn manager(max_sessions: usize) -> Arc<SessionManager> {
        let mut settings = Settings::default();
        settings.server.max_sessions = max_sessions;
        Arc::new(SessionManager::new(&settings, empty_chains()))
    }

    #[test]
    fn create_get_remove() {
        let manager = manager(4);
        let session = manager.create().unwrap();
        assert_eq!(session.state(), SessionState::Connecting);

        let found = manager.get(&session.id).unwrap();
        assert_eq!(found.id, session.id);

        assert!(manager.remove(&session.id));
        assert!(manager.get(&session.id).is_none());
        assert_eq!(found.state(), SessionState::Closed);
    }

    #[test]
    fn capacity_rejects_when_full() {
        let manager = manager(2);
        manager.create().unwrap();
        manager.create().unwrap();

        let err = manager.create().unwrap_err();
        assert!(matches!(err, ServerError::Capacity));
    }

    #[test]
    fn single_connection_per_session() {
        let manager = manager(4);
        let session = manager.create().unwrap();

        session.attach().unwrap();
        let err = session.attach().unwrap_err();
        assert!(matches!(err, ServerError::ConnectionConflict));
    }

    #[test]
    fn reattach_resets_sequencing() {
        let manager = manager(4);
        let session = manager.create().unwrap();
        session.attach().unwrap();

        session
            .push_chunk(&AudioChunk::new(0, vec![1, 2], false))
            .unwrap();
        session
            .push_chunk(&AudioChunk::new(1, vec![3], false))
            .unwrap();
        assert_eq!(session.expected_seq(), 2);

        session.detach();
        session.attach().unwrap();

        // Both the buffer and the client restart at zero
        assert_eq!(session.expected_seq(), 0);
        session
            .push_chunk(&AudioChunk::new(0, vec![9], false))
            .unwrap();
    }

    #[test]
    fn grace_expiry_evicts_and_reconnect_gets_fresh_session() {
        let mut settings = Settings::default();
        settings.server.max_sessions = 4;
        settings.session.grace_period_secs = 0;
        let manager = Arc::new(SessionManager::new(&settings, empty_chains()));

        let session = manager.create().unwrap();
        let id = session.id.clone();
        session.attach().unwrap();
        session.detach();

        std::thread::sleep(StdDuration::from_millis(20));
        manager.cleanup_expired();

        assert!(manager.get(&id).is_none());
        assert_eq!(session.state(), SessionState::Closed);

        // Reconnecting past the grace period starts over under the same id
        let fresh = manager.create_with_id(id).unwrap();
        assert!(!Arc::ptr_eq(&fresh, &session));
        assert_eq!(fresh.agent.turn_count(), 0);
        fresh.attach().unwrap();
    }

    #[test]
    fn append_audio_requires_known_session() {
        let manager = manager(4);
        let session = manager.create().unwrap();

        manager
            .append_audio(&session.id, &AudioChunk::new(0, vec![1], false))
            .unwrap();

        let err = manager
            .append_audio("no-such-session", &AudioChunk::new(0, vec![1], false))
            .unwrap_err();
        assert!(matches!(err, echoai_core::Error::UnknownSession(_)));
    }

    #[test]
    fn out_of_order_chunk_rejected() {
        let manager = manager(4);
        let session = manager.create().unwrap();
        session.attach().unwrap();

        session
            .push_chunk(&AudioChunk::new(0, vec![1], false))
            .unwrap();
        assert!(session
            .push_chunk(&AudioChunk::new(5, vec![2], false))
            .is_err());
    }
}
