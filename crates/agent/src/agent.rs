//! Turn pipeline
//!
//! `ConversationAgent` drives one turn at a time for one session:
//! transcribe, retrieve, generate, synthesize, stream. Events go out over
//! a bounded channel; when the transport cannot drain fast enough the
//! pipeline suspends at the send rather than buffering unboundedly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

use echoai_config::Settings;
use echoai_core::{
    AudioHandle, Error, GenerateRequest, Result, Snippet, Turn, TurnRole, Utterance, VoiceConfig,
};
use echoai_providers::{ProviderChains, ResponseCache};

use crate::events::AgentEvent;
use crate::history::ConversationHistory;
use crate::phase::TurnPhase;

/// Per-session agent configuration, derived from settings at session
/// creation.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Prior turns replayed to the model
    pub history_window: usize,
    /// Outbound audio chunk size in bytes
    pub audio_chunk_bytes: usize,
    /// Snippets requested per retrieval
    pub retriever_top_k: usize,
    pub voice: VoiceConfig,
}

impl AgentConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            history_window: settings.session.history_window,
            audio_chunk_bytes: settings.session.audio_chunk_bytes,
            retriever_top_k: settings.providers.retriever.top_k,
            voice: VoiceConfig::default(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            history_window: 8,
            audio_chunk_bytes: 32 * 1024,
            retriever_top_k: 5,
            voice: VoiceConfig::default(),
        }
    }
}

/// Orchestrates turns for a single session.
pub struct ConversationAgent {
    session_id: String,
    config: AgentConfig,
    chains: Arc<ProviderChains>,
    cache: Arc<ResponseCache>,
    history: Mutex<ConversationHistory>,
    /// Held for the whole of `run_turn`: turns for one session never
    /// overlap, even when an old runner task is still draining after a
    /// reconnect.
    turn_lock: AsyncMutex<()>,
    /// Outbound audio sequence, monotonic across turns, reset on
    /// reconnection.
    outbound_seq: AtomicU64,
}

impl ConversationAgent {
    pub fn new(
        session_id: impl Into<String>,
        config: AgentConfig,
        chains: Arc<ProviderChains>,
        cache: Arc<ResponseCache>,
    ) -> Self {
        let history = Mutex::new(ConversationHistory::new(config.history_window));
        Self {
            session_id: session_id.into(),
            config,
            chains,
            cache,
            history,
            turn_lock: AsyncMutex::new(()),
            outbound_seq: AtomicU64::new(0),
        }
    }

    /// Full turn log, for the session inspection API.
    pub fn history_snapshot(&self) -> Vec<Turn> {
        self.history.lock().turns().to_vec()
    }

    pub fn turn_count(&self) -> usize {
        self.history.lock().len()
    }

    /// Restart outbound audio numbering at zero. Called on reconnection,
    /// where both directions' sequences reset.
    pub fn reset_outbound_seq(&self) {
        self.outbound_seq.store(0, Ordering::SeqCst);
    }

    /// Run one complete turn. Failed turns are appended to history with a
    /// client-safe error event; the error is also returned for the
    /// caller's logging.
    pub async fn run_turn(
        &self,
        utterance: Utterance,
        events: &mpsc::Sender<AgentEvent>,
        cancel: &watch::Receiver<bool>,
    ) -> Result<()> {
        let _turn = self.turn_lock.lock().await;
        let mut cancel = cancel.clone();
        let started = Instant::now();
        info!(
            session_id = %self.session_id,
            chunks = utterance.chunk_count,
            bytes = utterance.audio.len(),
            "turn started"
        );

        // Transcribe. Cancellation drops the in-flight provider call.
        self.emit(events, AgentEvent::Status { phase: TurnPhase::Transcribing }).await?;
        let audio = utterance.audio;
        let stt = tokio::select! {
            result = self.chains.stt.execute(|p| {
                let audio = &audio;
                async move { p.transcribe(audio).await }
            }) => result,
            _ = cancelled(&mut cancel) => {
                return self.abort_turn(TurnRole::User, None, events).await;
            }
        };
        let (transcript, outcome) = match stt {
            Ok(ok) => ok,
            Err(err) => return self.fail_turn(TurnRole::User, None, err, events).await,
        };
        if outcome.fallback_count() > 0 {
            info!(
                session_id = %self.session_id,
                provider = %outcome.used.provider,
                fallbacks = outcome.fallback_count(),
                "transcription recovered via fallback"
            );
        }
        self.emit(events, AgentEvent::Transcript { text: transcript.text.clone() }).await?;

        // Window is snapshotted before the new user turn lands; the
        // transcript travels separately in the request.
        let window = self.history.lock().window_messages();
        let user_turn = Turn::user(&transcript.text);
        let user_turn_id = user_turn.id;
        self.history.lock().push(user_turn);

        // Silence completes the turn with no response.
        if transcript.is_blank() {
            debug!(session_id = %self.session_id, "blank transcript, skipping generation");
            self.emit(events, AgentEvent::Status { phase: TurnPhase::Complete }).await?;
            self.emit(events, AgentEvent::TurnComplete { turn_id: user_turn_id }).await?;
            return Ok(());
        }

        if self.check_cancelled(&cancel, events).await? {
            return Ok(());
        }

        // Retrieve, best-effort
        self.emit(events, AgentEvent::Status { phase: TurnPhase::Retrieving }).await?;
        let context = self.retrieve_context(&transcript.text).await;

        // Generate
        self.emit(events, AgentEvent::Status { phase: TurnPhase::Generating }).await?;
        let request = GenerateRequest::new(&transcript.text)
            .with_context(context)
            .with_history(window);
        let generation = tokio::select! {
            result = self.chains.llm.execute(|p| {
                let request = &request;
                async move { p.generate(request).await }
            }) => result,
            _ = cancelled(&mut cancel) => {
                return self.abort_turn(TurnRole::Assistant, None, events).await;
            }
        };
        let reply = match generation {
            Ok((text, _)) => text,
            Err(err) => return self.fail_turn(TurnRole::Assistant, None, err, events).await,
        };
        self.emit(events, AgentEvent::ResponseText { text: reply.clone() }).await?;

        // Synthesize, cache-first
        self.emit(events, AgentEvent::Status { phase: TurnPhase::Synthesizing }).await?;
        let synthesis = tokio::select! {
            result = self.synthesize(&reply) => result,
            _ = cancelled(&mut cancel) => {
                return self
                    .abort_turn(TurnRole::Assistant, Some(reply), events)
                    .await;
            }
        };
        let audio = match synthesis {
            Ok(audio) => audio,
            Err(err) => {
                return self
                    .fail_turn(TurnRole::Assistant, Some(reply), err, events)
                    .await
            }
        };

        // Stream out. turn_complete goes only after the transport has
        // accepted the final chunk.
        self.emit(events, AgentEvent::Status { phase: TurnPhase::StreamingOut }).await?;
        let chunks: Vec<&[u8]> = audio.chunks(self.config.audio_chunk_bytes).collect();
        let last = chunks.len().saturating_sub(1);
        for (i, chunk) in chunks.iter().enumerate() {
            if self.check_cancelled(&cancel, events).await? {
                return Ok(());
            }
            let seq = self.outbound_seq.fetch_add(1, Ordering::SeqCst);
            self.emit(
                events,
                AgentEvent::AudioChunk {
                    seq,
                    payload: Arc::new(chunk.to_vec()),
                    is_final: i == last,
                },
            )
            .await?;
        }

        let turn = Turn::assistant(&reply).with_audio(AudioHandle::new(audio.len()));
        let turn_id = turn.id;
        self.history.lock().push(turn);

        self.emit(events, AgentEvent::Status { phase: TurnPhase::Complete }).await?;
        self.emit(events, AgentEvent::TurnComplete { turn_id }).await?;

        let elapsed = started.elapsed().as_millis() as f64;
        metrics::histogram!("echoai_turn_duration_ms").record(elapsed);
        info!(
            session_id = %self.session_id,
            turn_id = %turn_id,
            duration_ms = elapsed,
            audio_bytes = audio.len(),
            "turn complete"
        );
        Ok(())
    }

    async fn retrieve_context(&self, query: &str) -> Vec<Snippet> {
        let Some(retriever) = &self.chains.retriever else {
            return Vec::new();
        };
        match retriever.retrieve(query, self.config.retriever_top_k).await {
            Ok(snippets) => {
                debug!(session_id = %self.session_id, count = snippets.len(), "context retrieved");
                snippets
            }
            Err(err) => {
                warn!(
                    session_id = %self.session_id,
                    error = %err,
                    "retrieval failed, degrading to empty context"
                );
                metrics::counter!("echoai_retrieval_degraded_total").increment(1);
                Vec::new()
            }
        }
    }

    async fn synthesize(&self, reply: &str) -> Result<Arc<Vec<u8>>> {
        let key = ResponseCache::key(reply, &self.config.voice);
        if let Some(hit) = self.cache.get(&key) {
            debug!(session_id = %self.session_id, bytes = hit.len(), "synthesis served from cache");
            return Ok(hit);
        }
        let voice = &self.config.voice;
        let (bytes, _) = self
            .chains
            .tts
            .execute(|p| {
                let voice = voice;
                async move { p.synthesize(reply, voice).await }
            })
            .await?;
        Ok(self.cache.put(key, bytes))
    }

    /// Append the failure to history and tell the client, then surface the
    /// error to the caller. The session survives; only this turn failed.
    async fn fail_turn(
        &self,
        role: TurnRole,
        partial_text: Option<String>,
        err: Error,
        events: &mpsc::Sender<AgentEvent>,
    ) -> Result<()> {
        warn!(session_id = %self.session_id, error = %err, "turn failed");
        metrics::counter!("echoai_turns_failed_total").increment(1);
        self.history.lock().push(Turn::failed(role, partial_text));

        // Best-effort: the transport may already be gone.
        let _ = events
            .send(AgentEvent::Status { phase: TurnPhase::Failed })
            .await;
        let _ = events
            .send(AgentEvent::Error {
                code: err.code(),
                message: err.client_message(),
            })
            .await;
        Err(err)
    }

    /// Record the cancelled turn as failed and stop. Not an error from the
    /// caller's view; the session is closing anyway.
    async fn abort_turn(
        &self,
        role: TurnRole,
        partial_text: Option<String>,
        events: &mpsc::Sender<AgentEvent>,
    ) -> Result<()> {
        info!(session_id = %self.session_id, "turn cancelled, dropping in-flight work");
        self.history.lock().push(Turn::failed(role, partial_text));
        let _ = events
            .send(AgentEvent::Status { phase: TurnPhase::Failed })
            .await;
        Ok(())
    }

    /// True when the turn was cancelled; the failed turn is already
    /// recorded by the time this returns.
    async fn check_cancelled(
        &self,
        cancel: &watch::Receiver<bool>,
        events: &mpsc::Sender<AgentEvent>,
    ) -> Result<bool> {
        if !*cancel.borrow() {
            return Ok(false);
        }
        self.abort_turn(TurnRole::Assistant, None, events).await?;
        Ok(true)
    }

    async fn emit(&self, events: &mpsc::Sender<AgentEvent>, event: AgentEvent) -> Result<()> {
        events.send(event).await.map_err(|_| Error::ChannelClosed)
    }
}

/// Resolves once the cancel flag is raised. Pends forever when the sender
/// is gone, so a detached signal never aborts a turn by accident.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
