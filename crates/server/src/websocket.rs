//! WebSocket transport
//!
//! One socket per session. Inbound frames are JSON `ClientMessage`s;
//! outbound frames are JSON `ServerMessage`s pushed through a bounded
//! FIFO channel, so a slow client stalls the pipeline instead of growing
//! an unbounded buffer.
//!
//! Protocol violations (malformed JSON, bad base64, sequence gaps) are
//! fatal to the connection but not to the session: the client may
//! reconnect within the grace period and resume with fresh sequence
//! numbering.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use echoai_agent::AgentEvent;
use echoai_core::{AudioChunk, Error, Result, SessionState, Utterance};

use crate::session::Session;
use crate::state::AppState;

/// Messages accepted from the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// One chunk of utterance audio, base64-encoded. `seq` must be
    /// contiguous; `is_final` finalizes the utterance.
    AudioChunk {
        seq: u64,
        payload: String,
        #[serde(default)]
        is_final: bool,
    },
    /// Explicit end-of-utterance signal
    EndUtterance,
    Ping,
}

/// Messages sent to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once on attach
    SessionInfo { session_id: String },
    Transcript {
        text: String,
    },
    /// `partial` is reserved for streaming generation; today every
    /// response arrives finalized.
    ResponseText {
        text: String,
        partial: bool,
    },
    /// Synthesized audio, base64-encoded, in sequence order
    AudioChunk {
        seq: u64,
        payload: String,
        is_final: bool,
    },
    TurnComplete {
        turn_id: String,
    },
    /// Stable `code` from the error taxonomy; `message` is client-safe
    Error {
        code: String,
        message: String,
    },
    Status {
        session_state: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        phase: Option<String>,
    },
    Pong,
}

/// WebSocket upgrade. An unknown session id gets a fresh session under
/// that id; a session with a live connection rejects a second one.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> std::result::Result<Response, crate::ServerError> {
    let session = match state.sessions.get(&session_id) {
        Some(session) => session,
        None => {
            debug!(session_id = %session_id, "socket for unknown session, creating fresh");
            state.sessions.create_with_id(session_id)?
        }
    };
    session.attach()?;

    let outbound_buffer = state.config.session.outbound_buffer;
    let utterance_queue = state.config.session.utterance_queue;
    Ok(ws.on_upgrade(move |socket| {
        handle_socket(socket, session, outbound_buffer, utterance_queue)
    }))
}

async fn handle_socket(
    socket: WebSocket,
    session: Arc<Session>,
    outbound_buffer: usize,
    utterance_queue: usize,
) {
    info!(session_id = %session.id, "connection attached");
    metrics::counter!("echoai_connections_total").increment(1);

    let (ws_tx, mut ws_rx) = socket.split();
    let (out_tx, out_rx) = mpsc::channel::<ServerMessage>(outbound_buffer);
    tokio::spawn(forward_outbound(ws_tx, out_rx));

    let _ = out_tx
        .send(ServerMessage::SessionInfo {
            session_id: session.id.clone(),
        })
        .await;
    let _ = out_tx
        .send(ServerMessage::Status {
            session_state: session.state().as_str().to_string(),
            phase: None,
        })
        .await;

    // Connection-scoped cancellation: fires on teardown so an in-flight
    // turn stops immediately. Session-level close (the DELETE endpoint,
    // eviction) is bridged onto the same signal.
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(bridge_session_cancel(
        session.cancel_handle(),
        cancel_tx.clone(),
    ));

    // Utterances queue behind the running turn; one turn at a time.
    let (utt_tx, utt_rx) = mpsc::channel::<Utterance>(utterance_queue);
    tokio::spawn(run_turns(
        Arc::clone(&session),
        utt_rx,
        out_tx.clone(),
        cancel_rx.clone(),
        outbound_buffer,
    ));

    // A closed session (deleted, evicted) drops its connection rather
    // than keep accepting audio into an orphaned registry entry.
    let mut conn_cancel = cancel_rx;
    loop {
        if *conn_cancel.borrow_and_update() {
            info!(session_id = %session.id, "session closed, dropping connection");
            break;
        }
        let frame = tokio::select! {
            frame = ws_rx.next() => match frame {
                Some(frame) => frame,
                None => break,
            },
            _ = conn_cancel.changed() => continue,
        };
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                debug!(session_id = %session.id, error = %err, "socket read error");
                break;
            }
        };
        let outcome = match frame {
            Message::Text(text) => handle_client_message(&session, &text, &out_tx, &utt_tx).await,
            Message::Binary(_) => Err(Error::ProtocolViolation(
                "binary frames are not part of the protocol".to_string(),
            )),
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => Ok(()),
        };
        if let Err(err) = outcome {
            warn!(session_id = %session.id, error = %err, "closing connection");
            metrics::counter!("echoai_protocol_violations_total").increment(1);
            let _ = out_tx
                .send(ServerMessage::Error {
                    code: err.code().to_string(),
                    message: err.client_message(),
                })
                .await;
            break;
        }
    }

    // Teardown: cancel the in-flight turn, drop the utterance queue so the
    // runner exits, and start the grace period.
    let _ = cancel_tx.send(true);
    drop(utt_tx);
    session.detach();
    info!(session_id = %session.id, "connection detached");
}

async fn handle_client_message(
    session: &Arc<Session>,
    text: &str,
    out_tx: &mpsc::Sender<ServerMessage>,
    utt_tx: &mpsc::Sender<Utterance>,
) -> Result<()> {
    let message: ClientMessage = serde_json::from_str(text)
        .map_err(|e| Error::ProtocolViolation(format!("malformed message: {e}")))?;
    session.touch();

    match message {
        ClientMessage::AudioChunk {
            seq,
            payload,
            is_final,
        } => {
            let payload = BASE64
                .decode(payload)
                .map_err(|_| Error::ProtocolViolation("invalid base64 payload".to_string()))?;
            session.push_chunk(&AudioChunk::new(seq, payload, is_final))?;
            if is_final {
                queue_utterance(session, utt_tx).await?;
            }
        }
        ClientMessage::EndUtterance => queue_utterance(session, utt_tx).await?,
        ClientMessage::Ping => out_tx
            .send(ServerMessage::Pong)
            .await
            .map_err(|_| Error::ChannelClosed)?,
    }
    Ok(())
}

/// Finalize the captured utterance and hand it to the turn runner. An
/// empty utterance is a no-op. The send suspends when the queue is full,
/// which in turn stalls frame reads: inbound backpressure.
async fn queue_utterance(
    session: &Arc<Session>,
    utt_tx: &mpsc::Sender<Utterance>,
) -> Result<()> {
    let utterance = session.take_utterance();
    if utterance.is_empty() {
        return Ok(());
    }
    utt_tx.send(utterance).await.map_err(|_| Error::ChannelClosed)
}

/// Consumes finalized utterances strictly one at a time.
async fn run_turns(
    session: Arc<Session>,
    mut utt_rx: mpsc::Receiver<Utterance>,
    out_tx: mpsc::Sender<ServerMessage>,
    cancel_rx: watch::Receiver<bool>,
    event_buffer: usize,
) {
    let (ev_tx, ev_rx) = mpsc::channel::<AgentEvent>(event_buffer);
    let translator = tokio::spawn(forward_events(Arc::clone(&session), ev_rx, out_tx));

    while let Some(utterance) = utt_rx.recv().await {
        if *cancel_rx.borrow() {
            debug!(session_id = %session.id, "discarding queued utterance after cancel");
            continue;
        }
        session.set_state(SessionState::Processing);
        let result = session.agent.run_turn(utterance, &ev_tx, &cancel_rx).await;
        session.set_state(SessionState::Active);
        if let Err(err) = result {
            warn!(session_id = %session.id, error = %err, "turn did not complete");
            if matches!(err, Error::ChannelClosed) {
                break;
            }
        }
    }

    drop(ev_tx);
    let _ = translator.await;
}

/// Forward the session-level close signal onto the connection-scoped
/// cancel channel. A close raised before the bridge starts still counts.
async fn bridge_session_cancel(
    mut session_cancel: watch::Receiver<bool>,
    cancel_tx: watch::Sender<bool>,
) {
    loop {
        if *session_cancel.borrow_and_update() {
            let _ = cancel_tx.send(true);
            return;
        }
        if session_cancel.changed().await.is_err() {
            return;
        }
    }
}

/// Translate agent events into wire messages, preserving order.
async fn forward_events(
    session: Arc<Session>,
    mut ev_rx: mpsc::Receiver<AgentEvent>,
    out_tx: mpsc::Sender<ServerMessage>,
) {
    while let Some(event) = ev_rx.recv().await {
        let message = match event {
            AgentEvent::Transcript { text } => ServerMessage::Transcript { text },
            AgentEvent::ResponseText { text } => ServerMessage::ResponseText {
                text,
                partial: false,
            },
            AgentEvent::AudioChunk {
                seq,
                payload,
                is_final,
            } => ServerMessage::AudioChunk {
                seq,
                payload: BASE64.encode(payload.as_slice()),
                is_final,
            },
            AgentEvent::TurnComplete { turn_id } => ServerMessage::TurnComplete {
                turn_id: turn_id.to_string(),
            },
            AgentEvent::Error { code, message } => ServerMessage::Error {
                code: code.to_string(),
                message,
            },
            AgentEvent::Status { phase } => ServerMessage::Status {
                session_state: session.state().as_str().to_string(),
                phase: Some(phase.as_str().to_string()),
            },
        };
        if out_tx.send(message).await.is_err() {
            break;
        }
    }
}

/// Serialize and write outbound messages in FIFO order.
async fn forward_outbound(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut out_rx: mpsc::Receiver<ServerMessage>,
) {
    while let Some(message) = out_rx.recv().await {
        let text = match serde_json::to_string(&message) {
            Ok(text) => text,
            Err(err) => {
                warn!(error = %err, "failed to serialize outbound message");
                continue;
            }
        };
        if ws_tx.send(Message::Text(text)).await.is_err() {
            break;
        }
    }
    let _ = ws_tx.close().await;
}
