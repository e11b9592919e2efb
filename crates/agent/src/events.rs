//! Events emitted by a running turn

use std::sync::Arc;

use uuid::Uuid;

use crate::phase::TurnPhase;

/// Ordered events produced by one turn, consumed by the transport layer.
///
/// Delivery order is the pipeline order: `Transcript`, then
/// `ResponseText`, then `AudioChunk`s in sequence order, then
/// `TurnComplete`. `Error` may replace any suffix of that stream.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// Final transcript of the user's utterance
    Transcript { text: String },
    /// The assistant's full response text, sent before its audio
    ResponseText { text: String },
    /// One chunk of synthesized audio. `seq` is session-monotonic across
    /// turns; `is_final` marks the last chunk of this response.
    AudioChunk {
        seq: u64,
        payload: Arc<Vec<u8>>,
        is_final: bool,
    },
    /// The turn finished; all of its audio has been handed to the
    /// transport.
    TurnComplete { turn_id: Uuid },
    /// The turn failed. `code` is a stable client-safe error code and
    /// `message` never carries provider detail.
    Error {
        code: &'static str,
        message: String,
    },
    /// Pipeline progress, advisory only
    Status { phase: TurnPhase },
}
