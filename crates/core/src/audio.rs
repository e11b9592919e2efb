//! Audio chunk and utterance buffer types
//!
//! Audio crosses the transport as opaque byte chunks tagged with a
//! per-direction, per-session sequence number. The server never decodes
//! the payload; framing and sequencing are the only concerns here.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One chunk of audio in either direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioChunk {
    /// Monotonic per-direction, per-session sequence number starting at 0
    pub seq: u64,
    /// Opaque audio bytes
    pub payload: Vec<u8>,
    /// Marks end-of-utterance on the inbound direction, end-of-response
    /// audio on the outbound direction
    pub is_final: bool,
}

impl AudioChunk {
    pub fn new(seq: u64, payload: Vec<u8>, is_final: bool) -> Self {
        Self {
            seq,
            payload,
            is_final,
        }
    }
}

/// One continuous span of user audio, assembled from in-order chunks and
/// terminated by an `is_final` chunk or an explicit end-of-utterance signal.
#[derive(Debug, Clone, Default)]
pub struct Utterance {
    pub audio: Vec<u8>,
    pub chunk_count: usize,
}

impl Utterance {
    pub fn is_empty(&self) -> bool {
        self.audio.is_empty()
    }
}

/// Accumulates inbound chunks for the utterance currently being captured,
/// enforcing the contiguous-sequence invariant.
///
/// The expected sequence number spans utterances: it keeps incrementing
/// across a session's lifetime and only resets on reconnect.
#[derive(Debug, Default)]
pub struct UtteranceBuffer {
    audio: Vec<u8>,
    chunk_count: usize,
    expected_seq: u64,
}

impl UtteranceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. A gap or out-of-order sequence number is a protocol
    /// error; the chunk is not partially applied.
    pub fn push(&mut self, chunk: &AudioChunk) -> Result<()> {
        if chunk.seq != self.expected_seq {
            return Err(Error::OutOfOrderChunk {
                expected: self.expected_seq,
                got: chunk.seq,
            });
        }
        self.expected_seq += 1;
        self.audio.extend_from_slice(&chunk.payload);
        self.chunk_count += 1;
        Ok(())
    }

    /// Take the accumulated utterance, leaving the buffer ready for the
    /// next one. Sequence expectations carry over.
    pub fn take(&mut self) -> Utterance {
        Utterance {
            audio: std::mem::take(&mut self.audio),
            chunk_count: std::mem::replace(&mut self.chunk_count, 0),
        }
    }

    /// Reset sequencing after a reconnect: the client restarts at seq 0.
    pub fn reset(&mut self) {
        self.audio.clear();
        self.chunk_count = 0;
        self.expected_seq = 0;
    }

    pub fn expected_seq(&self) -> u64 {
        self.expected_seq
    }

    pub fn is_empty(&self) -> bool {
        self.audio.is_empty()
    }

    pub fn len(&self) -> usize {
        self.audio.len()
    }
}
