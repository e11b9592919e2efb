//! Conversation agent
//!
//! Owns the per-session turn pipeline: finalized utterance in, ordered
//! stream of agent events out. One turn at a time per session; the
//! transport queues further utterances behind the running turn.

pub mod agent;
pub mod events;
pub mod history;
pub mod phase;

pub use agent::{AgentConfig, ConversationAgent};
pub use events::AgentEvent;
pub use history::ConversationHistory;
pub use phase::TurnPhase;
