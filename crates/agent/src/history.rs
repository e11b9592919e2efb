//! Bounded conversation history

use echoai_core::{Message, Turn, TurnRole, TurnStatus};

/// Full turn log plus a sliding prompt window.
///
/// The log keeps every turn for the session's lifetime (it backs the
/// session inspection API); only the most recent `window` turns with text
/// are flattened into prompt messages, oldest first.
#[derive(Debug)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
    window: usize,
}

impl ConversationHistory {
    pub fn new(window: usize) -> Self {
        Self {
            turns: Vec::new(),
            window,
        }
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Prompt window: the last `window` completed turns that carry text,
    /// oldest first. Failed turns and silence are not replayed to the
    /// model.
    pub fn window_messages(&self) -> Vec<Message> {
        let mut messages: Vec<Message> = self
            .turns
            .iter()
            .rev()
            .filter(|t| t.status == TurnStatus::Complete)
            .filter_map(|t| {
                let text = t.text.as_deref()?.trim();
                if text.is_empty() {
                    return None;
                }
                Some(match t.role {
                    TurnRole::User => Message::user(text),
                    TurnRole::Assistant => Message::assistant(text),
                })
            })
            .take(self.window)
            .collect();
        messages.reverse();
        messages
    }
}
