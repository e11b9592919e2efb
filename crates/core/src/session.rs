//! Session lifecycle states

use serde::{Deserialize, Serialize};

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Transport attached, handshake not complete
    #[default]
    Connecting,
    /// Accepting audio
    Active,
    /// A turn is in flight
    Processing,
    /// Close requested; draining
    Closing,
    /// Resources released; terminal
    Closed,
}

impl SessionState {
    /// Legal transitions from this state. `Closed` is terminal.
    pub fn allowed_transitions(&self) -> &'static [SessionState] {
        match self {
            SessionState::Connecting => &[SessionState::Active, SessionState::Closed],
            SessionState::Active => &[
                SessionState::Processing,
                SessionState::Closing,
                SessionState::Closed,
            ],
            SessionState::Processing => &[
                SessionState::Active,
                SessionState::Closing,
                SessionState::Closed,
            ],
            SessionState::Closing => &[SessionState::Closed],
            SessionState::Closed => &[],
        }
    }

    pub fn can_transition_to(&self, target: SessionState) -> bool {
        self.allowed_transitions().contains(&target)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Connecting => "connecting",
            SessionState::Active => "active",
            SessionState::Processing => "processing",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_transitions() {
        assert!(SessionState::Connecting.can_transition_to(SessionState::Active));
        assert!(SessionState::Active.can_transition_to(SessionState::Processing));
        assert!(SessionState::Processing.can_transition_to(SessionState::Active));
        assert!(!SessionState::Closing.can_transition_to(SessionState::Active));
        assert!(SessionState::Closed.allowed_transitions().is_empty());
        assert!(SessionState::Closed.is_terminal());
    }
}
