//! Turn pipeline phases

/// Where a running turn currently is in the pipeline.
///
/// Phases advance strictly forward; `Complete` and `Failed` are terminal.
/// A cancelled turn lands in `Failed` from whatever phase it was in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Transcribing,
    Retrieving,
    Generating,
    Synthesizing,
    StreamingOut,
    Complete,
    Failed,
}

impl TurnPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnPhase::Complete | TurnPhase::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TurnPhase::Transcribing => "transcribing",
            TurnPhase::Retrieving => "retrieving",
            TurnPhase::Generating => "generating",
            TurnPhase::Synthesizing => "synthesizing",
            TurnPhase::StreamingOut => "streaming_out",
            TurnPhase::Complete => "complete",
            TurnPhase::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
