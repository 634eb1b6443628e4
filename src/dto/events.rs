//! Events a session controller emits to its embedding view layer.

use serde::Serialize;

use crate::dto::snapshot::{QuestionPrompt, RevealView, RoomSnapshot, ScoreboardEntry};

/// Everything the view layer needs to follow a session, delivered in order
/// over the session handle's event channel.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Fresh authoritative snapshot after a reconciled change.
    RoomUpdated {
        /// The reconciled view.
        snapshot: RoomSnapshot,
    },
    /// A round opened; show the prompt and start the countdown display.
    RoundBegan {
        /// Index of the round that opened.
        round: usize,
        /// Prompt with the answer withheld.
        prompt: QuestionPrompt,
        /// Seconds on the clock.
        timer_seconds: u32,
    },
    /// One second elapsed on the active countdown.
    CountdownTick {
        /// Round the countdown belongs to.
        round: usize,
        /// Seconds left.
        remaining_seconds: u32,
    },
    /// The local participant's round resolved.
    RoundRevealed {
        /// What happened and what it scored.
        reveal: RevealView,
    },
    /// The game finished; show the final standings.
    GameFinished {
        /// Standings sorted best-first.
        scoreboard: Vec<ScoreboardEntry>,
    },
    /// A unanimous play-again vote reset the room; show the lobby again.
    ReturnedToLobby,
    /// The session is over and the controller has shut down.
    SessionEnded {
        /// Why the session ended.
        reason: EndReason,
    },
}

/// Terminal reasons for a session.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The local participant chose to leave.
    Left,
    /// The room was deleted or could no longer be found.
    RoomClosed,
}
