//! Conversational turn tracking.
//!
//! Both ends of a session track whose turn it is with the same four states.
//! The relay drives the machine from upstream frames; the client mirrors it to
//! decide when local playback has to be flushed.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    /// Before the upstream setup handshake has completed.
    #[default]
    Idle,
    /// The assistant awaits or is processing user input.
    Listening,
    /// The assistant is producing output. Unreachable while output audio is disabled.
    Speaking,
    /// A barge-in closed the assistant's turn early.
    Interrupted,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnState::Idle => write!(f, "idle"),
            TurnState::Listening => write!(f, "listening"),
            TurnState::Speaking => write!(f, "speaking"),
            TurnState::Interrupted => write!(f, "interrupted"),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TurnError {
    #[error("illegal turn transition from {from} to {to}")]
    IllegalTransition { from: TurnState, to: TurnState },
}

impl TurnState {
    /// Whether the edge `self -> to` exists in the transition table.
    pub fn can_transition_to(self, to: TurnState) -> bool {
        use TurnState::*;
        matches!(
            (self, to),
            (Idle, Listening)
                | (Listening, Listening)
                | (Listening, Speaking)
                | (Listening, Interrupted)
                | (Speaking, Speaking)
                | (Speaking, Listening)
                | (Speaking, Interrupted)
                | (Interrupted, Listening)
        )
    }
}

/// Holds the current [`TurnState`] and rejects edges outside the table.
#[derive(Debug, Default)]
pub struct TurnMachine {
    state: TurnState,
}

impl TurnMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Moves to `to`, returning the previous state.
    pub fn transition(&mut self, to: TurnState) -> Result<TurnState, TurnError> {
        let from = self.state;
        if !from.can_transition_to(to) {
            return Err(TurnError::IllegalTransition { from, to });
        }
        self.state = to;
        Ok(from)
    }
}
