//! Core data types for the session orchestrator.
//!
//! This module contains the small shared vocabulary used across the
//! launcher, sessions, renderer, and aggregator.

use std::fmt;

/// One of a session's two output channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// The remote command's standard output.
    Stdout,
    /// The remote command's diagnostic output.
    Stderr,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Stdout => write!(f, "stdout"),
            Channel::Stderr => write!(f, "stderr"),
        }
    }
}

/// Lifecycle of one session.
///
/// Each transition happens exactly once: `Pending -> Running` when the
/// session task starts, `Running -> Completed` once both channels have hit
/// end-of-stream and the child has exited. `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Pending,
    Running,
    Completed,
}

impl SessionState {
    /// Move to the next lifecycle state. `Completed` absorbs.
    pub fn advance(self) -> SessionState {
        match self {
            SessionState::Pending => SessionState::Running,
            SessionState::Running | SessionState::Completed => SessionState::Completed,
        }
    }

    /// Whether this state has no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed)
    }
}

/// Message sent from session tasks to the single event consumer.
///
/// All shared mutable state (display, counters, tallies) is owned by one
/// consumer task; sessions only ever talk to it through these events, so
/// records can never interleave mid-line.
/// Lifecycle events carry the session's spawn id, not just its target
/// name: a host list may legitimately contain the same target twice, and
/// the two sessions must be tracked independently.
#[derive(Debug, Clone)]
pub enum Event {
    /// A session task has started and its target is now active.
    Started { id: usize, target: String },
    /// One complete line arrived on one of a session's channels.
    Line {
        target: String,
        channel: Channel,
        content: String,
    },
    /// A session has finished: both channels closed and the child exited
    /// (or the child never spawned at all).
    Finished { id: usize, target: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_advances_exactly_once_each() {
        let state = SessionState::Pending;
        let state = state.advance();
        assert_eq!(state, SessionState::Running);
        let state = state.advance();
        assert_eq!(state, SessionState::Completed);
    }

    #[test]
    fn test_completed_is_terminal() {
        assert!(!SessionState::Pending.is_terminal());
        assert!(!SessionState::Running.is_terminal());
        assert!(SessionState::Completed.is_terminal());
        assert_eq!(SessionState::Completed.advance(), SessionState::Completed);
    }

    #[test]
    fn test_channel_display() {
        assert_eq!(Channel::Stdout.to_string(), "stdout");
        assert_eq!(Channel::Stderr.to_string(), "stderr");
    }
}
