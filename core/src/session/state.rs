//! session/state.rs
//! Lifecycle states, events, and the single transition function.
//!
//! Design notes:
//! - The lifecycle is an explicit sum type with all transition logic in
//!   one total function; invalid requests are rejected with no side
//!   effect, which is what makes the invalid-transition property
//!   mechanically checkable.
//! - COMPLETED is reachable only from TERMINATING after manifest
//!   finalization; FAILED is reachable from any non-terminal state.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Lifecycle state of one recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Session record created, identifiers assigned; no chunk activity.
    Initializing,
    /// External transport established; no chunk activity.
    Connecting,
    /// Principal identity confirmed; no chunk activity.
    Authenticating,
    /// Chunker consuming the live stream; the only state that creates
    /// chunk records.
    Active,
    /// Capture paused; Merkle leaves retained; resumable.
    Suspending,
    /// Capture stopped permanently; manifest finalization in progress.
    Terminating,
    /// Terminal success; all fields frozen.
    Completed,
    /// Terminal failure; all fields frozen.
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Initializing   => "initializing",
            SessionState::Connecting     => "connecting",
            SessionState::Authenticating => "authenticating",
            SessionState::Active         => "active",
            SessionState::Suspending     => "suspending",
            SessionState::Terminating    => "terminating",
            SessionState::Completed      => "completed",
            SessionState::Failed         => "failed",
        };
        f.write_str(name)
    }
}

/// Lifecycle events; transitions are the only path to state mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Transport established (signaled by the RDP collaborator).
    Connect,
    /// Identity check initiated.
    Authenticate,
    /// Start (or restart) capture.
    Activate,
    /// Pause capture without finalizing.
    Suspend,
    /// Stop capture permanently and finalize.
    Terminate,
    /// Manifest finalization succeeded.
    Finalized,
    /// Unrecoverable error.
    Fail,
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionEvent::Connect      => "connect",
            SessionEvent::Authenticate => "authenticate",
            SessionEvent::Activate     => "activate",
            SessionEvent::Suspend      => "suspend",
            SessionEvent::Terminate    => "terminate",
            SessionEvent::Finalized    => "finalized",
            SessionEvent::Fail         => "fail",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub enum StateTransitionError {
    /// The event is not legal from the current state.
    Invalid { from: SessionState, event: SessionEvent },

    /// Another transition is in flight for this session and the wait
    /// exceeded `transition_lock_timeout`.
    Busy { waited: Duration },

    /// The configured resume-cycle budget is spent.
    ResumeLimit { limit: u32 },
}

impl fmt::Display for StateTransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use StateTransitionError::*;
        match self {
            Invalid { from, event } =>
                write!(f, "invalid transition: {} from state {}", event, from),
            Busy { waited } =>
                write!(f, "session already transitioning (waited {:?})", waited),
            ResumeLimit { limit } =>
                write!(f, "resume cycle limit {} exceeded", limit),
        }
    }
}

impl std::error::Error for StateTransitionError {}

/// The one transition function. A rejected transition never partially
/// applies; callers mutate only after `Ok`.
pub fn transition(
    state: SessionState,
    event: SessionEvent,
) -> Result<SessionState, StateTransitionError> {
    use SessionEvent::*;
    use SessionState::*;

    let next = match (state, event) {
        (Initializing, Connect) => Connecting,
        (Connecting, Authenticate) => Authenticating,
        (Authenticating, Activate) => Active,
        (Active, Suspend) => Suspending,
        (Suspending, Activate) => Active,
        (Active, Terminate) | (Suspending, Terminate) => Terminating,
        (Terminating, Finalized) => Completed,
        (from, Fail) if !from.is_terminal() => Failed,
        (from, event) => return Err(StateTransitionError::Invalid { from, event }),
    };

    Ok(next)
}
