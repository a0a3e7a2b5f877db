//! Live session state machine.
//!
//! ```text
//! Idle ──start──▶ Connecting ──opened──▶ Open
//!   ▲                │  │                 │ │
//!   └─mic refused────┘  └─connect failed─┐│ └─remote close / stop──▶ Closed
//!                                        ▼▼
//!                                      Errored ◀──transport error
//! ```
//!
//! Every transition goes through [`SessionState::apply`], a pure function of
//! the current state and one [`SessionEvent`]. Closed and Errored are
//! terminal; events arriving after them are ignored.

/// Observable phase of a live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Open,
    Closed,
    Errored,
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// `start()` passed the entitlement check.
    Start,
    /// The microphone could not be acquired.
    MicrophoneDenied,
    /// The remote session is established.
    Opened,
    /// The remote side or the local user ended the session.
    Closed,
    /// The transport failed (including a failed connect).
    Error,
}

impl SessionState {
    /// Next state after `event`. Events that make no sense in the current
    /// state leave it unchanged.
    ///
    /// ```
    /// use guide_voice::live::{SessionEvent, SessionState};
    ///
    /// let s = SessionState::Idle.apply(SessionEvent::Start);
    /// assert_eq!(s, SessionState::Connecting);
    /// assert_eq!(s.apply(SessionEvent::Opened), SessionState::Open);
    /// assert_eq!(SessionState::Open.apply(SessionEvent::Closed), SessionState::Closed);
    /// ```
    pub fn apply(self, event: SessionEvent) -> SessionState {
        use SessionEvent as E;
        use SessionState as S;

        match (self, event) {
            (S::Idle, E::Start) => S::Connecting,
            (S::Connecting, E::MicrophoneDenied) => S::Idle,
            (S::Connecting, E::Opened) => S::Open,
            (S::Connecting | S::Open, E::Closed) => S::Closed,
            (S::Connecting | S::Open, E::Error) => S::Errored,
            (state, _) => state,
        }
    }

    /// `true` while a session is being set up or is running.
    pub fn is_active(self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::Open)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Errored)
    }

    /// Short label for status output.
    pub fn label(self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Connecting => "Connecting",
            SessionState::Open => "Open",
            SessionState::Closed => "Closed",
            SessionState::Errored => "Errored",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
