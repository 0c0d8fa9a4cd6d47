pub mod actor;
pub mod chat;
pub mod handler;
pub mod notifications;
pub mod protocol;

/// Per-connection session states. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Authenticating,
    Joining,
    Active,
    Closing,
    Closed,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Connecting, Authenticating)
                | (Authenticating, Joining)
                | (Authenticating, Closing)
                | (Joining, Active)
                | (Joining, Closing)
                | (Active, Closing)
                | (Closing, Closed)
        )
    }
}

/// Tracks one connection's state and logs every transition.
#[derive(Debug)]
pub struct Lifecycle {
    kind: &'static str,
    state: SessionState,
}

impl Lifecycle {
    /// Starts in `Connecting`. `kind` labels log lines ("chat", "notifications").
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            state: SessionState::Connecting,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Move to `next` if the transition is legal. Returns false and leaves the state unchanged otherwise.
    pub fn advance(&mut self, next: SessionState) -> bool {
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                session = self.kind,
                from = ?self.state,
                to = ?next,
                "Illegal session transition ignored"
            );
            return false;
        }
        tracing::debug!(session = self.kind, from = ?self.state, to = ?next, "Session transition");
        self.state = next;
        true
    }
}
