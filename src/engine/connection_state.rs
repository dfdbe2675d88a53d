//! Connection state machine.

/// State of the single connection owned by the correlation engine.
///
/// Transitions:
/// - Connecting -> Open (transport reported open)
/// - Connecting -> Closed (connect failed)
/// - Open -> Closed (transport closed, or inbound processing hit a fatal error)
///
/// `Closed` is terminal; the connection is never recreated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Transport created, handshake not finished
    #[default]
    Connecting,
    /// Frames may be sent
    Open,
    /// Connection terminated (terminal state)
    Closed,
}

impl ConnectionState {
    /// Whether a transition from `self` to `next` is allowed.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        matches!(
            (self, next),
            (ConnectionState::Connecting, ConnectionState::Open)
                | (ConnectionState::Connecting, ConnectionState::Closed)
                | (ConnectionState::Open, ConnectionState::Closed)
        )
    }

    /// Whether the connection has left `Connecting`.
    pub fn is_settled(self) -> bool {
        self != ConnectionState::Connecting
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
        };
        f.write_str(label)
    }
}
