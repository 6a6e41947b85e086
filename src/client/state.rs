use std::fmt;

/// Lifecycle of the single transport session a manager owns.
///
/// ```text
/// Idle ──connect──▶ Connecting ──connected──▶ Connected
///                     ▲    │                     │
///                retry│    │failed               │failed
///                     │    ▼                     │
///                   Reconnecting ◀───────────────┘
///
/// any state ──disconnect──▶ Closed ──connect──▶ Connecting
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

impl ConnectionState {
    /// True while the manager is trying to hold a connection open.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Connected | ConnectionState::Reconnecting
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}
