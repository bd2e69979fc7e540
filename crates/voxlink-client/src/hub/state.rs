use std::fmt;

/// Lifecycle of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Negotiating,
    SocketOpen,
    Authenticating,
    Ready,
    Closing,
    Closed,
    Failed,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Negotiating => "negotiating",
            ConnectionState::SocketOpen => "socket_open",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Ready => "ready",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
            ConnectionState::Failed => "failed",
        }
    }

    /// States from which `negotiate` and `connect` may start.
    pub fn is_idle(self) -> bool {
        matches!(
            self,
            ConnectionState::Disconnected | ConnectionState::Closed | ConnectionState::Failed
        )
    }

    /// A socket is (or is about to be) open.
    pub fn is_open(self) -> bool {
        matches!(
            self,
            ConnectionState::SocketOpen | ConnectionState::Authenticating | ConnectionState::Ready
        )
    }

    /// States a pending `connect` stops waiting at.
    pub(crate) fn is_settled(self) -> bool {
        !matches!(
            self,
            ConnectionState::SocketOpen | ConnectionState::Authenticating
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
