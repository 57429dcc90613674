//! Presence status of the peer on the other end of a conversation.

use serde::{Deserialize, Serialize};

/// Presence status of a peer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PresenceStatus {
    /// Peer is connected.
    Online,
    /// Peer is known but not connected.
    Offline,
    /// No connection attempt has completed yet.
    #[default]
    Unknown,
}

impl PresenceStatus {
    /// Whether the peer is currently reachable.
    #[must_use]
    pub const fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }
}

impl std::fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}
