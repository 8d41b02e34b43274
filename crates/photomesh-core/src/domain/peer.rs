//! Peer identity and the per-peer connection state machine.
//!
//! A *peer* is another PhotoMesh endpoint on the local network.  Each peer
//! is described by an immutable [`PeerIdentity`] and tracked through the
//! [`ConnectionState`] machine as it joins and leaves the session.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a peer, derived from UUID v4.
pub type PeerId = Uuid;

/// Immutable descriptor of a local or remote peer.
///
/// Two identities are equal when their `id`s are equal — the display name
/// is informational only and may collide between devices (two phones can
/// both be called "iPhone").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerIdentity {
    /// UUID v4 uniquely identifying this endpoint instance.
    pub id: PeerId,
    /// Human-readable device name shown in the UI.
    pub display_name: String,
}

impl PeerIdentity {
    /// Creates a fresh identity with a random id.
    ///
    /// Called exactly once per process lifetime for the local endpoint;
    /// remote identities arrive over the wire.
    pub fn generate(display_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            display_name: display_name.into(),
        }
    }
}

impl PartialEq for PeerIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PeerIdentity {}

impl Hash for PeerIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.display_name, self.id)
    }
}

/// Current state of a peer's membership in the session.
///
/// ```text
/// NotConnected ──► Connecting ──► Connected
///       ▲              │              │
///       └──────────────┴──────────────┘
/// ```
///
/// - `NotConnected`: initial state; also reached from any state on
///   departure, link loss, or handshake failure.
/// - `Connecting`: a join handshake is in flight (either direction).
/// - `Connected`: the handshake completed; payloads can flow.
///
/// `Connected` is reachable only via `Connecting`.  There is no terminal
/// state — the machine cycles for the session's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    NotConnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    /// Returns `true` if moving from `self` to `next` is a legal transition.
    ///
    /// A same-state "transition" is not legal here; callers treat it as an
    /// idempotent no-op before ever consulting this function.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (NotConnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, NotConnected)
                | (Connected, NotConnected)
        )
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::NotConnected
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::NotConnected => "not connected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// One tracked remote peer: its identity plus its current state.
///
/// Unique by identity within a session — a duplicate discovery of the same
/// peer updates the existing record rather than creating a second one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    pub identity: PeerIdentity,
    pub state: ConnectionState,
}

impl PeerRecord {
    /// Creates a record in the initial `NotConnected` state.
    pub fn new(identity: PeerIdentity) -> Self {
        Self {
            identity,
            state: ConnectionState::NotConnected,
        }
    }
}

/// Transport security policy for the session.
///
/// The session layer only declares the policy; enforcing it is the
/// transport's concern.  Payload-level encryption on top of the transport
/// is explicitly out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncryptionPolicy {
    /// The transport must be encrypted for links to be accepted.
    Required,
    /// Encrypted transport is preferred but unencrypted links are allowed.
    Optional,
}

impl Default for EncryptionPolicy {
    fn default() -> Self {
        EncryptionPolicy::Required
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_equality_is_by_id_only() {
        // Arrange
        let id = Uuid::new_v4();
        let a = PeerIdentity {
            id,
            display_name: "living-room-ipad".to_string(),
        };
        let b = PeerIdentity {
            id,
            display_name: "renamed-later".to_string(),
        };

        // Act / Assert – same id means same peer, whatever the name says
        assert_eq!(a, b);
    }

    #[test]
    fn test_identities_with_same_name_but_different_ids_are_distinct() {
        let a = PeerIdentity::generate("iPhone");
        let b = PeerIdentity::generate("iPhone");
        assert_ne!(a, b);
    }

    #[test]
    fn test_generate_assigns_unique_ids() {
        let a = PeerIdentity::generate("x");
        let b = PeerIdentity::generate("x");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_initial_state_is_not_connected() {
        assert_eq!(ConnectionState::default(), ConnectionState::NotConnected);
    }

    #[test]
    fn test_connected_is_only_reachable_via_connecting() {
        // Arrange
        use ConnectionState::*;

        // Act / Assert
        assert!(Connecting.can_transition_to(Connected));
        assert!(!NotConnected.can_transition_to(Connected));
        assert!(!Connected.can_transition_to(Connected));
    }

    #[test]
    fn test_not_connected_is_reachable_from_any_state() {
        use ConnectionState::*;
        assert!(Connecting.can_transition_to(NotConnected));
        assert!(Connected.can_transition_to(NotConnected));
    }

    #[test]
    fn test_connecting_is_only_reachable_from_not_connected() {
        use ConnectionState::*;
        assert!(NotConnected.can_transition_to(Connecting));
        assert!(!Connected.can_transition_to(Connecting));
    }

    #[test]
    fn test_new_record_starts_not_connected() {
        let record = PeerRecord::new(PeerIdentity::generate("kitchen-phone"));
        assert_eq!(record.state, ConnectionState::NotConnected);
    }

    #[test]
    fn test_encryption_policy_defaults_to_required() {
        assert_eq!(EncryptionPolicy::default(), EncryptionPolicy::Required);
    }
}
