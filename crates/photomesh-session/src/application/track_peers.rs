//! Peer membership tracking and the connection-state machine.
//!
//! The `PeerTracker` is the session's in-memory record of every remote
//! peer it has discovered or connected to.  State transitions arrive from
//! concurrent transport callbacks — one stream per peer, with no
//! cross-peer ordering guarantee — so the tracker itself stays synchronous
//! and is always driven from the single owner context (the session event
//! pump).
//!
//! # Connection lifecycle (for beginners)
//!
//! Peers progress through these states:
//!
//! ```text
//! NotConnected ──► Connecting ──► Connected
//!       ▲              │              │
//!       └──────────────┴──────────────┘
//! ```
//!
//! - `NotConnected`: the peer is known (e.g., discovered) but no link is up.
//! - `Connecting`: a join handshake is in flight, in either direction.
//! - `Connected`: the handshake completed; the peer is a broadcast target.
//!
//! A handshake failure or link loss drops the peer back to `NotConnected`;
//! the record is kept so it can reconnect later.

use std::collections::HashMap;

use photomesh_core::{ConnectionState, PeerId, PeerIdentity, PeerRecord};
use tracing::warn;

/// One observable state change, emitted at most once per actual transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    /// The peer whose state changed.
    pub identity: PeerIdentity,
    /// The state before the transition.
    pub previous: ConnectionState,
    /// The state after the transition.
    pub current: ConnectionState,
}

/// In-memory membership set: one [`PeerRecord`] per known remote peer.
///
/// # HashMap choice
///
/// A `HashMap<PeerId, PeerRecord>` provides O(1) lookup by UUID and makes
/// the "a peer appears at most once" invariant structural: a duplicate
/// discovery of a known peer can only ever update the existing entry.
#[derive(Default)]
pub struct PeerTracker {
    peers: HashMap<PeerId, PeerRecord>,
}

impl PeerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a state transition for `identity`, registering the peer on
    /// first sight.
    ///
    /// Idempotent: if `new_state` equals the peer's current state the call
    /// has no observable effect and returns `None` — no duplicate event is
    /// fired.  An illegal transition (e.g. `NotConnected → Connected`
    /// without passing through `Connecting`) is ignored with a warning,
    /// because it can only come from a confused transport, and returns
    /// `None` as well.
    ///
    /// A repeat sighting of a known peer refreshes its display name; the
    /// record itself is never duplicated.
    pub fn record_transition(
        &mut self,
        identity: &PeerIdentity,
        new_state: ConnectionState,
    ) -> Option<StateChange> {
        let record = self
            .peers
            .entry(identity.id)
            .or_insert_with(|| PeerRecord::new(identity.clone()));

        // Devices can be renamed between sessions; the id is what counts.
        if record.identity.display_name != identity.display_name {
            record.identity.display_name = identity.display_name.clone();
        }

        if record.state == new_state {
            return None;
        }

        if !record.state.can_transition_to(new_state) {
            warn!(
                "ignoring illegal transition for {}: {} -> {}",
                record.identity, record.state, new_state
            );
            return None;
        }

        let previous = record.state;
        record.state = new_state;
        Some(StateChange {
            identity: record.identity.clone(),
            previous,
            current: new_state,
        })
    }

    /// Returns an owned snapshot of all peer records.
    pub fn snapshot(&self) -> Vec<PeerRecord> {
        self.peers.values().cloned().collect()
    }

    /// Returns the identities whose state is `Connected` right now.
    ///
    /// This is the broadcast target set: exactly the peers connected at the
    /// moment of the call, nothing queued for later joiners.
    pub fn connected_peers(&self) -> Vec<PeerIdentity> {
        self.peers
            .values()
            .filter(|r| r.state == ConnectionState::Connected)
            .map(|r| r.identity.clone())
            .collect()
    }

    /// Looks up the identity for a peer id, if the peer is known.
    pub fn identity_of(&self, id: PeerId) -> Option<PeerIdentity> {
        self.peers.get(&id).map(|r| r.identity.clone())
    }

    /// Wipes all peer state.
    ///
    /// A recreated session starts from scratch — peer state is replaced,
    /// never merged.
    pub fn reset(&mut self) {
        self.peers.clear();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
