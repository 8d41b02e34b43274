//! photomesh-session library entry point.
//!
//! This crate is the peer session and broadcast layer of PhotoMesh: peer
//! discovery over UDP, membership over TCP, reliable per-peer photo
//! fan-out, and the ordered local feed.  It is a library/service layer —
//! the photo grid, capture UI, and app chrome are external collaborators
//! that call into [`infrastructure::ui_bridge::SessionManager`] and receive
//! events back from it.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and embedding applications share the same module tree.

pub mod application;
pub mod infrastructure;

pub use application::broadcast::{BroadcastOutcome, PeerSender, SendError, SendFailure};
pub use application::track_peers::{PeerTracker, StateChange};
pub use infrastructure::network::browser::DiscoveredPeer;
pub use infrastructure::network::peer_link::SessionEstablishError;
pub use infrastructure::ui_bridge::{SessionError, SessionManager, SessionObserver};
