//! # photomesh-core
//!
//! Shared library for PhotoMesh containing the network protocol codec and
//! the domain entities for the peer session and photo feed.
//!
//! This crate is used by every PhotoMesh endpoint, whether it is hosting a
//! session or joining one. It has zero dependencies on OS APIs, UI
//! frameworks, or network sockets.
//!
//! # Architecture overview (for beginners)
//!
//! PhotoMesh lets a handful of devices on the same local network form a
//! shared session and broadcast photos to one another. Every member keeps
//! an ordered local feed of the photos it has sent or received.
//!
//! This crate (`photomesh-core`) is the shared foundation. It defines:
//!
//! - **`protocol`** – How bytes travel over the network. Messages are
//!   encoded into a compact binary format (24-byte header + payload) and
//!   decoded back into typed Rust structs on the other end.
//!
//! - **`domain`** – Pure business logic with no OS dependencies: the
//!   identity of a peer, the per-peer connection state machine, and the
//!   most-recent-first photo feed.

// Declare the two top-level modules.  Rust will look for each in a
// subdirectory with the same name (e.g., src/protocol/mod.rs).
pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `photomesh_core::PeerIdentity` instead of
// `photomesh_core::domain::peer::PeerIdentity`.
pub use domain::feed::{FeedEntry, FeedStore};
pub use domain::peer::{ConnectionState, EncryptionPolicy, PeerId, PeerIdentity, PeerRecord};
pub use protocol::codec::{decode_message, encode_message, ProtocolError};
pub use protocol::messages::MeshMessage;
