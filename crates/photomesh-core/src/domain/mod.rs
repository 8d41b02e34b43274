//! Domain entities for PhotoMesh.
//!
//! This module contains pure business logic with no infrastructure
//! dependencies.
//!
//! # What is "domain" in Clean Architecture? (for beginners)
//!
//! Clean Architecture organises code into concentric layers.  The innermost
//! layer is called the **domain** (or "entities" layer).  Domain code:
//!
//! - Contains the core business rules of the application.
//! - Has **no** imports from OS APIs, network libraries, database drivers,
//!   or UI frameworks.
//! - Can be compiled and tested on any platform without any external setup.
//! - Defines the data types and operations that make the system uniquely
//!   what it is: in this case, the identity of a session peer, the
//!   connection-state machine each peer moves through, and the
//!   most-recent-first feed of shared photos.
//!
//! Code in outer layers (infrastructure, application, UI) depends on the
//! domain, but the domain never depends on them.  This makes the domain
//! easy to unit-test in isolation.

/// Peer identity and the per-peer connection state machine.
///
/// See [`peer::PeerIdentity`] and [`peer::ConnectionState`].
pub mod peer;

/// The ordered, most-recent-first photo feed.
///
/// See [`feed::FeedStore`] for the main type.
pub mod feed;
