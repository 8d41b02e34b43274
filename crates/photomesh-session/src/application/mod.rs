//! Application layer use cases for the session crate.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (pure business rules) and the infrastructure (OS/network/storage).
//!
//! Use cases in this layer:
//!
//! - **Orchestrate** domain objects to fulfil a user goal (e.g., "send this
//!   photo to everyone who is connected right now").
//! - **Depend on abstractions** (traits) rather than concrete
//!   implementations, so the infrastructure can be swapped without changing
//!   this code.
//! - **Contain no OS calls, no network I/O, no file system access**.
//!
//! # Sub-modules
//!
//! - **`track_peers`** – Maintains the membership set: one record per known
//!   remote peer and its connection-state machine.  Every transport event
//!   funnels through here so the rest of the system has a single answer to
//!   "who is connected?".
//!
//! - **`broadcast`** – Fans a payload out to the currently connected peers,
//!   one independent send per peer, collecting per-peer failures without
//!   letting any of them poison the rest.
//!
//! - **`receive_feed`** – Accepts inbound payloads into the local feed,
//!   dropping anything that does not look like an image.

pub mod broadcast;
pub mod receive_feed;
pub mod track_peers;
