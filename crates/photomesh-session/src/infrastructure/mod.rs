//! Infrastructure layer for the session crate.
//!
//! Contains OS-facing adapters: UDP discovery sockets, TCP peer links,
//! file-system storage, and the UI-facing session manager.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `photomesh_core`, but MUST NOT be imported by the `application` or
//! domain layers.

pub mod network;
pub mod storage;
pub mod ui_bridge;
