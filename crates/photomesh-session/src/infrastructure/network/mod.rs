//! Network adapters: UDP discovery (advertiser + browser) and TCP peer links.
//!
//! Discovery and membership use separate transports:
//!
//! - **UDP** (`advertiser`, `browser`) — connectionless probe/announce
//!   exchange on the discovery port.  Lossy by nature, which is fine: the
//!   browser just probes again.
//! - **TCP** (`peer_link`) — the session channel.  One connection per peer
//!   pair carrying the join handshake, photo frames, and leave notices.

pub mod advertiser;
pub mod browser;
pub mod peer_link;
