//! All PhotoMesh protocol message types.
//!
//! Messages follow the wire format described in `codec`: a fixed 24-byte
//! header followed by a per-message payload.  Photos travel as opaque byte
//! blobs — this layer imposes no image format; interpretation is entirely
//! the receiver's responsibility.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Current protocol version byte.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Total size of the common message header in bytes.
pub const HEADER_SIZE: usize = 24;

// ── Message type codes ────────────────────────────────────────────────────────

/// All message type codes defined in the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    // Control channel (0x00–0x3F)
    JoinRequest = 0x01,
    JoinAccept = 0x02,
    Leave = 0x09,
    Error = 0x0A,
    // Data channel (0x40–0x7F)
    Photo = 0x40,
    // Discovery (0x80–0x8F)
    Probe = 0x80,
    Announce = 0x81,
}

impl TryFrom<u8> for MessageType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(MessageType::JoinRequest),
            0x02 => Ok(MessageType::JoinAccept),
            0x09 => Ok(MessageType::Leave),
            0x0A => Ok(MessageType::Error),
            0x40 => Ok(MessageType::Photo),
            0x80 => Ok(MessageType::Probe),
            0x81 => Ok(MessageType::Announce),
            _ => Err(()),
        }
    }
}

// ── Per-message payload structs ───────────────────────────────────────────────

/// JOIN_REQUEST (0x01): sent by a browsing peer to request membership.
///
/// The host accepts automatically and unconditionally; any gatekeeping is
/// the concern of an outer layer, not this core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequestMessage {
    /// UUID v4 uniquely identifying the joining endpoint.
    pub peer_id: Uuid,
    /// Protocol version the joiner supports.
    pub protocol_version: u8,
    /// Human-readable device name.
    pub display_name: String,
}

/// JOIN_ACCEPT (0x02): host response completing the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinAcceptMessage {
    /// UUID of the hosting endpoint.
    pub peer_id: Uuid,
    /// Whether the host requires encrypted transport for this session.
    pub encryption_required: bool,
    /// Human-readable device name of the host.
    pub display_name: String,
}

/// Reason for a graceful departure from the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum LeaveReason {
    UserInitiated = 0x01,
    HostShutdown = 0x02,
    ProtocolError = 0x03,
    Timeout = 0x04,
}

impl TryFrom<u8> for LeaveReason {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(LeaveReason::UserInitiated),
            0x02 => Ok(LeaveReason::HostShutdown),
            0x03 => Ok(LeaveReason::ProtocolError),
            0x04 => Ok(LeaveReason::Timeout),
            _ => Err(()),
        }
    }
}

/// Protocol-level error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ProtocolErrorCode {
    ProtocolVersionMismatch = 0x01,
    InternalError = 0x02,
    InvalidMessage = 0x03,
}

/// ERROR (0x0A): error notification from either side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Protocol error code.
    pub error_code: ProtocolErrorCode,
    /// Human-readable description (for logging only, not end-user display).
    pub description: String,
}

/// PHOTO (0x40): one broadcast payload.
///
/// The bytes are opaque to this layer — no header, no versioning, no image
/// format requirement on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoMessage {
    /// Raw payload bytes.
    pub data: Vec<u8>,
}

/// PROBE (0x80): a browsing peer asks "who is advertising this service?".
///
/// Broadcast over UDP on the discovery port.  Hosts advertising a
/// *byte-identical* service id answer with [`AnnounceMessage`]; everyone
/// else stays silent, so a mismatched service id simply finds nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeMessage {
    /// Service identifier the browser is looking for.
    pub service_id: String,
    /// UUID of the browsing endpoint.
    pub peer_id: Uuid,
    /// Human-readable device name of the browser.
    pub display_name: String,
}

/// ANNOUNCE (0x81): a hosting peer answers a matching probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnounceMessage {
    /// Service identifier the host is advertising under.
    pub service_id: String,
    /// UUID of the hosting endpoint.
    pub peer_id: Uuid,
    /// TCP port the host accepts join requests on.
    pub session_port: u16,
    /// Human-readable device name of the host.
    pub display_name: String,
}

// ── Top-level message enum ────────────────────────────────────────────────────

/// All valid PhotoMesh messages, discriminated by type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MeshMessage {
    JoinRequest(JoinRequestMessage),
    JoinAccept(JoinAcceptMessage),
    Leave { reason: LeaveReason },
    Error(ErrorMessage),
    Photo(PhotoMessage),
    Probe(ProbeMessage),
    Announce(AnnounceMessage),
}

impl MeshMessage {
    /// Returns the [`MessageType`] discriminant for this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            MeshMessage::JoinRequest(_) => MessageType::JoinRequest,
            MeshMessage::JoinAccept(_) => MessageType::JoinAccept,
            MeshMessage::Leave { .. } => MessageType::Leave,
            MeshMessage::Error(_) => MessageType::Error,
            MeshMessage::Photo(_) => MessageType::Photo,
            MeshMessage::Probe(_) => MessageType::Probe,
            MeshMessage::Announce(_) => MessageType::Announce,
        }
    }
}
