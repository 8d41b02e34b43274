//! Binary codec for encoding and decoding PhotoMesh protocol messages.
//!
//! Wire format:
//! ```text
//! [version:1][msg_type:1][reserved:2][payload_len:4][seq:8][timestamp_us:8][payload:N]
//! ```
//! Total header size: 24 bytes. All multi-byte integers are big-endian.
//!
//! The same framing is used on both transports: one message per UDP
//! datagram for discovery, and a contiguous stream of frames on the TCP
//! session channel (the `payload_len` field tells the reader where each
//! frame ends).

use std::time::{SystemTime, UNIX_EPOCH};

use crate::protocol::messages::{
    AnnounceMessage, ErrorMessage, JoinAcceptMessage, JoinRequestMessage, LeaveReason,
    MeshMessage, MessageType, PhotoMessage, ProbeMessage, ProtocolErrorCode, HEADER_SIZE,
    PROTOCOL_VERSION,
};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the minimum required length.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The message type byte in the header is not a recognized value.
    #[error("unknown message type: 0x{0:02X}")]
    UnknownMessageType(u8),

    /// The protocol version in the header is not supported.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// The payload could not be parsed (field value out of range, UTF-8 error, etc.).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The encoded payload length field does not match the actual data available.
    #[error("payload length mismatch: header says {declared}, available is {available}")]
    PayloadLengthMismatch { declared: usize, available: usize },
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`MeshMessage`] into a byte vector including the 24-byte header.
///
/// The sequence number is **not** set by this function – pass a pre-incremented
/// value from a [`crate::protocol::SequenceCounter`].
///
/// # Errors
///
/// Returns [`ProtocolError`] if serialization fails.
///
/// # Examples
///
/// ```rust
/// use photomesh_core::protocol::{encode_message, decode_message};
/// use photomesh_core::protocol::messages::{LeaveReason, MeshMessage};
///
/// let msg = MeshMessage::Leave { reason: LeaveReason::UserInitiated };
/// let bytes = encode_message(&msg, 0, 0).unwrap();
/// let (decoded, consumed) = decode_message(&bytes).unwrap();
/// assert_eq!(decoded, msg);
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn encode_message(
    msg: &MeshMessage,
    sequence_number: u64,
    timestamp_us: u64,
) -> Result<Vec<u8>, ProtocolError> {
    let payload = encode_payload(msg)?;
    let payload_len = payload.len() as u32;

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());

    // Header: version (1) + msg_type (1) + reserved (2) + payload_len (4) +
    //         seq (8) + timestamp_us (8) = 24 bytes
    buf.push(PROTOCOL_VERSION);
    buf.push(msg.message_type() as u8);
    buf.push(0x00); // reserved
    buf.push(0x00); // reserved
    buf.extend_from_slice(&payload_len.to_be_bytes());
    buf.extend_from_slice(&sequence_number.to_be_bytes());
    buf.extend_from_slice(&timestamp_us.to_be_bytes());

    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Encodes a [`MeshMessage`] using the current system time as the timestamp.
///
/// # Errors
///
/// Returns [`ProtocolError`] if serialization fails.
pub fn encode_message_now(
    msg: &MeshMessage,
    sequence_number: u64,
) -> Result<Vec<u8>, ProtocolError> {
    let timestamp_us = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64;
    encode_message(msg, sequence_number, timestamp_us)
}

/// Decodes one [`MeshMessage`] from the beginning of `bytes`.
///
/// Returns the decoded message and the total number of bytes consumed
/// (header + payload), so the caller can advance their read cursor.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the bytes are malformed.
///
/// # Examples
///
/// ```rust
/// use photomesh_core::protocol::{encode_message, decode_message};
/// use photomesh_core::protocol::messages::{MeshMessage, PhotoMessage};
///
/// let original = MeshMessage::Photo(PhotoMessage { data: vec![0x89, 0x50] });
/// let bytes = encode_message(&original, 1, 0).unwrap();
/// let (decoded, n) = decode_message(&bytes).unwrap();
/// assert_eq!(decoded, original);
/// assert_eq!(n, bytes.len());
/// ```
pub fn decode_message(bytes: &[u8]) -> Result<(MeshMessage, usize), ProtocolError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let version = bytes[0];
    if version != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion(version));
    }

    let msg_type_byte = bytes[1];
    let msg_type = MessageType::try_from(msg_type_byte)
        .map_err(|_| ProtocolError::UnknownMessageType(msg_type_byte))?;

    // bytes[2..4] are reserved – ignored on decode

    let payload_len = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;

    let total_needed = HEADER_SIZE + payload_len;
    if bytes.len() < total_needed {
        return Err(ProtocolError::PayloadLengthMismatch {
            declared: payload_len,
            available: bytes.len() - HEADER_SIZE,
        });
    }

    let payload = &bytes[HEADER_SIZE..HEADER_SIZE + payload_len];
    let msg = decode_payload(msg_type, payload)?;
    Ok((msg, total_needed))
}

/// Reads the declared payload length from a raw 24-byte header.
///
/// Used by stream readers that receive the header and payload in separate
/// reads and need to know how many more bytes to wait for.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the slice is too short or the version byte
/// is unsupported.
pub fn peek_payload_len(header: &[u8]) -> Result<usize, ProtocolError> {
    if header.len() < HEADER_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: HEADER_SIZE,
            available: header.len(),
        });
    }
    if header[0] != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion(header[0]));
    }
    Ok(u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize)
}

// ── Payload encoding ──────────────────────────────────────────────────────────

fn encode_payload(msg: &MeshMessage) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = Vec::new();
    match msg {
        MeshMessage::JoinRequest(m) => encode_join_request(&mut buf, m),
        MeshMessage::JoinAccept(m) => encode_join_accept(&mut buf, m),
        MeshMessage::Leave { reason } => buf.push(*reason as u8),
        MeshMessage::Error(m) => encode_error(&mut buf, m),
        MeshMessage::Photo(m) => encode_photo(&mut buf, m),
        MeshMessage::Probe(m) => encode_probe(&mut buf, m),
        MeshMessage::Announce(m) => encode_announce(&mut buf, m),
    }
    Ok(buf)
}

// ── Payload decoding ──────────────────────────────────────────────────────────

fn decode_payload(msg_type: MessageType, payload: &[u8]) -> Result<MeshMessage, ProtocolError> {
    match msg_type {
        MessageType::JoinRequest => decode_join_request(payload).map(MeshMessage::JoinRequest),
        MessageType::JoinAccept => decode_join_accept(payload).map(MeshMessage::JoinAccept),
        MessageType::Leave => {
            require_len(payload, 1, "Leave")?;
            let reason = LeaveReason::try_from(payload[0]).map_err(|_| {
                ProtocolError::MalformedPayload(format!("unknown leave reason: {}", payload[0]))
            })?;
            Ok(MeshMessage::Leave { reason })
        }
        MessageType::Error => decode_error(payload).map(MeshMessage::Error),
        MessageType::Photo => decode_photo(payload).map(MeshMessage::Photo),
        MessageType::Probe => decode_probe(payload).map(MeshMessage::Probe),
        MessageType::Announce => decode_announce(payload).map(MeshMessage::Announce),
    }
}

// ── Per-message encode helpers ────────────────────────────────────────────────

fn encode_join_request(buf: &mut Vec<u8>, m: &JoinRequestMessage) {
    buf.extend_from_slice(m.peer_id.as_bytes());
    buf.push(m.protocol_version);
    write_length_prefixed_string(buf, &m.display_name);
}

fn encode_join_accept(buf: &mut Vec<u8>, m: &JoinAcceptMessage) {
    buf.extend_from_slice(m.peer_id.as_bytes());
    buf.push(if m.encryption_required { 0x01 } else { 0x00 });
    write_length_prefixed_string(buf, &m.display_name);
}

fn encode_error(buf: &mut Vec<u8>, m: &ErrorMessage) {
    buf.push(m.error_code as u8);
    write_length_prefixed_string(buf, &m.description);
}

fn encode_photo(buf: &mut Vec<u8>, m: &PhotoMessage) {
    buf.extend_from_slice(&(m.data.len() as u32).to_be_bytes());
    buf.extend_from_slice(&m.data);
}

fn encode_probe(buf: &mut Vec<u8>, m: &ProbeMessage) {
    write_length_prefixed_string(buf, &m.service_id);
    buf.extend_from_slice(m.peer_id.as_bytes());
    write_length_prefixed_string(buf, &m.display_name);
}

fn encode_announce(buf: &mut Vec<u8>, m: &AnnounceMessage) {
    write_length_prefixed_string(buf, &m.service_id);
    buf.extend_from_slice(m.peer_id.as_bytes());
    buf.extend_from_slice(&m.session_port.to_be_bytes());
    write_length_prefixed_string(buf, &m.display_name);
}

// ── Per-message decode helpers ────────────────────────────────────────────────

fn decode_join_request(p: &[u8]) -> Result<JoinRequestMessage, ProtocolError> {
    // 16 (uuid) + 1 (proto ver) + 2 (name_len) + name
    require_len(p, 19, "JoinRequest")?;
    let peer_id = read_uuid(p, 0)?;
    let protocol_version = p[16];
    let (display_name, _) = read_length_prefixed_string(p, 17)?;
    Ok(JoinRequestMessage {
        peer_id,
        protocol_version,
        display_name,
    })
}

fn decode_join_accept(p: &[u8]) -> Result<JoinAcceptMessage, ProtocolError> {
    // 16 (uuid) + 1 (encryption flag) + 2 (name_len) + name
    require_len(p, 19, "JoinAccept")?;
    let peer_id = read_uuid(p, 0)?;
    let encryption_required = p[16] != 0;
    let (display_name, _) = read_length_prefixed_string(p, 17)?;
    Ok(JoinAcceptMessage {
        peer_id,
        encryption_required,
        display_name,
    })
}

fn decode_error(p: &[u8]) -> Result<ErrorMessage, ProtocolError> {
    require_len(p, 3, "Error")?;
    let error_code = match p[0] {
        0x01 => ProtocolErrorCode::ProtocolVersionMismatch,
        0x03 => ProtocolErrorCode::InvalidMessage,
        _ => ProtocolErrorCode::InternalError,
    };
    let (description, _) = read_length_prefixed_string(p, 1)?;
    Ok(ErrorMessage {
        error_code,
        description,
    })
}

fn decode_photo(p: &[u8]) -> Result<PhotoMessage, ProtocolError> {
    // 4 (data_len) + data
    require_len(p, 4, "Photo")?;
    let data_len = u32::from_be_bytes([p[0], p[1], p[2], p[3]]) as usize;
    require_len(p, 4 + data_len, "Photo.data")?;
    let data = p[4..4 + data_len].to_vec();
    Ok(PhotoMessage { data })
}

fn decode_probe(p: &[u8]) -> Result<ProbeMessage, ProtocolError> {
    // 2 (svc_len) + svc + 16 (uuid) + 2 (name_len) + name
    let (service_id, svc_end) = read_length_prefixed_string(p, 0)?;
    let peer_id = read_uuid(p, svc_end)?;
    let (display_name, _) = read_length_prefixed_string(p, svc_end + 16)?;
    Ok(ProbeMessage {
        service_id,
        peer_id,
        display_name,
    })
}

fn decode_announce(p: &[u8]) -> Result<AnnounceMessage, ProtocolError> {
    // 2 (svc_len) + svc + 16 (uuid) + 2 (port) + 2 (name_len) + name
    let (service_id, svc_end) = read_length_prefixed_string(p, 0)?;
    let peer_id = read_uuid(p, svc_end)?;
    let port_off = svc_end + 16;
    require_len(p, port_off + 2, "Announce.session_port")?;
    let session_port = u16::from_be_bytes([p[port_off], p[port_off + 1]]);
    let (display_name, _) = read_length_prefixed_string(p, port_off + 2)?;
    Ok(AnnounceMessage {
        service_id,
        peer_id,
        session_port,
        display_name,
    })
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn require_len(buf: &[u8], needed: usize, context: &str) -> Result<(), ProtocolError> {
    if buf.len() < needed {
        Err(ProtocolError::MalformedPayload(format!(
            "{context}: need {needed} bytes, got {}",
            buf.len()
        )))
    } else {
        Ok(())
    }
}

fn read_uuid(buf: &[u8], offset: usize) -> Result<Uuid, ProtocolError> {
    if buf.len() < offset + 16 {
        return Err(ProtocolError::MalformedPayload(format!(
            "need 16 bytes for UUID at offset {offset}, got {}",
            buf.len().saturating_sub(offset)
        )));
    }
    Ok(Uuid::from_bytes(
        buf[offset..offset + 16].try_into().unwrap(),
    ))
}

/// Writes a 2-byte length prefix followed by the UTF-8 string bytes.
fn write_length_prefixed_string(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    let len = bytes.len().min(u16::MAX as usize) as u16;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&bytes[..len as usize]);
}

/// Reads a 2-byte length prefix and then that many UTF-8 bytes.
/// Returns the string and the offset of the byte after the string.
fn read_length_prefixed_string(buf: &[u8], offset: usize) -> Result<(String, usize), ProtocolError> {
    if buf.len() < offset + 2 {
        return Err(ProtocolError::MalformedPayload(format!(
            "need 2 bytes for string length at offset {offset}"
        )));
    }
    let len = u16::from_be_bytes([buf[offset], buf[offset + 1]]) as usize;
    let start = offset + 2;
    if buf.len() < start + len {
        return Err(ProtocolError::MalformedPayload(format!(
            "string of length {len} at offset {start} exceeds buffer"
        )));
    }
    let s = std::str::from_utf8(&buf[start..start + len])
        .map_err(|e| ProtocolError::MalformedPayload(format!("invalid UTF-8: {e}")))?
        .to_string();
    Ok((s, start + len))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::*;
    use uuid::Uuid;

    fn round_trip(msg: &MeshMessage) -> MeshMessage {
        let encoded = encode_message(msg, 0, 0).expect("encode failed");
        let (decoded, consumed) = decode_message(&encoded).expect("decode failed");
        assert_eq!(
            consumed,
            encoded.len(),
            "consumed bytes should equal total encoded size"
        );
        decoded
    }

    // ── JoinRequest / JoinAccept ──────────────────────────────────────────────

    #[test]
    fn test_join_request_round_trip() {
        let msg = MeshMessage::JoinRequest(JoinRequestMessage {
            peer_id: Uuid::new_v4(),
            protocol_version: 1,
            display_name: "kitchen-phone".to_string(),
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_join_request_with_empty_display_name() {
        let msg = MeshMessage::JoinRequest(JoinRequestMessage {
            peer_id: Uuid::nil(),
            protocol_version: 1,
            display_name: String::new(),
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_join_request_with_max_length_display_name() {
        let long_name = "a".repeat(u16::MAX as usize);
        let msg = MeshMessage::JoinRequest(JoinRequestMessage {
            peer_id: Uuid::new_v4(),
            protocol_version: 1,
            display_name: long_name,
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_join_accept_round_trip() {
        let msg = MeshMessage::JoinAccept(JoinAcceptMessage {
            peer_id: Uuid::new_v4(),
            encryption_required: true,
            display_name: "living-room-ipad".to_string(),
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_join_accept_without_encryption_round_trip() {
        let msg = MeshMessage::JoinAccept(JoinAcceptMessage {
            peer_id: Uuid::new_v4(),
            encryption_required: false,
            display_name: "host".to_string(),
        });
        assert_eq!(round_trip(&msg), msg);
    }

    // ── Leave ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_leave_user_initiated_round_trip() {
        let msg = MeshMessage::Leave {
            reason: LeaveReason::UserInitiated,
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_leave_timeout_round_trip() {
        let msg = MeshMessage::Leave {
            reason: LeaveReason::Timeout,
        };
        assert_eq!(round_trip(&msg), msg);
    }

    // ── Error ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_error_message_round_trip() {
        let msg = MeshMessage::Error(ErrorMessage {
            error_code: ProtocolErrorCode::ProtocolVersionMismatch,
            description: "peer speaks protocol version 2".to_string(),
        });
        assert_eq!(round_trip(&msg), msg);
    }

    // ── Photo ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_photo_round_trip() {
        // PNG signature followed by a fake body
        let msg = MeshMessage::Photo(PhotoMessage {
            data: vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 1, 2, 3],
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_photo_empty_payload_round_trip() {
        let msg = MeshMessage::Photo(PhotoMessage { data: vec![] });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_photo_large_payload_round_trip() {
        let msg = MeshMessage::Photo(PhotoMessage {
            data: vec![0xAB; 256 * 1024],
        });
        assert_eq!(round_trip(&msg), msg);
    }

    // ── Probe / Announce ──────────────────────────────────────────────────────

    #[test]
    fn test_probe_round_trip() {
        let msg = MeshMessage::Probe(ProbeMessage {
            service_id: "photomesh".to_string(),
            peer_id: Uuid::new_v4(),
            display_name: "kitchen-phone".to_string(),
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_announce_round_trip() {
        let msg = MeshMessage::Announce(AnnounceMessage {
            service_id: "photomesh".to_string(),
            peer_id: Uuid::new_v4(),
            session_port: 37800,
            display_name: "living-room-ipad".to_string(),
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_announce_with_empty_service_id_round_trip() {
        let msg = MeshMessage::Announce(AnnounceMessage {
            service_id: String::new(),
            peer_id: Uuid::new_v4(),
            session_port: 0,
            display_name: "x".to_string(),
        });
        assert_eq!(round_trip(&msg), msg);
    }

    // ── Error conditions ──────────────────────────────────────────────────────

    #[test]
    fn test_decode_empty_bytes_returns_insufficient_data() {
        let result = decode_message(&[]);
        assert!(matches!(result, Err(ProtocolError::InsufficientData { .. })));
    }

    #[test]
    fn test_decode_truncated_header_returns_insufficient_data() {
        let result = decode_message(&[0x01, 0x40]); // only 2 bytes
        assert!(matches!(result, Err(ProtocolError::InsufficientData { .. })));
    }

    #[test]
    fn test_decode_unknown_message_type_returns_error() {
        let mut bytes = vec![0u8; 24];
        bytes[0] = PROTOCOL_VERSION;
        bytes[1] = 0xFF; // unknown type
        // payload_length = 0, so no payload needed
        let result = decode_message(&bytes);
        assert!(matches!(result, Err(ProtocolError::UnknownMessageType(0xFF))));
    }

    #[test]
    fn test_decode_wrong_version_returns_error() {
        let mut bytes = vec![0u8; 24];
        bytes[0] = 0x99; // wrong version
        bytes[1] = MessageType::Photo as u8;
        let result = decode_message(&bytes);
        assert!(matches!(result, Err(ProtocolError::UnsupportedVersion(0x99))));
    }

    #[test]
    fn test_decode_payload_length_exceeds_available_returns_error() {
        let mut bytes = vec![0u8; 24];
        bytes[0] = PROTOCOL_VERSION;
        bytes[1] = MessageType::Leave as u8;
        // Declare 100 bytes of payload, but provide none
        bytes[4..8].copy_from_slice(&100u32.to_be_bytes());
        let result = decode_message(&bytes);
        assert!(matches!(
            result,
            Err(ProtocolError::PayloadLengthMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_photo_with_lying_inner_length_returns_malformed() {
        // Inner data_len claims 100 bytes but the payload carries only 4.
        let mut payload = Vec::new();
        payload.extend_from_slice(&100u32.to_be_bytes());
        let mut bytes = vec![0u8; 24];
        bytes[0] = PROTOCOL_VERSION;
        bytes[1] = MessageType::Photo as u8;
        bytes[4..8].copy_from_slice(&(payload.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&payload);

        let result = decode_message(&bytes);
        assert!(matches!(result, Err(ProtocolError::MalformedPayload(_))));
    }

    // ── Header layout ─────────────────────────────────────────────────────────

    #[test]
    fn test_header_has_correct_version_byte() {
        let msg = MeshMessage::Leave {
            reason: LeaveReason::UserInitiated,
        };
        let bytes = encode_message(&msg, 1, 0).unwrap();
        assert_eq!(bytes[0], PROTOCOL_VERSION);
    }

    #[test]
    fn test_header_encodes_sequence_number_correctly() {
        let seq = 0x1234_5678_9ABC_DEF0u64;
        let msg = MeshMessage::Photo(PhotoMessage { data: vec![] });
        let bytes = encode_message(&msg, seq, 0).unwrap();
        let decoded_seq = u64::from_be_bytes(bytes[8..16].try_into().unwrap());
        assert_eq!(decoded_seq, seq);
    }

    #[test]
    fn test_header_encodes_timestamp_correctly() {
        let ts = 0xABCD_EF01_2345_6789u64;
        let msg = MeshMessage::Photo(PhotoMessage { data: vec![] });
        let bytes = encode_message(&msg, 0, ts).unwrap();
        let decoded_ts = u64::from_be_bytes(bytes[16..24].try_into().unwrap());
        assert_eq!(decoded_ts, ts);
    }

    #[test]
    fn test_peek_payload_len_matches_encoded_length() {
        let msg = MeshMessage::Photo(PhotoMessage {
            data: vec![0u8; 77],
        });
        let bytes = encode_message(&msg, 0, 0).unwrap();
        let len = peek_payload_len(&bytes[..HEADER_SIZE]).unwrap();
        assert_eq!(len, bytes.len() - HEADER_SIZE);
    }

    #[test]
    fn test_peek_payload_len_rejects_short_header() {
        let result = peek_payload_len(&[0x01, 0x40, 0x00]);
        assert!(matches!(result, Err(ProtocolError::InsufficientData { .. })));
    }
}
