//! TCP peer links: join handshake, inbound frame pump, and the send registry.
//!
//! One TCP connection per peer pair carries the entire session channel:
//! the join handshake, photo frames, and leave notices, all in the common
//! frame format (24-byte header + payload).
//!
//! # Who owns what
//!
//! Each accepted or dialed connection is split into halves:
//!
//! - The **write half** goes into [`PeerLinks`], the registry the
//!   broadcaster sends through (it implements the `PeerSender` port).
//! - The **read half** is pumped by a per-connection tokio task that turns
//!   frames into [`LinkEvent`]s on the session's event channel.
//!
//! The tasks never touch shared session state directly — every observable
//! effect crosses the event channel so the session manager can apply it
//! from its single owner context.
//!
//! # Handshake
//!
//! Host side (accepting): first frame must be `JoinRequest`; the host
//! accepts automatically and unconditionally — there is no gatekeeping at
//! this layer.  It emits `HandshakeStarted`, replies `JoinAccept`,
//! registers the link, emits `PeerJoined`, then pumps frames.
//!
//! Join side ([`connect`]): dials, sends `JoinRequest`, awaits
//! `JoinAccept`.  A failure at any step surfaces as
//! [`SessionEstablishError`] and leaves nothing registered.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use photomesh_core::{
    decode_message,
    protocol::codec::{encode_message_now, peek_payload_len},
    protocol::messages::{
        JoinAcceptMessage, JoinRequestMessage, MeshMessage, PhotoMessage, HEADER_SIZE,
        PROTOCOL_VERSION,
    },
    protocol::SequenceCounter,
    EncryptionPolicy, PeerId, PeerIdentity, ProtocolError,
};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::application::broadcast::{PeerSender, SendError};

/// Error type for establishing a session link.
#[derive(Debug, Error)]
pub enum SessionEstablishError {
    /// The TCP connection could not be opened.
    #[error("failed to connect to {addr}: {source}")]
    ConnectFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// An I/O error occurred during the handshake.
    #[error("handshake I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A handshake frame could not be decoded.
    #[error("handshake protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The remote answered the handshake with the wrong message type.
    #[error("unexpected handshake reply")]
    UnexpectedReply,

    /// The remote closed the connection mid-handshake.
    #[error("connection closed during handshake")]
    Closed,
}

/// Events produced by link tasks for the session's event pump.
#[derive(Debug)]
pub enum LinkEvent {
    /// An inbound `JoinRequest` arrived; the peer is now `Connecting`.
    HandshakeStarted { identity: PeerIdentity },
    /// The handshake completed and the link is registered.
    PeerJoined { identity: PeerIdentity },
    /// The link closed (leave notice, EOF, or I/O error).
    PeerLeft { peer_id: PeerId },
    /// A photo frame arrived on an established link.
    PhotoReceived { from: PeerId, data: Vec<u8> },
}

/// Registry of the write halves of all established links.
///
/// This is the concrete [`PeerSender`]: the broadcaster fans out through
/// it, one write per target.  Writers are keyed by peer id; a send to a
/// peer with no registered writer fails with [`SendError::LinkClosed`].
pub struct PeerLinks {
    writers: Mutex<HashMap<PeerId, OwnedWriteHalf>>,
    seq: SequenceCounter,
}

impl PeerLinks {
    pub fn new() -> Self {
        Self {
            writers: Mutex::new(HashMap::new()),
            seq: SequenceCounter::new(),
        }
    }

    /// Registers the write half for `peer_id`, replacing any stale one.
    pub async fn register(&self, peer_id: PeerId, writer: OwnedWriteHalf) {
        let mut writers = self.writers.lock().await;
        if writers.insert(peer_id, writer).is_some() {
            warn!("replaced an existing link for peer {peer_id}");
        }
    }

    /// Removes the link for `peer_id`, closing the write half.
    pub async fn remove(&self, peer_id: PeerId) {
        self.writers.lock().await.remove(&peer_id);
    }

    /// Drops every registered link.
    pub async fn clear(&self) {
        self.writers.lock().await.clear();
    }

    /// Number of registered links.
    pub async fn len(&self) -> usize {
        self.writers.lock().await.len()
    }

    /// Writes one already-encoded frame to `peer_id`'s link.
    async fn write_frame(&self, peer_id: PeerId, frame: &[u8]) -> Result<(), SendError> {
        let mut writers = self.writers.lock().await;
        let writer = writers.get_mut(&peer_id).ok_or(SendError::LinkClosed)?;
        writer.write_all(frame).await?;
        Ok(())
    }
}

impl Default for PeerLinks {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PeerSender for PeerLinks {
    async fn send_photo(&self, peer: &PeerIdentity, data: &[u8]) -> Result<(), SendError> {
        let msg = MeshMessage::Photo(PhotoMessage {
            data: data.to_vec(),
        });
        let frame = encode_message_now(&msg, self.seq.next())?;
        self.write_frame(peer.id, &frame).await?;
        debug!("sent {} photo bytes to {peer}", data.len());
        Ok(())
    }
}

// ── Frame I/O ─────────────────────────────────────────────────────────────────

/// Reads one complete frame from `reader`.
///
/// Returns `Ok(None)` on a clean EOF at a frame boundary.  EOF in the
/// middle of a frame, undecodable bytes, and transport failures all come
/// back as errors — the caller treats every one of them as "the link is
/// gone".
pub async fn read_frame(
    reader: &mut OwnedReadHalf,
) -> Result<Option<MeshMessage>, SessionEstablishError> {
    let mut header = [0u8; HEADER_SIZE];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let payload_len = peek_payload_len(&header)?;
    let mut frame = Vec::with_capacity(HEADER_SIZE + payload_len);
    frame.extend_from_slice(&header);
    frame.resize(HEADER_SIZE + payload_len, 0);
    reader.read_exact(&mut frame[HEADER_SIZE..]).await?;

    let (msg, _) = decode_message(&frame)?;
    Ok(Some(msg))
}

/// Encodes and writes one frame to `writer`.
async fn write_message(
    writer: &mut OwnedWriteHalf,
    msg: &MeshMessage,
    seq: &SequenceCounter,
) -> Result<(), SessionEstablishError> {
    let frame = encode_message_now(msg, seq.next())?;
    writer.write_all(&frame).await?;
    Ok(())
}

// ── Host side ─────────────────────────────────────────────────────────────────

/// Accept loop for the hosting side of a session.
///
/// Runs until the listener is dropped or the task is aborted.  Each
/// accepted connection gets its own handshake + pump task, so a peer that
/// stalls mid-handshake never blocks the others.
pub async fn run_host_listener(
    listener: TcpListener,
    local: PeerIdentity,
    policy: EncryptionPolicy,
    links: Arc<PeerLinks>,
    events: mpsc::Sender<LinkEvent>,
) {
    loop {
        let (stream, remote) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!("accept failed: {e}");
                continue;
            }
        };
        debug!("inbound connection from {remote}");

        let local = local.clone();
        let links = Arc::clone(&links);
        let events = events.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_incoming(stream, local, policy, links, events).await {
                debug!("inbound link from {remote} ended: {e}");
            }
        });
    }
}

/// Handshakes one inbound connection and pumps it until it closes.
async fn serve_incoming(
    stream: TcpStream,
    local: PeerIdentity,
    policy: EncryptionPolicy,
    links: Arc<PeerLinks>,
    events: mpsc::Sender<LinkEvent>,
) -> Result<(), SessionEstablishError> {
    let (mut reader, mut writer) = stream.into_split();

    let request = match read_frame(&mut reader).await? {
        Some(MeshMessage::JoinRequest(req)) => req,
        Some(_) => return Err(SessionEstablishError::UnexpectedReply),
        None => return Err(SessionEstablishError::Closed),
    };

    let remote = PeerIdentity {
        id: request.peer_id,
        display_name: request.display_name,
    };
    info!("join request from {remote}");
    let _ = events
        .send(LinkEvent::HandshakeStarted {
            identity: remote.clone(),
        })
        .await;

    // Automatic, unconditional accept.
    let accept = MeshMessage::JoinAccept(JoinAcceptMessage {
        peer_id: local.id,
        encryption_required: policy == EncryptionPolicy::Required,
        display_name: local.display_name.clone(),
    });
    let seq = SequenceCounter::new();
    write_message(&mut writer, &accept, &seq).await?;

    links.register(remote.id, writer).await;
    let _ = events
        .send(LinkEvent::PeerJoined {
            identity: remote.clone(),
        })
        .await;

    pump_frames(reader, remote.id, links, events).await;
    Ok(())
}

// ── Join side ─────────────────────────────────────────────────────────────────

/// Dials `addr` and performs the join handshake as the joining peer.
///
/// On success the link is registered in `links`, a `PeerJoined` event is
/// emitted, the inbound pump task is spawned, and the host's identity is
/// returned.  On failure nothing is registered.
///
/// # Errors
///
/// Returns [`SessionEstablishError`] if the dial, the request write, or
/// the accept read fails, or if the host answers with anything other than
/// `JoinAccept`.
pub async fn connect(
    addr: SocketAddr,
    local: PeerIdentity,
    links: Arc<PeerLinks>,
    events: mpsc::Sender<LinkEvent>,
) -> Result<PeerIdentity, SessionEstablishError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|source| SessionEstablishError::ConnectFailed { addr, source })?;
    let (mut reader, mut writer) = stream.into_split();

    let request = MeshMessage::JoinRequest(JoinRequestMessage {
        peer_id: local.id,
        protocol_version: PROTOCOL_VERSION,
        display_name: local.display_name.clone(),
    });
    let seq = SequenceCounter::new();
    write_message(&mut writer, &request, &seq).await?;

    let accept = match read_frame(&mut reader).await? {
        Some(MeshMessage::JoinAccept(acc)) => acc,
        Some(_) => return Err(SessionEstablishError::UnexpectedReply),
        None => return Err(SessionEstablishError::Closed),
    };

    let host = PeerIdentity {
        id: accept.peer_id,
        display_name: accept.display_name,
    };
    info!(
        "joined session hosted by {host} (encryption required: {})",
        accept.encryption_required
    );

    links.register(host.id, writer).await;
    let _ = events
        .send(LinkEvent::PeerJoined {
            identity: host.clone(),
        })
        .await;

    let pump_links = Arc::clone(&links);
    let pump_events = events.clone();
    let host_id = host.id;
    tokio::spawn(async move {
        pump_frames(reader, host_id, pump_links, pump_events).await;
    });

    Ok(host)
}

// ── Shared pump ───────────────────────────────────────────────────────────────

/// Reads frames from an established link until it closes, translating
/// them into [`LinkEvent`]s.
///
/// Leave notices, clean EOF, and transport errors all end the same way:
/// the link is deregistered and a single `PeerLeft` is emitted.
async fn pump_frames(
    mut reader: OwnedReadHalf,
    peer_id: PeerId,
    links: Arc<PeerLinks>,
    events: mpsc::Sender<LinkEvent>,
) {
    loop {
        match read_frame(&mut reader).await {
            Ok(Some(MeshMessage::Photo(photo))) => {
                let _ = events
                    .send(LinkEvent::PhotoReceived {
                        from: peer_id,
                        data: photo.data,
                    })
                    .await;
            }
            Ok(Some(MeshMessage::Leave { reason })) => {
                debug!("peer {peer_id} left: {reason:?}");
                break;
            }
            Ok(Some(MeshMessage::Error(err))) => {
                warn!("peer {peer_id} reported error {:?}: {}", err.error_code, err.description);
            }
            Ok(Some(other)) => {
                warn!(
                    "unexpected frame on established link from {peer_id}: {:?}",
                    std::mem::discriminant(&other)
                );
            }
            Ok(None) => {
                debug!("peer {peer_id} closed the link");
                break;
            }
            Err(e) => {
                debug!("link to {peer_id} failed: {e}");
                break;
            }
        }
    }

    links.remove(peer_id).await;
    let _ = events.send(LinkEvent::PeerLeft { peer_id }).await;
}

// ── Tests ─────────────────────────────────────────────────────────────────────
