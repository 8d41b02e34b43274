//! UDP advertiser: answers discovery probes while the session is hosted.
//!
//! While hosting, the advertiser binds a UDP socket on the discovery port
//! (default 37801) and answers `Probe` datagrams.  On receiving a valid
//! probe it:
//!
//! 1. Compares the probe's service id with its own, byte for byte.
//! 2. If they match, sends a unicast `Announce` back to the probe's source
//!    address carrying the local identity and the TCP session port.
//! 3. If they do not match, stays silent.  A mismatched service id is
//!    *absence*, not an error: the browsing peer must simply never find
//!    this host.
//!
//! The responder runs as a blocking loop on a dedicated thread to avoid
//! tying up the Tokio runtime with synchronous socket I/O.
//!
//! # How UDP discovery works (for beginners)
//!
//! UDP (User Datagram Protocol) is connectionless: no handshake, no
//! delivery guarantee, no ordering.  Those trade-offs suit discovery
//! perfectly:
//!
//! 1. A browsing peer sends a `Probe` packet to the LAN broadcast address
//!    (e.g. `255.255.255.255`) on the discovery port.  Every device on the
//!    LAN receives it.
//!
//! 2. Each advertising host listening on that port checks the service id.
//!    On a match it sends a unicast `Announce` back to the prober's source
//!    address.
//!
//! 3. The browser now knows the host's IP + TCP session port and can open
//!    a connection to begin the join handshake.
//!
//! # Read timeout
//!
//! The socket carries a 500 ms read timeout.  `recv_from` blocks at most
//! that long before returning a timeout error, at which point the loop
//! checks the `running` flag and exits cleanly if `stop` was called.

use std::net::{SocketAddr, UdpSocket};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use photomesh_core::{
    decode_message, encode_message,
    protocol::messages::{AnnounceMessage, MeshMessage},
    protocol::SequenceCounter,
    PeerIdentity,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Error type for advertiser operations.
#[derive(Debug, Error)]
pub enum AdvertiseError {
    /// The UDP socket could not be bound.
    #[error("failed to bind advertise socket on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Answers discovery probes on a background thread while active.
///
/// Start/stop are idempotent: starting an already-advertising instance is
/// a no-op, as is stopping one that is not running.  Dropping the
/// advertiser stops it.
pub struct Advertiser {
    running: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl Advertiser {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Returns `true` while the responder thread is active.
    pub fn is_advertising(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Binds the discovery socket and spawns the responder thread.
    ///
    /// `session_port` is the TCP port embedded in every `Announce` reply —
    /// the port the host is accepting join requests on.
    ///
    /// # Errors
    ///
    /// Returns [`AdvertiseError::BindFailed`] if the socket cannot be bound.
    pub fn start(
        &mut self,
        discovery_port: u16,
        service_id: String,
        local: PeerIdentity,
        session_port: u16,
    ) -> Result<(), AdvertiseError> {
        if self.is_advertising() {
            debug!("advertiser already running; start is a no-op");
            return Ok(());
        }

        let addr: SocketAddr = ([0, 0, 0, 0], discovery_port).into();
        let socket =
            UdpSocket::bind(addr).map_err(|source| AdvertiseError::BindFailed { addr, source })?;
        socket
            .set_read_timeout(Some(Duration::from_millis(500)))
            .ok();

        self.running.store(true, Ordering::Relaxed);
        let running = Arc::clone(&self.running);

        let handle = std::thread::Builder::new()
            .name("photomesh-advertise".to_string())
            .spawn(move || {
                advertise_loop(socket, service_id, local, session_port, running);
            })
            .expect("failed to spawn advertise thread");
        self.handle = Some(handle);

        info!("advertiser listening on UDP {addr}");
        Ok(())
    }

    /// Signals the responder thread to exit and waits for it.
    ///
    /// No-op when the advertiser is not running.
    pub fn stop(&mut self) {
        if !self.is_advertising() {
            return;
        }
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        info!("advertiser stopped");
    }
}

impl Default for Advertiser {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Advertiser {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The main receive loop executed on the advertise thread.
fn advertise_loop(
    socket: UdpSocket,
    service_id: String,
    local: PeerIdentity,
    session_port: u16,
    running: Arc<AtomicBool>,
) {
    let seq = SequenceCounter::new();
    let mut buf = vec![0u8; 4096];

    while running.load(Ordering::Relaxed) {
        let (len, src) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(e) if is_timeout_error(&e) => continue,
            Err(e) => {
                error!("advertise recv error: {e}");
                continue;
            }
        };

        let datagram = &buf[..len];
        match decode_message(datagram) {
            Ok((MeshMessage::Probe(probe), _)) => {
                // Byte-identical service id or silence.
                if probe.service_id != service_id {
                    debug!(
                        "ignoring probe from {src} for service {:?} (advertising {:?})",
                        probe.service_id, service_id
                    );
                    continue;
                }
                debug!(
                    "probe from {src}: peer_id={}, name={}",
                    probe.peer_id, probe.display_name
                );
                send_announce(&socket, src, &service_id, &local, session_port, &seq);
            }
            Ok((other, _)) => {
                warn!(
                    "unexpected message on discovery port from {src}: {:?}",
                    std::mem::discriminant(&other)
                );
            }
            Err(e) => {
                debug!("failed to decode discovery datagram from {src}: {e}");
            }
        }
    }

    info!("advertise responder exiting");
}

/// Sends a unicast `Announce` back to `dest`.
fn send_announce(
    socket: &UdpSocket,
    dest: SocketAddr,
    service_id: &str,
    local: &PeerIdentity,
    session_port: u16,
    seq: &SequenceCounter,
) {
    let msg = MeshMessage::Announce(AnnounceMessage {
        service_id: service_id.to_string(),
        peer_id: local.id,
        session_port,
        display_name: local.display_name.clone(),
    });
    match encode_message(&msg, seq.next(), current_timestamp_us()) {
        Ok(bytes) => {
            if let Err(e) = socket.send_to(&bytes, dest) {
                warn!("failed to send Announce to {dest}: {e}");
            }
        }
        Err(e) => error!("failed to encode Announce: {e}"),
    }
}

/// Returns `true` for OS timeout / would-block errors that should be retried.
fn is_timeout_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

/// Returns the current time as microseconds since the Unix epoch.
fn current_timestamp_us() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
