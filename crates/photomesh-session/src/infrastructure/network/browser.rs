//! UDP browser: probes the LAN for hosts advertising a service id.
//!
//! The browser is the active half of discovery.  On a dedicated thread it
//! repeatedly broadcasts a `Probe` datagram on the discovery port and
//! listens for unicast `Announce` replies.  Each matching reply becomes a
//! [`DiscoveredPeer`] on the channel handed back from [`Browser::discover`].
//!
//! A host advertising a different service id never replies, so the browser
//! reports it as nothing at all — absence, not an error.  Finding nobody
//! is a normal outcome (the channel simply stays empty).
//!
//! The probe/listen loop uses the same 500 ms read-timeout pattern as the
//! advertiser so `stop` is honoured within one timeout interval.

use std::net::{SocketAddr, UdpSocket};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use photomesh_core::{
    decode_message, encode_message,
    protocol::messages::{MeshMessage, ProbeMessage},
    protocol::SequenceCounter,
    PeerIdentity,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Error type for browser operations.
#[derive(Debug, Error)]
pub enum BrowseError {
    /// The UDP probe socket could not be bound.
    #[error("failed to bind browse socket: {0}")]
    BindFailed(#[source] std::io::Error),
}

/// A host found during browsing.
#[derive(Debug, Clone)]
pub struct DiscoveredPeer {
    /// Identity the host announced.
    pub identity: PeerIdentity,
    /// Source address the `Announce` arrived from.
    pub addr: SocketAddr,
    /// TCP address to connect to for the join handshake (the source IP
    /// combined with the announced session port).
    pub session_addr: SocketAddr,
}

/// Browser settings.
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// UDP port the probes are sent to.
    pub discovery_port: u16,
    /// How often a probe is rebroadcast while browsing.
    pub probe_interval: Duration,
    /// Where probes are sent.  `None` means the LAN broadcast address
    /// (`255.255.255.255`); tests point this at loopback instead.
    pub probe_target: Option<SocketAddr>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            discovery_port: 37801,
            probe_interval: Duration::from_secs(1),
            probe_target: None,
        }
    }
}

/// Probes for advertising hosts on a background thread.
///
/// Restartable: `discover` after `stop` starts a fresh browse with a fresh
/// channel.  Dropping the browser stops it.
pub struct Browser {
    config: BrowserConfig,
    running: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl Browser {
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Returns `true` while the probe thread is active.
    pub fn is_browsing(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Starts probing for hosts advertising `service_id`.
    ///
    /// Returns the channel on which [`DiscoveredPeer`]s arrive.  Calling
    /// `discover` while already browsing restarts the browse (the previous
    /// channel closes).
    ///
    /// # Errors
    ///
    /// Returns [`BrowseError::BindFailed`] if the probe socket cannot be
    /// bound.
    pub fn discover(
        &mut self,
        service_id: String,
        local: PeerIdentity,
    ) -> Result<mpsc::Receiver<DiscoveredPeer>, BrowseError> {
        self.stop();

        let socket = UdpSocket::bind("0.0.0.0:0").map_err(BrowseError::BindFailed)?;
        socket.set_broadcast(true).ok();
        socket
            .set_read_timeout(Some(Duration::from_millis(500)))
            .ok();

        let target = self.config.probe_target.unwrap_or_else(|| {
            SocketAddr::from(([255, 255, 255, 255], self.config.discovery_port))
        });
        let probe_interval = self.config.probe_interval;

        let (tx, rx) = mpsc::channel(64);
        self.running.store(true, Ordering::Relaxed);
        let running = Arc::clone(&self.running);

        let handle = std::thread::Builder::new()
            .name("photomesh-browse".to_string())
            .spawn(move || {
                browse_loop(socket, target, probe_interval, service_id, local, tx, running);
            })
            .expect("failed to spawn browse thread");
        self.handle = Some(handle);

        info!("browsing for hosts via {target}");
        Ok(rx)
    }

    /// Stops the probe thread and waits for it.  No-op when not browsing.
    pub fn stop(&mut self) {
        if !self.is_browsing() {
            return;
        }
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        info!("browser stopped");
    }
}

impl Drop for Browser {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Probe/listen loop executed on the browse thread.
fn browse_loop(
    socket: UdpSocket,
    target: SocketAddr,
    probe_interval: Duration,
    service_id: String,
    local: PeerIdentity,
    tx: mpsc::Sender<DiscoveredPeer>,
    running: Arc<AtomicBool>,
) {
    let seq = SequenceCounter::new();
    let mut buf = vec![0u8; 4096];
    let mut last_probe: Option<Instant> = None;

    while running.load(Ordering::Relaxed) {
        let due = last_probe.map_or(true, |t| t.elapsed() >= probe_interval);
        if due {
            send_probe(&socket, target, &service_id, &local, &seq);
            last_probe = Some(Instant::now());
        }

        let (len, src) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(e) if is_timeout_error(&e) => continue,
            Err(e) => {
                error!("browse recv error: {e}");
                continue;
            }
        };

        match decode_message(&buf[..len]) {
            Ok((MeshMessage::Announce(announce), _)) => {
                if announce.service_id != service_id {
                    // Should not happen (mismatched hosts stay silent), but
                    // a stray reply must not surface as a discovery.
                    debug!("ignoring announce for service {:?}", announce.service_id);
                    continue;
                }
                if announce.peer_id == local.id {
                    continue; // our own advertisement echoed back
                }
                debug!(
                    "announce from {src}: peer_id={}, name={}, session_port={}",
                    announce.peer_id, announce.display_name, announce.session_port
                );
                let peer = DiscoveredPeer {
                    identity: PeerIdentity {
                        id: announce.peer_id,
                        display_name: announce.display_name,
                    },
                    addr: src,
                    session_addr: SocketAddr::new(src.ip(), announce.session_port),
                };
                if tx.blocking_send(peer).is_err() {
                    // Receiver dropped – caller stopped caring.
                    break;
                }
            }
            Ok((other, _)) => {
                warn!(
                    "unexpected message on browse socket from {src}: {:?}",
                    std::mem::discriminant(&other)
                );
            }
            Err(e) => {
                debug!("failed to decode browse datagram from {src}: {e}");
            }
        }
    }

    info!("browse loop exiting");
}

/// Sends one `Probe` to `target`.
fn send_probe(
    socket: &UdpSocket,
    target: SocketAddr,
    service_id: &str,
    local: &PeerIdentity,
    seq: &SequenceCounter,
) {
    let msg = MeshMessage::Probe(ProbeMessage {
        service_id: service_id.to_string(),
        peer_id: local.id,
        display_name: local.display_name.clone(),
    });
    match encode_message(&msg, seq.next(), current_timestamp_us()) {
        Ok(bytes) => {
            if let Err(e) = socket.send_to(&bytes, target) {
                warn!("failed to send Probe to {target}: {e}");
            }
        }
        Err(e) => error!("failed to encode Probe: {e}"),
    }
}

fn is_timeout_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

fn current_timestamp_us() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
