//! Caller-facing session bridge: the [`SessionManager`] and its observers.
//!
//! The photo grid, capture UI, and app chrome are external collaborators.
//! They hold a `SessionManager`, call its operations, and receive events
//! back through registered observers and callbacks.  Nothing in this crate
//! renders anything.
//!
//! # The single owner context (for beginners)
//!
//! Transport callbacks arrive concurrently: every TCP link pumps frames on
//! its own tokio task, and the UDP threads run on their own OS threads.
//! None of them touch session state directly.  Instead they emit
//! [`LinkEvent`]s on a channel, and one event-pump task — spawned when the
//! manager is created — consumes that channel and applies each event to
//! the peer tracker and the feed in order.  All shared-state mutation is
//! marshaled onto that one context, so the tracker and the feed keep their
//! single-writer discipline without fine-grained locking.
//!
//! Observer callbacks are invoked *after* the state lock is released, so
//! an observer may call back into the manager without deadlocking.
//!
//! # Lifecycle
//!
//! A `SessionManager` is an explicitly constructed instance; there are no
//! globals.  Creating a new manager starts from an empty peer set and an
//! empty feed — peer state is replaced, never merged.  Dropping the
//! manager aborts its tasks and stops its discovery threads; observers
//! unsubscribe implicitly by the manager going away.

use std::sync::Arc;

use photomesh_core::{
    ConnectionState, EncryptionPolicy, FeedEntry, PeerIdentity, PeerRecord,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::broadcast::{BroadcastOutcome, Broadcaster, PeerSender, SendFailure};
use crate::application::receive_feed::FeedIntake;
use crate::application::track_peers::{PeerTracker, StateChange};
use crate::infrastructure::network::advertiser::{AdvertiseError, Advertiser};
use crate::infrastructure::network::browser::{
    Browser, BrowserConfig, BrowseError, DiscoveredPeer,
};
use crate::infrastructure::network::peer_link::{
    connect, run_host_listener, LinkEvent, PeerLinks, SessionEstablishError,
};
use crate::infrastructure::storage::config::SessionConfig;

/// Error type for session-level operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The TCP session listener could not be bound.
    #[error("failed to bind session listener: {0}")]
    Listen(#[source] std::io::Error),

    /// Starting the advertiser failed.
    #[error(transparent)]
    Advertise(#[from] AdvertiseError),

    /// Starting the browser failed.
    #[error(transparent)]
    Browse(#[from] BrowseError),

    /// A join handshake failed.
    #[error(transparent)]
    Establish(#[from] SessionEstablishError),
}

/// Receives session events on behalf of the embedding application.
///
/// Implementations must be cheap and non-blocking; they are called from
/// the session's event context.
pub trait SessionObserver: Send + Sync {
    /// A peer's connection state changed.
    fn on_state_changed(&self, peer: &PeerIdentity, state: ConnectionState);
    /// A photo arrived from a peer and was accepted into the feed.
    fn on_data_received(&self, peer: &PeerIdentity, bytes: &[u8]);
}

type FeedChangedFn = Arc<dyn Fn() + Send + Sync>;
type SendErrorFn = Arc<dyn Fn(&SendFailure) + Send + Sync>;
type SessionErrorFn = Arc<dyn Fn(&SessionError) + Send + Sync>;

/// Mutable session state, guarded by one lock and mutated only from the
/// event pump and the manager's own operations.
struct Shared {
    tracker: PeerTracker,
    intake: FeedIntake,
    observers: Vec<Arc<dyn SessionObserver>>,
    feed_changed: Vec<FeedChangedFn>,
    send_error: Vec<SendErrorFn>,
    session_error: Vec<SessionErrorFn>,
}

impl Shared {
    fn new() -> Self {
        Self {
            tracker: PeerTracker::new(),
            intake: FeedIntake::new(),
            observers: Vec::new(),
            feed_changed: Vec::new(),
            send_error: Vec::new(),
            session_error: Vec::new(),
        }
    }
}

/// State held while hosting is active.
struct HostingState {
    /// The actual bound port (resolves port 0 to the OS-assigned one).
    port: u16,
    accept_task: JoinHandle<()>,
}

/// The one session a device participates in.
///
/// Composes the advertiser, browser, link registry, peer tracker, feed,
/// and broadcaster, and owns the event pump that ties them together.
pub struct SessionManager {
    local: PeerIdentity,
    policy: EncryptionPolicy,
    config: SessionConfig,
    shared: Arc<Mutex<Shared>>,
    links: Arc<PeerLinks>,
    broadcaster: Broadcaster,
    advertiser: std::sync::Mutex<Advertiser>,
    browser: std::sync::Mutex<Browser>,
    hosting: std::sync::Mutex<Option<HostingState>>,
    link_events: mpsc::Sender<LinkEvent>,
    pump_task: JoinHandle<()>,
}

impl SessionManager {
    /// Creates a manager with a freshly generated local identity.
    ///
    /// Must be called from within a tokio runtime (the event pump task is
    /// spawned here).  The local identity is created exactly once per
    /// manager; encryption policy is `Required`.
    pub fn new(config: SessionConfig) -> Self {
        let local = PeerIdentity::generate(config.session.display_name.clone());
        info!("session manager created as {local}");

        let shared = Arc::new(Mutex::new(Shared::new()));
        let links = Arc::new(PeerLinks::new());
        let broadcaster = Broadcaster::new(Arc::clone(&links) as Arc<dyn PeerSender>);

        let browser_config = BrowserConfig {
            discovery_port: config.network.discovery_port,
            probe_target: config
                .network
                .probe_address
                .as_deref()
                .and_then(|s| s.parse().ok()),
            ..BrowserConfig::default()
        };

        let (link_events, rx) = mpsc::channel(256);
        let pump_shared = Arc::clone(&shared);
        let pump_task = tokio::spawn(event_pump(rx, pump_shared));

        Self {
            local,
            policy: EncryptionPolicy::Required,
            config,
            shared,
            links,
            broadcaster,
            advertiser: std::sync::Mutex::new(Advertiser::new()),
            browser: std::sync::Mutex::new(Browser::new(browser_config)),
            hosting: std::sync::Mutex::new(None),
            link_events,
            pump_task,
        }
    }

    /// The identity this device presents to peers.
    pub fn local_identity(&self) -> &PeerIdentity {
        &self.local
    }

    // ── Hosting ───────────────────────────────────────────────────────────────

    /// Binds the session listener and starts advertising.
    ///
    /// Idempotent: calling while already hosting is a no-op.  With
    /// `session_port = 0` the OS picks a port; [`Self::hosting_port`]
    /// reports the bound one.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Listen`] if the TCP listener cannot be
    /// bound, or [`SessionError::Advertise`] if the discovery socket is
    /// taken.
    pub async fn start_hosting(&self) -> Result<(), SessionError> {
        if self.hosting.lock().unwrap().is_some() {
            debug!("already hosting; start_hosting is a no-op");
            return Ok(());
        }

        let bind = format!(
            "{}:{}",
            self.config.network.bind_address, self.config.network.session_port
        );
        let listener = TcpListener::bind(&bind).await.map_err(SessionError::Listen)?;
        let port = listener.local_addr().map_err(SessionError::Listen)?.port();

        let accept_task = tokio::spawn(run_host_listener(
            listener,
            self.local.clone(),
            self.policy,
            Arc::clone(&self.links),
            self.link_events.clone(),
        ));

        if let Err(e) = self.advertiser.lock().unwrap().start(
            self.config.network.discovery_port,
            self.config.session.service_id.clone(),
            self.local.clone(),
            port,
        ) {
            accept_task.abort();
            return Err(e.into());
        }

        *self.hosting.lock().unwrap() = Some(HostingState { port, accept_task });
        info!("hosting session on TCP port {port}");
        Ok(())
    }

    /// Stops accepting new peers and withdraws the advertisement.
    ///
    /// Established links stay up; peers already in the session keep
    /// exchanging photos.  No-op when not hosting.
    pub fn stop_hosting(&self) {
        let Some(state) = self.hosting.lock().unwrap().take() else {
            return;
        };
        state.accept_task.abort();
        self.advertiser.lock().unwrap().stop();
        info!("stopped hosting");
    }

    /// The bound session port while hosting, if any.
    pub fn hosting_port(&self) -> Option<u16> {
        self.hosting.lock().unwrap().as_ref().map(|s| s.port)
    }

    // ── Browsing ──────────────────────────────────────────────────────────────

    /// Starts probing the LAN for hosts advertising this service id.
    ///
    /// Returns the stream of discoveries.  Finding nobody is a normal
    /// outcome — the channel just stays empty until a matching host
    /// appears or the browse is stopped.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Browse`] if the probe socket cannot be
    /// bound.
    pub fn browse_peers(&self) -> Result<mpsc::Receiver<DiscoveredPeer>, SessionError> {
        let rx = self
            .browser
            .lock()
            .unwrap()
            .discover(self.config.session.service_id.clone(), self.local.clone())?;
        Ok(rx)
    }

    /// Stops the browse, if one is running.
    pub fn stop_browsing(&self) {
        self.browser.lock().unwrap().stop();
    }

    // ── Joining ───────────────────────────────────────────────────────────────

    /// Walks `peer` through `Connecting → Connected` by performing the
    /// join handshake.
    ///
    /// On failure the peer reverts to `NotConnected`, the error is also
    /// surfaced to `on_session_error` subscribers, and the session remains
    /// usable.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Establish`] when the dial or handshake
    /// fails.
    pub async fn join_session(&self, peer: &DiscoveredPeer) -> Result<(), SessionError> {
        self.apply_transition(&peer.identity, ConnectionState::Connecting)
            .await;

        match connect(
            peer.session_addr,
            self.local.clone(),
            Arc::clone(&self.links),
            self.link_events.clone(),
        )
        .await
        {
            Ok(host) => {
                debug!("join handshake with {host} complete");
                Ok(())
            }
            Err(e) => {
                warn!("join to {} failed: {e}", peer.session_addr);
                self.apply_transition(&peer.identity, ConnectionState::NotConnected)
                    .await;
                let error = SessionError::Establish(e);
                let subscribers: Vec<SessionErrorFn> =
                    self.shared.lock().await.session_error.clone();
                for f in &subscribers {
                    f(&error);
                }
                Err(error)
            }
        }
    }

    // ── Photos ────────────────────────────────────────────────────────────────

    /// Adds a locally captured or imported photo to the feed.
    ///
    /// Returns `false` if the bytes were rejected by the image check.
    /// Adding does not send anything; call [`Self::broadcast`] to share.
    pub async fn add_local_photo(&self, bytes: Vec<u8>) -> bool {
        let (accepted, subscribers) = {
            let mut shared = self.shared.lock().await;
            let accepted = shared.intake.accept(bytes).is_some();
            let subscribers = if accepted {
                shared.feed_changed.clone()
            } else {
                Vec::new()
            };
            (accepted, subscribers)
        };
        for f in &subscribers {
            f();
        }
        accepted
    }

    /// Sends `bytes` to every peer connected right now.
    ///
    /// An empty session makes this a silent no-op.  Per-peer failures are
    /// surfaced to `on_send_error` subscribers and in the returned
    /// outcome; they never fail the broadcast as a whole.
    pub async fn broadcast(&self, bytes: &[u8]) -> BroadcastOutcome {
        let (targets, subscribers) = {
            let shared = self.shared.lock().await;
            (shared.tracker.connected_peers(), shared.send_error.clone())
        };

        let outcome = self.broadcaster.broadcast(bytes, &targets).await;
        for failure in &outcome.failures {
            for f in &subscribers {
                f(failure);
            }
        }
        outcome
    }

    // ── Snapshots ─────────────────────────────────────────────────────────────

    /// Identities of the peers currently `Connected`.
    pub async fn connected_peers(&self) -> Vec<PeerIdentity> {
        self.shared.lock().await.tracker.connected_peers()
    }

    /// All known peers with their current states.
    pub async fn peer_snapshot(&self) -> Vec<PeerRecord> {
        self.shared.lock().await.tracker.snapshot()
    }

    /// Most-recent-first copy of the feed.
    pub async fn feed_snapshot(&self) -> Vec<FeedEntry> {
        self.shared.lock().await.intake.snapshot()
    }

    // ── Observers and callbacks ───────────────────────────────────────────────

    /// Registers an observer for state changes and received photos.
    pub async fn add_observer(&self, observer: Arc<dyn SessionObserver>) {
        self.shared.lock().await.observers.push(observer);
    }

    /// Registers a callback fired whenever the feed gains an entry.
    pub async fn on_feed_changed(&self, f: impl Fn() + Send + Sync + 'static) {
        self.shared.lock().await.feed_changed.push(Arc::new(f));
    }

    /// Registers a callback fired for each per-peer send failure.
    pub async fn on_send_error(&self, f: impl Fn(&SendFailure) + Send + Sync + 'static) {
        self.shared.lock().await.send_error.push(Arc::new(f));
    }

    /// Registers a callback fired when a session operation fails.
    pub async fn on_session_error(&self, f: impl Fn(&SessionError) + Send + Sync + 'static) {
        self.shared.lock().await.session_error.push(Arc::new(f));
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    /// Records a transition and notifies observers outside the lock.
    async fn apply_transition(&self, identity: &PeerIdentity, state: ConnectionState) {
        let (change, observers) = {
            let mut shared = self.shared.lock().await;
            let change = shared.tracker.record_transition(identity, state);
            (change, shared.observers.clone())
        };
        notify_state_change(&observers, change);
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.pump_task.abort();
        if let Ok(mut hosting) = self.hosting.lock() {
            if let Some(state) = hosting.take() {
                state.accept_task.abort();
            }
        }
        // Advertiser and Browser stop themselves on drop.
    }
}

/// Calls `on_state_changed` on every observer for one change.
fn notify_state_change(observers: &[Arc<dyn SessionObserver>], change: Option<StateChange>) {
    if let Some(change) = change {
        for obs in observers {
            obs.on_state_changed(&change.identity, change.current);
        }
    }
}

/// The event pump: applies transport events to session state in order.
async fn event_pump(mut rx: mpsc::Receiver<LinkEvent>, shared: Arc<Mutex<Shared>>) {
    while let Some(event) = rx.recv().await {
        match event {
            LinkEvent::HandshakeStarted { identity } => {
                let (change, observers) = {
                    let mut s = shared.lock().await;
                    let change = s
                        .tracker
                        .record_transition(&identity, ConnectionState::Connecting);
                    (change, s.observers.clone())
                };
                notify_state_change(&observers, change);
            }
            LinkEvent::PeerJoined { identity } => {
                let (changes, observers) = {
                    let mut s = shared.lock().await;
                    // A joiner-side link never saw HandshakeStarted, so
                    // walk the peer through Connecting first.
                    let first = s
                        .tracker
                        .record_transition(&identity, ConnectionState::Connecting);
                    let second = s
                        .tracker
                        .record_transition(&identity, ConnectionState::Connected);
                    ([first, second], s.observers.clone())
                };
                for change in changes {
                    notify_state_change(&observers, change);
                }
            }
            LinkEvent::PeerLeft { peer_id } => {
                let (change, observers) = {
                    let mut s = shared.lock().await;
                    match s.tracker.identity_of(peer_id) {
                        Some(identity) => {
                            let change = s
                                .tracker
                                .record_transition(&identity, ConnectionState::NotConnected);
                            (change, s.observers.clone())
                        }
                        None => {
                            debug!("departure of unknown peer {peer_id}");
                            (None, Vec::new())
                        }
                    }
                };
                notify_state_change(&observers, change);
            }
            LinkEvent::PhotoReceived { from, data } => {
                let (sender, accepted, observers, subscribers) = {
                    let mut s = shared.lock().await;
                    let sender = s.tracker.identity_of(from);
                    let accepted = s.intake.accept(data.clone()).is_some();
                    let subscribers = if accepted {
                        s.feed_changed.clone()
                    } else {
                        Vec::new()
                    };
                    (sender, accepted, s.observers.clone(), subscribers)
                };
                if accepted {
                    if let Some(sender) = sender {
                        for obs in &observers {
                            obs.on_data_received(&sender, &data);
                        }
                    }
                    for f in &subscribers {
                        f();
                    }
                }
            }
        }
    }
    debug!("event pump exiting");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
