//! Broadcast fan-out: one independent send per connected peer.
//!
//! The broadcast contract is deliberately narrow:
//!
//! - Targets are exactly the peers connected *at the moment of the call*.
//!   A peer that connects a millisecond later gets nothing; the payload is
//!   never queued for later delivery.
//! - An empty target set is a silent no-op: no error, no side effect.
//! - A failed send to one target never blocks or fails delivery to the
//!   others, and there is no automatic retry.  Failures come back to the
//!   caller as per-peer [`SendFailure`]s.
//!
//! The use case depends on the [`PeerSender`] port rather than a concrete
//! socket, so it is fully testable with a mock.

use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use photomesh_core::{PeerIdentity, ProtocolError};
use thiserror::Error;
use tracing::{debug, warn};

/// A broadcast failed to serialize or transmit to one target.
///
/// Non-fatal and per-target: the session stays usable and the other
/// targets are unaffected.
#[derive(Debug, Error)]
pub enum SendError {
    /// The payload could not be framed for the wire.
    #[error("failed to encode payload: {0}")]
    Serialization(#[from] ProtocolError),

    /// The transport rejected the write.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// No live link exists for the target peer (it dropped between the
    /// target snapshot and the write).
    #[error("no open link to peer")]
    LinkClosed,
}

/// A single failed delivery within one broadcast.
#[derive(Debug)]
pub struct SendFailure {
    /// The peer that did not receive the payload.
    pub peer: PeerIdentity,
    /// Why the send failed.
    pub error: SendError,
}

/// Port for delivering one payload to one peer.
///
/// Implemented by the TCP link registry in the infrastructure layer and by
/// a `mockall` mock in tests.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PeerSender: Send + Sync {
    /// Sends `data` to `peer`, fire-and-forget: resolution means the bytes
    /// were handed to the transport, not that the peer processed them.
    async fn send_photo(&self, peer: &PeerIdentity, data: &[u8]) -> Result<(), SendError>;
}

/// Result of one broadcast call.
#[derive(Debug, Default)]
pub struct BroadcastOutcome {
    /// Peers the payload was handed to the transport for.
    pub delivered: Vec<PeerIdentity>,
    /// Per-peer failures; empty on a clean broadcast.
    pub failures: Vec<SendFailure>,
}

impl BroadcastOutcome {
    /// Returns `true` if nothing was sent and nothing failed.
    pub fn is_noop(&self) -> bool {
        self.delivered.is_empty() && self.failures.is_empty()
    }
}

/// Fans payloads out to the current target set through a [`PeerSender`].
pub struct Broadcaster {
    sender: Arc<dyn PeerSender>,
}

impl Broadcaster {
    pub fn new(sender: Arc<dyn PeerSender>) -> Self {
        Self { sender }
    }

    /// Sends `payload` to every peer in `targets` independently.
    ///
    /// The caller supplies the target set (the connected peers at call
    /// time).  An empty set returns immediately with a no-op outcome —
    /// the payload is dropped, not queued.
    pub async fn broadcast(&self, payload: &[u8], targets: &[PeerIdentity]) -> BroadcastOutcome {
        if targets.is_empty() {
            debug!("broadcast with no connected peers; dropping payload");
            return BroadcastOutcome::default();
        }

        let mut outcome = BroadcastOutcome::default();
        for peer in targets {
            match self.sender.send_photo(peer, payload).await {
                Ok(()) => outcome.delivered.push(peer.clone()),
                Err(error) => {
                    warn!("failed to send payload to {peer}: {error}");
                    outcome.failures.push(SendFailure {
                        peer: peer.clone(),
                        error,
                    });
                }
            }
        }
        outcome
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn peers(n: usize) -> Vec<PeerIdentity> {
        (0..n)
            .map(|i| PeerIdentity::generate(format!("peer-{i}")))
            .collect()
    }

    #[test]
    fn test_broadcast_sends_exactly_once_per_connected_peer() {
        // Arrange
        let targets = peers(3);
        let payload = vec![0x89u8, 0x50, 0x4E, 0x47];
        let mut mock = MockPeerSender::new();
        for p in &targets {
            let expected_peer = p.clone();
            let expected_payload = payload.clone();
            mock.expect_send_photo()
                .withf(move |peer, data| {
                    *peer == expected_peer && data == expected_payload.as_slice()
                })
                .times(1)
                .returning(|_, _| Ok(()));
        }
        let broadcaster = Broadcaster::new(Arc::new(mock));

        // Act
        let outcome = tokio_test::block_on(broadcaster.broadcast(&payload, &targets));

        // Assert
        assert_eq!(outcome.delivered.len(), 3);
        assert!(outcome.failures.is_empty());
    }

    #[test]
    fn test_broadcast_with_empty_target_set_is_silent_noop() {
        // Arrange – the mock would panic on any unexpected call
        let mock = MockPeerSender::new();
        let broadcaster = Broadcaster::new(Arc::new(mock));

        // Act
        let outcome = tokio_test::block_on(broadcaster.broadcast(&[1, 2, 3], &[]));

        // Assert – no send, no error
        assert!(outcome.is_noop());
    }

    #[test]
    fn test_one_failing_peer_does_not_block_the_others() {
        // Arrange – the middle peer's link is gone
        let targets = peers(3);
        let bad = targets[1].clone();
        let mut mock = MockPeerSender::new();
        mock.expect_send_photo()
            .times(3)
            .returning(move |peer, _| {
                if *peer == bad {
                    Err(SendError::LinkClosed)
                } else {
                    Ok(())
                }
            });
        let broadcaster = Broadcaster::new(Arc::new(mock));

        // Act
        let outcome = tokio_test::block_on(broadcaster.broadcast(&[0xFF], &targets));

        // Assert – two deliveries, one isolated failure
        assert_eq!(outcome.delivered.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].peer, targets[1]);
        assert!(matches!(outcome.failures[0].error, SendError::LinkClosed));
    }

    #[test]
    fn test_every_peer_failing_reports_every_failure() {
        let targets = peers(2);
        let mut mock = MockPeerSender::new();
        mock.expect_send_photo().times(2).returning(|_, _| {
            Err(SendError::Transport(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "pipe closed",
            )))
        });
        let broadcaster = Broadcaster::new(Arc::new(mock));

        let outcome = tokio_test::block_on(broadcaster.broadcast(&[0x00], &targets));

        assert!(outcome.delivered.is_empty());
        assert_eq!(outcome.failures.len(), 2);
    }

    #[test]
    fn test_identical_payload_goes_to_every_target() {
        // Arrange – capture what each peer received
        let targets = peers(2);
        let payload = vec![1u8, 2, 3, 4, 5];
        let mut mock = MockPeerSender::new();
        let expected = payload.clone();
        mock.expect_send_photo()
            .times(2)
            .withf(move |_, data| data == expected.as_slice())
            .returning(|_, _| Ok(()));
        let broadcaster = Broadcaster::new(Arc::new(mock));

        // Act / Assert (expectations verify the payload bytes)
        let outcome = tokio_test::block_on(broadcaster.broadcast(&payload, &targets));
        assert_eq!(outcome.delivered.len(), 2);
    }
}
