//! The ordered, most-recent-first photo feed.
//!
//! Every payload a member sends or receives lands in its local
//! [`FeedStore`].  The store is a pure in-memory sequence: no persistence
//! across restarts, no automatic eviction, no reordering.  The newest entry
//! is always at index 0, which is exactly how the consuming UI presents the
//! photo grid.
//!
//! # Single-writer discipline
//!
//! `FeedStore` is deliberately not thread-safe on its own.  All mutation
//! must happen from the one logical owner context (the session event pump);
//! transport callbacks hand payloads over a channel instead of touching the
//! store directly.  This keeps insertion ordering deterministic without any
//! locking inside the store itself.

use std::collections::VecDeque;

/// One payload in the feed together with its logical insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    /// Opaque payload bytes.  The feed imposes no structure — image
    /// encoding is the caller's concern.
    pub payload: Vec<u8>,
    /// Monotonically increasing insertion counter, starting at 0.  Later
    /// entries have higher values even though they sit closer to the front.
    pub inserted_at: u64,
}

/// Append-to-front collection of sent and received payloads.
#[derive(Debug, Default)]
pub struct FeedStore {
    entries: VecDeque<FeedEntry>,
    next_order: u64,
}

impl FeedStore {
    /// Creates an empty feed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `payload` at the front of the feed.
    ///
    /// Synchronous; the caller is responsible for the single-writer
    /// discipline described in the module docs.
    pub fn insert_front(&mut self, payload: Vec<u8>) -> &FeedEntry {
        let entry = FeedEntry {
            payload,
            inserted_at: self.next_order,
        };
        self.next_order += 1;
        self.entries.push_front(entry);
        // push_front cannot leave the deque empty
        &self.entries[0]
    }

    /// Returns the current sequence, newest first, without mutating it.
    pub fn entries(&self) -> impl Iterator<Item = &FeedEntry> {
        self.entries.iter()
    }

    /// Returns an owned copy of the current sequence, newest first.
    pub fn snapshot(&self) -> Vec<FeedEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Number of entries in the feed.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the feed holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
