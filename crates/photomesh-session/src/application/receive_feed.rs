//! Inbound feed intake: validate a received payload and prepend it.
//!
//! Every payload that arrives over a peer link goes through [`FeedIntake`]
//! before it can reach the feed.  A payload that does not look like an
//! image is dropped silently — a malformed frame from one peer must never
//! take the session down, and there is no protocol-level NACK to send back.

use photomesh_core::{FeedEntry, FeedStore};
use tracing::debug;

/// Returns `true` if `bytes` starts with a known image container signature.
///
/// This is a cheap magic-number check, not a decode: the receiving side
/// only needs enough confidence to keep arbitrary garbage out of the feed.
/// Recognized containers: PNG, JPEG, GIF, BMP, and HEIC/HEIF (the `ftyp`
/// box at offset 4).
pub fn looks_like_image(bytes: &[u8]) -> bool {
    if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return true; // PNG
    }
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return true; // JPEG
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return true;
    }
    if bytes.starts_with(b"BM") && bytes.len() >= 14 {
        return true; // BMP, header is 14 bytes minimum
    }
    // ISO-BMFF (HEIC/HEIF/AVIF): 4-byte box size then "ftyp".
    if bytes.len() >= 8 && &bytes[4..8] == b"ftyp" {
        return true;
    }
    false
}

/// Validating front door for the local feed.
///
/// Owns the [`FeedStore`] and is itself driven only from the session's
/// single owner context, preserving the feed's single-writer discipline.
#[derive(Default)]
pub struct FeedIntake {
    feed: FeedStore,
}

impl FeedIntake {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts `bytes` into the feed if they pass the image check.
    ///
    /// Returns the entry's insertion timestamp on success, or `None` when
    /// the payload was dropped.  The drop is deliberate and quiet: the
    /// only trace is a debug log line, and the feed is left untouched.
    pub fn accept(&mut self, bytes: Vec<u8>) -> Option<u64> {
        if !looks_like_image(&bytes) {
            debug!(len = bytes.len(), "dropping payload that is not an image");
            return None;
        }
        let entry = self.feed.insert_front(bytes);
        Some(entry.inserted_at)
    }

    /// Most-recent-first view of the feed.
    pub fn entries(&self) -> impl Iterator<Item = &FeedEntry> {
        self.feed.entries()
    }

    /// Owned most-recent-first copy of the feed.
    pub fn snapshot(&self) -> Vec<FeedEntry> {
        self.feed.snapshot()
    }

    pub fn len(&self) -> usize {
        self.feed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feed.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

    fn png_payload(tail: &[u8]) -> Vec<u8> {
        let mut v = PNG_MAGIC.to_vec();
        v.extend_from_slice(tail);
        v
    }

    #[test]
    fn test_png_payload_is_accepted_at_front() {
        // Arrange
        let mut intake = FeedIntake::new();
        let payload = png_payload(&[1, 2, 3]);

        // Act
        let stamp = intake.accept(payload.clone());

        // Assert – newest entry sits at index 0
        assert!(stamp.is_some());
        let snapshot = intake.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].payload, payload);
    }

    #[test]
    fn test_jpeg_and_gif_signatures_are_recognized() {
        assert!(looks_like_image(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00]));
        assert!(looks_like_image(b"GIF89a trailing"));
        assert!(looks_like_image(b"GIF87a trailing"));
    }

    #[test]
    fn test_heic_ftyp_box_is_recognized() {
        // 4-byte box length, then the ftyp marker
        let heic = [0x00, 0x00, 0x00, 0x18, b'f', b't', b'y', b'p', b'h', b'e'];
        assert!(looks_like_image(&heic));
    }

    #[test]
    fn test_garbage_payload_is_dropped_and_feed_unchanged() {
        // Arrange
        let mut intake = FeedIntake::new();
        intake.accept(png_payload(&[7]));

        // Act – random bytes, no image magic
        let stamp = intake.accept(vec![0xDE, 0xAD, 0xBE, 0xEF]);

        // Assert
        assert!(stamp.is_none());
        assert_eq!(intake.len(), 1);
    }

    #[test]
    fn test_empty_payload_is_dropped() {
        let mut intake = FeedIntake::new();
        assert!(intake.accept(Vec::new()).is_none());
        assert!(intake.is_empty());
    }

    #[test]
    fn test_newest_entry_is_first() {
        // Arrange
        let mut intake = FeedIntake::new();

        // Act
        intake.accept(png_payload(&[1]));
        intake.accept(png_payload(&[2]));
        intake.accept(png_payload(&[3]));

        // Assert
        let snapshot = intake.snapshot();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[0].payload, png_payload(&[3]));
        assert_eq!(snapshot[2].payload, png_payload(&[1]));
    }

    #[test]
    fn test_truncated_bmp_header_is_rejected() {
        // "BM" alone is too short to be a real BMP
        assert!(!looks_like_image(b"BM"));
    }
}
