use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tracing::debug;

type Fingerprint = [u8; 32];

/// Rejects payloads already seen within a sliding window.
///
/// Check-and-insert and the purge of expired fingerprints happen under one
/// lock, so two concurrent deliveries of the same payload admit exactly one.
pub struct DuplicateCache {
    window: Duration,
    seen: Mutex<HashMap<Fingerprint, Instant>>,
}

impl DuplicateCache {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns `false` if an identical payload was accepted within the window.
    pub fn accept(&self, payload: &[u8]) -> bool {
        let fingerprint: Fingerprint = Sha256::digest(payload).into();
        let now = Instant::now();
        let window = self.window;

        let mut seen = self.seen.lock();
        let before = seen.len();
        seen.retain(|_, last| now.duration_since(*last) < window);
        let purged = before - seen.len();
        if purged > 0 {
            debug!(purged, "expired fingerprints removed");
        }

        if seen.contains_key(&fingerprint) {
            return false;
        }
        let _ = seen.insert(fingerprint, now);
        true
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn duplicate_inside_window_is_rejected() {
        let cache = DuplicateCache::new(Duration::from_secs(5));
        assert!(cache.accept(b"hello"));
        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(!cache.accept(b"hello"));
        assert!(cache.accept(b"other"));
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_after_window_is_accepted() {
        let cache = DuplicateCache::new(Duration::from_secs(5));
        assert!(cache.accept(b"hello"));
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(cache.accept(b"hello"));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_purged_on_accept() {
        let cache = DuplicateCache::new(Duration::from_secs(5));
        for i in 0..10u8 {
            assert!(cache.accept(&[i]));
        }
        assert_eq!(cache.len(), 10);
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(cache.accept(b"fresh"));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_duplicate_still_purges() {
        let cache = DuplicateCache::new(Duration::from_secs(5));
        assert!(cache.accept(b"old"));
        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(cache.accept(b"dup"));
        tokio::time::advance(Duration::from_secs(2)).await;

        assert!(!cache.accept(b"dup"));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_duplicate_does_not_extend_window() {
        let cache = DuplicateCache::new(Duration::from_secs(5));
        assert!(cache.accept(b"x"));
        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(!cache.accept(b"x"));
        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(cache.accept(b"x"));
    }
}
