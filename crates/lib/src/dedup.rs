//! Delivery dedup: remembers provider delivery ids for a TTL window so retried
//! deliveries of the same event are admitted at most once.
//!
//! Expired entries are swept on insertion; there is no background timer.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default window during which a repeated delivery id counts as a duplicate.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// TTL-bounded set of delivery ids. Share behind an `Arc`.
pub struct DedupCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, Instant>>,
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl DedupCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns true if `id` was already recorded and has not expired. Otherwise records it
    /// with the current time and returns false.
    pub fn seen_or_record(&self, id: &str) -> bool {
        self.seen_or_record_at(id, Instant::now())
    }

    /// Same as [`seen_or_record`](Self::seen_or_record) with an explicit clock reading.
    ///
    /// The lock is held across check, sweep, and insert, so concurrent callers racing on
    /// one id see exactly one `false`.
    pub fn seen_or_record_at(&self, id: &str, now: Instant) -> bool {
        let mut entries = match self.entries.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(received_at) = entries.get(id) {
            if !self.expired(*received_at, now) {
                log::debug!("dedup: duplicate delivery {}", id);
                return true;
            }
        }
        let ttl = self.ttl;
        entries.retain(|_, received_at| now.saturating_duration_since(*received_at) <= ttl);
        entries.insert(id.to_string(), now);
        false
    }

    /// Number of ids currently held (expired ones included until the next insertion).
    pub fn len(&self) -> usize {
        match self.entries.lock() {
            Ok(g) => g.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn expired(&self, received_at: Instant, now: Instant) -> bool {
        now.saturating_duration_since(received_at) > self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};

    #[test]
    fn first_sighting_then_duplicate_then_expired() {
        let cache = DedupCache::new(Duration::from_secs(300));
        let t0 = Instant::now();
        assert!(!cache.seen_or_record_at("Ev1", t0));
        assert!(cache.seen_or_record_at("Ev1", t0 + Duration::from_secs(299)));
        assert!(!cache.seen_or_record_at("Ev1", t0 + Duration::from_secs(301)));
    }

    #[test]
    fn duplicate_does_not_refresh_receipt_time() {
        let cache = DedupCache::new(Duration::from_secs(10));
        let t0 = Instant::now();
        assert!(!cache.seen_or_record_at("Ev1", t0));
        assert!(cache.seen_or_record_at("Ev1", t0 + Duration::from_secs(8)));
        assert!(!cache.seen_or_record_at("Ev1", t0 + Duration::from_secs(11)));
    }

    #[test]
    fn insertion_sweeps_expired_entries() {
        let cache = DedupCache::new(Duration::from_secs(10));
        let t0 = Instant::now();
        cache.seen_or_record_at("a", t0);
        cache.seen_or_record_at("b", t0 + Duration::from_secs(5));
        assert_eq!(cache.len(), 2);
        cache.seen_or_record_at("c", t0 + Duration::from_secs(12));
        assert_eq!(cache.len(), 2);
        assert!(cache.seen_or_record_at("b", t0 + Duration::from_secs(12)));
    }

    #[test]
    fn duplicate_lookup_does_not_sweep() {
        let cache = DedupCache::new(Duration::from_secs(10));
        let t0 = Instant::now();
        cache.seen_or_record_at("old", t0);
        cache.seen_or_record_at("fresh", t0 + Duration::from_secs(9));
        assert!(cache.seen_or_record_at("fresh", t0 + Duration::from_secs(15)));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn concurrent_callers_admit_exactly_once() {
        let cache = Arc::new(DedupCache::default());
        let threads = 16;
        let barrier = Arc::new(Barrier::new(threads));
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let cache = cache.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    cache.seen_or_record("Ev-race")
                })
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().expect("thread panicked"))
            .filter(|seen| !seen)
            .count();
        assert_eq!(admitted, 1);
    }
}
