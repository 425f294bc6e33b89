use std::num::NonZeroUsize;

use lru::LruCache;

/// Distinct-page counts per client for the current window.
///
/// Bounded: once `capacity` clients are tracked, a new client evicts the least
/// recently visited one. Owned by the analyzer's worker; it is not synchronized.
#[derive(Debug)]
pub(crate) struct VisitCounter {
    entries: LruCache<String, u32>,
}

impl VisitCounter {
    pub(crate) fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
        }
    }

    /// Counts one more distinct page for `client_id` and returns the new total.
    pub(crate) fn visit(&mut self, client_id: &str) -> u32 {
        if let Some(count) = self.entries.get_mut(client_id) {
            *count = count.saturating_add(1);
            return *count;
        }
        if let Some((evicted, _)) = self.entries.push(client_id.to_owned(), 1) {
            tracing::trace!(client = %evicted, "visit counter full, evicted least recent client");
        }
        1
    }

    /// Current count, or zero for an untracked client. Does not touch recency.
    pub(crate) fn count(&self, client_id: &str) -> u32 {
        self.entries.peek(client_id).copied().unwrap_or(0)
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter(capacity: usize) -> VisitCounter {
        VisitCounter::new(NonZeroUsize::new(capacity).unwrap())
    }

    #[test]
    fn nth_visit_returns_n() {
        let mut c = counter(10);
        for n in 1..=20 {
            assert_eq!(c.visit("192.168.1.1"), n);
        }
        assert_eq!(c.count("192.168.1.1"), 20);
    }

    #[test]
    fn clients_are_counted_independently() {
        let mut c = counter(10);
        assert_eq!(c.visit("192.168.1.1"), 1);
        assert_eq!(c.visit("192.168.1.2"), 1);
        assert_eq!(c.visit("192.168.1.1"), 2);
        assert_eq!(c.count("192.168.1.2"), 1);
        assert_eq!(c.count("10.0.0.1"), 0);
    }

    #[test]
    fn clear_resets_everything() {
        let mut c = counter(10);
        c.visit("a");
        c.visit("a");
        c.visit("b");
        c.clear();

        assert_eq!(c.len(), 0);
        assert_eq!(c.count("a"), 0);
        assert_eq!(c.visit("a"), 1);
    }

    #[test]
    fn least_recent_client_is_evicted_at_capacity() {
        let mut c = counter(3);
        c.visit("a");
        c.visit("b");
        c.visit("c");
        c.visit("d");

        assert_eq!(c.len(), 3);
        assert_eq!(c.count("a"), 0);
        assert_eq!(c.count("b"), 1);
        assert_eq!(c.count("d"), 1);
    }

    #[test]
    fn visiting_refreshes_recency() {
        let mut c = counter(3);
        c.visit("a");
        c.visit("b");
        c.visit("c");
        // "a" becomes most recent, so "b" is the one to go.
        c.visit("a");
        c.visit("d");

        assert_eq!(c.count("a"), 2);
        assert_eq!(c.count("b"), 0);
        assert_eq!(c.count("c"), 1);
    }

    #[test]
    fn count_does_not_refresh_recency() {
        let mut c = counter(2);
        c.visit("a");
        c.visit("b");
        assert_eq!(c.count("a"), 1);
        c.visit("c");

        assert_eq!(c.count("a"), 0);
        assert_eq!(c.count("b"), 1);
    }

    #[test]
    fn capacity_of_one_keeps_only_latest() {
        let mut c = counter(1);
        assert_eq!(c.visit("a"), 1);
        assert_eq!(c.visit("b"), 1);
        assert_eq!(c.count("a"), 0);
        assert_eq!(c.visit("b"), 2);
    }

    #[test]
    fn counts_saturate_instead_of_wrapping() {
        let mut c = counter(1);
        c.entries.put("a".to_owned(), u32::MAX - 1);
        assert_eq!(c.visit("a"), u32::MAX);
        assert_eq!(c.visit("a"), u32::MAX);
    }
}
