use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwap;

/// Append-only set of blocked clients.
///
/// Readers load the current snapshot without locking. The single writer (the
/// analyzer's worker) copies the snapshot, adds one client and publishes the copy
/// in one atomic swap, so readers never see a partial update.
#[derive(Debug)]
pub(crate) struct Blocklist {
    snapshot: ArcSwap<HashSet<String>>,
}

impl Blocklist {
    pub(crate) fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(HashSet::new()),
        }
    }

    #[inline]
    pub(crate) fn contains(&self, client_id: &str) -> bool {
        self.snapshot.load().contains(client_id)
    }

    /// Publishes a new snapshot containing `client_id`.
    ///
    /// Returns `false` if the client was already blocked. Must only be called from
    /// one thread at a time.
    pub(crate) fn insert(&self, client_id: &str) -> bool {
        let current = self.snapshot.load();
        if current.contains(client_id) {
            return false;
        }
        let mut next = HashSet::with_capacity(current.len() + 1);
        next.extend(current.iter().cloned());
        next.insert(client_id.to_owned());
        self.snapshot.store(Arc::new(next));
        true
    }

    pub(crate) fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    /// The current snapshot. Later insertions are not reflected in it.
    pub(crate) fn snapshot(&self) -> Arc<HashSet<String>> {
        self.snapshot.load_full()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn starts_empty() {
        let bl = Blocklist::new();
        assert_eq!(bl.len(), 0);
        assert!(!bl.contains("192.168.1.1"));
    }

    #[test]
    fn insert_is_idempotent() {
        let bl = Blocklist::new();
        assert!(bl.insert("192.168.1.1"));
        assert!(!bl.insert("192.168.1.1"));
        assert_eq!(bl.len(), 1);
        assert!(bl.contains("192.168.1.1"));
    }

    #[test]
    fn old_snapshots_are_unaffected_by_later_inserts() {
        let bl = Blocklist::new();
        bl.insert("a");
        let before = bl.snapshot();
        bl.insert("b");

        assert_eq!(before.len(), 1);
        assert!(!before.contains("b"));
        assert!(bl.contains("a") && bl.contains("b"));
    }

    #[test]
    fn readers_only_ever_see_growth() {
        let bl = Arc::new(Blocklist::new());
        let writer = {
            let bl = Arc::clone(&bl);
            thread::spawn(move || {
                for i in 0..500 {
                    bl.insert(&format!("10.0.{}.{}", i / 256, i % 256));
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let bl = Arc::clone(&bl);
                thread::spawn(move || {
                    let mut last = 0;
                    let mut first_seen = false;
                    for _ in 0..10_000 {
                        let len = bl.len();
                        assert!(len >= last, "blocklist shrank from {last} to {len}");
                        last = len;
                        if bl.contains("10.0.0.0") {
                            first_seen = true;
                        } else {
                            assert!(!first_seen, "blocked client disappeared");
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(bl.len(), 500);
    }
}
