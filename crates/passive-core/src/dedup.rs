//! Fingerprint deduplication gate.

use std::collections::HashSet;

use parking_lot::Mutex;

/// Admits each fingerprint digest exactly once for the lifetime of a run.
///
/// The lock is held only for the set lookup/insert. Nothing is ever evicted.
#[derive(Debug, Default)]
pub struct DedupGate {
    seen: Mutex<HashSet<String>>,
}

impl DedupGate {
    /// Creates an empty gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true the first time `digest` is offered, false afterwards.
    pub fn try_admit(&self, digest: &str) -> bool {
        let mut seen = self.seen.lock();
        if seen.contains(digest) {
            return false;
        }
        seen.insert(digest.to_string())
    }

    /// Number of admitted digests.
    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    /// Returns true when nothing has been admitted yet.
    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn admits_once() {
        let gate = DedupGate::new();
        assert!(gate.is_empty());
        assert!(gate.try_admit("abc"));
        assert!(!gate.try_admit("abc"));
        assert!(gate.try_admit("def"));
        assert_eq!(gate.len(), 2);
    }

    #[test]
    fn concurrent_admission_is_exclusive() {
        let gate = Arc::new(DedupGate::new());
        let admitted = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..32 {
                scope.spawn(|| {
                    for _ in 0..100 {
                        if gate.try_admit("same-digest") {
                            admitted.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                });
            }
        });

        assert_eq!(admitted.load(Ordering::SeqCst), 1);
        assert_eq!(gate.len(), 1);
    }
}
