//! One-way "already succeeded" flag shared between components.

use std::sync::OnceLock;

/// Records that an expensive availability check has succeeded at least once.
///
/// Set once, read many times, never reset. Share it behind an `Arc` with
/// every component that should skip the check after the first success.
#[derive(Debug, Default)]
pub struct SuccessLatch {
    succeeded: OnceLock<()>,
}

impl SuccessLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the latch. Later calls are no-ops.
    pub fn set(&self) {
        let _ = self.succeeded.set(());
    }

    pub fn is_set(&self) -> bool {
        self.succeeded.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_latch_starts_unset_and_stays_set() {
        let latch = SuccessLatch::new();
        assert!(!latch.is_set());

        latch.set();
        assert!(latch.is_set());

        latch.set();
        assert!(latch.is_set());
    }

    #[test]
    fn test_latch_is_shared_across_threads() {
        let latch = Arc::new(SuccessLatch::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let latch = Arc::clone(&latch);
                std::thread::spawn(move || latch.set())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(latch.is_set());
    }
}
