//! Progress reporting and cooperative cancellation for batch operations.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Observer polled by batch operations between items.
///
/// Returning true from [`Progress::is_canceled`] makes the running batch stop
/// and return what it has done so far. Nothing already applied is undone.
pub trait Progress: Sync {
    /// Returns true once the caller wants the batch to stop.
    fn is_canceled(&self) -> bool;

    /// Reports that `n` more items were processed.
    fn advance(&self, n: u64);
}

/// A [`Progress`] that never cancels and ignores advances.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn is_canceled(&self) -> bool {
        false
    }

    fn advance(&self, _n: u64) {}
}

/// A shareable cancellation flag that also counts processed items.
#[derive(Debug, Default)]
pub struct CancelFlag {
    canceled: AtomicBool,
    processed: AtomicU64,
    cancel_after: Option<u64>,
}

impl CancelFlag {
    /// Creates a flag that is not canceled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a flag that cancels itself once `n` items were reported.
    #[must_use]
    pub fn cancel_after(n: u64) -> Self {
        Self {
            cancel_after: Some(n),
            ..Self::default()
        }
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::Release);
    }

    /// Number of items reported so far.
    #[must_use]
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Acquire)
    }
}

impl Progress for CancelFlag {
    fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
            || self.cancel_after.is_some_and(|limit| self.processed() >= limit)
    }

    fn advance(&self, n: u64) {
        self.processed.fetch_add(n, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_progress_never_cancels() {
        let p = NoProgress;
        p.advance(10);
        assert!(!p.is_canceled());
    }

    #[test]
    fn cancel_flag_counts_and_cancels() {
        let flag = CancelFlag::new();
        flag.advance(3);
        assert_eq!(flag.processed(), 3);
        assert!(!flag.is_canceled());
        flag.cancel();
        assert!(flag.is_canceled());
    }

    #[test]
    fn cancel_after_limit() {
        let flag = CancelFlag::cancel_after(2);
        flag.advance(1);
        assert!(!flag.is_canceled());
        flag.advance(1);
        assert!(flag.is_canceled());
    }
}
