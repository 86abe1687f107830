//! Shared cancellation flag for background scanning.
//!
//! A single process-wide flag, set by `cleanup` and polled by the scan
//! worker at every recursion and loop boundary. Cancellation is monotonic
//! for one teardown: once set, scanning halts at the next checkpoint.
//! A fresh watch session re-arms the flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cloneable handle to the shared cancel flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of all in-flight and queued scans.
    pub fn set(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Re-arms the flag for a fresh session.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    /// Checks whether cancellation has been requested.
    ///
    /// Returns `Some(())` while still active, `None` once cancelled,
    /// enabling early returns with the `?` operator.
    #[inline]
    pub fn is_active(&self) -> Option<()> {
        if self.cancelled.load(Ordering::Relaxed) {
            None
        } else {
            Some(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_flag_is_active() {
        let flag = CancelFlag::new();
        assert!(flag.is_active().is_some());
    }

    #[test]
    fn set_cancels_all_clones() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        flag.set();
        assert!(clone.is_active().is_none());
    }

    #[test]
    fn reset_rearms() {
        let flag = CancelFlag::new();
        flag.set();
        flag.reset();
        assert!(flag.is_active().is_some());
    }
}
