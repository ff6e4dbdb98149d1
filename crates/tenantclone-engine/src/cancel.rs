//! Cooperative cancellation for clone runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag.
///
/// The orchestrator checks it between entity-type phases. Rows already in
/// flight when it is set still finish, and nothing is rolled back.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_the_flag() {
        let handle = CancelHandle::new();
        let other = handle.clone();
        assert!(!other.is_cancelled());
        handle.cancel();
        handle.cancel();
        assert!(other.is_cancelled());
    }
}
