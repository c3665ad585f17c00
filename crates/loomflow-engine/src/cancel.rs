//! Cooperative cancellation
//!
//! A cooking call checks its [`CancelFlag`] between batches; there is no
//! enforced deadline inside a node's compute.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag, cloneable across tasks.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    inner: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request termination. Takes effect at the next batch boundary.
    pub fn cancel(&self) {
        self.inner.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.load(Ordering::SeqCst)
    }

    /// Re-arm the flag for a new cooking call.
    pub fn reset(&self) {
        self.inner.store(false, Ordering::SeqCst);
    }
}
