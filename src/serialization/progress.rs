//! Progress reporting and cooperative cancellation
//!
//! The codec polls a [`ProgressCallback`] at every node boundary. Nothing
//! is preempted: an operation stops at the next boundary after the callback
//! asks it to.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Observer of a deflate or inflate walk.
pub trait ProgressCallback {
    /// Polled before each node; returning `false` cancels the walk.
    fn continue_operation(&mut self) -> bool {
        true
    }

    /// Amount of work done out of `total`.
    ///
    /// Deflate counts nodes, inflate counts stream bytes.
    fn progress(&mut self, _done: u64, _total: u64) {}
}

/// Shareable cancellation flag.
///
/// Clones share the same flag, so another thread can cancel a walk running
/// with one of them as its callback.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of every walk polling this token
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clear a previous cancellation request
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

impl ProgressCallback for CancellationToken {
    fn continue_operation(&mut self) -> bool {
        !self.is_cancelled()
    }
}
