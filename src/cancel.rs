//! Cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Token used to abort a running sort.
///
/// The token is cheap to clone and may be cancelled from any thread. The
/// sorter checks it before each chunk is dispatched and once per merged
/// record, so cancellation takes effect at chunk and record granularity
/// rather than instantly.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    canceled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a new, non-cancelled token.
    pub fn new() -> Self {
        CancellationToken::default()
    }

    /// Requests cancellation of every sort holding a clone of this token.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::Relaxed);
    }

    /// Checks whether cancellation has been requested.
    pub fn is_canceled(&self) -> bool {
        return self.canceled.load(Ordering::Relaxed);
    }
}
