//! Process-wide record of the compression count reported by the API.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::Arc;

static GLOBAL_TRACKER: Lazy<Arc<QuotaTracker>> = Lazy::new(|| Arc::new(QuotaTracker::new()));

/// Holds the most recent `compression-count` value seen on any response.
///
/// The server always reports the authoritative total for the current period,
/// so writes overwrite rather than accumulate and the last writer wins.
#[derive(Debug, Default)]
pub struct QuotaTracker {
    count: Mutex<Option<u64>>,
}

impl QuotaTracker {
    pub fn new() -> Self {
        Self {
            count: Mutex::new(None),
        }
    }

    /// The tracker shared by every client in this process.
    pub fn global() -> Arc<QuotaTracker> {
        Arc::clone(&GLOBAL_TRACKER)
    }

    pub fn record(&self, count: u64) {
        *self.count.lock() = Some(count);
        tracing::debug!(count, "compression count updated");
    }

    /// `None` until a response carrying the header has been observed.
    pub fn current(&self) -> Option<u64> {
        *self.count.lock()
    }
}
