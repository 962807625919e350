//! Network time.
//!
//! Signed requests carry timestamps the storage node checks against its own
//! clock, so the client keeps an offset between the local clock and the
//! network's. The offset starts unknown (zero), and only server timestamps
//! taken from successful responses update it. Writers race last-writer-wins
//! on a single atomic.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

/// Offset changes below this are not logged.
const LOG_THRESHOLD_MS: u64 = 1_000;

static SHARED: OnceLock<Arc<NetworkTime>> = OnceLock::new();

/// Local-to-network clock offset.
#[derive(Debug, Default)]
pub struct NetworkTime {
    offset_ms: AtomicI64,
    known: AtomicBool,
}

fn local_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

impl NetworkTime {
    /// A fresh estimate with no offset. Use this where tests need isolation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide estimate.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::clone(SHARED.get_or_init(|| Arc::new(Self::new())))
    }

    /// Current network time in milliseconds since the epoch.
    #[must_use]
    pub fn now_ms(&self) -> u64 {
        let local = i128::from(local_now_ms());
        let adjusted = local + i128::from(self.offset_ms.load(Ordering::Relaxed));
        u64::try_from(adjusted.max(0)).unwrap_or(u64::MAX)
    }

    /// Recalibrate from a server timestamp (milliseconds since the epoch).
    pub fn observe_server_time(&self, server_ms: u64) {
        let local = i128::from(local_now_ms());
        let offset = (i128::from(server_ms) - local).clamp(i128::from(i64::MIN), i128::from(i64::MAX));
        #[allow(clippy::cast_possible_truncation)]
        let offset = offset as i64;

        let previous = self.offset_ms.swap(offset, Ordering::Relaxed);
        let was_known = self.known.swap(true, Ordering::Relaxed);
        if !was_known || offset.abs_diff(previous) >= LOG_THRESHOLD_MS {
            info!(offset_ms = offset, "network time recalibrated");
        }
    }

    /// The offset, or `None` before the first observation.
    #[must_use]
    pub fn offset_ms(&self) -> Option<i64> {
        self.known
            .load(Ordering::Relaxed)
            .then(|| self.offset_ms.load(Ordering::Relaxed))
    }
}
