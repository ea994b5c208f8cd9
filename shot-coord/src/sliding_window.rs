use std::num::NonZeroU64;
use std::sync::Arc;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use crate::Decision;
use crate::instruments::Instruments;
use crate::instruments::flag_decision;
use crate::key::ClientIdentity;
use crate::key::CoordinationKey;
use crate::key::Namespace;
use crate::script::AtomicScript;
use crate::store::CoordinationStore;

/// A sliding window log.
///
/// Each admitted request is recorded with its timestamp in a per-client sorted
/// set. A request is admitted when fewer than `limit` entries fall inside the
/// last `window`, so there is no boundary burst. Memory per client is bounded
/// by `limit` entries.
///
/// Timestamps come from the caller's wall clock, so instances sharing a store
/// should keep their clocks reasonably in sync.
#[derive(Debug)]
pub struct SlidingWindow {
    store: Arc<dyn CoordinationStore>,
    limit: u64,
    window_ms: u64,
    instruments: Instruments,
}

impl SlidingWindow {
    /// Creates a new `SlidingWindow` primitive.
    ///
    /// `window` has millisecond resolution and is at least one millisecond.
    pub fn new(store: Arc<dyn CoordinationStore>, limit: NonZeroU64, window: Duration) -> Self {
        Self {
            store,
            limit: limit.get(),
            window_ms: (window.as_millis() as u64).max(1),
            instruments: Instruments::new("sliding_window"),
        }
    }

    pub async fn decide(&self, client: &ClientIdentity) -> Decision {
        let key = CoordinationKey::scoped(Namespace::SlidingWindow, client.as_str());
        let script = AtomicScript::sliding_window(key, now_ms(), self.window_ms, self.limit);
        self.instruments
            .run(self.store.as_ref(), script, |reply| {
                flag_decision("sliding_window", reply, Decision::Deny)
            })
            .await
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}
