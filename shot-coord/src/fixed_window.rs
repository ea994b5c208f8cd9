use std::num::NonZeroU64;
use std::sync::Arc;
use std::time::Duration;

use crate::Decision;
use crate::instruments::Instruments;
use crate::instruments::flag_decision;
use crate::key::ClientIdentity;
use crate::key::CoordinationKey;
use crate::key::Namespace;
use crate::script::AtomicScript;
use crate::store::CoordinationStore;

/// A simple window-based limiter.
///
/// The window opens at a client's first request and closes when the counter key
/// expires. It is the cheapest strategy but admits "boundary bursts": up to
/// double the limit in a short period spanning two windows. That is a property
/// of fixed windows, not a defect, and it is kept as is.
///
/// Denied requests are not counted, so a client hammering a closed window does
/// not push anything further out.
#[derive(Debug)]
pub struct FixedWindow {
    store: Arc<dyn CoordinationStore>,
    limit: u64,
    window_secs: u64,
    instruments: Instruments,
}

impl FixedWindow {
    /// Creates a new `FixedWindow` primitive.
    ///
    /// # Arguments
    ///
    /// * `limit` - The maximum number of requests allowed within a single window.
    /// * `window` - The duration of the window, rounded up to whole seconds.
    pub fn new(store: Arc<dyn CoordinationStore>, limit: NonZeroU64, window: Duration) -> Self {
        Self {
            store,
            limit: limit.get(),
            window_secs: whole_secs(window),
            instruments: Instruments::new("fixed_window"),
        }
    }

    /// Counts one request for `client`. `Deny` once the window is full.
    pub async fn decide(&self, client: &ClientIdentity) -> Decision {
        let key = CoordinationKey::scoped(Namespace::FixedWindow, client.as_str());
        let script = AtomicScript::fixed_window(key, self.limit, self.window_secs);
        self.instruments
            .run(self.store.as_ref(), script, |reply| {
                flag_decision("fixed_window", reply, Decision::Deny)
            })
            .await
    }
}

/// Second-granularity store expiries round up and never drop to zero, since a
/// zero expiry deletes the key on the spot.
pub(crate) fn whole_secs(duration: Duration) -> u64 {
    duration
        .as_secs()
        .saturating_add(u64::from(duration.subsec_nanos() > 0))
        .max(1)
}
