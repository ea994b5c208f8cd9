use std::sync::Arc;

use crate::Decision;
use crate::instruments::Instruments;
use crate::instruments::flag_decision;
use crate::key::CoordinationKey;
use crate::script::AtomicScript;
use crate::store::CoordinationStore;

/// Optimistic state transition on a single key.
///
/// Writes `new` only if the key currently holds `expected`. The write clears
/// any expiry on the key, as a plain `SET` does.
#[derive(Debug)]
pub struct CompareAndSwap {
    store: Arc<dyn CoordinationStore>,
    key: CoordinationKey,
    expected: String,
    new: String,
    instruments: Instruments,
}

impl CompareAndSwap {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        key: impl Into<String>,
        expected: impl Into<String>,
        new: impl Into<String>,
    ) -> Self {
        Self {
            store,
            key: CoordinationKey::fixed(key),
            expected: expected.into(),
            new: new.into(),
            instruments: Instruments::new("compare_swap"),
        }
    }

    /// `Allow` if the transition was applied, `Conflict` if the key held something else.
    pub async fn decide(&self) -> Decision {
        let script =
            AtomicScript::compare_and_swap(self.key.clone(), self.expected.clone(), self.new.clone());
        self.instruments
            .run(self.store.as_ref(), script, |reply| {
                flag_decision("compare_and_swap", reply, Decision::Conflict)
            })
            .await
    }
}
