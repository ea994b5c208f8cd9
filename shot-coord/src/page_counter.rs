use std::sync::Arc;
use std::time::Duration;

use crate::Decision;
use crate::error::StoreError;
use crate::fixed_window::whole_secs;
use crate::instruments::Instruments;
use crate::key::CoordinationKey;
use crate::script::AtomicScript;
use crate::script::Reply;
use crate::store::CoordinationStore;

/// A shared hit counter that resets `ttl` after its first hit.
#[derive(Debug)]
pub struct PageCounter {
    store: Arc<dyn CoordinationStore>,
    key: CoordinationKey,
    ttl_secs: u64,
    instruments: Instruments,
}

impl PageCounter {
    pub fn new(store: Arc<dyn CoordinationStore>, key: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            key: CoordinationKey::fixed(key),
            ttl_secs: whole_secs(ttl),
            instruments: Instruments::new("page_counter"),
        }
    }

    /// Counts one hit and returns the running total.
    pub async fn decide(&self) -> Decision<u64> {
        let script = AtomicScript::page_counter(self.key.clone(), self.ttl_secs);
        self.instruments
            .run(self.store.as_ref(), script, |reply| match reply {
                Reply::Int(count) if count > 0 => Ok(Decision::Allow(count as u64)),
                other => Err(StoreError::UnexpectedReply {
                    script: "page_counter",
                    reply: other.to_string(),
                }),
            })
            .await
    }
}
