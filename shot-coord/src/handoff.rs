use std::sync::Arc;

use crate::Decision;
use crate::error::StoreError;
use crate::instruments::Instruments;
use crate::key::CoordinationKey;
use crate::script::AtomicScript;
use crate::script::Reply;
use crate::store::CoordinationStore;

/// Moves one work item from a source queue to a processing queue.
///
/// Items are pushed onto the head of the source queue by producers and taken
/// from its tail, so the queue is FIFO. The pop and the push onto the
/// processing queue happen in one script: an item is always in exactly one of
/// the two lists. Reaping items abandoned in the processing queue is left to
/// whoever owns it.
#[derive(Debug)]
pub struct WorkQueueHandoff {
    store: Arc<dyn CoordinationStore>,
    source: CoordinationKey,
    processing: CoordinationKey,
    instruments: Instruments,
}

impl WorkQueueHandoff {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        source: impl Into<String>,
        processing: impl Into<String>,
    ) -> Self {
        Self {
            store,
            source: CoordinationKey::fixed(source),
            processing: CoordinationKey::fixed(processing),
            instruments: Instruments::new("handoff"),
        }
    }

    /// Claims the oldest item. `Empty` when there is nothing to claim.
    ///
    /// An item that is not valid UTF-8 is reported as
    /// [`StoreError::UnexpectedReply`]; note that it has still been moved.
    pub async fn decide(&self) -> Decision<String> {
        let script = AtomicScript::handoff(self.source.clone(), self.processing.clone());
        self.instruments
            .run(self.store.as_ref(), script, |reply| match reply {
                Reply::Nil => Ok(Decision::Empty),
                Reply::Data(data) => String::from_utf8(data).map(Decision::Allow).map_err(|err| {
                    StoreError::UnexpectedReply {
                        script: "handoff",
                        reply: format!("non-text item: {err}"),
                    }
                }),
                other => Err(StoreError::UnexpectedReply {
                    script: "handoff",
                    reply: other.to_string(),
                }),
            })
            .await
    }
}
