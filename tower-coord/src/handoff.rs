use std::sync::Arc;

use async_trait::async_trait;
use http::HeaderMap;
use http::HeaderValue;
use http::request::Parts;
use shot_coord::CoordinationStore;
use shot_coord::Decision;
use shot_coord::WorkQueueHandoff;
use tracing::warn;

use crate::CoordError;
use crate::guard::Admission;
use crate::guard::Guard;
use crate::guard::GuardLayer;

/// Header carrying the claimed work item, on both the forwarded request and
/// the response.
pub const QUEUE_ITEM_HEADER: &str = "x-queue-item";

/// The work item claimed for this request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffItem(pub String);

#[async_trait]
impl Guard for WorkQueueHandoff {
    fn name(&self) -> &'static str {
        "handoff"
    }

    async fn admit(&self, parts: &mut Parts) -> Admission {
        match self.decide().await {
            Decision::Allow(item) => {
                let mut headers = HeaderMap::new();
                // Items that cannot travel in a header still reach the handler
                match HeaderValue::from_str(&item) {
                    Ok(value) => {
                        parts.headers.insert(QUEUE_ITEM_HEADER, value.clone());
                        headers.insert(QUEUE_ITEM_HEADER, value);
                    }
                    Err(_) => warn!(item = %item, "work item is not a valid header value"),
                }
                parts.extensions.insert(HandoffItem(item));
                Admission::Continue(headers)
            }
            Decision::Empty | Decision::Deny | Decision::Conflict => {
                Admission::ShortCircuit(CoordError::QueueEmpty)
            }
            // The item has already left the source queue; forwarding without it would lose it
            Decision::Error(err) if err.is_unexpected_reply() => {
                warn!(error = %err, "claimed work item is unreadable");
                Admission::ShortCircuit(CoordError::InvalidItem)
            }
            Decision::Error(err) => Admission::Degraded(err),
        }
    }
}

impl GuardLayer<WorkQueueHandoff> {
    /// Claims one item from `source` into `processing` per request.
    pub fn handoff(
        store: Arc<dyn CoordinationStore>,
        source: impl Into<String>,
        processing: impl Into<String>,
    ) -> Self {
        Self::new(Arc::new(WorkQueueHandoff::new(store, source, processing)))
    }
}
