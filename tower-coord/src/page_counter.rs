use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::HeaderMap;
use http::HeaderValue;
use http::request::Parts;
use shot_coord::CoordinationStore;
use shot_coord::Decision;
use shot_coord::PageCounter;

use crate::guard::Admission;
use crate::guard::Guard;
use crate::guard::GuardLayer;

pub const COUNTER_HEADER: &str = "x-counter";

/// Running hit count, as seen by the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageViews(pub u64);

#[async_trait]
impl Guard for PageCounter {
    fn name(&self) -> &'static str {
        "page_counter"
    }

    async fn admit(&self, parts: &mut Parts) -> Admission {
        match self.decide().await {
            Decision::Allow(count) => {
                parts.extensions.insert(PageViews(count));
                let mut headers = HeaderMap::new();
                headers.insert(COUNTER_HEADER, HeaderValue::from(count));
                Admission::Continue(headers)
            }
            Decision::Error(err) => Admission::Degraded(err),
            Decision::Deny | Decision::Empty | Decision::Conflict => {
                Admission::Continue(HeaderMap::new())
            }
        }
    }
}

impl GuardLayer<PageCounter> {
    pub fn page_counter(store: Arc<dyn CoordinationStore>, key: impl Into<String>, ttl: Duration) -> Self {
        Self::new(Arc::new(PageCounter::new(store, key, ttl)))
    }
}
