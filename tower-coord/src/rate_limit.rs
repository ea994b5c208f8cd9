use std::num::NonZeroU64;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::request::Parts;
use shot_coord::CoordinationStore;
use shot_coord::FixedWindow;
use shot_coord::SlidingWindow;

use crate::CoordError;
use crate::guard::Admission;
use crate::guard::Guard;
use crate::guard::GuardLayer;
use crate::identity::client_identity;

#[async_trait]
impl Guard for FixedWindow {
    fn name(&self) -> &'static str {
        "fixed_window"
    }

    async fn admit(&self, parts: &mut Parts) -> Admission {
        let client = client_identity(parts);
        Admission::from_decision(self.decide(&client).await, CoordError::TooManyRequests)
    }
}

#[async_trait]
impl Guard for SlidingWindow {
    fn name(&self) -> &'static str {
        "sliding_window"
    }

    async fn admit(&self, parts: &mut Parts) -> Admission {
        let client = client_identity(parts);
        Admission::from_decision(self.decide(&client).await, CoordError::TooManyRequests)
    }
}

impl GuardLayer<FixedWindow> {
    /// Per-client fixed window: at most `limit` requests per `window`, which
    /// has whole-second resolution.
    pub fn fixed_window(
        store: Arc<dyn CoordinationStore>,
        limit: NonZeroU64,
        window: Duration,
    ) -> Self {
        Self::new(Arc::new(FixedWindow::new(store, limit, window)))
    }
}

impl GuardLayer<SlidingWindow> {
    /// Per-client sliding window with millisecond resolution.
    pub fn sliding_window(
        store: Arc<dyn CoordinationStore>,
        limit: NonZeroU64,
        window: Duration,
    ) -> Self {
        Self::new(Arc::new(SlidingWindow::new(store, limit, window)))
    }
}
