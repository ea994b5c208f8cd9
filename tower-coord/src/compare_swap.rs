use std::sync::Arc;

use async_trait::async_trait;
use http::request::Parts;
use shot_coord::CompareAndSwap;
use shot_coord::CoordinationStore;

use crate::CoordError;
use crate::guard::Admission;
use crate::guard::Guard;
use crate::guard::GuardLayer;

#[async_trait]
impl Guard for CompareAndSwap {
    fn name(&self) -> &'static str {
        "compare_swap"
    }

    async fn admit(&self, _parts: &mut Parts) -> Admission {
        Admission::from_decision(self.decide().await, CoordError::Conflict)
    }
}

impl GuardLayer<CompareAndSwap> {
    /// Forwards only the request that moves `key` from `expected` to `new`.
    pub fn compare_and_swap(
        store: Arc<dyn CoordinationStore>,
        key: impl Into<String>,
        expected: impl Into<String>,
        new: impl Into<String>,
    ) -> Self {
        Self::new(Arc::new(CompareAndSwap::new(store, key, expected, new)))
    }
}
