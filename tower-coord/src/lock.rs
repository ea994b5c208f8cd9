use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::request::Parts;
use shot_coord::CoordinationStore;
use shot_coord::MutualExclusionLock;

use crate::CoordError;
use crate::guard::Admission;
use crate::guard::Guard;
use crate::guard::GuardLayer;
use crate::identity::client_identity;

#[async_trait]
impl Guard for MutualExclusionLock {
    fn name(&self) -> &'static str {
        "lock"
    }

    async fn admit(&self, parts: &mut Parts) -> Admission {
        let client = client_identity(parts);
        Admission::from_decision(self.decide(&client).await, CoordError::Locked)
    }
}

impl GuardLayer<MutualExclusionLock> {
    /// Admits one request per `lease` on `resource`. The lease is never
    /// released early, so it also bounds how often the handler can run.
    pub fn lock(
        store: Arc<dyn CoordinationStore>,
        resource: impl Into<String>,
        lease: Duration,
    ) -> Self {
        Self::new(Arc::new(MutualExclusionLock::new(store, resource, lease)))
    }
}
