use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::HeaderMap;
use http::request::Parts;
use shot_coord::CoordinationStore;
use shot_coord::Decision;
use shot_coord::SessionRenewer;

use crate::CoordError;
use crate::guard::Admission;
use crate::guard::Guard;
use crate::guard::GuardLayer;
use crate::identity::cookie;

pub const SESSION_COOKIE: &str = "session_id";

/// The stored value of the session that admitted this request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionValue(pub Vec<u8>);

#[async_trait]
impl Guard for SessionRenewer {
    fn name(&self) -> &'static str {
        "session"
    }

    async fn admit(&self, parts: &mut Parts) -> Admission {
        let token = cookie(parts, SESSION_COOKIE).unwrap_or_default().to_owned();
        match self.decide(&token).await {
            Decision::Allow(value) => {
                parts.extensions.insert(SessionValue(value));
                Admission::Continue(HeaderMap::new())
            }
            Decision::Deny if token.is_empty() => {
                Admission::ShortCircuit(CoordError::MissingSession)
            }
            Decision::Error(err) => Admission::Degraded(err),
            Decision::Deny | Decision::Empty | Decision::Conflict => {
                Admission::ShortCircuit(CoordError::SessionNotFound)
            }
        }
    }
}

impl GuardLayer<SessionRenewer> {
    /// Requires a live session and slides its expiry out to `ttl`.
    ///
    /// Failing open lets requests through unauthenticated while the store is
    /// down; use [`FailPolicy::Closed`](crate::FailPolicy::Closed) where that
    /// matters.
    pub fn session(store: Arc<dyn CoordinationStore>, ttl: Duration) -> Self {
        Self::new(Arc::new(SessionRenewer::new(store, ttl)))
    }
}
