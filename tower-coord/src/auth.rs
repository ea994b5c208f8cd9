use std::sync::Arc;

use async_trait::async_trait;
use http::HeaderMap;
use http::header::AUTHORIZATION;
use http::request::Parts;
use opentelemetry::global;
use opentelemetry::metrics::Counter;
use tracing::debug;

use crate::CoordError;
use crate::guard::Admission;
use crate::guard::Guard;
use crate::guard::GuardLayer;

/// Static bearer token check.
///
/// An empty configured token refuses every request.
pub struct BearerAuth {
    token: String,
    success: Counter<u64>,
    failed: Counter<u64>,
}

impl BearerAuth {
    pub fn new(token: impl Into<String>) -> Self {
        let meter = global::meter("auth");
        Self {
            token: token.into(),
            success: meter.u64_counter("auth_success_total").build(),
            failed: meter.u64_counter("auth_failed_total").build(),
        }
    }

    fn accepts(&self, parts: &Parts) -> bool {
        parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .is_some_and(|presented| !self.token.is_empty() && presented == self.token)
    }
}

impl std::fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerAuth").finish_non_exhaustive()
    }
}

#[async_trait]
impl Guard for BearerAuth {
    fn name(&self) -> &'static str {
        "auth"
    }

    async fn admit(&self, parts: &mut Parts) -> Admission {
        if self.accepts(parts) {
            self.success.add(1, &[]);
            Admission::Continue(HeaderMap::new())
        } else {
            self.failed.add(1, &[]);
            debug!(path = parts.uri.path(), "rejected bearer token");
            Admission::ShortCircuit(CoordError::Unauthorized)
        }
    }
}

impl GuardLayer<BearerAuth> {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::new(Arc::new(BearerAuth::new(token)))
    }
}
