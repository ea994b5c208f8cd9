use serde::Deserialize;

/// What a coordination layer does when the store cannot produce a decision.
///
/// `Open` lets the request through as if it had been allowed; `Closed` answers
/// `503 Service Unavailable`. Either way the decision is counted under the
/// `error` outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailPolicy {
    #[default]
    Open,
    Closed,
}

impl FailPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            FailPolicy::Open => "open",
            FailPolicy::Closed => "closed",
        }
    }
}
