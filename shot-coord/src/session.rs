use std::sync::Arc;
use std::time::Duration;

use crate::Decision;
use crate::Outcome;
use crate::error::StoreError;
use crate::fixed_window::whole_secs;
use crate::instruments::Instruments;
use crate::key::CoordinationKey;
use crate::key::Namespace;
use crate::script::AtomicScript;
use crate::script::Reply;
use crate::store::CoordinationStore;

/// Sliding session expiry.
///
/// Looks a session up by token and, when it exists, pushes its expiry out to
/// `ttl` in the same step. The session value is handed back on `Allow`.
#[derive(Debug)]
pub struct SessionRenewer {
    store: Arc<dyn CoordinationStore>,
    ttl_secs: u64,
    instruments: Instruments,
}

impl SessionRenewer {
    /// `ttl` is rounded up to whole seconds.
    pub fn new(store: Arc<dyn CoordinationStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl_secs: whole_secs(ttl),
            instruments: Instruments::new("session"),
        }
    }

    /// Renews the session behind `token`. `Deny` when it does not exist.
    ///
    /// An empty token is refused without a store round-trip and counted as
    /// denied with `reason="missing"`.
    pub async fn decide(&self, token: &str) -> Decision<Vec<u8>> {
        if token.is_empty() {
            self.instruments.skipped(Outcome::Denied, "missing");
            return Decision::Deny;
        }
        let key = CoordinationKey::scoped(Namespace::Session, token);
        let script = AtomicScript::session_renew(key, self.ttl_secs);
        self.instruments
            .run(self.store.as_ref(), script, |reply| match reply {
                Reply::Nil => Ok(Decision::Deny),
                Reply::Data(value) => Ok(Decision::Allow(value)),
                other => Err(StoreError::UnexpectedReply {
                    script: "session_renew",
                    reply: other.to_string(),
                }),
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use more_asserts::assert_ge;

    use super::*;
    use crate::MemoryStore;
    use crate::instruments::tests::Recorder;

    #[tokio::test]
    async fn it_renews_existing_sessions() {
        let store = Arc::new(MemoryStore::new());
        store.set("session:abc", "user-42", Some(Duration::from_secs(2)));
        let renewer = SessionRenewer::new(store.clone(), Duration::from_secs(10));

        assert_eq!(renewer.decide("abc").await, Decision::Allow(b"user-42".to_vec()));

        let ttl = store.ttl("session:abc").unwrap();
        assert_ge!(ttl, Duration::from_secs(9));
    }

    #[tokio::test]
    async fn unknown_sessions_are_denied() {
        let store = Arc::new(MemoryStore::new());
        let renewer = SessionRenewer::new(store.clone(), Duration::from_secs(10));

        assert_eq!(renewer.decide("nope").await, Decision::Deny);
        assert!(!store.exists("session:nope"));
    }

    #[tokio::test]
    async fn empty_tokens_never_reach_the_store() {
        let renewer = SessionRenewer::new(
            Arc::new(crate::store::tests::FailingStore),
            Duration::from_secs(10),
        );
        assert_eq!(renewer.decide("").await, Decision::Deny);
    }

    #[tokio::test]
    async fn missing_tokens_are_counted() {
        let recorder = Recorder::new();
        let renewer = SessionRenewer {
            store: Arc::new(MemoryStore::new()),
            ttl_secs: 10,
            instruments: recorder.instruments("session"),
        };

        assert_eq!(renewer.decide("").await, Decision::Deny);
        assert_eq!(renewer.decide("nope").await, Decision::Deny);

        let decisions = recorder.decisions("session");
        let count = |outcome: &str, reason: &str| {
            decisions
                .get(&(outcome.to_string(), reason.to_string()))
                .copied()
        };
        assert_eq!(count("denied", "missing"), Some(1));
        assert_eq!(count("denied", ""), Some(1));
        assert_eq!(recorder.timed("session"), 1);
    }

    #[tokio::test]
    async fn expired_sessions_stay_expired() {
        let store = Arc::new(MemoryStore::new());
        store.set("session:old", "user", Some(Duration::from_millis(10)));
        let renewer = SessionRenewer::new(store, Duration::from_secs(10));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(renewer.decide("old").await, Decision::Deny);
    }
}
