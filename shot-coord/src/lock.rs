use std::sync::Arc;
use std::time::Duration;

use crate::Decision;
use crate::instruments::Instruments;
use crate::instruments::flag_decision;
use crate::key::ClientIdentity;
use crate::key::CoordinationKey;
use crate::script::AtomicScript;
use crate::store::CoordinationStore;

/// A single-holder lease on a fixed resource key.
///
/// The first caller to find the key absent claims it with a fresh holder token
/// and an expiry of `lease`, in one step. Everyone else is refused until the
/// lease runs out. There is no release: the resource frees itself on expiry.
#[derive(Debug)]
pub struct MutualExclusionLock {
    store: Arc<dyn CoordinationStore>,
    key: CoordinationKey,
    lease_ms: u64,
    instruments: Instruments,
}

impl MutualExclusionLock {
    pub fn new(store: Arc<dyn CoordinationStore>, resource: impl Into<String>, lease: Duration) -> Self {
        Self {
            store,
            key: CoordinationKey::fixed(resource),
            lease_ms: (lease.as_millis() as u64).max(1),
            instruments: Instruments::new("lock"),
        }
    }

    pub fn resource(&self) -> &CoordinationKey {
        &self.key
    }

    /// Tries to take the lease on behalf of `client`.
    pub async fn decide(&self, client: &ClientIdentity) -> Decision {
        let script = AtomicScript::lock(self.key.clone(), holder_token(client), self.lease_ms);
        self.instruments
            .run(self.store.as_ref(), script, |reply| {
                flag_decision("lock", reply, Decision::Deny)
            })
            .await
    }
}

fn holder_token(client: &ClientIdentity) -> String {
    format!("{client}:{:016x}", rand::random::<u64>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;

    #[tokio::test]
    async fn it_leases_and_expires() {
        let store = Arc::new(MemoryStore::new());
        let lock = MutualExclusionLock::new(store, "lock:order:test", Duration::from_millis(500));
        let client = ClientIdentity::from_peer("127.0.0.1:12345");

        assert_eq!(lock.decide(&client).await, Decision::Allow(()));
        assert_eq!(lock.decide(&client).await, Decision::Deny);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(lock.decide(&client).await, Decision::Allow(()));
    }

    #[tokio::test]
    async fn deny_keeps_the_holder() {
        let store = Arc::new(MemoryStore::new());
        let lock = MutualExclusionLock::new(store.clone(), "lock:r", Duration::from_secs(5));

        let _ = lock.decide(&ClientIdentity::from_peer("10.0.0.1:1")).await;
        let holder = store.get("lock:r").unwrap();
        assert!(holder.starts_with(b"10.0.0.1:"));

        assert_eq!(
            lock.decide(&ClientIdentity::from_peer("10.0.0.2:1")).await,
            Decision::Deny
        );
        assert_eq!(store.get("lock:r"), Some(holder));
    }

    #[tokio::test]
    async fn concurrent_callers_get_one_lease() {
        let store = Arc::new(MemoryStore::new());
        let lock = Arc::new(MutualExclusionLock::new(store, "lock:r", Duration::from_secs(5)));

        let mut handles = vec![];
        for i in 0..32 {
            let lock = Arc::clone(&lock);
            let client = ClientIdentity::from_peer(&format!("10.0.0.{i}:1"));
            handles.push(tokio::spawn(async move { lock.decide(&client).await }));
        }

        let winners = futures::future::join_all(handles)
            .await
            .into_iter()
            .filter(|r| matches!(r, Ok(Decision::Allow(()))))
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn holder_tokens_are_unique() {
        let client = ClientIdentity::from_peer("127.0.0.1:1");
        assert_ne!(holder_token(&client), holder_token(&client));
    }
}
