use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::script::AtomicScript;
use crate::script::Reply;

mod memory;
mod remote;

pub use memory::MemoryStore;
pub use remote::RedisStore;

/// A key-value store that can execute an [`AtomicScript`] as one indivisible unit.
///
/// Implementations must serialize scripts touching the same key: every primitive's
/// correctness rests on that guarantee alone. The connection behind a store is
/// shared by all callers, so `eval` takes `&self` and may be called concurrently.
///
/// Dropping the returned future abandons the round-trip. Whatever the store
/// already committed stays committed.
#[async_trait]
pub trait CoordinationStore: Debug + Send + Sync {
    /// Runs the script and returns its reply.
    async fn eval(&self, script: &AtomicScript) -> Result<Reply, StoreError>;
}

#[async_trait]
impl<T> CoordinationStore for Arc<T>
where
    T: CoordinationStore + ?Sized,
{
    async fn eval(&self, script: &AtomicScript) -> Result<Reply, StoreError> {
        (**self).eval(script).await
    }
}
