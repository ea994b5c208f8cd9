use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::RedisError;
use redis::Script;
use redis::Value;
use redis::aio::ConnectionManager;
use tokio::time::timeout;
use tracing::info;

use super::CoordinationStore;
use crate::error::StoreError;
use crate::script::Arg;
use crate::script::AtomicScript;
use crate::script::Reply;
use crate::script::ScriptKind;

/// A [`CoordinationStore`] backed by Redis (or anything speaking its protocol).
///
/// Scripts run through `EVALSHA`, falling back to `EVAL` the first time a
/// server sees them; Redis executes each one atomically. The underlying
/// [`ConnectionManager`] is a single multiplexed connection that reconnects on
/// failure, so cloning a `RedisStore` is cheap and every clone shares it.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    scripts: Arc<[Script; ScriptKind::COUNT]>,
    timeout: Duration,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connects to `url` and verifies the connection with a `PING`.
    ///
    /// `op_timeout` bounds the connect and every later script round-trip.
    pub async fn connect(url: &str, op_timeout: Duration) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(unavailable)?;
        let connection = timeout(op_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Timeout(op_timeout))?
            .map_err(unavailable)?;

        let store = Self {
            connection,
            scripts: Arc::new(ScriptKind::ALL.map(|kind| Script::new(kind.source()))),
            timeout: op_timeout,
        };
        store.ping().await?;
        info!(timeout = ?op_timeout, "connected to coordination store");
        Ok(store)
    }

    /// Round-trips a `PING`.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();
        let _: String = timeout(self.timeout, redis::cmd("PING").query_async(&mut connection))
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))?
            .map_err(unavailable)?;
        Ok(())
    }

    /// A connection for ad-hoc commands, sharing the store's multiplexed link.
    pub fn connection(&self) -> ConnectionManager {
        self.connection.clone()
    }
}

#[async_trait]
impl CoordinationStore for RedisStore {
    async fn eval(&self, script: &AtomicScript) -> Result<Reply, StoreError> {
        let name = script.kind().name();
        let mut invocation = self.scripts[script.kind().index()].prepare_invoke();
        for key in script.keys() {
            invocation.key(key.as_str());
        }
        for arg in script.args() {
            match arg {
                Arg::Int(n) => invocation.arg(*n),
                Arg::Text(text) => invocation.arg(text.as_str()),
            };
        }

        let mut connection = self.connection.clone();
        let value: Value = timeout(self.timeout, invocation.invoke_async(&mut connection))
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))?
            .map_err(|err| script_error(name, err))?;

        reply(name, value)
    }
}

fn unavailable(err: RedisError) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

fn script_error(script: &'static str, err: RedisError) -> StoreError {
    if err.is_io_error() || err.is_connection_dropped() || err.is_timeout() {
        unavailable(err)
    } else {
        StoreError::Script {
            script,
            reason: err.to_string(),
        }
    }
}

fn reply(script: &'static str, value: Value) -> Result<Reply, StoreError> {
    match value {
        Value::Nil => Ok(Reply::Nil),
        Value::Int(n) => Ok(Reply::Int(n)),
        Value::BulkString(data) => Ok(Reply::Data(data)),
        Value::SimpleString(text) => Ok(Reply::Data(text.into_bytes())),
        Value::Okay => Ok(Reply::Data(b"OK".to_vec())),
        other => Err(StoreError::UnexpectedReply {
            script,
            reply: format!("{other:?}"),
        }),
    }
}
