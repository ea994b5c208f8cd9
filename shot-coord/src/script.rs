use std::fmt;

use crate::key::CoordinationKey;

const FIXED_WINDOW: &str = r#"
local current = tonumber(redis.call("GET", KEYS[1]) or "0")
if current >= tonumber(ARGV[1]) then
  return 0
end
if redis.call("INCR", KEYS[1]) == 1 then
  redis.call("EXPIRE", KEYS[1], ARGV[2])
end
return 1
"#;

const SLIDING_WINDOW: &str = r#"
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local count = redis.call("ZCOUNT", KEYS[1], "(" .. (now - window), "+inf")
if count >= tonumber(ARGV[3]) then
  return 0
end
redis.call("ZREMRANGEBYSCORE", KEYS[1], "-inf", now - window)
redis.call("ZADD", KEYS[1], now, now .. "-" .. count)
redis.call("PEXPIRE", KEYS[1], window)
return 1
"#;

const LOCK: &str = r#"
if redis.call("SET", KEYS[1], ARGV[1], "NX", "PX", ARGV[2]) then
  return 1
end
return 0
"#;

const HANDOFF: &str = r#"
return redis.call("RPOPLPUSH", KEYS[1], KEYS[2])
"#;

const SESSION_RENEW: &str = r#"
local value = redis.call("GET", KEYS[1])
if value then
  redis.call("EXPIRE", KEYS[1], ARGV[1])
end
return value
"#;

const COMPARE_AND_SWAP: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
  redis.call("SET", KEYS[1], ARGV[2])
  return 1
end
return 0
"#;

const PAGE_COUNTER: &str = r#"
local current = redis.call("INCR", KEYS[1])
if current == 1 then
  redis.call("EXPIRE", KEYS[1], ARGV[1])
end
return current
"#;

/// Identifies which decision function a script evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptKind {
    FixedWindow,
    SlidingWindow,
    Lock,
    Handoff,
    SessionRenew,
    CompareAndSwap,
    PageCounter,
}

impl ScriptKind {
    pub const COUNT: usize = 7;

    /// Every kind, in discriminant order.
    pub const ALL: [ScriptKind; Self::COUNT] = [
        ScriptKind::FixedWindow,
        ScriptKind::SlidingWindow,
        ScriptKind::Lock,
        ScriptKind::Handoff,
        ScriptKind::SessionRenew,
        ScriptKind::CompareAndSwap,
        ScriptKind::PageCounter,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ScriptKind::FixedWindow => "fixed_window",
            ScriptKind::SlidingWindow => "sliding_window",
            ScriptKind::Lock => "lock",
            ScriptKind::Handoff => "handoff",
            ScriptKind::SessionRenew => "session_renew",
            ScriptKind::CompareAndSwap => "compare_and_swap",
            ScriptKind::PageCounter => "page_counter",
        }
    }

    /// The Lua source evaluated by a Redis-compatible store.
    pub fn source(self) -> &'static str {
        match self {
            ScriptKind::FixedWindow => FIXED_WINDOW,
            ScriptKind::SlidingWindow => SLIDING_WINDOW,
            ScriptKind::Lock => LOCK,
            ScriptKind::Handoff => HANDOFF,
            ScriptKind::SessionRenew => SESSION_RENEW,
            ScriptKind::CompareAndSwap => COMPARE_AND_SWAP,
            ScriptKind::PageCounter => PAGE_COUNTER,
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// A single positional script argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Int(i64),
    Text(String),
}

impl Arg {
    fn count(value: u64) -> Self {
        Arg::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Int(n) => write!(f, "{n}"),
            Arg::Text(s) => f.write_str(s),
        }
    }
}

/// An immutable script invocation: what to run, on which keys, with which arguments.
///
/// Only the constructors below can build one, so the key and argument layout
/// always matches what the script expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtomicScript {
    kind: ScriptKind,
    keys: Vec<CoordinationKey>,
    args: Vec<Arg>,
}

impl AtomicScript {
    /// `[limiterKey]`, `limit, windowSeconds` -> `0/1`
    pub fn fixed_window(key: CoordinationKey, limit: u64, window_secs: u64) -> Self {
        Self {
            kind: ScriptKind::FixedWindow,
            keys: vec![key],
            args: vec![Arg::count(limit), Arg::count(window_secs)],
        }
    }

    /// `[limiterKey]`, `nowMs, windowMs, limit` -> `0/1`
    pub fn sliding_window(key: CoordinationKey, now_ms: i64, window_ms: u64, limit: u64) -> Self {
        Self {
            kind: ScriptKind::SlidingWindow,
            keys: vec![key],
            args: vec![Arg::Int(now_ms), Arg::count(window_ms), Arg::count(limit)],
        }
    }

    /// `[lockKey]`, `holderToken, leaseMs` -> `0/1`
    pub fn lock(key: CoordinationKey, holder: String, lease_ms: u64) -> Self {
        Self {
            kind: ScriptKind::Lock,
            keys: vec![key],
            args: vec![Arg::Text(holder), Arg::count(lease_ms)],
        }
    }

    /// `[sourceKey, processingKey]` -> item or nil
    pub fn handoff(source: CoordinationKey, processing: CoordinationKey) -> Self {
        Self {
            kind: ScriptKind::Handoff,
            keys: vec![source, processing],
            args: Vec::new(),
        }
    }

    /// `[sessionKey]`, `ttlSeconds` -> value or nil
    pub fn session_renew(key: CoordinationKey, ttl_secs: u64) -> Self {
        Self {
            kind: ScriptKind::SessionRenew,
            keys: vec![key],
            args: vec![Arg::count(ttl_secs)],
        }
    }

    /// `[stateKey]`, `expectedValue, newValue` -> `0/1`
    pub fn compare_and_swap(key: CoordinationKey, expected: String, new: String) -> Self {
        Self {
            kind: ScriptKind::CompareAndSwap,
            keys: vec![key],
            args: vec![Arg::Text(expected), Arg::Text(new)],
        }
    }

    /// `[counterKey]`, `ttlSeconds` -> count
    pub fn page_counter(key: CoordinationKey, ttl_secs: u64) -> Self {
        Self {
            kind: ScriptKind::PageCounter,
            keys: vec![key],
            args: vec![Arg::count(ttl_secs)],
        }
    }

    pub fn kind(&self) -> ScriptKind {
        self.kind
    }

    pub fn keys(&self) -> &[CoordinationKey] {
        &self.keys
    }

    pub fn args(&self) -> &[Arg] {
        &self.args
    }
}

/// What a script handed back, reduced to the shapes primitives care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Nil,
    Int(i64),
    Data(Vec<u8>),
}

impl Reply {
    /// Interprets a `0/1` flag reply.
    pub(crate) fn flag(&self) -> Option<bool> {
        match self {
            Reply::Int(0) => Some(false),
            Reply::Int(1) => Some(true),
            _ => None,
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Nil => f.write_str("nil"),
            Reply::Int(n) => write!(f, "integer {n}"),
            Reply::Data(data) => write!(f, "{} bytes of data", data.len()),
        }
    }
}
