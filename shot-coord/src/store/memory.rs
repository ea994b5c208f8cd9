use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;

use super::CoordinationStore;
use crate::error::StoreError;
use crate::script::Arg;
use crate::script::AtomicScript;
use crate::script::Reply;
use crate::script::ScriptKind;

const WRONG_TYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";
const NOT_AN_INTEGER: &str = "ERR value is not an integer or out of range";

/// An in-process [`CoordinationStore`].
///
/// Scripts are serialized behind a single mutex and evaluated with the same
/// semantics as their Lua counterparts, expiry included. State is scoped to this
/// process: it coordinates the tasks of one server instance and nothing more.
/// Use it for tests and single-instance deployments, never as a substitute for a
/// shared store when several instances serve the same clients.
///
/// Expired keys are dropped on the next access to the store, whichever key that
/// access touches, so clients that never return do not pin memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<String, Entry>,
    /// Every deadline ever set, soonest first. Entries whose key has since been
    /// rewritten or re-expired are skipped when they surface.
    deadlines: BinaryHeap<Reverse<(Instant, String)>>,
}

impl State {
    fn purge(&mut self, now: Instant) {
        while let Some(Reverse((at, _))) = self.deadlines.peek() {
            if *at > now {
                break;
            }
            let Some(Reverse((at, key))) = self.deadlines.pop() else {
                break;
            };
            if self
                .entries
                .get(&key)
                .is_some_and(|entry| entry.expires_at == Some(at))
            {
                self.entries.remove(&key);
            }
        }
    }
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug)]
enum Value {
    Text(Vec<u8>),
    /// Head at the front, tail at the back.
    List(VecDeque<Vec<u8>>),
    /// `(score, member)` pairs, members unique.
    Sorted(Vec<(i64, String)>),
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a plain value, replacing whatever was there.
    pub fn set(&self, key: &str, value: impl Into<Vec<u8>>, ttl: Option<Duration>) {
        let mut state = self.state();
        let mut space = Keyspace::new(&mut state);
        space.set(key, value.into());
        if let Some(ttl) = ttl {
            let at = space.now.checked_add(ttl);
            space.deadline(key, at);
        }
    }

    /// Reads a plain value.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut state = self.state();
        match Keyspace::new(&mut state).live(key) {
            Some(Entry {
                value: Value::Text(data),
                ..
            }) => Some(data.clone()),
            _ => None,
        }
    }

    /// Pushes an item onto the head of a list.
    pub fn push(&self, key: &str, item: impl Into<Vec<u8>>) {
        let item: Vec<u8> = item.into();
        let mut state = self.state();
        let mut space = Keyspace::new(&mut state);
        match space.list_mut(key) {
            Ok(list) => list.push_front(item),
            Err(_) => {
                space
                    .entries
                    .insert(key.to_string(), Entry::new(Value::List(VecDeque::from([item]))));
            }
        }
    }

    /// A list's items, head first.
    pub fn list(&self, key: &str) -> Vec<Vec<u8>> {
        let mut state = self.state();
        match Keyspace::new(&mut state).live(key) {
            Some(Entry {
                value: Value::List(list),
                ..
            }) => list.iter().cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// Remaining time to live, `None` for missing keys and keys without expiry.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let mut state = self.state();
        let mut space = Keyspace::new(&mut state);
        let now = space.now;
        space
            .live(key)
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    pub fn exists(&self, key: &str) -> bool {
        let mut state = self.state();
        Keyspace::new(&mut state).live(key).is_some()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // Every mutation completes before the guard drops, so a poisoned map is still consistent
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn eval(&self, script: &AtomicScript) -> Result<Reply, StoreError> {
        let mut state = self.state();
        let mut space = Keyspace::new(&mut state);
        evaluate(&mut space, script).map_err(|reason| StoreError::Script {
            script: script.kind().name(),
            reason,
        })
    }
}

/// The map as seen at one instant, everything due by then already dropped.
struct Keyspace<'a> {
    entries: &'a mut HashMap<String, Entry>,
    deadlines: &'a mut BinaryHeap<Reverse<(Instant, String)>>,
    now: Instant,
}

impl<'a> Keyspace<'a> {
    fn new(state: &'a mut State) -> Self {
        let now = Instant::now();
        state.purge(now);
        Self {
            entries: &mut state.entries,
            deadlines: &mut state.deadlines,
            now,
        }
    }

    /// Sets or clears the expiry of a live key. A deadline past what `Instant`
    /// can represent means the key never expires.
    fn deadline(&mut self, key: &str, at: Option<Instant>) {
        let Some(entry) = self.live(key) else {
            return;
        };
        entry.expires_at = at;
        if let Some(at) = at {
            self.deadlines.push(Reverse((at, key.to_string())));
        }
    }

    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        if self
            .entries
            .get(key)
            .is_some_and(|entry| entry.is_expired(self.now))
        {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, String> {
        match self.live(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Text(data),
                ..
            }) => Ok(Some(data.clone())),
            Some(_) => Err(WRONG_TYPE.into()),
        }
    }

    /// Plain `SET`: replaces the value and clears any expiry.
    fn set(&mut self, key: &str, data: Vec<u8>) {
        self.entries
            .insert(key.to_string(), Entry::new(Value::Text(data)));
    }

    fn incr(&mut self, key: &str) -> Result<i64, String> {
        match self.live(key) {
            None => {
                self.set(key, b"1".to_vec());
                Ok(1)
            }
            Some(Entry {
                value: Value::Text(data),
                ..
            }) => {
                let next = parse_int(data)?
                    .checked_add(1)
                    .ok_or_else(|| NOT_AN_INTEGER.to_string())?;
                *data = next.to_string().into_bytes();
                Ok(next)
            }
            Some(_) => Err(WRONG_TYPE.into()),
        }
    }

    /// `PEXPIRE`: a non-positive ttl deletes the key.
    fn expire(&mut self, key: &str, ttl_ms: i64) {
        if ttl_ms <= 0 {
            self.entries.remove(key);
            return;
        }
        let at = self.now.checked_add(Duration::from_millis(ttl_ms as u64));
        self.deadline(key, at);
    }

    fn list_mut(&mut self, key: &str) -> Result<&mut VecDeque<Vec<u8>>, String> {
        self.live(key);
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::List(VecDeque::new())));
        match &mut entry.value {
            Value::List(list) => Ok(list),
            _ => Err(WRONG_TYPE.into()),
        }
    }

    fn check_list(&mut self, key: &str) -> Result<(), String> {
        match self.live(key) {
            None
            | Some(Entry {
                value: Value::List(_),
                ..
            }) => Ok(()),
            Some(_) => Err(WRONG_TYPE.into()),
        }
    }

    fn sorted_mut(&mut self, key: &str) -> Result<&mut Vec<(i64, String)>, String> {
        self.live(key);
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::Sorted(Vec::new())));
        match &mut entry.value {
            Value::Sorted(set) => Ok(set),
            _ => Err(WRONG_TYPE.into()),
        }
    }

    fn count_above(&mut self, key: &str, floor: i64) -> Result<i64, String> {
        match self.live(key) {
            None => Ok(0),
            Some(Entry {
                value: Value::Sorted(set),
                ..
            }) => Ok(set.iter().filter(|(score, _)| *score > floor).count() as i64),
            Some(_) => Err(WRONG_TYPE.into()),
        }
    }
}

fn parse_int(data: &[u8]) -> Result<i64, String> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or_else(|| NOT_AN_INTEGER.to_string())
}

fn key(script: &AtomicScript, index: usize) -> Result<&str, String> {
    script
        .keys()
        .get(index)
        .map(|key| key.as_str())
        .ok_or_else(|| format!("ERR missing KEYS[{}]", index + 1))
}

fn int_arg(script: &AtomicScript, index: usize) -> Result<i64, String> {
    match script.args().get(index) {
        Some(Arg::Int(n)) => Ok(*n),
        Some(Arg::Text(text)) => parse_int(text.as_bytes()),
        None => Err(format!("ERR missing ARGV[{}]", index + 1)),
    }
}

fn text_arg(script: &AtomicScript, index: usize) -> Result<String, String> {
    script
        .args()
        .get(index)
        .map(Arg::to_string)
        .ok_or_else(|| format!("ERR missing ARGV[{}]", index + 1))
}

fn evaluate(space: &mut Keyspace<'_>, script: &AtomicScript) -> Result<Reply, String> {
    match script.kind() {
        ScriptKind::FixedWindow => {
            let key = key(script, 0)?;
            let limit = int_arg(script, 0)?;
            let window_secs = int_arg(script, 1)?;
            let current = match space.get(key)? {
                Some(data) => parse_int(&data)?,
                None => 0,
            };
            if current >= limit {
                return Ok(Reply::Int(0));
            }
            if space.incr(key)? == 1 {
                space.expire(key, window_secs.saturating_mul(1000));
            }
            Ok(Reply::Int(1))
        }
        ScriptKind::SlidingWindow => {
            let key = key(script, 0)?;
            let now = int_arg(script, 0)?;
            let window = int_arg(script, 1)?;
            let limit = int_arg(script, 2)?;
            let floor = now.saturating_sub(window);
            let count = space.count_above(key, floor)?;
            if count >= limit {
                return Ok(Reply::Int(0));
            }
            let member = format!("{now}-{count}");
            let set = space.sorted_mut(key)?;
            set.retain(|(score, existing)| *score > floor && *existing != member);
            set.push((now, member));
            space.expire(key, window);
            Ok(Reply::Int(1))
        }
        ScriptKind::Lock => {
            let key = key(script, 0)?;
            let holder = text_arg(script, 0)?;
            let lease_ms = int_arg(script, 1)?;
            if lease_ms <= 0 {
                return Err("ERR invalid expire time in 'set' command".into());
            }
            if space.live(key).is_some() {
                return Ok(Reply::Int(0));
            }
            space.set(key, holder.into_bytes());
            space.expire(key, lease_ms);
            Ok(Reply::Int(1))
        }
        ScriptKind::Handoff => {
            let source = key(script, 0)?;
            let processing = key(script, 1)?;
            space.check_list(source)?;
            space.check_list(processing)?;
            if space.live(source).is_none() {
                return Ok(Reply::Nil);
            }
            let list = space.list_mut(source)?;
            let Some(item) = list.pop_back() else {
                return Ok(Reply::Nil);
            };
            if list.is_empty() && source != processing {
                space.entries.remove(source);
            }
            space.list_mut(processing)?.push_front(item.clone());
            Ok(Reply::Data(item))
        }
        ScriptKind::SessionRenew => {
            let key = key(script, 0)?;
            let ttl_secs = int_arg(script, 0)?;
            match space.get(key)? {
                Some(value) => {
                    space.expire(key, ttl_secs.saturating_mul(1000));
                    Ok(Reply::Data(value))
                }
                None => Ok(Reply::Nil),
            }
        }
        ScriptKind::CompareAndSwap => {
            let key = key(script, 0)?;
            let expected = text_arg(script, 0)?;
            let new = text_arg(script, 1)?;
            if space.get(key)?.as_deref() == Some(expected.as_bytes()) {
                space.set(key, new.into_bytes());
                Ok(Reply::Int(1))
            } else {
                Ok(Reply::Int(0))
            }
        }
        ScriptKind::PageCounter => {
            let key = key(script, 0)?;
            let ttl_secs = int_arg(script, 0)?;
            let current = space.incr(key)?;
            if current == 1 {
                space.expire(key, ttl_secs.saturating_mul(1000));
            }
            Ok(Reply::Int(current))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::CoordinationKey;

    fn key(name: &str) -> CoordinationKey {
        CoordinationKey::fixed(name)
    }

    #[tokio::test]
    async fn fixed_window_denies_without_counting() {
        let store = MemoryStore::new();
        let script = AtomicScript::fixed_window(key("fw"), 2, 60);

        assert_eq!(store.eval(&script).await, Ok(Reply::Int(1)));
        assert_eq!(store.eval(&script).await, Ok(Reply::Int(1)));
        assert_eq!(store.eval(&script).await, Ok(Reply::Int(0)));
        assert_eq!(store.eval(&script).await, Ok(Reply::Int(0)));
        assert_eq!(store.get("fw"), Some(b"2".to_vec()));
        assert!(store.ttl("fw").is_some());
    }

    #[tokio::test]
    async fn expired_keys_disappear() {
        let store = MemoryStore::new();
        store.set("gone", "x", Some(Duration::from_millis(10)));
        assert!(store.exists("gone"));

        std::thread::sleep(Duration::from_millis(15));
        assert!(!store.exists("gone"));
        assert_eq!(store.get("gone"), None);
    }

    #[tokio::test]
    async fn expired_keys_are_swept_by_any_access() {
        let store = MemoryStore::new();
        for n in 0..1_000 {
            let lock = AtomicScript::lock(key(&format!("lock:{n}")), "holder".into(), 1);
            assert_eq!(store.eval(&lock).await, Ok(Reply::Int(1)));
        }
        store.set("kept", "x", None);

        std::thread::sleep(Duration::from_millis(20));
        let other = AtomicScript::page_counter(key("unrelated"), 60);
        assert_eq!(store.eval(&other).await, Ok(Reply::Int(1)));

        let state = store.state();
        assert_eq!(state.entries.len(), 2);
        assert!(state.entries.contains_key("kept"));
        assert_eq!(state.deadlines.len(), 1);
    }

    #[tokio::test]
    async fn renewed_keys_survive_their_old_deadline() {
        let store = MemoryStore::new();
        store.set("session:tok", "user", Some(Duration::from_millis(10)));
        let renew = AtomicScript::session_renew(key("session:tok"), 60);
        assert_eq!(store.eval(&renew).await, Ok(Reply::Data(b"user".to_vec())));

        std::thread::sleep(Duration::from_millis(15));
        assert_eq!(store.get("session:tok"), Some(b"user".to_vec()));
    }

    #[tokio::test]
    async fn unrepresentable_expiry_never_expires() {
        let store = MemoryStore::new();
        let lock = AtomicScript::lock(key("forever"), "holder".into(), u64::MAX);
        assert_eq!(store.eval(&lock).await, Ok(Reply::Int(1)));
        assert_eq!(store.eval(&lock).await, Ok(Reply::Int(0)));

        store.set("pinned", "x", Some(Duration::MAX));
        assert!(store.exists("pinned"));
        assert_eq!(store.ttl("pinned"), None);
    }

    #[tokio::test]
    async fn handoff_moves_tail_to_processing_head() {
        let store = MemoryStore::new();
        store.push("src", "first");
        store.push("src", "second");
        store.push("work", "older");

        let script = AtomicScript::handoff(key("src"), key("work"));
        assert_eq!(store.eval(&script).await, Ok(Reply::Data(b"first".to_vec())));
        assert_eq!(store.list("src"), vec![b"second".to_vec()]);
        assert_eq!(
            store.list("work"),
            vec![b"first".to_vec(), b"older".to_vec()]
        );

        assert_eq!(store.eval(&script).await, Ok(Reply::Data(b"second".to_vec())));
        assert!(!store.exists("src"));
        assert_eq!(store.eval(&script).await, Ok(Reply::Nil));
    }

    #[tokio::test]
    async fn handoff_can_rotate_a_single_list() {
        let store = MemoryStore::new();
        store.push("ring", "a");
        store.push("ring", "b");

        let script = AtomicScript::handoff(key("ring"), key("ring"));
        assert_eq!(store.eval(&script).await, Ok(Reply::Data(b"a".to_vec())));
        assert_eq!(store.list("ring"), vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[tokio::test]
    async fn wrong_types_are_script_errors() {
        let store = MemoryStore::new();
        store.push("list", "item");

        let err = store
            .eval(&AtomicScript::session_renew(key("list"), 10))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Script { script: "session_renew", .. }));

        store.set("text", "value", None);
        let err = store
            .eval(&AtomicScript::handoff(key("text"), key("out")))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Script { .. }));
        assert!(!store.exists("out"));
    }

    #[tokio::test]
    async fn compare_and_swap_clears_expiry() {
        let store = MemoryStore::new();
        store.set("state", "old", Some(Duration::from_secs(30)));

        let script = AtomicScript::compare_and_swap(key("state"), "old".into(), "new".into());
        assert_eq!(store.eval(&script).await, Ok(Reply::Int(1)));
        assert_eq!(store.get("state"), Some(b"new".to_vec()));
        assert_eq!(store.ttl("state"), None);
        assert_eq!(store.eval(&script).await, Ok(Reply::Int(0)));
    }

    #[tokio::test]
    async fn page_counter_counts_up() {
        let store = MemoryStore::new();
        let script = AtomicScript::page_counter(key("views"), 60);

        for expected in 1..=3 {
            assert_eq!(store.eval(&script).await, Ok(Reply::Int(expected)));
        }
        assert!(store.ttl("views").is_some());
    }
}
