//! # shot-coord
//!
//! `shot-coord` provides atomic decision primitives whose state lives in a shared
//! coordination store, so every server instance sees the same decision.
//!
//! ## Core Philosophy
//!
//! A process-local limiter or lock only protects one process. `shot-coord` pushes the
//! whole read-modify-write of each primitive into a single [`AtomicScript`] that the
//! store executes as one serialized unit. The calling process holds no shared mutable
//! state and takes no locks of its own; it is free to run every request concurrently.
//!
//! ## Key Concepts
//!
//! * **One round-trip**: every primitive makes its decision with exactly one script
//!   evaluation. Splitting it would reintroduce the race the primitive exists to prevent.
//! * **Store seam**: [`CoordinationStore`] is the only thing a primitive talks to.
//!   [`RedisStore`] is the production backend, [`MemoryStore`] a per-process stand-in.
//! * **Decisions, not errors**: primitives never fail; a store problem is reported as
//!   [`Decision::Error`] and it is up to the caller to decide whether to fail open.
//!
//! ## Example
//!
//! ```rust
//! use std::num::NonZeroU64;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use shot_coord::ClientIdentity;
//! use shot_coord::FixedWindow;
//! use shot_coord::MemoryStore;
//!
//! # tokio_test_block_on(async {
//! let store = Arc::new(MemoryStore::new());
//! let limiter = FixedWindow::new(store, NonZeroU64::new(5).unwrap(), Duration::from_secs(1));
//!
//! let client = ClientIdentity::from_peer("10.0.0.7:51234");
//! if limiter.decide(&client).await.is_allowed() {
//!     // Request allowed
//! }
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::fmt;

mod compare_swap;
mod error;
mod fixed_window;
mod handoff;
mod instruments;
mod key;
mod lock;
mod page_counter;
mod script;
mod session;
mod sliding_window;
mod store;

pub use compare_swap::CompareAndSwap;
pub use error::StoreError;
pub use fixed_window::FixedWindow;
pub use handoff::WorkQueueHandoff;
pub use key::ClientIdentity;
pub use key::CoordinationKey;
pub use key::Namespace;
pub use lock::MutualExclusionLock;
pub use page_counter::PageCounter;
pub use script::Arg;
pub use script::AtomicScript;
pub use script::Reply;
pub use script::ScriptKind;
pub use session::SessionRenewer;
pub use sliding_window::SlidingWindow;
pub use store::CoordinationStore;
pub use store::MemoryStore;
pub use store::RedisStore;

/// The result of running a primitive's [`AtomicScript`].
///
/// `Allow`, `Deny`, `Empty` and `Conflict` are authoritative: the store confirmed
/// them. `Error` means the store could not be reached or replied with something
/// the primitive did not expect.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision<T = ()> {
    /// The caller may proceed. Primitives that hand something back attach it here.
    Allow(T),
    /// The caller was refused (limit reached, lease held, session unknown).
    Deny,
    /// There was nothing to hand over.
    Empty,
    /// The expected state did not match; nothing was written.
    Conflict,
    /// The store failed to produce a decision.
    Error(StoreError),
}

impl<T> Decision<T> {
    /// Helper to check if allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow(_))
    }

    /// Whether the store confirmed this decision.
    pub fn is_authoritative(&self) -> bool {
        !matches!(self, Decision::Error(_))
    }

    /// The label this decision is counted under.
    pub fn outcome(&self) -> Outcome {
        match self {
            Decision::Allow(_) => Outcome::Allowed,
            Decision::Deny => Outcome::Denied,
            Decision::Empty => Outcome::Empty,
            Decision::Conflict => Outcome::Conflict,
            Decision::Error(_) => Outcome::Error,
        }
    }

    /// Maps the item carried by an `Allow`.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Decision<U> {
        match self {
            Decision::Allow(item) => Decision::Allow(f(item)),
            Decision::Deny => Decision::Deny,
            Decision::Empty => Decision::Empty,
            Decision::Conflict => Decision::Conflict,
            Decision::Error(err) => Decision::Error(err),
        }
    }
}

/// Observability label for a [`Decision`].
///
/// `Error` is deliberately its own bucket so that requests let through while the
/// store is down are never mistaken for ordinary allowed traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Allowed,
    Denied,
    Empty,
    Conflict,
    Error,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Allowed => "allowed",
            Outcome::Denied => "denied",
            Outcome::Empty => "empty",
            Outcome::Conflict => "conflict",
            Outcome::Error => "error",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
