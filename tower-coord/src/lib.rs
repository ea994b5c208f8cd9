//! # Tower Coord
//!
//! `tower-coord` puts the store-backed primitives of [`shot_coord`] in front of HTTP
//! handlers, as [Tower](https://github.com/tower-rs/tower) layers that plug into
//! [axum](https://github.com/tokio-rs/axum) routes.
//!
//! ## Interceptors
//! A handler is an infallible service from request to response ([`Handler`]). An
//! [`Interceptor`] turns one handler into another, and [`chain`] composes a list of
//! them so that the first one listed sees the request first:
//!
//! ```rust
//! # use std::convert::Infallible;
//! # use std::num::NonZeroU64;
//! # use std::sync::Arc;
//! # use std::time::Duration;
//! # use axum::extract::Request;
//! # use axum::response::IntoResponse;
//! # use shot_coord::MemoryStore;
//! use tower_coord::{AccessLogLayer, GuardLayer, Interceptor, RecoveryLayer, chain, handler};
//!
//! let store = Arc::new(MemoryStore::new());
//! let secure = chain(
//!     handler(tower::service_fn(|_req: Request| async {
//!         Ok::<_, Infallible>("secure ok".into_response())
//!     })),
//!     &[
//!         Interceptor::layer(RecoveryLayer::new()),
//!         Interceptor::layer(AccessLogLayer::new()),
//!         GuardLayer::bearer("s3cret").into(),
//!         GuardLayer::fixed_window(store, NonZeroU64::new(5).unwrap(), Duration::from_secs(1))
//!             .into(),
//!     ],
//! );
//! # let _ = secure;
//! ```
//!
//! ## Guards
//! Every primitive implements [`Guard`]. A [`GuardLayer`] asks its guard for an
//! [`Admission`] and either forwards the request or answers on the spot:
//!
//! | Guard | Refusal |
//! |---|---|
//! | fixed / sliding window | `429 too many requests` |
//! | lock | `429 resource is locked` |
//! | work queue hand-off | `204` (queue empty), `500 invalid item type` |
//! | session | `401 missing session_id`, `401 session not found` |
//! | compare-and-swap | `409 update failed, expected value did not match` |
//! | bearer auth | `401 unauthorized` |
//!
//! When the store cannot decide, the layer's [`FailPolicy`] applies: `Open` (the
//! default) forwards the request, `Closed` answers `503`.

mod access_log;
mod auth;
mod chain;
mod compare_swap;
pub mod config;
mod error;
mod guard;
mod handoff;
mod identity;
mod lock;
mod page_counter;
mod policy;
mod rate_limit;
mod recovery;
mod session;


pub use access_log::AccessLogLayer;
pub use access_log::AccessLogService;
pub use auth::BearerAuth;
pub use chain::Handler;
pub use chain::Interceptor;
pub use chain::chain;
pub use chain::handler;
pub use error::CoordError;
pub use guard::Admission;
pub use guard::Guard;
pub use guard::GuardLayer;
pub use guard::GuardService;
pub use handoff::HandoffItem;
pub use handoff::QUEUE_ITEM_HEADER;
pub use identity::PeerAddr;
pub use identity::client_identity;
pub use page_counter::COUNTER_HEADER;
pub use page_counter::PageViews;
pub use policy::FailPolicy;
pub use recovery::RecoveryFuture;
pub use recovery::RecoveryLayer;
pub use recovery::RecoveryService;
pub use session::SESSION_COOKIE;
pub use session::SessionValue;
