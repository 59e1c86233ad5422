//! Tether Cache - Shared subscriptions for live queries.
//!
//! This crate sits between views and the transport:
//!
//! - `SubscriptionChannel`: The transport seam ("subscribe with callbacks,
//!   returns a disposer" and "fetch once")
//! - `Disposer`: Releases a subscription when disposed or dropped
//! - `QueryCache`: At most one open channel per (query, args), fanned out to
//!   every listener, closed when the last listener goes away
//! - `MemoryChannel`: In-process channel for tests and non-networked hosts
//! - `DisabledChannel`: Channel for environments that cannot subscribe
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//! use serde_json::json;
//! use tether_cache::{MemoryChannel, QueryCache};
//! use tether_core::{ArgsSource, QueryOutcome, QueryRef};
//!
//! let channel = Rc::new(MemoryChannel::new());
//! let cache = QueryCache::new(channel.clone());
//!
//! let tasks = QueryRef::new("tasks.get");
//! let args = ArgsSource::from(json!({})).resolve().unwrap();
//!
//! let first = cache.subscribe(&tasks, &args, Rc::new(|_: &QueryOutcome| {}));
//! let second = cache.subscribe(&tasks, &args, Rc::new(|_: &QueryOutcome| {}));
//! assert_eq!(channel.subscribe_calls(), 1);
//!
//! drop((first, second));
//! assert_eq!(channel.active_subscriptions(), 0);
//! ```

pub mod cache;
pub mod channel;
pub mod memory;

pub use cache::{CacheKey, Listener, ListenerId, QueryCache};
pub use channel::{DataCallback, DisabledChannel, Disposer, ErrorCallback, SubscriptionChannel};
pub use memory::MemoryChannel;
