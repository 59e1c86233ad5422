//! Tether Reactive - Reactive views over live query subscriptions.
//!
//! This crate turns cache subscriptions into state a UI can render:
//!
//! - `QueryView`: A handle for one live query whose args may change between
//!   reads; `state()` recomputes on demand
//! - `DetachedSubscription`: Fixed args, seeded, no host; used for prefetch
//!   and decoded envelopes
//! - `QueryState`: Data, error, loading and staleness flags
//! - `reconcile`: The precedence rule shared by both
//! - `Signal` / `Notifier`: Change notification for hosts
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//! use serde_json::json;
//! use tether_cache::{MemoryChannel, QueryCache};
//! use tether_core::{CanonicalArgs, QueryRef};
//! use tether_reactive::{QueryOptions, QueryView};
//!
//! let channel = Rc::new(MemoryChannel::new());
//! let cache = QueryCache::new(channel.clone());
//! let tasks = QueryRef::new("tasks.get");
//!
//! let view = QueryView::new(cache, tasks.clone(), json!({}), QueryOptions::new());
//! view.state().unwrap();
//!
//! view.set(json!(["optimistic"]));
//! assert_eq!(view.state().unwrap().data, Some(json!(["optimistic"])));
//!
//! channel.publish(&tasks, &CanonicalArgs::empty(), Ok(json!(["server"])));
//! assert_eq!(view.state().unwrap().data, Some(json!(["server"])));
//! ```

pub mod detached;
pub mod signal;
pub mod state;
pub mod view;

pub use detached::DetachedSubscription;
pub use signal::{ChangeCallback, Notifier, Signal, SignalSubscription, SubscriptionId};
pub use state::{reconcile, OverrideToken, QueryOptions, QueryState, ReconcileInput};
pub use view::QueryView;
