//! In-process subscription channel.
//!
//! `MemoryChannel` keeps a current outcome per (query, args) and pushes it to
//! subscribers when it changes. It is what tests and non-networked hosts use
//! in place of a real transport: new subscribers receive the current outcome
//! synchronously, like a client that already holds the result locally.

use crate::cache::CacheKey;
use crate::channel::{DataCallback, Disposer, ErrorCallback, SubscriptionChannel};
use std::rc::Rc;
use std::cell::RefCell;
use futures::future::{self, LocalBoxFuture};
use hashbrown::HashMap;
use tether_core::{CanonicalArgs, QueryOutcome, QueryRef, RemoteError};

struct Subscriber {
    on_data: DataCallback,
    on_error: ErrorCallback,
}

impl Subscriber {
    fn deliver(&self, outcome: &QueryOutcome) {
        match outcome {
            Ok(value) => (self.on_data)(value.clone()),
            Err(err) => (self.on_error)(err.clone()),
        }
    }
}

#[derive(Default)]
struct MemoryState {
    current: HashMap<CacheKey, QueryOutcome>,
    subscribers: HashMap<CacheKey, Vec<(u64, Rc<Subscriber>)>>,
    next_id: u64,
    subscribe_calls: usize,
    fetch_calls: usize,
}

/// A subscription channel backed by in-memory results.
#[derive(Default)]
pub struct MemoryChannel {
    state: Rc<RefCell<MemoryState>>,
    disabled: bool,
}

impl MemoryChannel {
    /// Creates an empty channel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a channel that reports itself as disabled.
    pub fn disabled() -> Self {
        Self {
            state: Rc::default(),
            disabled: true,
        }
    }

    /// Sets the current outcome for (query, args) and pushes it to every
    /// subscriber of that key.
    pub fn publish(&self, query: &QueryRef, args: &CanonicalArgs, outcome: QueryOutcome) {
        let key = CacheKey::new(query.clone(), args.clone());
        let subscribers: Vec<Rc<Subscriber>> = {
            let mut state = self.state.borrow_mut();
            state.current.insert(key.clone(), outcome.clone());
            state
                .subscribers
                .get(&key)
                .map(|subs| subs.iter().map(|(_, s)| s.clone()).collect())
                .unwrap_or_default()
        };
        for subscriber in subscribers {
            subscriber.deliver(&outcome);
        }
    }

    /// Forgets the current outcome for (query, args) without notifying.
    pub fn forget(&self, query: &QueryRef, args: &CanonicalArgs) {
        let key = CacheKey::new(query.clone(), args.clone());
        self.state.borrow_mut().current.remove(&key);
    }

    /// Total number of `subscribe` calls so far.
    pub fn subscribe_calls(&self) -> usize {
        self.state.borrow().subscribe_calls
    }

    /// Total number of `fetch_once` calls so far.
    pub fn fetch_calls(&self) -> usize {
        self.state.borrow().fetch_calls
    }

    /// Number of subscriptions currently open, across all keys.
    pub fn active_subscriptions(&self) -> usize {
        self.state.borrow().subscribers.values().map(Vec::len).sum()
    }

    /// Number of subscriptions currently open for (query, args).
    pub fn active_for(&self, query: &QueryRef, args: &CanonicalArgs) -> usize {
        let key = CacheKey::new(query.clone(), args.clone());
        self.state
            .borrow()
            .subscribers
            .get(&key)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl SubscriptionChannel for MemoryChannel {
    fn subscribe(
        &self,
        query: &QueryRef,
        args: &CanonicalArgs,
        on_data: DataCallback,
        on_error: ErrorCallback,
    ) -> Disposer {
        if self.disabled {
            return Disposer::noop();
        }

        let key = CacheKey::new(query.clone(), args.clone());
        let subscriber = Rc::new(Subscriber { on_data, on_error });
        let (id, replay) = {
            let mut state = self.state.borrow_mut();
            state.subscribe_calls += 1;
            state.next_id += 1;
            let id = state.next_id;
            state
                .subscribers
                .entry(key.clone())
                .or_default()
                .push((id, subscriber.clone()));
            (id, state.current.get(&key).cloned())
        };

        if let Some(outcome) = replay {
            subscriber.deliver(&outcome);
        }

        let weak = Rc::downgrade(&self.state);
        Disposer::new(move || {
            if let Some(state) = weak.upgrade() {
                let removed = {
                    let mut state = state.borrow_mut();
                    let mut removed = Vec::new();
                    if let Some(subs) = state.subscribers.get_mut(&key) {
                        if let Some(pos) = subs.iter().position(|(sid, _)| *sid == id) {
                            removed.push(subs.remove(pos));
                        }
                        if subs.is_empty() {
                            state.subscribers.remove(&key);
                        }
                    }
                    removed
                };
                drop(removed);
            }
        })
    }

    fn fetch_once(
        &self,
        query: &QueryRef,
        args: &CanonicalArgs,
    ) -> LocalBoxFuture<'static, QueryOutcome> {
        let key = CacheKey::new(query.clone(), args.clone());
        let outcome = {
            let mut state = self.state.borrow_mut();
            state.fetch_calls += 1;
            state.current.get(&key).cloned()
        };
        let outcome = outcome
            .unwrap_or_else(|| Err(RemoteError::new(format!("no result for {query}{args}"))));
        Box::pin(future::ready(outcome))
    }

    fn is_disabled(&self) -> bool {
        self.disabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tether_core::Value;

    fn record() -> (Rc<RefCell<Vec<QueryOutcome>>>, DataCallback, ErrorCallback) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let data_seen = seen.clone();
        let error_seen = seen.clone();
        (
            seen,
            Box::new(move |v: Value| data_seen.borrow_mut().push(Ok(v))),
            Box::new(move |e: RemoteError| error_seen.borrow_mut().push(Err(e))),
        )
    }

    #[test]
    fn test_publish_reaches_subscribers() {
        let channel = MemoryChannel::new();
        let q = QueryRef::new("tasks.get");
        let a = CanonicalArgs::empty();
        let (seen, on_data, on_error) = record();

        let _d = channel.subscribe(&q, &a, on_data, on_error);
        channel.publish(&q, &a, Ok(json!([1])));
        channel.publish(&q, &a, Err(RemoteError::new("gone")));

        assert_eq!(
            seen.borrow().as_slice(),
            &[Ok(json!([1])), Err(RemoteError::new("gone"))]
        );
    }

    #[test]
    fn test_subscribe_replays_current() {
        let channel = MemoryChannel::new();
        let q = QueryRef::new("tasks.get");
        let a = CanonicalArgs::empty();
        channel.publish(&q, &a, Ok(json!("now")));

        let (seen, on_data, on_error) = record();
        let _d = channel.subscribe(&q, &a, on_data, on_error);

        assert_eq!(seen.borrow().as_slice(), &[Ok(json!("now"))]);
    }

    #[test]
    fn test_dispose_stops_delivery() {
        let channel = MemoryChannel::new();
        let q = QueryRef::new("tasks.get");
        let a = CanonicalArgs::empty();
        let (seen, on_data, on_error) = record();

        let d = channel.subscribe(&q, &a, on_data, on_error);
        assert_eq!(channel.active_for(&q, &a), 1);
        d.dispose();
        assert_eq!(channel.active_subscriptions(), 0);

        channel.publish(&q, &a, Ok(json!(1)));
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_fetch_without_result_fails() {
        let channel = MemoryChannel::new();
        let result = futures::executor::block_on(
            channel.fetch_once(&QueryRef::new("tasks.get"), &CanonicalArgs::empty()),
        );
        assert!(result.is_err());
        assert_eq!(channel.fetch_calls(), 1);
    }

    #[test]
    fn test_disabled_channel_never_subscribes() {
        let channel = MemoryChannel::disabled();
        let (_, on_data, on_error) = record();
        let d = channel.subscribe(&QueryRef::new("q"), &CanonicalArgs::empty(), on_data, on_error);

        assert!(d.is_noop());
        assert!(channel.is_disabled());
        assert_eq!(channel.subscribe_calls(), 0);
    }

    #[test]
    fn test_forget_clears_current() {
        let channel = MemoryChannel::new();
        let q = QueryRef::new("tasks.get");
        let a = CanonicalArgs::empty();
        channel.publish(&q, &a, Ok(json!(1)));
        channel.forget(&q, &a);

        let result = futures::executor::block_on(channel.fetch_once(&q, &a));
        assert!(result.is_err());
    }
}
