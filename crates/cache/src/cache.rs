//! Shared query cache.
//!
//! `QueryCache` owns, per (query, canonical args) pair, at most one open
//! channel and the most recently delivered outcome. Views register listeners;
//! every delivery on the channel is fanned out to all current listeners in
//! emission order. When the last listener goes away the channel is closed.
//!
//! The cache is single-threaded. Channels may deliver synchronously from
//! inside `subscribe`, and listeners may subscribe or dispose from inside a
//! callback, so no interior borrow is held while calling out.

use crate::channel::{DataCallback, Disposer, ErrorCallback, SubscriptionChannel};
use std::rc::{Rc, Weak};
use std::cell::{Cell, RefCell};
use std::fmt;
use futures::future::LocalBoxFuture;
use hashbrown::HashMap;
use tether_core::{CanonicalArgs, QueryOutcome, QueryRef, ResolvedArgs};

/// Callback registered by a view on a cache entry.
pub type Listener = Rc<dyn Fn(&QueryOutcome)>;

/// Unique identifier for a listener.
pub type ListenerId = u64;

/// Key of a cache entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// The query
    pub query: QueryRef,
    /// Its canonical arguments
    pub args: CanonicalArgs,
}

impl CacheKey {
    /// Creates a cache key.
    pub fn new(query: QueryRef, args: CanonicalArgs) -> Self {
        Self { query, args }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.query, self.args)
    }
}

struct CacheEntry {
    /// Most recent outcome delivered by the channel
    last_value: Option<QueryOutcome>,
    /// Registered listeners, in registration order
    listeners: Vec<(ListenerId, Listener)>,
    /// Disposer of the open channel
    channel: Option<Disposer>,
    /// Deliveries tagged with another generation come from a closed channel
    channel_generation: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    next_listener_id: ListenerId,
    next_generation: u64,
}

/// Deduplicating cache of live query subscriptions.
pub struct QueryCache {
    channel: Rc<dyn SubscriptionChannel>,
    disabled: bool,
    /// Set by `clear`; nothing opens afterwards
    closed: Cell<bool>,
    state: RefCell<CacheState>,
    self_ref: Weak<QueryCache>,
}

impl QueryCache {
    /// Creates a cache on top of a channel.
    ///
    /// The cache is disabled when the channel reports it cannot open
    /// subscriptions.
    pub fn new(channel: Rc<dyn SubscriptionChannel>) -> Rc<Self> {
        let disabled = channel.is_disabled();
        Self::with_disabled(channel, disabled)
    }

    /// Creates a cache, forcing disabled mode on or off.
    ///
    /// A disabled cache never opens channels; subscriptions are no-ops.
    pub fn with_disabled(channel: Rc<dyn SubscriptionChannel>, disabled: bool) -> Rc<Self> {
        Rc::new_cyclic(|self_ref| Self {
            channel,
            disabled,
            closed: Cell::new(false),
            state: RefCell::new(CacheState {
                entries: HashMap::new(),
                next_listener_id: 1,
                next_generation: 1,
            }),
            self_ref: self_ref.clone(),
        })
    }

    /// Returns true if subscriptions are no-ops.
    #[inline]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Returns true once `clear` has run.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    /// Returns the underlying channel.
    pub fn channel(&self) -> &Rc<dyn SubscriptionChannel> {
        &self.channel
    }

    /// Subscribes a listener to (query, args).
    ///
    /// Skip args, disabled mode and a cleared cache return a no-op disposer
    /// without opening anything. The first listener for a key opens the channel; later
    /// listeners share it. Disposing the last listener closes the channel.
    pub fn subscribe(
        &self,
        query: &QueryRef,
        args: &ResolvedArgs,
        listener: Listener,
    ) -> Disposer {
        let args = match args {
            ResolvedArgs::Skip => return Disposer::noop(),
            ResolvedArgs::Args(args) => args,
        };
        if self.disabled {
            tracing::debug!(query = %query, "transport disabled, not subscribing");
            return Disposer::noop();
        }
        if self.closed.get() {
            tracing::debug!(query = %query, "cache cleared, not subscribing");
            return Disposer::noop();
        }

        let key = CacheKey::new(query.clone(), args.clone());
        let (id, open_generation) = {
            let state = &mut *self.state.borrow_mut();
            let id = state.next_listener_id;
            state.next_listener_id += 1;

            match state.entries.get_mut(&key) {
                Some(entry) => {
                    entry.listeners.push((id, listener));
                    (id, None)
                }
                None => {
                    let generation = state.next_generation;
                    state.next_generation += 1;
                    state.entries.insert(
                        key.clone(),
                        CacheEntry {
                            last_value: None,
                            listeners: vec![(id, listener)],
                            channel: None,
                            channel_generation: generation,
                        },
                    );
                    (id, Some(generation))
                }
            }
        };

        if let Some(generation) = open_generation {
            self.open_channel(&key, generation);
        }

        let weak = self.self_ref.clone();
        Disposer::new(move || {
            if let Some(cache) = weak.upgrade() {
                cache.remove_listener(&key, id);
            }
        })
    }

    /// Returns the synchronously available outcome for (query, args).
    pub fn peek(&self, query: &QueryRef, args: &ResolvedArgs) -> Option<QueryOutcome> {
        let args = args.args()?;
        let key = CacheKey::new(query.clone(), args.clone());
        self.state
            .borrow()
            .entries
            .get(&key)
            .and_then(|entry| entry.last_value.clone())
    }

    /// Closes and re-opens the channel of an existing entry.
    ///
    /// The last outcome is kept so views do not regress to loading. Returns
    /// false if no entry exists for (query, args).
    pub fn reopen(&self, query: &QueryRef, args: &CanonicalArgs) -> bool {
        let key = CacheKey::new(query.clone(), args.clone());
        let (old, generation) = {
            let state = &mut *self.state.borrow_mut();
            let generation = state.next_generation;
            let entry = match state.entries.get_mut(&key) {
                Some(entry) => entry,
                None => return false,
            };
            entry.channel_generation = generation;
            let old = entry.channel.take();
            state.next_generation += 1;
            (old, generation)
        };

        tracing::debug!(key = %key, "reopening channel");
        if let Some(old) = old {
            old.dispose();
        }
        self.open_channel(&key, generation);
        true
    }

    /// Returns the number of live entries.
    pub fn entry_count(&self) -> usize {
        self.state.borrow().entries.len()
    }

    /// Returns the number of listeners on (query, args).
    pub fn listener_count(&self, query: &QueryRef, args: &CanonicalArgs) -> usize {
        let key = CacheKey::new(query.clone(), args.clone());
        self.state
            .borrow()
            .entries
            .get(&key)
            .map(|entry| entry.listeners.len())
            .unwrap_or(0)
    }

    /// Returns true if an entry exists for (query, args).
    pub fn contains(&self, query: &QueryRef, args: &CanonicalArgs) -> bool {
        let key = CacheKey::new(query.clone(), args.clone());
        self.state.borrow().entries.contains_key(&key)
    }

    /// Runs the query once through the channel.
    pub fn fetch_once(
        &self,
        query: &QueryRef,
        args: &CanonicalArgs,
    ) -> LocalBoxFuture<'static, QueryOutcome> {
        self.channel.fetch_once(query, args)
    }

    /// Closes every channel and drops every entry.
    ///
    /// Outstanding disposers become no-ops and later subscriptions are
    /// refused, so nothing re-opens after shutdown.
    pub fn clear(&self) {
        self.closed.set(true);
        let entries: Vec<CacheEntry> = {
            let mut state = self.state.borrow_mut();
            state.entries.drain().map(|(_, entry)| entry).collect()
        };
        if !entries.is_empty() {
            tracing::debug!(entries = entries.len(), "closing all channels");
        }
        drop(entries);
    }

    fn open_channel(&self, key: &CacheKey, generation: u64) {
        let on_data: DataCallback = {
            let weak = self.self_ref.clone();
            let key = key.clone();
            Box::new(move |value| {
                if let Some(cache) = weak.upgrade() {
                    cache.deliver(&key, generation, Ok(value));
                }
            })
        };
        let on_error: ErrorCallback = {
            let weak = self.self_ref.clone();
            let key = key.clone();
            Box::new(move |err| {
                if let Some(cache) = weak.upgrade() {
                    cache.deliver(&key, generation, Err(err));
                }
            })
        };

        tracing::debug!(key = %key, generation, "opening channel");
        let disposer = self.channel.subscribe(&key.query, &key.args, on_data, on_error);

        // A synchronous delivery may already have torn the entry down.
        let stale = {
            let mut state = self.state.borrow_mut();
            match state.entries.get_mut(key) {
                Some(entry) if entry.channel_generation == generation => {
                    entry.channel = Some(disposer);
                    None
                }
                _ => Some(disposer),
            }
        };
        if let Some(disposer) = stale {
            tracing::debug!(key = %key, "entry gone before channel opened, closing");
            disposer.dispose();
        }
    }

    fn deliver(&self, key: &CacheKey, generation: u64, outcome: QueryOutcome) {
        let listeners: Vec<Listener> = {
            let mut state = self.state.borrow_mut();
            let entry = match state.entries.get_mut(key) {
                Some(entry) => entry,
                None => return,
            };
            if entry.channel_generation != generation {
                return;
            }
            entry.last_value = Some(outcome.clone());
            entry.listeners.iter().map(|(_, l)| l.clone()).collect()
        };

        for listener in listeners {
            listener(&outcome);
        }
    }

    fn remove_listener(&self, key: &CacheKey, id: ListenerId) {
        let removed = {
            let mut state = self.state.borrow_mut();
            let now_empty = match state.entries.get_mut(key) {
                Some(entry) => {
                    entry.listeners.retain(|(lid, _)| *lid != id);
                    entry.listeners.is_empty()
                }
                None => return,
            };
            if now_empty {
                state.entries.remove(key)
            } else {
                None
            }
        };

        if let Some(entry) = removed {
            tracing::debug!(key = %key, "last listener gone, closing channel");
            drop(entry);
        }
    }
}

impl fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("disabled", &self.disabled)
            .field("closed", &self.closed.get())
            .field("entries", &self.state.borrow().entries.len())
            .finish()
    }
}
