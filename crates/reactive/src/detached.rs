//! Detached subscriptions.
//!
//! A `DetachedSubscription` follows the same reconciliation rules as a
//! `QueryView`, but has no host driving recomputation: args are fixed, the
//! state lives in a `Signal`, and the channel is opened once at construction.
//! Prefetched navigation data and decoded envelopes are handed out this way.

use crate::signal::{Signal, SignalSubscription};
use crate::state::{reconcile, OverrideToken, QueryState, ReconcileInput};
use std::rc::Rc;
use std::cell::RefCell;
use std::fmt;
use tether_cache::{Disposer, Listener, QueryCache};
use tether_core::{CanonicalArgs, QueryOutcome, QueryRef, ResolvedArgs, Value};

#[derive(Clone, Debug, Default)]
struct LiveCells {
    /// Latest outcome from the channel
    live: Option<QueryOutcome>,
    override_value: Option<Value>,
    override_generation: u64,
}

struct DetachedInner {
    query: QueryRef,
    args: CanonicalArgs,
    seed: Value,
    cells: Signal<LiveCells>,
    cache: Rc<QueryCache>,
    subscription: RefCell<Option<Disposer>>,
}

/// A seeded live subscription with fixed args.
#[derive(Clone)]
pub struct DetachedSubscription {
    inner: Rc<DetachedInner>,
}

impl DetachedSubscription {
    /// Subscribes to (query, args) and shows `seed` until the first delivery.
    ///
    /// Nothing is opened when the cache is disabled; the seed is then shown
    /// for the lifetime of the subscription.
    pub fn new(
        cache: &Rc<QueryCache>,
        query: QueryRef,
        args: CanonicalArgs,
        seed: Value,
    ) -> Self {
        let cells = Signal::new(LiveCells::default());
        let resolved = ResolvedArgs::Args(args.clone());

        let listener: Listener = {
            let cells = cells.clone();
            Rc::new(move |outcome: &QueryOutcome| {
                cells.update(|c| {
                    c.override_value = None;
                    c.live = Some(outcome.clone());
                });
            })
        };
        let disposer = cache.subscribe(&query, &resolved, listener);

        // An existing entry does not replay its last value.
        if cells.with(|c| c.live.is_none()) {
            if let Some(outcome) = cache.peek(&query, &resolved) {
                cells.update(|c| c.live = Some(outcome));
            }
        }

        Self {
            inner: Rc::new(DetachedInner {
                query,
                args,
                seed,
                cells,
                cache: cache.clone(),
                subscription: RefCell::new(Some(disposer)),
            }),
        }
    }

    /// Returns the visible state.
    pub fn state(&self) -> QueryState {
        self.inner.cells.with(|c| {
            reconcile(&ReconcileInput {
                override_value: c.override_value.as_ref(),
                sync_result: c.live.as_ref(),
                seed: Some(&self.inner.seed),
                ..ReconcileInput::default()
            })
        })
    }

    /// Installs a manual override until the next delivery.
    pub fn set(&self, value: Value) {
        self.install_override(value);
    }

    /// Computes an override from the current data and installs it.
    pub fn with_override<F>(&self, update: F) -> OverrideToken
    where
        F: FnOnce(Option<&Value>) -> Value,
    {
        let current = self.state().data;
        let generation = self.install_override(update(current.as_ref()));

        let cells = self.inner.cells.clone();
        OverrideToken::new(move || {
            let current = cells.with(|c| {
                c.override_generation == generation && c.override_value.is_some()
            });
            if current {
                cells.update(|c| c.override_value = None);
            }
        })
    }

    /// Does nothing: a detached subscription has no host to re-read it.
    pub fn refresh(&self) {
        tracing::debug!(
            query = %self.inner.query,
            "refresh on a detached subscription is a no-op"
        );
    }

    /// Registers a callback run on every delivery or override change.
    pub fn subscribe_changes<F>(&self, callback: F) -> SignalSubscription
    where
        F: Fn() + 'static,
    {
        self.inner.cells.subscribe(callback)
    }

    /// Returns true once the channel has delivered.
    pub fn has_live(&self) -> bool {
        self.inner.cells.with(|c| c.live.is_some())
    }

    /// Returns true while a channel subscription is held.
    pub fn is_subscribed(&self) -> bool {
        !self.inner.cache.is_closed()
            && self
                .inner
                .subscription
                .borrow()
                .as_ref()
                .map(|d| !d.is_noop())
                .unwrap_or(false)
    }

    /// Releases the channel subscription. The last state stays readable.
    pub fn dispose(&self) {
        let released = self.inner.subscription.borrow_mut().take();
        drop(released);
    }

    /// Returns the query.
    pub fn query(&self) -> &QueryRef {
        &self.inner.query
    }

    /// Returns the fixed args.
    pub fn args(&self) -> &CanonicalArgs {
        &self.inner.args
    }

    /// Returns the seed.
    pub fn seed(&self) -> &Value {
        &self.inner.seed
    }

    fn install_override(&self, value: Value) -> u64 {
        let mut generation = 0;
        self.inner.cells.update(|c| {
            c.override_generation += 1;
            c.override_value = Some(value);
            generation = c.override_generation;
        });
        generation
    }
}

impl fmt::Debug for DetachedSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetachedSubscription")
            .field("query", &self.inner.query)
            .field("args", &self.inner.args)
            .field("state", &self.state())
            .finish()
    }
}
