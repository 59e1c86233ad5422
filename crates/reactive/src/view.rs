//! Query views.
//!
//! A `QueryView` is the handle a call site holds for one live query. It is
//! pull-based: every call to [`QueryView::state`] resolves the arguments,
//! brings the subscription in line with them, and derives the visible state.
//! Hosts that want push notification register with
//! [`QueryView::subscribe_changes`] and re-read on each callback.
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
//! assert!(view.state().unwrap().is_loading);
//!
//! channel.publish(&tasks, &CanonicalArgs::empty(), Ok(json!(["a"])));
//! assert_eq!(view.state().unwrap().data, Some(json!(["a"])));
//! ```

use crate::signal::{Notifier, SignalSubscription};
use crate::state::{reconcile, OverrideToken, QueryOptions, QueryState, ReconcileInput};
use std::rc::{Rc, Weak};
use std::cell::RefCell;
use std::fmt;
use tether_cache::{Disposer, Listener, QueryCache};
use tether_core::{ArgsSource, QueryOutcome, QueryRef, ResolvedArgs, Result, Value};

#[derive(Default)]
struct ViewState {
    /// Args the subscription was established for; None before the first read
    current_args: Option<ResolvedArgs>,
    /// Epoch the subscription was established at
    subscribed_epoch: u64,
    /// Bumped by `refresh`
    refresh_epoch: u64,
    /// Manual override; presence means an override is installed
    override_value: Option<Value>,
    /// Bumped on every override install
    override_generation: u64,
    /// Args of `last_resolved_result`
    last_resolved_args: Option<ResolvedArgs>,
    /// Last delivery for this view, kept across arg changes
    last_resolved_result: Option<QueryOutcome>,
    /// Seed, until superseded
    seed: Option<Value>,
    /// The args have changed once while the seed was live
    seed_transitioned: bool,
    /// Set by `dispose`
    disposed: bool,
}

struct ViewInner {
    query: QueryRef,
    source: ArgsSource,
    keep_previous_data: bool,
    cache: Rc<QueryCache>,
    state: RefCell<ViewState>,
    subscription: RefCell<Option<Disposer>>,
    notifier: Notifier,
}

/// A reactive handle on one live query.
///
/// Cloning yields another handle on the same view. The subscription is
/// released when the last handle is dropped or on [`QueryView::dispose`].
#[derive(Clone)]
pub struct QueryView {
    inner: Rc<ViewInner>,
}

impl QueryView {
    /// Creates a view. Nothing is subscribed until the first `state()`.
    pub fn new(
        cache: Rc<QueryCache>,
        query: QueryRef,
        args: impl Into<ArgsSource>,
        options: QueryOptions,
    ) -> Self {
        let state = ViewState {
            seed: options.initial_data,
            ..ViewState::default()
        };
        Self {
            inner: Rc::new(ViewInner {
                query,
                source: args.into(),
                keep_previous_data: options.keep_previous_data,
                cache,
                state: RefCell::new(state),
                subscription: RefCell::new(None),
                notifier: Notifier::new(),
            }),
        }
    }

    /// Returns the query this view reads.
    pub fn query(&self) -> &QueryRef {
        &self.inner.query
    }

    /// Recomputes and returns the visible state.
    ///
    /// Errors come only from argument resolution (a failing thunk or
    /// non-object args). Channel errors are reported in `QueryState::error`.
    pub fn state(&self) -> Result<QueryState> {
        let resolved = self.inner.source.resolve()?;
        ViewInner::sync_subscription(&self.inner, &resolved);
        Ok(self.inner.derive(&resolved))
    }

    /// Installs a manual override, shown until the next delivery for the
    /// current args.
    pub fn set(&self, value: Value) {
        self.inner.install_override(value);
        self.inner.notifier.notify();
    }

    /// Computes an override from the current data and installs it.
    ///
    /// Release the returned token once the corresponding write settles.
    pub fn with_override<F>(&self, update: F) -> Result<OverrideToken>
    where
        F: FnOnce(Option<&Value>) -> Value,
    {
        let current = self.state()?.data;
        let generation = self.inner.install_override(update(current.as_ref()));
        self.inner.notifier.notify();

        let weak = Rc::downgrade(&self.inner);
        Ok(OverrideToken::new(move || {
            if let Some(inner) = weak.upgrade() {
                if inner.clear_override(generation) {
                    inner.notifier.notify();
                }
            }
        }))
    }

    /// Returns true if a manual override is installed.
    pub fn has_override(&self) -> bool {
        self.inner.state.borrow().override_value.is_some()
    }

    /// Forces a fresh channel for the current args on the next `state()`.
    pub fn refresh(&self) {
        self.inner.state.borrow_mut().refresh_epoch += 1;
        self.inner.notifier.notify();
    }

    /// Registers a callback run whenever this view's inputs change.
    pub fn subscribe_changes<F>(&self, callback: F) -> SignalSubscription
    where
        F: Fn() + 'static,
    {
        self.inner.notifier.subscribe(callback)
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

    /// Releases the subscription. The view stays readable but never
    /// subscribes again.
    pub fn dispose(&self) {
        self.inner.state.borrow_mut().disposed = true;
        let released = self.inner.subscription.borrow_mut().take();
        drop(released);
    }
}

impl fmt::Debug for QueryView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("QueryView")
            .field("query", &self.inner.query)
            .field("args", &state.current_args)
            .field("has_override", &state.override_value.is_some())
            .field("refresh_epoch", &state.refresh_epoch)
            .finish()
    }
}

enum Resubscribe {
    /// Drop the old subscription and subscribe for new args
    Replace,
    /// Same args, re-open the channel
    Reopen,
}

impl ViewInner {
    fn sync_subscription(this: &Rc<Self>, resolved: &ResolvedArgs) {
        let action = {
            let mut st = this.state.borrow_mut();
            if st.disposed {
                return;
            }
            let args_changed = st.current_args.as_ref() != Some(resolved);
            let epoch_changed = st.subscribed_epoch != st.refresh_epoch;
            if !args_changed && !epoch_changed {
                return;
            }

            st.subscribed_epoch = st.refresh_epoch;
            if args_changed {
                // The seed survives the first arg change only.
                if st.current_args.is_some() && st.seed.is_some() {
                    if st.seed_transitioned {
                        st.seed = None;
                    } else {
                        st.seed_transitioned = true;
                    }
                }
                st.current_args = Some(resolved.clone());
                Resubscribe::Replace
            } else {
                Resubscribe::Reopen
            }
        };

        if let (Resubscribe::Reopen, ResolvedArgs::Args(args)) = (&action, resolved) {
            let held = this.subscription.borrow().is_some();
            if held && this.cache.reopen(&this.query, args) {
                return;
            }
        }

        let old = this.subscription.borrow_mut().take();
        drop(old);

        if resolved.is_skip() {
            return;
        }

        let weak: Weak<ViewInner> = Rc::downgrade(this);
        let listener_args = resolved.clone();
        let listener: Listener = Rc::new(move |outcome: &QueryOutcome| {
            if let Some(inner) = weak.upgrade() {
                inner.on_delivery(&listener_args, outcome);
            }
        });
        let disposer = this.cache.subscribe(&this.query, resolved, listener);
        *this.subscription.borrow_mut() = Some(disposer);
    }

    fn on_delivery(&self, args: &ResolvedArgs, outcome: &QueryOutcome) {
        {
            let mut st = self.state.borrow_mut();
            if st.current_args.as_ref() != Some(args) {
                return;
            }
            st.override_value = None;
            st.last_resolved_args = Some(args.clone());
            st.last_resolved_result = Some(outcome.clone());
            st.seed = None;
        }
        self.notifier.notify();
    }

    fn derive(&self, resolved: &ResolvedArgs) -> QueryState {
        if resolved.is_skip() {
            return QueryState::skipped();
        }

        let sync = self.cache.peek(&self.query, resolved);
        let mut st = self.state.borrow_mut();
        if let Some(outcome) = &sync {
            // A joined entry counts as delivered for these args.
            st.last_resolved_args = Some(resolved.clone());
            st.last_resolved_result = Some(outcome.clone());
            st.seed = None;
        }
        reconcile(&ReconcileInput {
            skipped: false,
            override_value: st.override_value.as_ref(),
            sync_result: sync.as_ref(),
            seed: st.seed.as_ref(),
            previous: st.last_resolved_result.as_ref(),
            keep_previous_data: self.keep_previous_data,
            previous_args_match: st.last_resolved_args.as_ref() == Some(resolved),
        })
    }

    fn install_override(&self, value: Value) -> u64 {
        let mut st = self.state.borrow_mut();
        st.override_generation += 1;
        st.override_value = Some(value);
        st.override_generation
    }

    fn clear_override(&self, generation: u64) -> bool {
        let mut st = self.state.borrow_mut();
        if st.override_generation == generation && st.override_value.is_some() {
            st.override_value = None;
            true
        } else {
            false
        }
    }
}
