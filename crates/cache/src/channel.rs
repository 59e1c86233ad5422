//! The subscription channel seam.
//!
//! A `SubscriptionChannel` is the transport Tether sits on top of. It is an
//! external collaborator: Tether only needs "subscribe with callbacks, get a
//! disposer back" and "fetch once".

use futures::future::{self, LocalBoxFuture};
use tether_core::{CanonicalArgs, QueryOutcome, QueryRef, RemoteError, Value};

/// Callback invoked with each value pushed by a channel.
pub type DataCallback = Box<dyn Fn(Value)>;

/// Callback invoked with each error pushed by a channel.
pub type ErrorCallback = Box<dyn Fn(RemoteError)>;

/// Releases a subscription when disposed or dropped.
///
/// A no-op disposer releases nothing.
#[must_use = "dropping a Disposer releases the subscription immediately"]
pub struct Disposer {
    release: Option<Box<dyn FnOnce()>>,
}

impl Disposer {
    /// Creates a disposer that runs `release` once.
    pub fn new<F>(release: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Creates a disposer that does nothing.
    pub fn noop() -> Self {
        Self { release: None }
    }

    /// Returns true if this disposer has nothing to release.
    #[inline]
    pub fn is_noop(&self) -> bool {
        self.release.is_none()
    }

    /// Releases the subscription now.
    pub fn dispose(mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Disposer {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for Disposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disposer")
            .field("noop", &self.is_noop())
            .finish()
    }
}

/// A push-based transport for query results.
pub trait SubscriptionChannel {
    /// Opens a subscription for (query, args).
    ///
    /// The channel invokes `on_data`/`on_error` in emission order, possibly
    /// synchronously from inside this call, until the returned disposer runs.
    fn subscribe(
        &self,
        query: &QueryRef,
        args: &CanonicalArgs,
        on_data: DataCallback,
        on_error: ErrorCallback,
    ) -> Disposer;

    /// Runs the query once.
    fn fetch_once(&self, query: &QueryRef, args: &CanonicalArgs)
        -> LocalBoxFuture<'static, QueryOutcome>;

    /// Returns true when this environment cannot open channels.
    fn is_disabled(&self) -> bool {
        false
    }
}

/// A channel for environments without a live transport, such as a
/// server render pass. Subscriptions are no-ops and fetches fail.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledChannel;

impl SubscriptionChannel for DisabledChannel {
    fn subscribe(
        &self,
        _query: &QueryRef,
        _args: &CanonicalArgs,
        _on_data: DataCallback,
        _on_error: ErrorCallback,
    ) -> Disposer {
        Disposer::noop()
    }

    fn fetch_once(
        &self,
        query: &QueryRef,
        _args: &CanonicalArgs,
    ) -> LocalBoxFuture<'static, QueryOutcome> {
        let err = RemoteError::new(format!("transport disabled, cannot fetch {query}"));
        Box::pin(future::ready(Err(err)))
    }

    fn is_disabled(&self) -> bool {
        true
    }
}
