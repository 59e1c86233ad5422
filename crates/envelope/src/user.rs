//! Live current-user state with swap gating.
//!
//! A `LiveUser` starts from the user seed carried by a user envelope and
//! follows a separately supplied live query. Pushes are committed by these
//! rules:
//!
//! - Error pushes are logged and ignored.
//! - `null` before any non-null push has been committed is the transient
//!   "not authenticated yet" value and is ignored. After that, `null` means
//!   the user signed out and is committed.
//! - A push whose resource field (an image URL by default) differs from the
//!   displayed one is held until the readiness probe reports any terminal
//!   outcome. A newer push supersedes a held one.
//! - Anything else is committed immediately.

use crate::envelope::Envelope;
use crate::probe::{PreloadOutcome, ReadinessProbe};
use std::rc::{Rc, Weak};
use std::cell::RefCell;
use std::fmt;
use tether_cache::{Disposer, Listener, QueryCache};
use tether_core::{CanonicalArgs, Error, QueryOutcome, QueryRef, ResolvedArgs, Result, Value};
use tether_reactive::{QueryState, Signal, SignalSubscription};

/// Field holding the gated resource when none is configured.
pub const DEFAULT_RESOURCE_FIELD: &str = "image";

/// Options for `decode_user`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserOptions {
    /// Name of the gated field on the user object
    pub resource_field: String,
}

impl Default for UserOptions {
    fn default() -> Self {
        Self {
            resource_field: DEFAULT_RESOURCE_FIELD.to_string(),
        }
    }
}

impl UserOptions {
    /// Sets the gated field name.
    pub fn resource_field(mut self, field: impl Into<String>) -> Self {
        self.resource_field = field.into();
        self
    }
}

#[derive(Default)]
struct Gate {
    /// Bumped by every push that decides the next displayed value
    generation: u64,
    /// Held push and the generation it belongs to
    pending: Option<(u64, Value)>,
    /// A non-null live value has been committed
    authenticated: bool,
}

struct UserInner {
    query: QueryRef,
    args: CanonicalArgs,
    resource_field: String,
    displayed: Signal<Value>,
    gate: RefCell<Gate>,
    probe: Rc<dyn ReadinessProbe>,
    subscription: RefCell<Option<Disposer>>,
}

/// Current user, seeded from an envelope and kept live.
#[derive(Clone)]
pub struct LiveUser {
    inner: Rc<UserInner>,
}

/// Decodes a user envelope and subscribes `live_query` for updates.
///
/// The live query and args are supplied by the caller, not the envelope.
pub fn decode_user(
    json: &Value,
    cache: &Rc<QueryCache>,
    live_query: QueryRef,
    live_args: CanonicalArgs,
    probe: Rc<dyn ReadinessProbe>,
    options: UserOptions,
) -> Result<LiveUser> {
    let seed = match Envelope::from_json(json)? {
        Envelope::UserEnvelope(envelope) => envelope.data,
        other => {
            return Err(Error::invalid_envelope(format!(
                "expected user-envelope, found {}",
                other.kind()
            )))
        }
    };
    Ok(LiveUser::new(cache, live_query, live_args, seed, probe, options))
}

impl LiveUser {
    /// Creates a live user from a seed value.
    pub fn new(
        cache: &Rc<QueryCache>,
        query: QueryRef,
        args: CanonicalArgs,
        seed: Value,
        probe: Rc<dyn ReadinessProbe>,
        options: UserOptions,
    ) -> Self {
        let inner = Rc::new(UserInner {
            query,
            args,
            resource_field: options.resource_field,
            displayed: Signal::new(seed),
            gate: RefCell::new(Gate::default()),
            probe,
            subscription: RefCell::new(None),
        });

        let resolved = ResolvedArgs::Args(inner.args.clone());
        let listener: Listener = {
            let weak = Rc::downgrade(&inner);
            Rc::new(move |outcome: &QueryOutcome| {
                if let Some(inner) = weak.upgrade() {
                    UserInner::on_push(&inner, outcome);
                }
            })
        };
        let disposer = cache.subscribe(&inner.query, &resolved, listener);
        *inner.subscription.borrow_mut() = Some(disposer);

        // An existing entry does not replay its last value.
        let replay = {
            let gate = inner.gate.borrow();
            gate.generation == 0
        };
        if replay {
            if let Some(outcome) = cache.peek(&inner.query, &resolved) {
                UserInner::on_push(&inner, &outcome);
            }
        }

        Self { inner }
    }

    /// Returns the displayed user value.
    pub fn current(&self) -> Value {
        self.inner.displayed.get()
    }

    /// Returns the displayed value as query state.
    pub fn state(&self) -> QueryState {
        QueryState::from_resolved(Some(Ok(self.current())), false)
    }

    /// Returns true while a push is waiting on the readiness probe.
    pub fn is_pending(&self) -> bool {
        self.inner.gate.borrow().pending.is_some()
    }

    /// Commits a held push now without waiting for the probe.
    pub fn flush_pending(&self) {
        let pending = self.inner.gate.borrow_mut().pending.take();
        if let Some((_, value)) = pending {
            self.inner.commit(value);
        }
    }

    /// Registers a callback run whenever the displayed value changes.
    pub fn subscribe_changes<F>(&self, callback: F) -> SignalSubscription
    where
        F: Fn() + 'static,
    {
        self.inner.displayed.subscribe(callback)
    }

    /// Returns the gated field name.
    pub fn resource_field(&self) -> &str {
        &self.inner.resource_field
    }

    /// Releases the live subscription. Held pushes are dropped.
    pub fn dispose(&self) {
        let released = self.inner.subscription.borrow_mut().take();
        drop(released);
        let mut gate = self.inner.gate.borrow_mut();
        gate.generation += 1;
        gate.pending = None;
    }
}

impl fmt::Debug for LiveUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveUser")
            .field("query", &self.inner.query)
            .field("current", &self.current())
            .field("pending", &self.is_pending())
            .finish()
    }
}

impl UserInner {
    fn on_push(this: &Rc<Self>, outcome: &QueryOutcome) {
        let value = match outcome {
            Ok(value) => value.clone(),
            Err(err) => {
                tracing::warn!(query = %this.query, error = %err, "ignoring failed user push");
                return;
            }
        };

        if value.is_null() && !this.gate.borrow().authenticated {
            tracing::debug!(query = %this.query, "ignoring unauthenticated user push");
            return;
        }

        let incoming = this.resource_of(&value);
        let displayed = this.displayed.with(|current| this.resource_of(current));
        let gated = match incoming {
            Some(resource) if Some(&resource) != displayed.as_ref() => Some(resource),
            _ => None,
        };

        let generation = {
            let mut gate = this.gate.borrow_mut();
            gate.generation += 1;
            gate.pending = None;
            gate.generation
        };

        let resource = match gated {
            Some(resource) => resource,
            None => {
                this.commit(value);
                return;
            }
        };

        this.gate.borrow_mut().pending = Some((generation, value));
        tracing::debug!(
            query = %this.query,
            resource = %resource,
            "holding user push until resource is ready"
        );

        let weak: Weak<UserInner> = Rc::downgrade(this);
        let field = resource.clone();
        this.probe.prepare(
            &resource,
            Box::new(move |outcome: PreloadOutcome| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_ready(generation, &field, outcome);
                }
            }),
        );
    }

    fn on_ready(&self, generation: u64, resource: &str, outcome: PreloadOutcome) {
        match &outcome {
            PreloadOutcome::Ready => {}
            PreloadOutcome::Failed(reason) => {
                tracing::warn!(
                    resource,
                    reason = %reason,
                    "resource preload failed, swapping anyway"
                );
            }
            PreloadOutcome::TimedOut => {
                tracing::warn!(resource, "resource preload timed out, swapping anyway");
            }
        }

        let pending = {
            let mut gate = self.gate.borrow_mut();
            match gate.pending.take() {
                Some((held, value)) if held == generation => Some(value),
                other => {
                    gate.pending = other;
                    None
                }
            }
        };
        if let Some(value) = pending {
            self.commit(value);
        }
    }

    fn commit(&self, value: Value) {
        if !value.is_null() {
            self.gate.borrow_mut().authenticated = true;
        }
        self.displayed.set(value);
    }

    fn resource_of(&self, value: &Value) -> Option<String> {
        value
            .get(self.resource_field.as_str())
            .and_then(Value::as_str)
            .map(String::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{AlwaysReady, ReadyCallback};
    use std::cell::Cell;
    use serde_json::json;
    use tether_cache::MemoryChannel;
    use tether_core::RemoteError;

    /// Probe that holds callbacks until the test fires them.
    #[derive(Clone, Default)]
    struct ManualProbe {
        waiting: Rc<RefCell<Vec<(String, ReadyCallback)>>>,
    }

    impl ManualProbe {
        fn requested(&self) -> Vec<String> {
            self.waiting.borrow().iter().map(|(r, _)| r.clone()).collect()
        }

        fn fire(&self, index: usize, outcome: PreloadOutcome) {
            let (_, ready) = self.waiting.borrow_mut().remove(index);
            ready(outcome);
        }
    }

    impl ReadinessProbe for ManualProbe {
        fn prepare(&self, resource: &str, ready: ReadyCallback) {
            self.waiting.borrow_mut().push((resource.into(), ready));
        }
    }

    struct Fixture {
        channel: Rc<MemoryChannel>,
        _cache: Rc<QueryCache>,
        query: QueryRef,
        probe: ManualProbe,
        user: LiveUser,
    }

    fn fixture(seed: Value) -> Fixture {
        let channel = Rc::new(MemoryChannel::new());
        let cache = QueryCache::new(channel.clone());
        let query = QueryRef::new("users.current");
        let probe = ManualProbe::default();
        let user = LiveUser::new(
            &cache,
            query.clone(),
            CanonicalArgs::empty(),
            seed,
            Rc::new(probe.clone()),
            UserOptions::default(),
        );
        Fixture {
            channel,
            _cache: cache,
            query,
            probe,
            user,
        }
    }

    impl Fixture {
        fn push(&self, outcome: QueryOutcome) {
            self.channel.publish(&self.query, &CanonicalArgs::empty(), outcome);
        }
    }

    #[test]
    fn test_image_swap_waits_for_probe() {
        let f = fixture(json!({ "id": "u1", "image": null }));

        f.push(Ok(json!({ "id": "u1", "image": "http://x/img.png" })));
        assert_eq!(f.user.current(), json!({ "id": "u1", "image": null }));
        assert!(f.user.is_pending());
        assert_eq!(f.probe.requested(), vec!["http://x/img.png".to_string()]);

        f.probe.fire(0, PreloadOutcome::Ready);
        assert_eq!(f.user.current(), json!({ "id": "u1", "image": "http://x/img.png" }));
        assert!(!f.user.is_pending());
    }

    #[test]
    fn test_failed_preload_still_swaps() {
        let f = fixture(json!({ "id": "u1", "image": null }));
        f.push(Ok(json!({ "id": "u1", "image": "http://x/broken.png" })));

        f.probe.fire(0, PreloadOutcome::Failed("404".into()));
        assert_eq!(f.user.current()["image"], json!("http://x/broken.png"));
    }

    #[test]
    fn test_same_image_swaps_immediately() {
        let f = fixture(json!({ "id": "u1", "name": "Ann", "image": "a.png" }));
        f.push(Ok(json!({ "id": "u1", "name": "Anne", "image": "a.png" })));

        assert_eq!(f.user.current()["name"], json!("Anne"));
        assert!(f.probe.requested().is_empty());
    }

    #[test]
    fn test_removed_image_swaps_immediately() {
        let f = fixture(json!({ "id": "u1", "image": "a.png" }));
        f.push(Ok(json!({ "id": "u1", "image": null })));
        assert_eq!(f.user.current()["image"], Value::Null);
    }

    #[test]
    fn test_newer_push_supersedes_held_swap() {
        let f = fixture(json!({ "id": "u1", "image": null }));
        f.push(Ok(json!({ "id": "u1", "image": "one.png" })));
        f.push(Ok(json!({ "id": "u1", "image": "two.png" })));

        f.probe.fire(0, PreloadOutcome::Ready);
        assert_eq!(f.user.current()["image"], Value::Null);

        f.probe.fire(0, PreloadOutcome::TimedOut);
        assert_eq!(f.user.current()["image"], json!("two.png"));
    }

    #[test]
    fn test_unauthenticated_null_ignored() {
        let f = fixture(json!({ "id": "u1" }));
        f.push(Ok(Value::Null));
        assert_eq!(f.user.current(), json!({ "id": "u1" }));
    }

    #[test]
    fn test_sign_out_after_live_value() {
        let f = fixture(json!({ "id": "u1" }));
        f.push(Ok(json!({ "id": "u1", "name": "Ann" })));
        f.push(Ok(Value::Null));
        assert_eq!(f.user.current(), Value::Null);
    }

    #[test]
    fn test_error_push_ignored() {
        let f = fixture(json!({ "id": "u1" }));
        f.push(Err(RemoteError::new("unauthorized")));
        assert_eq!(f.user.current(), json!({ "id": "u1" }));
        assert_eq!(f.user.state().error, None);
    }

    #[test]
    fn test_flush_pending() {
        let f = fixture(json!({ "id": "u1", "image": null }));
        f.push(Ok(json!({ "id": "u1", "image": "slow.png" })));

        f.user.flush_pending();
        assert_eq!(f.user.current()["image"], json!("slow.png"));

        // The late probe result finds nothing to commit.
        f.probe.fire(0, PreloadOutcome::Ready);
        assert_eq!(f.user.current()["image"], json!("slow.png"));
    }

    #[test]
    fn test_change_notification_on_commit() {
        let f = fixture(json!({ "id": "u1", "image": null }));
        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();
        let _watch = f.user.subscribe_changes(move || count_clone.set(count_clone.get() + 1));

        f.push(Ok(json!({ "id": "u1", "image": "a.png" })));
        assert_eq!(count.get(), 0);
        f.probe.fire(0, PreloadOutcome::Ready);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_custom_resource_field_and_always_ready() {
        let channel = Rc::new(MemoryChannel::new());
        let cache = QueryCache::new(channel.clone());
        let query = QueryRef::new("users.current");
        let user = LiveUser::new(
            &cache,
            query.clone(),
            CanonicalArgs::empty(),
            json!({ "avatar": null }),
            Rc::new(AlwaysReady),
            UserOptions::default().resource_field("avatar"),
        );

        channel.publish(&query, &CanonicalArgs::empty(), Ok(json!({ "avatar": "b.png" })));
        assert_eq!(user.current(), json!({ "avatar": "b.png" }));
        assert_eq!(user.resource_field(), "avatar");
    }

    #[test]
    fn test_decode_user_envelope() {
        let channel = Rc::new(MemoryChannel::disabled());
        let cache = QueryCache::new(channel);
        let json = json!({ "kind": "user-envelope", "data": { "id": "u1" } });

        let user = decode_user(
            &json,
            &cache,
            QueryRef::new("users.current"),
            CanonicalArgs::empty(),
            Rc::new(AlwaysReady),
            UserOptions::default(),
        )
        .unwrap();
        assert_eq!(user.current(), json!({ "id": "u1" }));

        let wrong = json!({ "kind": "query-envelope", "refName": "x", "args": {}, "data": 1 });
        let err = decode_user(
            &wrong,
            &cache,
            QueryRef::new("users.current"),
            CanonicalArgs::empty(),
            Rc::new(AlwaysReady),
            UserOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidEnvelope { .. }));
    }

    #[test]
    fn test_dispose_drops_held_push() {
        let f = fixture(json!({ "id": "u1", "image": null }));
        f.push(Ok(json!({ "id": "u1", "image": "a.png" })));
        f.user.dispose();

        f.probe.fire(0, PreloadOutcome::Ready);
        assert_eq!(f.user.current()["image"], Value::Null);
        assert_eq!(f.channel.active_subscriptions(), 0);
    }
}
