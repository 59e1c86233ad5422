//! Reactive cells and change notification.
//!
//! `Notifier` keeps a set of observer callbacks and invokes them on demand.
//! `Signal<T>` is a value cell with a `Notifier` attached: every write bumps
//! its version and notifies observers. Hosts use these to learn when a view
//! should be re-read; the views themselves are recomputed on read.

use std::rc::{Rc, Weak};
use std::cell::{Cell, RefCell};
use std::fmt;

/// Unique identifier for an observer.
pub type SubscriptionId = u64;

/// Callback invoked on change.
pub type ChangeCallback = Rc<dyn Fn()>;

struct ObserverSet {
    /// Registered observers, in registration order
    observers: Vec<(SubscriptionId, ChangeCallback)>,
    /// Next observer ID to assign
    next_id: SubscriptionId,
}

/// A set of change observers.
#[derive(Clone)]
pub struct Notifier {
    set: Rc<RefCell<ObserverSet>>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    /// Creates a notifier with no observers.
    pub fn new() -> Self {
        Self {
            set: Rc::new(RefCell::new(ObserverSet {
                observers: Vec::new(),
                next_id: 1,
            })),
        }
    }

    /// Registers an observer. It stays registered until the returned
    /// subscription is dropped or released.
    pub fn subscribe<F>(&self, callback: F) -> SignalSubscription
    where
        F: Fn() + 'static,
    {
        let mut set = self.set.borrow_mut();
        let id = set.next_id;
        set.next_id += 1;
        set.observers.push((id, Rc::new(callback)));

        SignalSubscription {
            id,
            set: Rc::downgrade(&self.set),
        }
    }

    /// Invokes every observer.
    ///
    /// Observers may subscribe, unsubscribe or notify again from inside the
    /// callback.
    pub fn notify(&self) {
        let observers: Vec<ChangeCallback> = self
            .set
            .borrow()
            .observers
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for observer in observers {
            observer();
        }
    }

    /// Returns the number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.set.borrow().observers.len()
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("observers", &self.observer_count())
            .finish()
    }
}

/// Registration of one observer on a `Notifier`.
///
/// Dropping it unregisters the observer.
#[must_use = "dropping a SignalSubscription unregisters the observer"]
pub struct SignalSubscription {
    id: SubscriptionId,
    set: Weak<RefCell<ObserverSet>>,
}

impl SignalSubscription {
    /// Returns the subscription ID.
    #[inline]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Unregisters the observer now.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for SignalSubscription {
    fn drop(&mut self) {
        if let Some(set) = self.set.upgrade() {
            let removed: Vec<(SubscriptionId, ChangeCallback)> = {
                let mut set = set.borrow_mut();
                let (gone, kept): (Vec<_>, Vec<_>) = set
                    .observers
                    .drain(..)
                    .partition(|(id, _)| *id == self.id);
                set.observers = kept;
                gone
            };
            drop(removed);
        }
    }
}

/// A reactive value cell.
pub struct Signal<T> {
    value: Rc<RefCell<T>>,
    version: Rc<Cell<u64>>,
    notifier: Notifier,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            version: self.version.clone(),
            notifier: self.notifier.clone(),
        }
    }
}

impl<T> Signal<T> {
    /// Creates a signal holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            value: Rc::new(RefCell::new(value)),
            version: Rc::new(Cell::new(0)),
            notifier: Notifier::new(),
        }
    }

    /// Reads the value through a closure.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value.borrow())
    }

    /// Replaces the value and notifies observers.
    pub fn set(&self, value: T) {
        let old = self.value.replace(value);
        drop(old);
        self.bump();
    }

    /// Mutates the value in place and notifies observers once.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.value.borrow_mut());
        self.bump();
    }

    /// Number of writes so far.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version.get()
    }

    /// Registers an observer called after every write.
    pub fn subscribe<F>(&self, callback: F) -> SignalSubscription
    where
        F: Fn() + 'static,
    {
        self.notifier.subscribe(callback)
    }

    /// Returns the notifier of this signal.
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    fn bump(&self) {
        self.version.set(self.version.get() + 1);
        self.notifier.notify();
    }
}

impl<T: Clone> Signal<T> {
    /// Returns a clone of the value.
    pub fn get(&self) -> T {
        self.value.borrow().clone()
    }
}

impl<T: fmt::Debug> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("value", &*self.value.borrow())
            .field("version", &self.version.get())
            .finish()
    }
}
