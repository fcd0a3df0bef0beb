//! Ordered fan-out of zero-argument update callbacks.
//!
//! Registration hands back a [`Subscription`]; dropping it is the only way to
//! unregister. A callback whose subscription is kept alive (or leaked) fires
//! for every accepted update for the remaining lifetime of the registry.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::warn;

type Callback = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Slots {
    next_id: u64,
    callbacks: BTreeMap<u64, Callback>,
}

/// Registry of update callbacks, notified in registration order.
#[derive(Clone, Default)]
pub struct SubscriberRegistry {
    slots: Arc<Mutex<Slots>>,
}

impl SubscriberRegistry {
    /// Construct an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback`; it stays registered until the returned handle drops.
    #[must_use = "dropping the subscription unregisters the callback"]
    pub fn register<F>(&self, callback: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut slots = self.lock();
        let id = slots.next_id;
        slots.next_id += 1;
        slots.callbacks.insert(id, Arc::new(callback));
        Subscription {
            id,
            slots: Arc::downgrade(&self.slots),
        }
    }

    /// Invoke every registered callback synchronously, in registration order.
    ///
    /// Callbacks run outside the registry lock, so they may register or drop
    /// subscriptions. A callback unregistered by an earlier one in the same
    /// round is skipped; one registered during the round waits for the next.
    /// A panicking callback is logged and does not prevent the remaining
    /// callbacks from running. Returns the number of callbacks that completed
    /// normally.
    pub fn notify(&self) -> usize {
        let callbacks: Vec<(u64, Callback)> = self
            .lock()
            .callbacks
            .iter()
            .map(|(id, callback)| (*id, Arc::clone(callback)))
            .collect();

        let mut completed = 0;
        for (id, callback) in callbacks {
            if !self.lock().callbacks.contains_key(&id) {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| callback())) {
                Ok(()) => completed += 1,
                Err(_) => warn!(subscription = id, "update callback panicked"),
            }
        }
        completed
    }

    /// Number of registered callbacks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().callbacks.len()
    }

    /// Whether no callbacks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for SubscriberRegistry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SubscriberRegistry")
            .field("callbacks", &self.len())
            .finish()
    }
}

/// Scope-bound registration handle; dropping it unregisters the callback.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    slots: Weak<Mutex<Slots>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(slots) = self.slots.upgrade() {
            slots
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .callbacks
                .remove(&self.id);
        }
    }
}
