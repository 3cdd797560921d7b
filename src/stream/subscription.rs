use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

type Teardown = Box<dyn FnOnce() + Send>;

/// Live registration of an observer.
///
/// Dropping (or calling [`Subscription::dispose`]) synchronously runs the
/// teardown exactly once: the observer is detached from its source and any
/// cascading cleanup (e.g. releasing a ref-counted upstream) happens before
/// `dispose` returns.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    teardown: Option<Teardown>,
}

impl Subscription {
    pub fn new(teardown: impl FnOnce() + Send + 'static) -> Self {
        Self {
            teardown: Some(Box::new(teardown)),
        }
    }

    /// A subscription with nothing to release
    pub fn empty() -> Self {
        Self { teardown: None }
    }

    /// Disposes every subscription in order when the result is disposed
    pub fn from_many(subscriptions: Vec<Subscription>) -> Self {
        if subscriptions.is_empty() {
            return Self::empty();
        }
        Self::new(move || drop(subscriptions))
    }

    /// Chains `other` so both are released together, `self` first
    pub fn and(
        self,
        other: Subscription,
    ) -> Self {
        Self::from_many(vec![self, other])
    }

    pub fn dispose(self) {
        drop(self)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.teardown.is_some())
            .finish()
    }
}

/// A subscription slot that can be filled after it has been shared.
///
/// Operators use it when a callback must be able to release a subscription
/// that is only created later (an inner error tearing down its siblings).
/// Once disposed, anything assigned afterwards is released immediately.
#[derive(Clone, Default)]
pub struct SubscriptionSlot {
    inner: Arc<Mutex<SlotState>>,
}

#[derive(Default)]
struct SlotState {
    current: Option<Subscription>,
    disposed: bool,
}

impl SubscriptionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the held subscription, releasing the previous one
    pub fn set(
        &self,
        subscription: Subscription,
    ) {
        let released = {
            let mut state = self.inner.lock();
            if state.disposed {
                Some(subscription)
            } else {
                state.current.replace(subscription)
            }
        };
        drop(released);
    }

    pub fn clear(&self) {
        let released = self.inner.lock().current.take();
        drop(released);
    }

    pub fn dispose(&self) {
        let released = {
            let mut state = self.inner.lock();
            state.disposed = true;
            state.current.take()
        };
        drop(released);
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.lock().disposed
    }
}
