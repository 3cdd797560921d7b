//! Broadcast subject: the subscription registry behind every cache.
//!
//! Observers are kept in a `DashMap` keyed by a monotonically increasing id.
//! Fan-out is synchronous: `on_next` snapshots the registry (in registration
//! order) and calls each observer on the caller's thread, without holding
//! any registry lock, so observers may subscribe or unsubscribe from inside
//! their callbacks.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Weak;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::trace;

use super::Observable;
use super::Observer;
use super::ObserverRef;
use super::Subscription;
use crate::SharedError;

struct Registration<T> {
    observer: ObserverRef<T>,
    active: AtomicBool,
}

#[derive(Clone)]
enum Terminal {
    Completed,
    Failed(SharedError),
}

struct SubjectInner<T> {
    observers: DashMap<u64, Arc<Registration<T>>>,
    next_id: AtomicU64,
    terminal: Mutex<Option<Terminal>>,
}

/// Multicasts every notification to all currently registered observers.
pub struct Subject<T> {
    inner: Arc<SubjectInner<T>>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + 'static> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> Subject<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SubjectInner {
                observers: DashMap::new(),
                next_id: AtomicU64::new(1),
                terminal: Mutex::new(None),
            }),
        }
    }

    pub fn has_observers(&self) -> bool {
        !self.inner.observers.is_empty()
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.len()
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.terminal.lock().is_some()
    }

    fn snapshot(&self) -> Vec<Arc<Registration<T>>> {
        let mut registrations: Vec<(u64, Arc<Registration<T>>)> = self
            .inner
            .observers
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        registrations.sort_by_key(|(id, _)| *id);
        registrations.into_iter().map(|(_, r)| r).collect()
    }

    fn terminate(
        &self,
        terminal: Terminal,
    ) {
        let targets = {
            let mut guard = self.inner.terminal.lock();
            if guard.is_some() {
                return;
            }
            *guard = Some(terminal.clone());
            let targets = self.snapshot();
            self.inner.observers.clear();
            targets
        };

        for registration in targets {
            if registration.active.swap(false, Ordering::AcqRel) {
                match &terminal {
                    Terminal::Completed => registration.observer.on_completed(),
                    Terminal::Failed(error) => registration.observer.on_error(Arc::clone(error)),
                }
            }
        }
    }
}

fn unregister<T>(
    inner: &Weak<SubjectInner<T>>,
    id: u64,
    registration: &Registration<T>,
) {
    registration.active.store(false, Ordering::Release);
    if let Some(inner) = inner.upgrade() {
        inner.observers.remove(&id);
        trace!(observer_id = id, "Observer unregistered");
    }
}

impl<T: Clone + Send + 'static> Observable<T> for Subject<T> {
    fn subscribe(
        &self,
        observer: ObserverRef<T>,
    ) -> Subscription {
        let terminal = {
            let guard = self.inner.terminal.lock();
            match guard.as_ref() {
                Some(terminal) => Some(terminal.clone()),
                None => {
                    let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
                    let registration = Arc::new(Registration {
                        observer: Arc::clone(&observer),
                        active: AtomicBool::new(true),
                    });
                    self.inner.observers.insert(id, Arc::clone(&registration));
                    trace!(observer_id = id, "Observer registered");

                    let inner = Arc::downgrade(&self.inner);
                    return Subscription::new(move || unregister(&inner, id, &registration));
                }
            }
        };

        match terminal {
            Some(Terminal::Completed) => observer.on_completed(),
            Some(Terminal::Failed(error)) => observer.on_error(error),
            None => {}
        }
        Subscription::empty()
    }
}

impl<T: Clone + Send + 'static> Observer<T> for Subject<T> {
    fn on_next(
        &self,
        value: T,
    ) {
        for registration in self.snapshot() {
            if registration.active.load(Ordering::Acquire) {
                registration.observer.on_next(value.clone());
            }
        }
    }

    fn on_error(
        &self,
        error: SharedError,
    ) {
        self.terminate(Terminal::Failed(error));
    }

    fn on_completed(&self) {
        self.terminate(Terminal::Completed);
    }
}
