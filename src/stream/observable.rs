use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::AnonymousObserver;
use super::ObservableStream;
use super::Observer;
use super::ObserverRef;
use super::SafeObserver;
use super::Subscription;
use crate::SharedError;

/// A source of values that observers subscribe to.
///
/// Every operator in this crate is a concrete type implementing this trait;
/// pipelines are composed by constructing operators around their sources.
pub trait Observable<T>: Send + Sync {
    fn subscribe(
        &self,
        observer: ObserverRef<T>,
    ) -> Subscription;
}

pub type ObservableRef<T> = Arc<dyn Observable<T>>;

impl<T, O> Observable<T> for Arc<O>
where
    O: Observable<T> + ?Sized,
{
    fn subscribe(
        &self,
        observer: ObserverRef<T>,
    ) -> Subscription {
        (**self).subscribe(observer)
    }
}

type SubscribeFn<T> = Box<dyn Fn(ObserverRef<T>) -> Subscription + Send + Sync>;

/// Observable defined by a subscribe function.
///
/// The observer handed to the function is guarded: it receives nothing after a
/// terminal notification or after the returned subscription is disposed.
pub struct AnonymousObservable<T> {
    subscribe_fn: SubscribeFn<T>,
}

impl<T: Send + 'static> AnonymousObservable<T> {
    pub fn new(subscribe_fn: impl Fn(ObserverRef<T>) -> Subscription + Send + Sync + 'static) -> Self {
        Self {
            subscribe_fn: Box::new(subscribe_fn),
        }
    }
}

impl<T: Send + 'static> Observable<T> for AnonymousObservable<T> {
    fn subscribe(
        &self,
        observer: ObserverRef<T>,
    ) -> Subscription {
        let safe = SafeObserver::new(observer);
        let stopped = safe.stop_flag();
        let inner = (self.subscribe_fn)(Arc::new(safe));
        Subscription::new(move || {
            stopped.store(true, Ordering::Release);
            drop(inner);
        })
    }
}

/// Builds an observable from a subscribe function
pub fn create<T: Send + 'static>(
    subscribe_fn: impl Fn(ObserverRef<T>) -> Subscription + Send + Sync + 'static
) -> ObservableRef<T> {
    Arc::new(AnonymousObservable::new(subscribe_fn))
}

/// Emits `value` once and completes
pub fn just<T: Clone + Send + Sync + 'static>(value: T) -> ObservableRef<T> {
    create(move |observer| {
        observer.on_next(value.clone());
        observer.on_completed();
        Subscription::empty()
    })
}

/// Fails immediately with `error`
pub fn fail<T: Send + 'static>(error: SharedError) -> ObservableRef<T> {
    create(move |observer| {
        observer.on_error(Arc::clone(&error));
        Subscription::empty()
    })
}

/// Never emits and never terminates
pub fn never<T: Send + 'static>() -> ObservableRef<T> {
    create(|_| Subscription::empty())
}

/// Combinators available on every observable.
pub trait ObservableExt<T>: Observable<T> + Sized + 'static
where
    T: Send + 'static,
{
    fn into_observable(self) -> ObservableRef<T> {
        Arc::new(self)
    }

    /// Subscribes with a plain `on_next` closure
    fn subscribe_fn(
        &self,
        on_next: impl Fn(T) + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribe(AnonymousObserver::new(on_next).into_ref())
    }

    fn map<U: Send + 'static>(
        self,
        selector: impl Fn(T) -> U + Send + Sync + 'static,
    ) -> ObservableRef<U> {
        let source = Arc::new(self);
        let selector: Arc<dyn Fn(T) -> U + Send + Sync> = Arc::new(selector);
        create(move |observer: ObserverRef<U>| {
            source.subscribe(Arc::new(MapObserver {
                downstream: observer,
                selector: Arc::clone(&selector),
            }))
        })
    }

    /// Subscribes and exposes the values as an async stream
    fn into_stream(self) -> ObservableStream<T> {
        ObservableStream::new(&self)
    }

    /// Runs `action` on every value before forwarding it
    fn inspect(
        self,
        action: impl Fn(&T) + Send + Sync + 'static,
    ) -> ObservableRef<T> {
        let action = Arc::new(action);
        self.map(move |value| {
            action(&value);
            value
        })
    }

    /// Runs `action` once per subscription, when it terminates or is disposed
    fn finally(
        self,
        action: impl Fn() + Send + Sync + 'static,
    ) -> ObservableRef<T> {
        let source = Arc::new(self);
        let action: Arc<dyn Fn() + Send + Sync> = Arc::new(action);
        create(move |observer: ObserverRef<T>| {
            let once = Arc::new(FinallyAction {
                fired: AtomicBool::new(false),
                action: Arc::clone(&action),
            });
            let subscription = source.subscribe(Arc::new(FinallyObserver {
                downstream: observer,
                action: Arc::clone(&once),
            }));
            Subscription::new(move || {
                drop(subscription);
                once.fire();
            })
        })
    }
}

impl<T, O> ObservableExt<T> for O
where
    T: Send + 'static,
    O: Observable<T> + Sized + 'static,
{
}

struct MapObserver<T, U> {
    downstream: ObserverRef<U>,
    selector: Arc<dyn Fn(T) -> U + Send + Sync>,
}

impl<T, U> Observer<T> for MapObserver<T, U> {
    fn on_next(
        &self,
        value: T,
    ) {
        self.downstream.on_next((self.selector)(value));
    }

    fn on_error(
        &self,
        error: SharedError,
    ) {
        self.downstream.on_error(error);
    }

    fn on_completed(&self) {
        self.downstream.on_completed();
    }
}

struct FinallyAction {
    fired: AtomicBool,
    action: Arc<dyn Fn() + Send + Sync>,
}

impl FinallyAction {
    fn fire(&self) {
        if !self.fired.swap(true, Ordering::AcqRel) {
            (self.action)();
        }
    }
}

struct FinallyObserver<T> {
    downstream: ObserverRef<T>,
    action: Arc<FinallyAction>,
}

impl<T> Observer<T> for FinallyObserver<T> {
    fn on_next(
        &self,
        value: T,
    ) {
        self.downstream.on_next(value);
    }

    fn on_error(
        &self,
        error: SharedError,
    ) {
        self.downstream.on_error(error);
        self.action.fire();
    }

    fn on_completed(&self) {
        self.downstream.on_completed();
        self.action.fire();
    }
}
