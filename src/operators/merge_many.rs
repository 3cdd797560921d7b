use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use parking_lot::ReentrantMutex;
use tracing::warn;

use crate::CacheKey;
use crate::CacheValue;
use crate::ChangeReason;
use crate::ChangeSet;
use crate::ChangeStream;
use crate::Observable;
use crate::ObservableRef;
use crate::Observer;
use crate::ObserverRef;
use crate::SharedError;
use crate::Subscription;
use crate::SubscriptionSlot;

type InnerSelector<K, V, T> = Arc<dyn Fn(&K, &V) -> ObservableRef<T> + Send + Sync>;

/// Subscribes to one inner observable per item of a keyed stream and merges
/// their values.
///
/// An item's inner subscription is replaced on update and released on
/// remove. Inner completions are ignored; an error from an inner observable
/// or from the source terminates the whole merged stream.
pub struct MergeMany<V, K, T> {
    source: ChangeStream<V, K>,
    selector: InnerSelector<K, V, T>,
}

impl<V, K, T> MergeMany<V, K, T>
where
    V: CacheValue,
    K: CacheKey,
    T: Send + 'static,
{
    pub fn new(
        source: ChangeStream<V, K>,
        selector: impl Fn(&K, &V) -> ObservableRef<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            source,
            selector: Arc::new(selector),
        }
    }
}

struct MergeCore<K, T> {
    downstream: ObserverRef<T>,
    delivery: ReentrantMutex<()>,
    inner: Mutex<HashMap<K, Subscription>>,
    outer: SubscriptionSlot,
    terminated: AtomicBool,
}

impl<K, T> MergeCore<K, T>
where
    K: CacheKey,
    T: Send + 'static,
{
    fn emit(
        &self,
        value: T,
    ) {
        let _delivery = self.delivery.lock();
        if !self.terminated.load(Ordering::Acquire) {
            self.downstream.on_next(value);
        }
    }

    fn fail(
        &self,
        error: SharedError,
    ) {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        warn!(%error, "merge-many terminated by error");
        {
            let _delivery = self.delivery.lock();
            self.downstream.on_error(error);
        }
        self.release();
    }

    fn release(&self) {
        self.outer.dispose();
        let inner: Vec<Subscription> = self.inner.lock().drain().map(|(_, s)| s).collect();
        drop(inner);
    }

    fn attach(
        &self,
        key: K,
        subscription: Subscription,
    ) {
        let replaced = {
            let mut inner = self.inner.lock();
            if self.terminated.load(Ordering::Acquire) {
                Some(subscription)
            } else {
                inner.insert(key, subscription)
            }
        };
        drop(replaced);
    }

    fn detach(
        &self,
        key: &K,
    ) {
        let removed = self.inner.lock().remove(key);
        drop(removed);
    }
}

struct InnerObserver<K, T> {
    core: Arc<MergeCore<K, T>>,
}

impl<K, T> Observer<T> for InnerObserver<K, T>
where
    K: CacheKey,
    T: Send + 'static,
{
    fn on_next(
        &self,
        value: T,
    ) {
        self.core.emit(value);
    }

    fn on_error(
        &self,
        error: SharedError,
    ) {
        self.core.fail(error);
    }
}

struct SourceObserver<V, K, T> {
    core: Arc<MergeCore<K, T>>,
    selector: InnerSelector<K, V, T>,
}

impl<V, K, T> Observer<ChangeSet<V, K>> for SourceObserver<V, K, T>
where
    V: CacheValue,
    K: CacheKey,
    T: Send + 'static,
{
    fn on_next(
        &self,
        changes: ChangeSet<V, K>,
    ) {
        for change in changes.iter() {
            if self.core.terminated.load(Ordering::Acquire) {
                return;
            }
            let key = change.key();
            match change.reason() {
                ChangeReason::Add | ChangeReason::Update => {
                    self.core.detach(key);
                    let inner = (self.selector)(key, change.current());
                    let subscription = inner.subscribe(Arc::new(InnerObserver {
                        core: Arc::clone(&self.core),
                    }));
                    self.core.attach(key.clone(), subscription);
                }
                ChangeReason::Remove => self.core.detach(key),
                ChangeReason::Refresh | ChangeReason::Moved => {}
            }
        }
    }

    fn on_error(
        &self,
        error: SharedError,
    ) {
        self.core.fail(error);
    }
}

impl<V, K, T> Observable<T> for MergeMany<V, K, T>
where
    V: CacheValue,
    K: CacheKey,
    T: Send + 'static,
{
    fn subscribe(
        &self,
        observer: ObserverRef<T>,
    ) -> Subscription {
        let core = Arc::new(MergeCore {
            downstream: observer,
            delivery: ReentrantMutex::new(()),
            inner: Mutex::new(HashMap::new()),
            outer: SubscriptionSlot::new(),
            terminated: AtomicBool::new(false),
        });

        let outer = self.source.subscribe(Arc::new(SourceObserver {
            core: Arc::clone(&core),
            selector: Arc::clone(&self.selector),
        }));
        core.outer.set(outer);

        Subscription::new(move || {
            core.terminated.store(true, Ordering::Release);
            core.release();
        })
    }
}
