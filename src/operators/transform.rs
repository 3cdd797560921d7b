use std::sync::Arc;

use parking_lot::Mutex;

use crate::CacheKey;
use crate::CacheValue;
use crate::ChangeAwareCache;
use crate::ChangeReason;
use crate::ChangeSet;
use crate::ChangeStream;
use crate::Observable;
use crate::Observer;
use crate::ObserverRef;
use crate::SharedError;
use crate::Subscription;

type TransformFn<K, V, D> = Arc<dyn Fn(&K, &V) -> D + Send + Sync>;

/// Projects every value of a keyed stream, keeping keys.
///
/// Adds and updates invoke the projection; removes and refreshes reuse the
/// value projected last for that key.
pub struct Transform<V, K, D> {
    source: ChangeStream<V, K>,
    transform: TransformFn<K, V, D>,
}

impl<V, K, D> Transform<V, K, D>
where
    V: CacheValue,
    K: CacheKey,
    D: CacheValue,
{
    pub fn new(
        source: ChangeStream<V, K>,
        transform: impl Fn(&K, &V) -> D + Send + Sync + 'static,
    ) -> Self {
        Self {
            source,
            transform: Arc::new(transform),
        }
    }
}

struct TransformObserver<V, K, D> {
    downstream: ObserverRef<ChangeSet<D, K>>,
    transform: TransformFn<K, V, D>,
    projected: Mutex<ChangeAwareCache<D, K>>,
}

impl<V, K, D> Observer<ChangeSet<V, K>> for TransformObserver<V, K, D>
where
    V: CacheValue,
    K: CacheKey,
    D: CacheValue,
{
    fn on_next(
        &self,
        changes: ChangeSet<V, K>,
    ) {
        let transformed = {
            let mut projected = self.projected.lock();
            for change in changes.iter() {
                let key = change.key();
                match change.reason() {
                    ChangeReason::Add | ChangeReason::Update => {
                        let value = (self.transform)(key, change.current());
                        projected.add_or_update(key.clone(), value);
                    }
                    ChangeReason::Remove => projected.remove(key),
                    ChangeReason::Refresh => projected.refresh(key),
                    ChangeReason::Moved => {}
                }
            }
            projected.capture_changes()
        };
        if !transformed.is_empty() {
            self.downstream.on_next(transformed);
        }
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

impl<V, K, D> Observable<ChangeSet<D, K>> for Transform<V, K, D>
where
    V: CacheValue,
    K: CacheKey,
    D: CacheValue,
{
    fn subscribe(
        &self,
        observer: ObserverRef<ChangeSet<D, K>>,
    ) -> Subscription {
        self.source.subscribe(Arc::new(TransformObserver {
            downstream: observer,
            transform: Arc::clone(&self.transform),
            projected: Mutex::new(ChangeAwareCache::new()),
        }))
    }
}
