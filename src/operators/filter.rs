use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::CacheKey;
use crate::CacheValue;
use crate::Change;
use crate::ChangeReason;
use crate::ChangeSet;
use crate::ChangeStream;
use crate::Observable;
use crate::Observer;
use crate::ObserverRef;
use crate::SharedError;
use crate::Subscription;

pub type Predicate<V> = Arc<dyn Fn(&V) -> bool + Send + Sync>;

/// Tracks which keys currently pass a predicate so that transitions across
/// it can be reported as `Add` and `Remove`.
pub(crate) struct StatefulFilter<V, K> {
    predicate: Predicate<V>,
    matched: HashSet<K>,
}

impl<V, K> StatefulFilter<V, K>
where
    V: CacheValue,
    K: CacheKey,
{
    pub(crate) fn new(predicate: Predicate<V>) -> Self {
        Self {
            predicate,
            matched: HashSet::new(),
        }
    }

    pub(crate) fn process(
        &mut self,
        changes: &ChangeSet<V, K>,
    ) -> ChangeSet<V, K> {
        let mut filtered = Vec::new();
        for change in changes.iter() {
            let key = change.key();
            let was_matched = self.matched.contains(key);
            match change.reason() {
                ChangeReason::Add | ChangeReason::Update | ChangeReason::Refresh => {
                    let now_matched = (self.predicate)(change.current());
                    match (was_matched, now_matched) {
                        (true, true) => filtered.push(change.clone()),
                        (true, false) => {
                            self.matched.remove(key);
                            let last_seen = change.previous().unwrap_or(change.current());
                            filtered.push(Change::remove(key.clone(), last_seen.clone()));
                        }
                        (false, true) => {
                            self.matched.insert(key.clone());
                            filtered.push(Change::add(key.clone(), change.current().clone()));
                        }
                        (false, false) => {}
                    }
                }
                ChangeReason::Remove => {
                    if self.matched.remove(key) {
                        filtered.push(change.clone());
                    }
                }
                ChangeReason::Moved => {
                    if was_matched {
                        filtered.push(change.clone());
                    }
                }
            }
        }
        ChangeSet::new(filtered)
    }
}

/// Keyed filter: forwards entries matching `predicate`, reporting entries
/// that start or stop matching as `Add` / `Remove`.
pub struct Filter<V, K> {
    source: ChangeStream<V, K>,
    predicate: Predicate<V>,
}

impl<V, K> Filter<V, K>
where
    V: CacheValue,
    K: CacheKey,
{
    pub fn new(
        source: ChangeStream<V, K>,
        predicate: impl Fn(&V) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            source,
            predicate: Arc::new(predicate),
        }
    }
}

impl<V, K> Observable<ChangeSet<V, K>> for Filter<V, K>
where
    V: CacheValue,
    K: CacheKey,
{
    fn subscribe(
        &self,
        observer: ObserverRef<ChangeSet<V, K>>,
    ) -> Subscription {
        self.source.subscribe(Arc::new(FilterObserver {
            downstream: observer,
            filter: Mutex::new(StatefulFilter::new(Arc::clone(&self.predicate))),
        }))
    }
}

/// Applies the stateful filter to each batch on its way to `downstream`.
pub(crate) struct FilterObserver<V, K> {
    pub(crate) downstream: ObserverRef<ChangeSet<V, K>>,
    pub(crate) filter: Mutex<StatefulFilter<V, K>>,
}

impl<V, K> Observer<ChangeSet<V, K>> for FilterObserver<V, K>
where
    V: CacheValue,
    K: CacheKey,
{
    fn on_next(
        &self,
        changes: ChangeSet<V, K>,
    ) {
        let filtered = self.filter.lock().process(&changes);
        if !filtered.is_empty() {
            self.downstream.on_next(filtered);
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
