use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use changeflow::ChangeReason;
use changeflow::ChangeSet;
use changeflow::Observable;
use changeflow::Observer;
use changeflow::SharedError;
use changeflow::Subscription;
use parking_lot::Mutex;

struct Collected<V, K> {
    messages: Vec<ChangeSet<V, K>>,
    error: Option<SharedError>,
    completed: bool,
}

/// Mirrors a changeset stream into a map through the public API only
pub struct Collector<V, K> {
    state: Arc<Mutex<Collected<V, K>>>,
    _subscription: Subscription,
}

struct CollectingObserver<V, K> {
    state: Arc<Mutex<Collected<V, K>>>,
}

impl<V, K> Observer<ChangeSet<V, K>> for CollectingObserver<V, K>
where
    V: Send + Sync,
    K: Send + Sync,
{
    fn on_next(
        &self,
        changes: ChangeSet<V, K>,
    ) {
        self.state.lock().messages.push(changes);
    }

    fn on_error(
        &self,
        error: SharedError,
    ) {
        self.state.lock().error = Some(error);
    }

    fn on_completed(&self) {
        self.state.lock().completed = true;
    }
}

impl<V, K> Collector<V, K>
where
    V: Clone + Send + Sync + 'static,
    K: Clone + Eq + Hash + Send + Sync + 'static,
{
    pub fn new<O>(source: &O) -> Self
    where
        O: Observable<ChangeSet<V, K>> + ?Sized,
    {
        let state = Arc::new(Mutex::new(Collected {
            messages: Vec::new(),
            error: None,
            completed: false,
        }));
        let subscription = source.subscribe(Arc::new(CollectingObserver {
            state: Arc::clone(&state),
        }));
        Self {
            state,
            _subscription: subscription,
        }
    }

    pub fn message_count(&self) -> usize {
        self.state.lock().messages.len()
    }

    pub fn last(&self) -> Option<ChangeSet<V, K>> {
        self.state.lock().messages.last().cloned()
    }

    pub fn data(&self) -> HashMap<K, V> {
        let mut data = HashMap::new();
        for changes in &self.state.lock().messages {
            for change in changes.iter() {
                match change.reason() {
                    ChangeReason::Remove => {
                        data.remove(change.key());
                    }
                    ChangeReason::Moved => {}
                    _ => {
                        data.insert(change.key().clone(), change.current().clone());
                    }
                }
            }
        }
        data
    }

    pub fn has_error(&self) -> bool {
        self.state.lock().error.is_some()
    }

    pub fn is_completed(&self) -> bool {
        self.state.lock().completed
    }
}
