use std::collections::HashMap;
use std::hash::Hash;

use super::Recorder;
use crate::ChangeReason;
use crate::ChangeSet;
use crate::Observable;
use crate::SharedError;
use crate::Subscription;

/// Mirrors a changeset stream into a map while keeping every message.
pub struct ChangeSetAggregator<V, K> {
    recorder: Recorder<ChangeSet<V, K>>,
    subscription: Option<Subscription>,
}

impl<V, K> ChangeSetAggregator<V, K>
where
    V: Clone + Send + Sync + 'static,
    K: Clone + Eq + Hash + Send + Sync + 'static,
{
    pub fn new<O>(source: &O) -> Self
    where
        O: Observable<ChangeSet<V, K>> + ?Sized,
    {
        let (recorder, subscription) = Recorder::record(source);
        Self {
            recorder,
            subscription: Some(subscription),
        }
    }

    pub fn messages(&self) -> Vec<ChangeSet<V, K>> {
        self.recorder.values()
    }

    /// State obtained by replaying every message in order
    pub fn data(&self) -> HashMap<K, V> {
        let mut data = HashMap::new();
        for changes in self.recorder.values() {
            for change in changes.iter() {
                match change.reason() {
                    ChangeReason::Add | ChangeReason::Update | ChangeReason::Refresh => {
                        data.insert(change.key().clone(), change.current().clone());
                    }
                    ChangeReason::Remove => {
                        data.remove(change.key());
                    }
                    ChangeReason::Moved => {}
                }
            }
        }
        data
    }

    pub fn count(&self) -> usize {
        self.data().len()
    }

    pub fn lookup(
        &self,
        key: &K,
    ) -> Option<V> {
        self.data().get(key).cloned()
    }

    pub fn error(&self) -> Option<SharedError> {
        self.recorder.error()
    }

    pub fn is_completed(&self) -> bool {
        self.recorder.is_completed()
    }

    pub fn dispose(&mut self) {
        self.subscription.take();
    }
}
