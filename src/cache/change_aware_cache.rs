use std::collections::HashMap;

use tracing::trace;

use crate::CacheKey;
use crate::CacheValue;
use crate::Change;
use crate::ChangeReason;
use crate::ChangeSet;

/// Mutable key-value storage that a cache updater writes through.
///
/// Implemented by [`ChangeAwareCache`] for writes whose changes are
/// collected, and by a plain `HashMap` for writes nobody observes.
pub trait CacheStore<V, K> {
    fn add_or_update(
        &mut self,
        key: K,
        value: V,
    );

    /// No-op when `key` is absent
    fn remove(
        &mut self,
        key: &K,
    );

    /// No-op when `key` is absent
    fn refresh(
        &mut self,
        key: &K,
    );

    fn clear(&mut self);

    fn lookup(
        &self,
        key: &K,
    ) -> Option<&V>;

    fn count(&self) -> usize;
}

impl<V, K> CacheStore<V, K> for HashMap<K, V>
where
    V: CacheValue,
    K: CacheKey,
{
    fn add_or_update(
        &mut self,
        key: K,
        value: V,
    ) {
        self.insert(key, value);
    }

    fn remove(
        &mut self,
        key: &K,
    ) {
        HashMap::remove(self, key);
    }

    fn refresh(
        &mut self,
        _key: &K,
    ) {
    }

    fn clear(&mut self) {
        HashMap::clear(self);
    }

    fn lookup(
        &self,
        key: &K,
    ) -> Option<&V> {
        self.get(key)
    }

    fn count(&self) -> usize {
        self.len()
    }
}

/// Key-value store that records the net effect of every mutation since the
/// last [`capture_changes`](Self::capture_changes).
///
/// Successive operations on one key within a batch collapse into a single
/// pending change, so subscribers only ever see the net result:
///
/// | pending       | operation | pending afterwards |
/// |---------------|-----------|--------------------|
/// | Add(a)        | update    | Add(v)             |
/// | Add(a)        | remove    | dropped            |
/// | Update(u, p)  | update    | Update(v, p)       |
/// | Update(u, p)  | remove    | Remove(p)          |
/// | Remove(p)     | add       | Update(v, p)       |
/// | Refresh(r)    | update    | Update(v, r)       |
/// | Refresh(r)    | remove    | Remove(r)          |
/// | any           | refresh   | unchanged          |
///
/// A collapsed change keeps the position of the first change recorded for
/// its key.
#[derive(Debug, Clone)]
pub struct ChangeAwareCache<V, K> {
    data: HashMap<K, V>,
    pending: Vec<Option<Change<V, K>>>,
    positions: HashMap<K, usize>,
}

impl<V, K> Default for ChangeAwareCache<V, K>
where
    V: CacheValue,
    K: CacheKey,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V, K> ChangeAwareCache<V, K>
where
    V: CacheValue,
    K: CacheKey,
{
    pub fn new() -> Self {
        Self::from_data(HashMap::new())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::from_data(HashMap::with_capacity(capacity))
    }

    /// Starts tracking on top of already committed data
    pub fn from_data(data: HashMap<K, V>) -> Self {
        Self {
            data,
            pending: Vec::new(),
            positions: HashMap::new(),
        }
    }

    /// Releases the storage, discarding anything not yet captured
    pub fn into_data(self) -> HashMap<K, V> {
        self.data
    }

    pub fn data(&self) -> &HashMap<K, V> {
        &self.data
    }

    pub fn lookup(
        &self,
        key: &K,
    ) -> Option<&V> {
        self.data.get(key)
    }

    pub fn count(&self) -> usize {
        self.data.len()
    }

    pub fn keys(&self) -> Vec<K> {
        self.data.keys().cloned().collect()
    }

    pub fn items(&self) -> Vec<V> {
        self.data.values().cloned().collect()
    }

    pub fn key_values(&self) -> Vec<(K, V)> {
        self.data.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    pub fn has_pending_changes(&self) -> bool {
        self.pending.iter().any(Option::is_some)
    }

    pub fn add_or_update(
        &mut self,
        key: K,
        value: V,
    ) {
        let previous = self.data.insert(key.clone(), value.clone());

        let Some(position) = self.positions.get(&key).copied() else {
            let change = match previous {
                Some(previous) => Change::update(key.clone(), value, previous),
                None => Change::add(key.clone(), value),
            };
            self.push(key, change);
            return;
        };

        let collapsed = match self.pending[position].take() {
            Some(existing) => {
                let (reason, key, current, previous) = existing.into_parts();
                match reason {
                    ChangeReason::Add => Change::add(key, value),
                    ChangeReason::Update => Change::update(key, value, previous.unwrap_or(current)),
                    ChangeReason::Remove | ChangeReason::Refresh | ChangeReason::Moved => {
                        Change::update(key, value, current)
                    }
                }
            }
            None => Change::add(key, value),
        };
        self.pending[position] = Some(collapsed);
    }

    pub fn remove(
        &mut self,
        key: &K,
    ) {
        let Some(removed) = self.data.remove(key) else {
            trace!("remove ignored: key not present");
            return;
        };

        let Some(position) = self.positions.get(key).copied() else {
            self.push(key.clone(), Change::remove(key.clone(), removed));
            return;
        };

        let collapsed = self.pending[position].take().and_then(|existing| {
            let (reason, key, current, previous) = existing.into_parts();
            match reason {
                ChangeReason::Add => None,
                ChangeReason::Update => Some(Change::remove(key, previous.unwrap_or(current))),
                ChangeReason::Remove | ChangeReason::Refresh | ChangeReason::Moved => {
                    Some(Change::remove(key, current))
                }
            }
        });

        if collapsed.is_none() {
            self.positions.remove(key);
        }
        self.pending[position] = collapsed;
    }

    pub fn refresh(
        &mut self,
        key: &K,
    ) {
        let Some(value) = self.data.get(key) else {
            trace!("refresh ignored: key not present");
            return;
        };
        if self.positions.contains_key(key) {
            return;
        }
        let change = Change::refresh(key.clone(), value.clone());
        self.push(key.clone(), change);
    }

    pub fn refresh_all(&mut self) {
        for key in self.keys() {
            self.refresh(&key);
        }
    }

    /// Removes every key, recording a `Remove` for each
    pub fn clear(&mut self) {
        for key in self.keys() {
            self.remove(&key);
        }
    }

    /// Replays an upstream changeset onto this store.
    ///
    /// Moves carry no keyed state and are ignored.
    pub fn clone_changes(
        &mut self,
        changes: &ChangeSet<V, K>,
    ) {
        apply_changes(self, changes);
    }

    /// Returns the net pending changes and resets the accumulator
    pub fn capture_changes(&mut self) -> ChangeSet<V, K> {
        self.positions.clear();
        let changes: Vec<Change<V, K>> = self.pending.drain(..).flatten().collect();
        trace!(changes = changes.len(), "captured changes");
        ChangeSet::new(changes)
    }

    /// Reverts every pending change, restoring the data as of the last
    /// capture
    pub fn discard_changes(&mut self) {
        self.positions.clear();
        let pending: Vec<Change<V, K>> = self.pending.drain(..).flatten().collect();
        for change in pending.into_iter().rev() {
            let (reason, key, current, previous) = change.into_parts();
            match reason {
                ChangeReason::Add => {
                    self.data.remove(&key);
                }
                ChangeReason::Update => {
                    if let Some(previous) = previous {
                        self.data.insert(key, previous);
                    }
                }
                ChangeReason::Remove => {
                    self.data.insert(key, current);
                }
                ChangeReason::Refresh | ChangeReason::Moved => {}
            }
        }
        trace!("discarded pending changes");
    }

    fn push(
        &mut self,
        key: K,
        change: Change<V, K>,
    ) {
        self.positions.insert(key, self.pending.len());
        self.pending.push(Some(change));
    }
}

impl<V, K> CacheStore<V, K> for ChangeAwareCache<V, K>
where
    V: CacheValue,
    K: CacheKey,
{
    fn add_or_update(
        &mut self,
        key: K,
        value: V,
    ) {
        ChangeAwareCache::add_or_update(self, key, value);
    }

    fn remove(
        &mut self,
        key: &K,
    ) {
        ChangeAwareCache::remove(self, key);
    }

    fn refresh(
        &mut self,
        key: &K,
    ) {
        ChangeAwareCache::refresh(self, key);
    }

    fn clear(&mut self) {
        ChangeAwareCache::clear(self);
    }

    fn lookup(
        &self,
        key: &K,
    ) -> Option<&V> {
        self.data.get(key)
    }

    fn count(&self) -> usize {
        self.data.len()
    }
}

/// Applies `changes` to any store
pub(crate) fn apply_changes<V, K, S>(
    store: &mut S,
    changes: &ChangeSet<V, K>,
) where
    V: Clone,
    K: Clone,
    S: CacheStore<V, K> + ?Sized,
{
    for change in changes.iter() {
        match change.reason() {
            ChangeReason::Add | ChangeReason::Update => {
                store.add_or_update(change.key().clone(), change.current().clone())
            }
            ChangeReason::Remove => store.remove(change.key()),
            ChangeReason::Refresh => store.refresh(change.key()),
            ChangeReason::Moved => {}
        }
    }
}
