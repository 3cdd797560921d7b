//! Single lock around one cache's storage.
//!
//! All reads and writes go through one re-entrant lock. While a write is in
//! progress the edit closure receives a [`CacheUpdater`] that borrows the
//! storage per operation, so the same thread may read the cache or issue a
//! nested write from inside the edit without deadlocking.

use std::cell::RefCell;
use std::collections::HashMap;
use std::mem;

use parking_lot::ReentrantMutex;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::apply_changes;
use super::CacheStore;
use super::ChangeAwareCache;
use crate::CacheKey;
use crate::CacheValue;
use crate::Change;
use crate::ChangeSet;
use crate::Error;
use crate::Result;

/// Called with the captured changes before they become readable
pub type PreviewHandler<'a, V, K> = &'a dyn Fn(&ChangeSet<V, K>);

enum ActiveWrite<V, K> {
    /// Changes are being collected against a working copy
    Tracking(ChangeAwareCache<V, K>),
    /// Edits go straight to committed storage
    Direct,
}

struct WriterState<V, K> {
    data: HashMap<K, V>,
    active: Option<ActiveWrite<V, K>>,
}

impl<V, K> WriterState<V, K>
where
    V: CacheValue,
    K: CacheKey,
{
    fn store_mut(&mut self) -> &mut dyn CacheStore<V, K> {
        match &mut self.active {
            Some(ActiveWrite::Tracking(working)) => working,
            _ => &mut self.data,
        }
    }

    fn view(&self) -> &HashMap<K, V> {
        match &self.active {
            Some(ActiveWrite::Tracking(working)) => working.data(),
            _ => &self.data,
        }
    }
}

/// Abandons the active write if the edit closure unwinds.
///
/// A tracked batch is reverted so the committed data is as it was before the
/// edit; a preview write never touched it. Direct edits are already applied.
struct RollbackOnUnwind<'a, V, K>
where
    V: CacheValue,
    K: CacheKey,
{
    state: &'a RefCell<WriterState<V, K>>,
    restore_data: bool,
    armed: bool,
}

impl<V, K> Drop for RollbackOnUnwind<'_, V, K>
where
    V: CacheValue,
    K: CacheKey,
{
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(mut state) = self.state.try_borrow_mut() else {
            return;
        };
        if let Some(ActiveWrite::Tracking(mut working)) = state.active.take() {
            if self.restore_data {
                working.discard_changes();
                state.data = working.into_data();
            }
        }
        warn!("edit panicked; pending batch rolled back");
    }
}

pub struct ReaderWriter<V, K> {
    state: ReentrantMutex<RefCell<WriterState<V, K>>>,
}

impl<V, K> Default for ReaderWriter<V, K>
where
    V: CacheValue,
    K: CacheKey,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V, K> ReaderWriter<V, K>
where
    V: CacheValue,
    K: CacheKey,
{
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: ReentrantMutex::new(RefCell::new(WriterState {
                data: HashMap::with_capacity(capacity),
                active: None,
            })),
        }
    }

    /// Runs `edit` as one batch and returns the changes it produced.
    ///
    /// With a `preview` handler the edit is applied to a copy of the storage;
    /// `preview` observes the captured changes while readers still see the
    /// pre-edit state, and the copy is committed afterwards. Without one,
    /// changes are captured only when `collect_changes` is set; otherwise the
    /// edit is applied directly and an empty changeset is returned.
    ///
    /// A `write` issued from inside another write on the same thread joins the
    /// outer batch and returns an empty changeset. If `edit` panics the batch
    /// is abandoned and the committed data is left as it was.
    pub fn write(
        &self,
        edit: impl FnOnce(&mut CacheUpdater<'_, V, K>),
        preview: Option<PreviewHandler<'_, V, K>>,
        collect_changes: bool,
    ) -> ChangeSet<V, K> {
        let guard = self.state.lock();

        {
            let mut state = guard.borrow_mut();
            if state.active.is_some() {
                drop(state);
                debug!("write issued during an active write; joining the outer batch");
                edit(&mut CacheUpdater::new(self));
                return ChangeSet::empty();
            }

            let active = if preview.is_some() {
                ActiveWrite::Tracking(ChangeAwareCache::from_data(state.data.clone()))
            } else if collect_changes {
                ActiveWrite::Tracking(ChangeAwareCache::from_data(mem::take(&mut state.data)))
            } else {
                ActiveWrite::Direct
            };
            state.active = Some(active);
        }

        let mut rollback = RollbackOnUnwind {
            state: &*guard,
            restore_data: preview.is_none(),
            armed: true,
        };
        edit(&mut CacheUpdater::new(self));
        rollback.armed = false;
        drop(rollback);

        let finished = guard.borrow_mut().active.take();
        let Some(ActiveWrite::Tracking(mut working)) = finished else {
            trace!("direct write applied");
            return ChangeSet::empty();
        };

        let changes = working.capture_changes();
        match preview {
            Some(preview) => {
                preview(&changes);
                guard.borrow_mut().data = working.into_data();
            }
            None => guard.borrow_mut().data = working.into_data(),
        }
        trace!(changes = changes.len(), "write committed");
        changes
    }

    /// Adds `edit` to the write already in progress on this thread.
    ///
    /// Fails with [`Error::InvalidOperation`] when no write is active; the
    /// storage is left untouched.
    pub fn write_nested(
        &self,
        edit: impl FnOnce(&mut CacheUpdater<'_, V, K>),
    ) -> Result<()> {
        let guard = self.state.lock();
        if guard.borrow().active.is_none() {
            return Err(Error::nested_write_without_active());
        }
        edit(&mut CacheUpdater::new(self));
        Ok(())
    }

    /// Drops every entry without producing changes
    pub(crate) fn release(&self) {
        let guard = self.state.lock();
        let released = {
            let mut state = guard.borrow_mut();
            mem::take(&mut state.data)
        };
        drop(released);
    }

    pub fn lookup(
        &self,
        key: &K,
    ) -> Option<V> {
        self.read(|data| data.get(key).cloned())
    }

    pub fn count(&self) -> usize {
        self.read(HashMap::len)
    }

    pub fn keys(&self) -> Vec<K> {
        self.read(|data| data.keys().cloned().collect())
    }

    pub fn items(&self) -> Vec<V> {
        self.read(|data| data.values().cloned().collect())
    }

    pub fn key_values(&self) -> Vec<(K, V)> {
        self.read(|data| data.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    /// One `Add` per entry matching `filter` (every entry when `None`)
    pub fn get_initial_updates(
        &self,
        filter: Option<&dyn Fn(&V) -> bool>,
    ) -> ChangeSet<V, K> {
        self.read(|data| {
            data.iter()
                .filter(|(_, v)| filter.map_or(true, |f| f(v)))
                .map(|(k, v)| Change::add(k.clone(), v.clone()))
                .collect()
        })
    }

    fn read<R>(
        &self,
        f: impl FnOnce(&HashMap<K, V>) -> R,
    ) -> R {
        let guard = self.state.lock();
        let state = guard.borrow();
        f(state.view())
    }

    fn with_store<R>(
        &self,
        f: impl FnOnce(&mut dyn CacheStore<V, K>) -> R,
    ) -> R {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        f(state.store_mut())
    }
}

/// Keyed write access handed to an edit closure.
pub struct CacheUpdater<'a, V, K> {
    writer: &'a ReaderWriter<V, K>,
}

impl<'a, V, K> CacheUpdater<'a, V, K>
where
    V: CacheValue,
    K: CacheKey,
{
    fn new(writer: &'a ReaderWriter<V, K>) -> Self {
        Self { writer }
    }

    pub fn add_or_update(
        &mut self,
        key: K,
        value: V,
    ) {
        self.writer.with_store(|store| store.add_or_update(key, value));
    }

    pub fn add_or_update_many(
        &mut self,
        items: impl IntoIterator<Item = (K, V)>,
    ) {
        self.writer.with_store(|store| {
            for (key, value) in items {
                store.add_or_update(key, value);
            }
        });
    }

    pub fn remove(
        &mut self,
        key: &K,
    ) {
        self.writer.with_store(|store| store.remove(key));
    }

    pub fn remove_keys<'k>(
        &mut self,
        keys: impl IntoIterator<Item = &'k K>,
    ) where
        K: 'k,
    {
        self.writer.with_store(|store| {
            for key in keys {
                store.remove(key);
            }
        });
    }

    pub fn refresh(
        &mut self,
        key: &K,
    ) {
        self.writer.with_store(|store| store.refresh(key));
    }

    pub fn refresh_all(&mut self) {
        for key in self.writer.keys() {
            self.refresh(&key);
        }
    }

    pub fn clear(&mut self) {
        self.writer.with_store(|store| store.clear());
    }

    /// Replays an upstream changeset into the batch
    pub fn clone_changes(
        &mut self,
        changes: &ChangeSet<V, K>,
    ) {
        self.writer.with_store(|store| apply_changes(store, changes));
    }

    pub fn lookup(
        &self,
        key: &K,
    ) -> Option<V> {
        self.writer.lookup(key)
    }

    pub fn count(&self) -> usize {
        self.writer.count()
    }

    pub fn keys(&self) -> Vec<K> {
        self.writer.keys()
    }

    pub fn items(&self) -> Vec<V> {
        self.writer.items()
    }
}
