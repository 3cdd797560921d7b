use std::ops::Deref;
use std::sync::Arc;

use super::CacheUpdater;
use super::ObservableCache;
use crate::CacheConfig;
use crate::CacheKey;
use crate::CacheValue;
use crate::ChangeSet;
use crate::Observable;
use crate::ObserverRef;
use crate::Subscription;

type KeySelector<V, K> = Arc<dyn Fn(&V) -> K + Send + Sync>;

/// Editable cache whose keys are derived from the values themselves.
///
/// ```ignore
/// let people = SourceCache::new(|p: &Person| p.id);
/// people.edit(|updater| {
///     updater.add_or_update(Person::new(1, "Ada"));
///     updater.remove(&2);
/// });
/// ```
pub struct SourceCache<V: CacheValue, K: CacheKey> {
    cache: ObservableCache<V, K>,
    key_selector: KeySelector<V, K>,
}

impl<V, K> SourceCache<V, K>
where
    V: CacheValue,
    K: CacheKey,
{
    pub fn new(key_selector: impl Fn(&V) -> K + Send + Sync + 'static) -> Self {
        Self::with_config(key_selector, &CacheConfig::default())
    }

    pub fn with_config(
        key_selector: impl Fn(&V) -> K + Send + Sync + 'static,
        config: &CacheConfig,
    ) -> Self {
        Self {
            cache: ObservableCache::new(config),
            key_selector: Arc::new(key_selector),
        }
    }

    /// Applies `edit` as one batch and broadcasts the net changes
    pub fn edit(
        &self,
        edit: impl FnOnce(&mut SourceUpdater<'_, '_, V, K>),
    ) {
        let key_selector = &*self.key_selector;
        self.cache.update_from_intermediate(|updater| {
            edit(&mut SourceUpdater {
                updater,
                key_selector,
            })
        });
    }

    /// Joins the write already in progress on this thread
    pub fn edit_nested(
        &self,
        edit: impl FnOnce(&mut SourceUpdater<'_, '_, V, K>),
    ) -> crate::Result<()> {
        let key_selector = &*self.key_selector;
        self.cache.edit_nested(|updater| {
            edit(&mut SourceUpdater {
                updater,
                key_selector,
            })
        })
    }

    pub fn add_or_update(
        &self,
        value: V,
    ) {
        self.edit(|updater| updater.add_or_update(value));
    }

    pub fn remove(
        &self,
        key: &K,
    ) {
        self.edit(|updater| updater.remove(key));
    }

    pub fn clear(&self) {
        self.edit(|updater| updater.clear());
    }

    pub fn key_of(
        &self,
        value: &V,
    ) -> K {
        (self.key_selector)(value)
    }

    pub fn as_observable_cache(&self) -> &ObservableCache<V, K> {
        &self.cache
    }
}

impl<V, K> Deref for SourceCache<V, K>
where
    V: CacheValue,
    K: CacheKey,
{
    type Target = ObservableCache<V, K>;

    fn deref(&self) -> &Self::Target {
        &self.cache
    }
}

impl<V, K> Observable<ChangeSet<V, K>> for SourceCache<V, K>
where
    V: CacheValue,
    K: CacheKey,
{
    fn subscribe(
        &self,
        observer: ObserverRef<ChangeSet<V, K>>,
    ) -> Subscription {
        self.cache.subscribe(observer)
    }
}

/// Write access for a [`SourceCache`] edit; keys come from the key selector.
pub struct SourceUpdater<'u, 'a, V, K> {
    updater: &'u mut CacheUpdater<'a, V, K>,
    key_selector: &'u (dyn Fn(&V) -> K + Send + Sync),
}

impl<V, K> SourceUpdater<'_, '_, V, K>
where
    V: CacheValue,
    K: CacheKey,
{
    pub fn add_or_update(
        &mut self,
        value: V,
    ) {
        let key = (self.key_selector)(&value);
        self.updater.add_or_update(key, value);
    }

    pub fn add_or_update_many(
        &mut self,
        values: impl IntoIterator<Item = V>,
    ) {
        for value in values {
            self.add_or_update(value);
        }
    }

    pub fn remove(
        &mut self,
        key: &K,
    ) {
        self.updater.remove(key);
    }

    pub fn remove_keys<'k>(
        &mut self,
        keys: impl IntoIterator<Item = &'k K>,
    ) where
        K: 'k,
    {
        self.updater.remove_keys(keys);
    }

    /// Removes the entries whose keys the given values map to
    pub fn remove_items<'v>(
        &mut self,
        values: impl IntoIterator<Item = &'v V>,
    ) where
        V: 'v,
    {
        for value in values {
            let key = (self.key_selector)(value);
            self.updater.remove(&key);
        }
    }

    pub fn refresh(
        &mut self,
        key: &K,
    ) {
        self.updater.refresh(key);
    }

    pub fn refresh_all(&mut self) {
        self.updater.refresh_all();
    }

    pub fn clear(&mut self) {
        self.updater.clear();
    }

    /// Replaces the whole content with `values`
    pub fn load(
        &mut self,
        values: impl IntoIterator<Item = V>,
    ) {
        self.updater.clear();
        self.add_or_update_many(values);
    }

    pub fn lookup(
        &self,
        key: &K,
    ) -> Option<V> {
        self.updater.lookup(key)
    }

    pub fn count(&self) -> usize {
        self.updater.count()
    }

    pub fn keys(&self) -> Vec<K> {
        self.updater.keys()
    }
}
