use std::ops::Deref;

use super::CacheUpdater;
use super::ObservableCache;
use crate::CacheConfig;
use crate::CacheKey;
use crate::CacheValue;
use crate::ChangeSet;
use crate::Observable;
use crate::ObserverRef;
use crate::Subscription;

/// Cache edited with explicit keys, used to build operators.
pub struct IntermediateCache<V: CacheValue, K: CacheKey> {
    cache: ObservableCache<V, K>,
}

impl<V, K> Default for IntermediateCache<V, K>
where
    V: CacheValue,
    K: CacheKey,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V, K> IntermediateCache<V, K>
where
    V: CacheValue,
    K: CacheKey,
{
    pub fn new() -> Self {
        Self::with_config(&CacheConfig::default())
    }

    pub fn with_config(config: &CacheConfig) -> Self {
        Self {
            cache: ObservableCache::new(config),
        }
    }

    pub fn edit(
        &self,
        edit: impl FnOnce(&mut CacheUpdater<'_, V, K>),
    ) {
        self.cache.update_from_intermediate(edit);
    }
}

impl<V, K> Deref for IntermediateCache<V, K>
where
    V: CacheValue,
    K: CacheKey,
{
    type Target = ObservableCache<V, K>;

    fn deref(&self) -> &Self::Target {
        &self.cache
    }
}

impl<V, K> Observable<ChangeSet<V, K>> for IntermediateCache<V, K>
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
