use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::CacheConfig;
use crate::CacheKey;
use crate::CacheValue;
use crate::ChangeSet;
use crate::ChangeStream;
use crate::Observable;
use crate::ObservableCache;
use crate::ObserverRef;
use crate::Subscription;

struct SharedState<V: CacheValue, K: CacheKey> {
    subscribers: usize,
    cache: Option<Arc<ObservableCache<V, K>>>,
}

/// Shares one materialization of `source` between all subscribers.
///
/// The first subscriber subscribes to `source` through a shared cache; later
/// subscribers connect to that cache and receive its current contents first.
/// When the last subscriber leaves the cache is disposed, releasing the
/// upstream subscription. A later subscriber starts a fresh one.
pub struct RefCount<V: CacheValue, K: CacheKey> {
    source: ChangeStream<V, K>,
    config: CacheConfig,
    state: Arc<Mutex<SharedState<V, K>>>,
}

impl<V, K> RefCount<V, K>
where
    V: CacheValue,
    K: CacheKey,
{
    pub fn new(source: ChangeStream<V, K>) -> Self {
        Self::with_config(source, CacheConfig::default())
    }

    pub fn with_config(
        source: ChangeStream<V, K>,
        config: CacheConfig,
    ) -> Self {
        Self {
            source,
            config,
            state: Arc::new(Mutex::new(SharedState {
                subscribers: 0,
                cache: None,
            })),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers
    }

    fn acquire(&self) -> Arc<ObservableCache<V, K>> {
        let mut state = self.state.lock();
        state.subscribers += 1;
        if let Some(cache) = &state.cache {
            return Arc::clone(cache);
        }

        debug!("first subscriber: materializing shared cache");
        let cache = Arc::new(ObservableCache::from_stream_with_config(&self.source, &self.config));
        state.cache = Some(Arc::clone(&cache));
        cache
    }
}

fn release<V, K>(state: &Mutex<SharedState<V, K>>)
where
    V: CacheValue,
    K: CacheKey,
{
    let to_dispose = {
        let mut state = state.lock();
        state.subscribers -= 1;
        if state.subscribers == 0 {
            state.cache.take()
        } else {
            None
        }
    };

    if let Some(cache) = to_dispose {
        debug!("last subscriber left: disposing shared cache");
        cache.dispose();
    }
}

impl<V, K> Observable<ChangeSet<V, K>> for RefCount<V, K>
where
    V: CacheValue,
    K: CacheKey,
{
    fn subscribe(
        &self,
        observer: ObserverRef<ChangeSet<V, K>>,
    ) -> Subscription {
        let cache = self.acquire();
        let connection = cache.connect(None).subscribe(observer);

        let state = Arc::clone(&self.state);
        Subscription::new(move || {
            drop(connection);
            drop(cache);
            release(&state);
        })
    }
}
