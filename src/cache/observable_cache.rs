//! Broadcasting side of a cache.
//!
//! An [`ObservableCache`] owns a [`ReaderWriter`] and three subjects: the
//! committed changes, the preview of changes about to be committed, and the
//! item count. Every write and the broadcast that follows it run under one
//! re-entrant notification lock, so all subscribers observe commits in the
//! same order, and a new subscriber's initial snapshot can never interleave
//! with a concurrent broadcast. A commit made by a subscriber from inside a
//! callback is queued and delivered once the batch being broadcast has
//! reached every subscriber.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Weak;

use parking_lot::Mutex;
use parking_lot::ReentrantMutex;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::CacheUpdater;
use super::PreviewHandler;
use super::ReaderWriter;
use crate::operators::FilterObserver;
use crate::operators::Predicate;
use crate::operators::StatefulFilter;
use crate::CacheConfig;
use crate::CacheKey;
use crate::CacheValue;
use crate::Change;
use crate::ChangeSet;
use crate::ChangeStream;
use crate::Observable;
use crate::ObservableRef;
use crate::Observer;
use crate::ObserverRef;
use crate::SharedError;
use crate::Subject;
use crate::Subscription;

/// Commits waiting to be broadcast, with the count after each one
struct BroadcastQueue<V, K> {
    pending: VecDeque<(ChangeSet<V, K>, usize)>,
    draining: bool,
}

/// Resets the queue when the draining broadcast finishes or unwinds
struct DrainGuard<'a, V, K> {
    queue: &'a RefCell<BroadcastQueue<V, K>>,
}

impl<V, K> Drop for DrainGuard<'_, V, K> {
    fn drop(&mut self) {
        if let Ok(mut queue) = self.queue.try_borrow_mut() {
            queue.pending.clear();
            queue.draining = false;
        }
    }
}

pub(crate) struct CacheInner<V, K> {
    reader_writer: ReaderWriter<V, K>,
    notify_lock: ReentrantMutex<RefCell<BroadcastQueue<V, K>>>,
    changes: Subject<ChangeSet<V, K>>,
    preview: Subject<ChangeSet<V, K>>,
    count: Subject<usize>,
    upstream: Mutex<Option<Subscription>>,
    disposed: AtomicBool,
    log_changesets: bool,
}

impl<V, K> CacheInner<V, K>
where
    V: CacheValue,
    K: CacheKey,
{
    fn write(
        &self,
        edit: impl FnOnce(&mut CacheUpdater<'_, V, K>),
    ) {
        if self.disposed.load(Ordering::Acquire) {
            debug!("write ignored: cache disposed");
            return;
        }

        let notify = self.notify_lock.lock();
        let changes = if self.preview.has_observers() {
            let preview: PreviewHandler<'_, V, K> = &|changes| {
                if !changes.is_empty() {
                    self.preview.on_next(changes.clone());
                }
            };
            self.reader_writer.write(edit, Some(preview), true)
        } else {
            let collect = self.changes.has_observers() || self.count.has_observers();
            self.reader_writer.write(edit, None, collect)
        };

        if changes.is_empty() {
            return;
        }
        let count = self.reader_writer.count();
        {
            let mut queue = notify.borrow_mut();
            queue.pending.push_back((changes, count));
            if queue.draining {
                trace!(queued = queue.pending.len(), "commit queued behind an active broadcast");
                return;
            }
            queue.draining = true;
        }

        let _drain = DrainGuard { queue: &*notify };
        loop {
            let next = notify.borrow_mut().pending.pop_front();
            let Some((changes, count)) = next else {
                break;
            };
            self.broadcast(changes, count);
        }
    }

    fn broadcast(
        &self,
        changes: ChangeSet<V, K>,
        count: usize,
    ) {
        if self.log_changesets {
            trace!(
                adds = changes.adds(),
                updates = changes.updates(),
                removes = changes.removes(),
                refreshes = changes.refreshes(),
                "broadcasting changeset"
            );
        }
        self.changes.on_next(changes);
        if self.count.has_observers() {
            self.count.on_next(count);
        }
    }

    fn terminate(
        &self,
        error: Option<SharedError>,
    ) {
        let _notify = self.notify_lock.lock();
        match error {
            Some(error) => {
                self.changes.on_error(Arc::clone(&error));
                self.preview.on_error(Arc::clone(&error));
                self.count.on_error(error);
            }
            None => {
                self.changes.on_completed();
                self.preview.on_completed();
                self.count.on_completed();
            }
        }
    }
}

/// Observable key-value cache.
///
/// Dropping the cache disposes it: subscribers are completed, the upstream
/// subscription (if any) is released, and the storage is freed.
pub struct ObservableCache<V: CacheValue, K: CacheKey> {
    inner: Arc<CacheInner<V, K>>,
}

impl<V, K> ObservableCache<V, K>
where
    V: CacheValue,
    K: CacheKey,
{
    pub(crate) fn new(config: &CacheConfig) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                reader_writer: ReaderWriter::with_capacity(config.initial_capacity),
                notify_lock: ReentrantMutex::new(RefCell::new(BroadcastQueue {
                    pending: VecDeque::new(),
                    draining: false,
                })),
                changes: Subject::new(),
                preview: Subject::new(),
                count: Subject::new(),
                upstream: Mutex::new(None),
                disposed: AtomicBool::new(false),
                log_changesets: config.log_changesets,
            }),
        }
    }

    /// Materializes a changeset stream.
    ///
    /// Upstream errors and completion are forwarded to every subscriber of
    /// the cache; the data already received stays readable.
    pub fn from_stream<O>(source: &O) -> Self
    where
        O: Observable<ChangeSet<V, K>> + ?Sized,
    {
        Self::from_stream_with_config(source, &CacheConfig::default())
    }

    pub fn from_stream_with_config<O>(
        source: &O,
        config: &CacheConfig,
    ) -> Self
    where
        O: Observable<ChangeSet<V, K>> + ?Sized,
    {
        let cache = Self::new(config);
        let subscription = source.subscribe(Arc::new(UpstreamObserver {
            cache: Arc::downgrade(&cache.inner),
        }));

        let released = {
            let mut upstream = cache.inner.upstream.lock();
            if cache.is_disposed() {
                Some(subscription)
            } else {
                *upstream = Some(subscription);
                None
            }
        };
        drop(released);
        cache
    }

    /// Committed changes, starting with one `Add` per entry matching
    /// `predicate`.
    ///
    /// With a predicate the stream is filtered statefully: an entry that
    /// stops matching on update is reported as `Remove`, one that starts
    /// matching as `Add`. Batches left empty by the filter are not emitted.
    pub fn connect(
        &self,
        predicate: Option<Predicate<V>>,
    ) -> ChangeStream<V, K> {
        Arc::new(Connect {
            inner: Arc::clone(&self.inner),
            predicate,
        })
    }

    /// Changes about to be committed, delivered while readers still see the
    /// pre-edit state. Only entries whose new value matches `predicate` are
    /// forwarded.
    pub fn preview(
        &self,
        predicate: Option<Predicate<V>>,
    ) -> ChangeStream<V, K> {
        let inner = Arc::clone(&self.inner);
        crate::create(move |observer: ObserverRef<ChangeSet<V, K>>| {
            let predicate = predicate.clone();
            inner.preview.subscribe(Arc::new(PredicateObserver {
                downstream: observer,
                predicate,
            }))
        })
    }

    /// Every change to `key`, starting with its current value as an `Add`
    pub fn watch(
        &self,
        key: K,
    ) -> ObservableRef<Change<V, K>> {
        let inner = Arc::clone(&self.inner);
        crate::create(move |observer: ObserverRef<Change<V, K>>| {
            let _notify = inner.notify_lock.lock();
            if let Some(value) = inner.reader_writer.lookup(&key) {
                observer.on_next(Change::add(key.clone(), value));
            }
            inner.changes.subscribe(Arc::new(WatchObserver {
                downstream: observer,
                key: key.clone(),
            }))
        })
    }

    /// The current count, then every distinct count after a commit
    pub fn count_changed(&self) -> ObservableRef<usize> {
        let inner = Arc::clone(&self.inner);
        crate::create(move |observer: ObserverRef<usize>| {
            let _notify = inner.notify_lock.lock();
            let current = inner.reader_writer.count();
            observer.on_next(current);
            inner.count.subscribe(Arc::new(DistinctObserver {
                downstream: observer,
                last: Mutex::new(Some(current)),
            }))
        })
    }

    /// Applies `edit` as one batch and broadcasts the resulting changes
    pub fn edit(
        &self,
        edit: impl FnOnce(&mut CacheUpdater<'_, V, K>),
    ) {
        self.update_from_intermediate(edit);
    }

    pub fn update_from_intermediate(
        &self,
        edit: impl FnOnce(&mut CacheUpdater<'_, V, K>),
    ) {
        self.inner.write(edit);
    }

    /// Replays an upstream changeset as one batch
    pub fn update_from_source(
        &self,
        changes: &ChangeSet<V, K>,
    ) {
        self.inner.write(|updater| updater.clone_changes(changes));
    }

    /// Joins the write in progress on this thread
    pub fn edit_nested(
        &self,
        edit: impl FnOnce(&mut CacheUpdater<'_, V, K>),
    ) -> crate::Result<()> {
        self.inner.reader_writer.write_nested(edit)
    }

    pub fn lookup(
        &self,
        key: &K,
    ) -> Option<V> {
        self.inner.reader_writer.lookup(key)
    }

    pub fn count(&self) -> usize {
        self.inner.reader_writer.count()
    }

    pub fn keys(&self) -> Vec<K> {
        self.inner.reader_writer.keys()
    }

    pub fn items(&self) -> Vec<V> {
        self.inner.reader_writer.items()
    }

    pub fn key_values(&self) -> Vec<(K, V)> {
        self.inner.reader_writer.key_values()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Completes every subscriber and releases upstream and storage.
    /// Calling it again has no effect.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("disposing observable cache");

        let upstream = self.inner.upstream.lock().take();
        drop(upstream);

        self.inner.terminate(None);
        self.inner.reader_writer.release();
    }
}

impl<V: CacheValue, K: CacheKey> Drop for ObservableCache<V, K> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<V, K> Observable<ChangeSet<V, K>> for ObservableCache<V, K>
where
    V: CacheValue,
    K: CacheKey,
{
    fn subscribe(
        &self,
        observer: ObserverRef<ChangeSet<V, K>>,
    ) -> Subscription {
        self.connect(None).subscribe(observer)
    }
}

struct Connect<V, K> {
    inner: Arc<CacheInner<V, K>>,
    predicate: Option<Predicate<V>>,
}

impl<V, K> Observable<ChangeSet<V, K>> for Connect<V, K>
where
    V: CacheValue,
    K: CacheKey,
{
    fn subscribe(
        &self,
        observer: ObserverRef<ChangeSet<V, K>>,
    ) -> Subscription {
        let _notify = self.inner.notify_lock.lock();

        let Some(predicate) = self.predicate.clone() else {
            let initial = self.inner.reader_writer.get_initial_updates(None);
            if !initial.is_empty() {
                observer.on_next(initial);
            }
            return self.inner.changes.subscribe(observer);
        };

        let mut filter = StatefulFilter::new(predicate);
        let initial = filter.process(&self.inner.reader_writer.get_initial_updates(None));
        if !initial.is_empty() {
            observer.on_next(initial);
        }
        self.inner.changes.subscribe(Arc::new(FilterObserver {
            downstream: observer,
            filter: Mutex::new(filter),
        }))
    }
}

struct UpstreamObserver<V, K> {
    cache: Weak<CacheInner<V, K>>,
}

impl<V, K> Observer<ChangeSet<V, K>> for UpstreamObserver<V, K>
where
    V: CacheValue,
    K: CacheKey,
{
    fn on_next(
        &self,
        changes: ChangeSet<V, K>,
    ) {
        if let Some(cache) = self.cache.upgrade() {
            cache.write(|updater| updater.clone_changes(&changes));
        }
    }

    fn on_error(
        &self,
        error: SharedError,
    ) {
        warn!(%error, "upstream of observable cache failed");
        if let Some(cache) = self.cache.upgrade() {
            cache.terminate(Some(error));
        }
    }

    fn on_completed(&self) {
        if let Some(cache) = self.cache.upgrade() {
            cache.terminate(None);
        }
    }
}

struct PredicateObserver<V, K> {
    downstream: ObserverRef<ChangeSet<V, K>>,
    predicate: Option<Predicate<V>>,
}

impl<V, K> Observer<ChangeSet<V, K>> for PredicateObserver<V, K>
where
    V: CacheValue,
    K: CacheKey,
{
    fn on_next(
        &self,
        changes: ChangeSet<V, K>,
    ) {
        let Some(predicate) = &self.predicate else {
            self.downstream.on_next(changes);
            return;
        };
        let matching: ChangeSet<V, K> = changes
            .iter()
            .filter(|change| predicate(change.current()))
            .cloned()
            .collect();
        if !matching.is_empty() {
            self.downstream.on_next(matching);
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

struct WatchObserver<V, K> {
    downstream: ObserverRef<Change<V, K>>,
    key: K,
}

impl<V, K> Observer<ChangeSet<V, K>> for WatchObserver<V, K>
where
    V: CacheValue,
    K: CacheKey,
{
    fn on_next(
        &self,
        changes: ChangeSet<V, K>,
    ) {
        for change in changes.iter().filter(|change| *change.key() == self.key) {
            self.downstream.on_next(change.clone());
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

struct DistinctObserver {
    downstream: ObserverRef<usize>,
    last: Mutex<Option<usize>>,
}

impl Observer<usize> for DistinctObserver {
    fn on_next(
        &self,
        count: usize,
    ) {
        let changed = self.last.lock().replace(count) != Some(count);
        if changed {
            self.downstream.on_next(count);
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
