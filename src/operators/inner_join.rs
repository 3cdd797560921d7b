//! Inner join of two keyed changeset streams.
//!
//! Both sides are mirrored under one lock. The right side is kept under its
//! own key together with a reverse index from left key to right key, so a
//! right item that moves to another left key can retract the pair it used to
//! form. Each upstream batch yields at most one downstream batch.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::ReentrantMutex;
use tracing::debug;
use tracing::warn;

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
use crate::SubscriptionSlot;

type RightKeySelector<RV, LK> = Arc<dyn Fn(&RV) -> LK + Send + Sync>;
type ResultSelector<LK, LV, RV, D> = Arc<dyn Fn(&LK, &LV, &RV) -> D + Send + Sync>;

/// Emits `result_selector(left_key, left, right)` for every left key that has
/// a matching right item, keyed by the left key.
pub struct InnerJoin<LV, LK, RV, RK, D> {
    left: ChangeStream<LV, LK>,
    right: ChangeStream<RV, RK>,
    right_key_selector: RightKeySelector<RV, LK>,
    result_selector: ResultSelector<LK, LV, RV, D>,
}

impl<LV, LK, RV, RK, D> InnerJoin<LV, LK, RV, RK, D>
where
    LV: CacheValue,
    LK: CacheKey,
    RV: CacheValue,
    RK: CacheKey,
    D: CacheValue,
{
    pub fn new(
        left: ChangeStream<LV, LK>,
        right: ChangeStream<RV, RK>,
        right_key_selector: impl Fn(&RV) -> LK + Send + Sync + 'static,
        result_selector: impl Fn(&LK, &LV, &RV) -> D + Send + Sync + 'static,
    ) -> Self {
        Self {
            left,
            right,
            right_key_selector: Arc::new(right_key_selector),
            result_selector: Arc::new(result_selector),
        }
    }
}

struct JoinState<LV, LK, RV, RK, D> {
    left: HashMap<LK, LV>,
    right: HashMap<RK, RV>,
    right_by_left: HashMap<LK, RK>,
    joined: ChangeAwareCache<D, LK>,
    left_completed: bool,
    right_completed: bool,
    terminated: bool,
}

struct JoinCore<LV, LK, RV, RK, D> {
    state: ReentrantMutex<RefCell<JoinState<LV, LK, RV, RK, D>>>,
    downstream: ObserverRef<ChangeSet<D, LK>>,
    right_key_selector: RightKeySelector<RV, LK>,
    result_selector: ResultSelector<LK, LV, RV, D>,
    upstream: SubscriptionSlot,
}

enum Terminal {
    LeftCompleted,
    RightCompleted,
    Failed(SharedError),
}

impl<LV, LK, RV, RK, D> JoinCore<LV, LK, RV, RK, D>
where
    LV: CacheValue,
    LK: CacheKey,
    RV: CacheValue,
    RK: CacheKey,
    D: CacheValue,
{
    fn on_left(
        &self,
        changes: &ChangeSet<LV, LK>,
    ) {
        let guard = self.state.lock();
        let joined = {
            let mut state = guard.borrow_mut();
            if state.terminated {
                return;
            }
            let state = &mut *state;
            for change in changes.iter() {
                let key = change.key();
                match change.reason() {
                    ChangeReason::Add | ChangeReason::Update => {
                        let left = change.current().clone();
                        let right = state
                            .right_by_left
                            .get(key)
                            .and_then(|right_key| state.right.get(right_key));
                        match right {
                            Some(right) => {
                                let value = (self.result_selector)(key, &left, right);
                                state.joined.add_or_update(key.clone(), value);
                            }
                            None => state.joined.remove(key),
                        }
                        state.left.insert(key.clone(), left);
                    }
                    ChangeReason::Remove => {
                        state.left.remove(key);
                        state.joined.remove(key);
                    }
                    ChangeReason::Refresh => state.joined.refresh(key),
                    ChangeReason::Moved => {}
                }
            }
            state.joined.capture_changes()
        };
        self.publish(joined);
    }

    fn on_right(
        &self,
        changes: &ChangeSet<RV, RK>,
    ) {
        let guard = self.state.lock();
        let joined = {
            let mut state = guard.borrow_mut();
            if state.terminated {
                return;
            }
            let state = &mut *state;
            for change in changes.iter() {
                let right_key = change.key();
                match change.reason() {
                    ChangeReason::Add | ChangeReason::Update => {
                        let right = change.current().clone();
                        let left_key = (self.right_key_selector)(&right);

                        let previous_left_key =
                            state.right.get(right_key).map(|previous| (self.right_key_selector)(previous));
                        if let Some(previous_left_key) = previous_left_key {
                            if previous_left_key != left_key {
                                Self::retract(state, &previous_left_key, right_key);
                            }
                        }

                        if let Some(left) = state.left.get(&left_key) {
                            let value = (self.result_selector)(&left_key, left, &right);
                            state.joined.add_or_update(left_key.clone(), value);
                        }
                        state.right_by_left.insert(left_key, right_key.clone());
                        state.right.insert(right_key.clone(), right);
                    }
                    ChangeReason::Remove => {
                        if let Some(previous) = state.right.remove(right_key) {
                            let left_key = (self.right_key_selector)(&previous);
                            Self::retract(state, &left_key, right_key);
                        }
                    }
                    ChangeReason::Refresh => {
                        let left_key = (self.right_key_selector)(change.current());
                        if state.right_by_left.get(&left_key) == Some(right_key) {
                            state.joined.refresh(&left_key);
                        }
                    }
                    ChangeReason::Moved => {}
                }
            }
            state.joined.capture_changes()
        };
        self.publish(joined);
    }

    /// Drops the pair at `left_key` if it was formed with `right_key`
    fn retract(
        state: &mut JoinState<LV, LK, RV, RK, D>,
        left_key: &LK,
        right_key: &RK,
    ) {
        if state.right_by_left.get(left_key) == Some(right_key) {
            state.right_by_left.remove(left_key);
            state.joined.remove(left_key);
        }
    }

    fn publish(
        &self,
        joined: ChangeSet<D, LK>,
    ) {
        if !joined.is_empty() {
            self.downstream.on_next(joined);
        }
    }

    fn on_terminal(
        &self,
        terminal: Terminal,
    ) {
        let guard = self.state.lock();
        let notification = {
            let mut state = guard.borrow_mut();
            if state.terminated {
                return;
            }
            let notification = match terminal {
                Terminal::Failed(error) => Some(Err(error)),
                Terminal::LeftCompleted => {
                    state.left_completed = true;
                    None
                }
                Terminal::RightCompleted => {
                    state.right_completed = true;
                    None
                }
            };
            let notification = notification
                .or_else(|| (state.left_completed && state.right_completed).then_some(Ok(())));
            if notification.is_some() {
                state.terminated = true;
            }
            notification
        };

        match notification {
            Some(Err(error)) => {
                warn!(%error, "inner join upstream failed");
                self.downstream.on_error(error);
                self.upstream.dispose();
            }
            Some(Ok(())) => {
                debug!("both join inputs completed");
                self.downstream.on_completed();
                self.upstream.dispose();
            }
            None => {}
        }
    }
}

struct LeftObserver<LV, LK, RV, RK, D> {
    core: Arc<JoinCore<LV, LK, RV, RK, D>>,
}

impl<LV, LK, RV, RK, D> Observer<ChangeSet<LV, LK>> for LeftObserver<LV, LK, RV, RK, D>
where
    LV: CacheValue,
    LK: CacheKey,
    RV: CacheValue,
    RK: CacheKey,
    D: CacheValue,
{
    fn on_next(
        &self,
        changes: ChangeSet<LV, LK>,
    ) {
        self.core.on_left(&changes);
    }

    fn on_error(
        &self,
        error: SharedError,
    ) {
        self.core.on_terminal(Terminal::Failed(error));
    }

    fn on_completed(&self) {
        self.core.on_terminal(Terminal::LeftCompleted);
    }
}

struct RightObserver<LV, LK, RV, RK, D> {
    core: Arc<JoinCore<LV, LK, RV, RK, D>>,
}

impl<LV, LK, RV, RK, D> Observer<ChangeSet<RV, RK>> for RightObserver<LV, LK, RV, RK, D>
where
    LV: CacheValue,
    LK: CacheKey,
    RV: CacheValue,
    RK: CacheKey,
    D: CacheValue,
{
    fn on_next(
        &self,
        changes: ChangeSet<RV, RK>,
    ) {
        self.core.on_right(&changes);
    }

    fn on_error(
        &self,
        error: SharedError,
    ) {
        self.core.on_terminal(Terminal::Failed(error));
    }

    fn on_completed(&self) {
        self.core.on_terminal(Terminal::RightCompleted);
    }
}

impl<LV, LK, RV, RK, D> Observable<ChangeSet<D, LK>> for InnerJoin<LV, LK, RV, RK, D>
where
    LV: CacheValue,
    LK: CacheKey,
    RV: CacheValue,
    RK: CacheKey,
    D: CacheValue,
{
    fn subscribe(
        &self,
        observer: ObserverRef<ChangeSet<D, LK>>,
    ) -> Subscription {
        let upstream = SubscriptionSlot::new();
        let core = Arc::new(JoinCore {
            state: ReentrantMutex::new(RefCell::new(JoinState {
                left: HashMap::new(),
                right: HashMap::new(),
                right_by_left: HashMap::new(),
                joined: ChangeAwareCache::new(),
                left_completed: false,
                right_completed: false,
                terminated: false,
            })),
            downstream: observer,
            right_key_selector: Arc::clone(&self.right_key_selector),
            result_selector: Arc::clone(&self.result_selector),
            upstream: upstream.clone(),
        });

        let left = self.left.subscribe(Arc::new(LeftObserver {
            core: Arc::clone(&core),
        }));
        let right = self.right.subscribe(Arc::new(RightObserver { core }));
        upstream.set(left.and(right));

        Subscription::new(move || upstream.dispose())
    }
}
