//! Pausable buffering of a change stream.
//!
//! While the gate says "pause", incoming batches are flattened into one
//! buffer. On resume (the gate says "go", or the pause timeout fires) the
//! buffer is emitted as a single batch. Gate, timeout and data notifications
//! are serialized through one re-entrant lock.

use std::cell::RefCell;
use std::mem;
use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use parking_lot::ReentrantMutex;
use tracing::debug;
use tracing::trace;

use crate::BufferConfig;
use crate::ChangeBatch;
use crate::Error;
use crate::Observable;
use crate::ObservableRef;
use crate::Observer;
use crate::ObserverRef;
use crate::Result;
use crate::SchedulerRef;
use crate::SharedError;
use crate::Subscription;
use crate::SubscriptionSlot;

/// Buffers a change stream while `pause` last emitted `true`.
///
/// ```ignore
/// let buffered = BufferIf::new(cache.connect(None), gate.into_observable(), scheduler)
///     .initial_paused(true)
///     .with_timeout(Duration::from_millis(500))?;
/// ```
pub struct BufferIf<B> {
    source: ObservableRef<B>,
    pause: ObservableRef<bool>,
    initial_paused: bool,
    timeout: Option<Duration>,
    scheduler: SchedulerRef,
}

impl<B: ChangeBatch> BufferIf<B> {
    pub fn new(
        source: ObservableRef<B>,
        pause: ObservableRef<bool>,
        scheduler: SchedulerRef,
    ) -> Self {
        Self {
            source,
            pause,
            initial_paused: false,
            timeout: None,
            scheduler,
        }
    }

    /// Applies the defaults from `config`
    pub fn with_config(
        self,
        config: &BufferConfig,
    ) -> Self {
        Self {
            initial_paused: config.initial_paused,
            timeout: config.timeout(),
            ..self
        }
    }

    /// Pause state in effect before the gate emits anything
    pub fn initial_paused(
        self,
        paused: bool,
    ) -> Self {
        Self {
            initial_paused: paused,
            ..self
        }
    }

    /// Forces a flush once a pause has lasted `timeout`
    pub fn with_timeout(
        self,
        timeout: Duration,
    ) -> Result<Self> {
        if timeout.is_zero() {
            return Err(Error::InvalidArgument("buffer timeout must be positive".into()));
        }
        Ok(Self {
            timeout: Some(timeout),
            ..self
        })
    }
}

/// Accumulates flattened changes between flushes
struct ChangeBuffer<T> {
    items: Vec<T>,
}

impl<T> ChangeBuffer<T> {
    fn new() -> Self {
        Self { items: Vec::new() }
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn take(&mut self) -> Vec<T> {
        mem::take(&mut self.items)
    }
}

struct BufferState<B: ChangeBatch> {
    paused: bool,
    buffer: ChangeBuffer<B::Item>,
    timer: Option<Subscription>,
    /// Bumped on every pause so a stale timer can recognise itself
    generation: u64,
    terminated: bool,
}

struct BufferCore<B: ChangeBatch> {
    state: ReentrantMutex<RefCell<BufferState<B>>>,
    downstream: ObserverRef<B>,
    timeout: Option<Duration>,
    scheduler: SchedulerRef,
    upstream: SubscriptionSlot,
}

impl<B: ChangeBatch> BufferCore<B> {
    fn pause(self: &Arc<Self>) {
        let guard = self.state.lock();
        let generation = {
            let mut state = guard.borrow_mut();
            if state.terminated {
                return;
            }
            state.paused = true;
            state.generation += 1;
            state.generation
        };
        trace!(generation, "buffer paused");

        let Some(timeout) = self.timeout else {
            return;
        };
        let core: Weak<Self> = Arc::downgrade(self);
        let timer = self.scheduler.schedule_after(
            timeout,
            Box::new(move || {
                if let Some(core) = core.upgrade() {
                    core.on_timeout(generation);
                }
            }),
        );
        let replaced = guard.borrow_mut().timer.replace(timer);
        drop(replaced);
    }

    fn resume(&self) {
        let guard = self.state.lock();
        let (flushed, timer) = {
            let mut state = guard.borrow_mut();
            if state.terminated {
                return;
            }
            state.paused = false;
            (state.buffer.take(), state.timer.take())
        };
        drop(timer);

        if !flushed.is_empty() {
            debug!(changes = flushed.len(), "flushing buffered changes");
            self.downstream.on_next(B::from_changes(flushed));
        }
    }

    fn on_timeout(
        &self,
        generation: u64,
    ) {
        let guard = self.state.lock();
        let current = {
            let state = guard.borrow();
            state.paused && state.generation == generation
        };
        if current {
            debug!("buffer timeout elapsed");
            self.resume();
        }
    }

    fn on_data(
        &self,
        batch: B,
    ) {
        let guard = self.state.lock();
        let pass_through = {
            let mut state = guard.borrow_mut();
            if state.terminated {
                return;
            }
            if state.paused {
                batch.append_to(&mut state.buffer.items);
                None
            } else {
                Some(batch)
            }
        };
        if let Some(batch) = pass_through {
            self.downstream.on_next(batch);
        }
    }

    fn terminate(
        &self,
        error: Option<SharedError>,
    ) {
        let guard = self.state.lock();
        let (pending, timer) = {
            let mut state = guard.borrow_mut();
            if state.terminated {
                return;
            }
            state.terminated = true;
            (state.buffer.take(), state.timer.take())
        };
        drop(timer);

        match error {
            Some(error) => self.downstream.on_error(error),
            None => {
                if !pending.is_empty() {
                    self.downstream.on_next(B::from_changes(pending));
                }
                self.downstream.on_completed();
            }
        }
        self.upstream.dispose();
    }

    fn cancel(&self) {
        self.upstream.dispose();
        let guard = self.state.lock();
        let timer = guard.borrow_mut().timer.take();
        drop(timer);
    }
}

struct GateObserver<B: ChangeBatch> {
    core: Arc<BufferCore<B>>,
}

impl<B: ChangeBatch> Observer<bool> for GateObserver<B> {
    fn on_next(
        &self,
        paused: bool,
    ) {
        if paused {
            self.core.pause();
        } else {
            self.core.resume();
        }
    }

    fn on_error(
        &self,
        error: SharedError,
    ) {
        self.core.terminate(Some(error));
    }
}

struct DataObserver<B: ChangeBatch> {
    core: Arc<BufferCore<B>>,
}

impl<B: ChangeBatch> Observer<B> for DataObserver<B> {
    fn on_next(
        &self,
        batch: B,
    ) {
        self.core.on_data(batch);
    }

    fn on_error(
        &self,
        error: SharedError,
    ) {
        self.core.terminate(Some(error));
    }

    fn on_completed(&self) {
        self.core.terminate(None);
    }
}

impl<B: ChangeBatch> Observable<B> for BufferIf<B> {
    fn subscribe(
        &self,
        observer: ObserverRef<B>,
    ) -> Subscription {
        let core = Arc::new(BufferCore {
            state: ReentrantMutex::new(RefCell::new(BufferState {
                paused: false,
                buffer: ChangeBuffer::new(),
                timer: None,
                generation: 0,
                terminated: false,
            })),
            downstream: observer,
            timeout: self.timeout,
            scheduler: Arc::clone(&self.scheduler),
            upstream: SubscriptionSlot::new(),
        });

        if self.initial_paused {
            core.pause();
        }

        let gate = self.pause.subscribe(Arc::new(GateObserver {
            core: Arc::clone(&core),
        }));
        let data = self.source.subscribe(Arc::new(DataObserver {
            core: Arc::clone(&core),
        }));
        core.upstream.set(gate.and(data));

        Subscription::new(move || core.cancel())
    }
}
