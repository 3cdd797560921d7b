use std::marker::PhantomData;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::warn;

use crate::SharedError;

/// Push-based receiver of a stream of values.
///
/// A well-behaved source calls `on_next` any number of times followed by at
/// most one of `on_error` / `on_completed`, never concurrently.
pub trait Observer<T>: Send + Sync {
    fn on_next(
        &self,
        value: T,
    );

    /// Observers that do not handle errors log them
    fn on_error(
        &self,
        error: SharedError,
    ) {
        warn!(%error, "unhandled stream error");
    }

    fn on_completed(&self) {}
}

pub type ObserverRef<T> = Arc<dyn Observer<T>>;

type NextFn<T> = Box<dyn Fn(T) + Send + Sync>;
type ErrorFn = Box<dyn Fn(SharedError) + Send + Sync>;
type CompletedFn = Box<dyn Fn() + Send + Sync>;

/// Observer assembled from closures.
///
/// ```ignore
/// let observer = AnonymousObserver::new(|changes| println!("{changes:?}"))
///     .with_error(|e| eprintln!("stream failed: {e}"))
///     .with_completed(|| println!("done"));
/// cache.connect(None).subscribe(observer.into_ref());
/// ```
pub struct AnonymousObserver<T> {
    on_next: NextFn<T>,
    on_error: Option<ErrorFn>,
    on_completed: Option<CompletedFn>,
}

impl<T: 'static> AnonymousObserver<T> {
    pub fn new(on_next: impl Fn(T) + Send + Sync + 'static) -> Self {
        Self {
            on_next: Box::new(on_next),
            on_error: None,
            on_completed: None,
        }
    }

    pub fn with_error(
        mut self,
        on_error: impl Fn(SharedError) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Box::new(on_error));
        self
    }

    pub fn with_completed(
        mut self,
        on_completed: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        self.on_completed = Some(Box::new(on_completed));
        self
    }

    pub fn into_ref(self) -> ObserverRef<T> {
        Arc::new(self)
    }
}

impl<T> Observer<T> for AnonymousObserver<T> {
    fn on_next(
        &self,
        value: T,
    ) {
        (self.on_next)(value)
    }

    fn on_error(
        &self,
        error: SharedError,
    ) {
        match &self.on_error {
            Some(on_error) => on_error(error),
            None => warn!(%error, "unhandled stream error"),
        }
    }

    fn on_completed(&self) {
        if let Some(on_completed) = &self.on_completed {
            on_completed();
        }
    }
}

/// Wraps a downstream observer so it sees nothing after its first terminal
/// notification or after it has been detached.
pub(crate) struct SafeObserver<T> {
    downstream: ObserverRef<T>,
    stopped: Arc<AtomicBool>,
    _marker: PhantomData<fn(T)>,
}

impl<T> SafeObserver<T> {
    pub(crate) fn new(downstream: ObserverRef<T>) -> Self {
        Self {
            downstream,
            stopped: Arc::new(AtomicBool::new(false)),
            _marker: PhantomData,
        }
    }

    /// Flag that stops delivery when set; shared with the subscription teardown
    pub(crate) fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stopped)
    }
}

impl<T> Observer<T> for SafeObserver<T> {
    fn on_next(
        &self,
        value: T,
    ) {
        if !self.stopped.load(Ordering::Acquire) {
            self.downstream.on_next(value);
        }
    }

    fn on_error(
        &self,
        error: SharedError,
    ) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            self.downstream.on_error(error);
        }
    }

    fn on_completed(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            self.downstream.on_completed();
        }
    }
}
