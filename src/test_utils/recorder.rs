use std::sync::Arc;

use parking_lot::Mutex;

use crate::Observable;
use crate::Observer;
use crate::SharedError;
use crate::Subscription;

#[derive(Default)]
struct RecorderState<T> {
    values: Vec<T>,
    error: Option<SharedError>,
    completed: bool,
}

/// Records every notification an observable delivers.
pub struct Recorder<T> {
    state: Arc<Mutex<RecorderState<T>>>,
}

impl<T> Clone for Recorder<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Clone + Send + 'static> Recorder<T> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RecorderState {
                values: Vec::new(),
                error: None,
                completed: false,
            })),
        }
    }

    /// Subscribes a fresh recorder to `source`
    pub fn record<O>(source: &O) -> (Self, Subscription)
    where
        O: Observable<T> + ?Sized,
    {
        let recorder = Self::new();
        let subscription = source.subscribe(Arc::new(recorder.clone()));
        (recorder, subscription)
    }

    pub fn values(&self) -> Vec<T> {
        self.state.lock().values.clone()
    }

    pub fn last(&self) -> Option<T> {
        self.state.lock().values.last().cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().values.len()
    }

    pub fn error(&self) -> Option<SharedError> {
        self.state.lock().error.clone()
    }

    pub fn is_completed(&self) -> bool {
        self.state.lock().completed
    }
}

impl<T: Send> Observer<T> for Recorder<T> {
    fn on_next(
        &self,
        value: T,
    ) {
        self.state.lock().values.push(value);
    }

    fn on_error(
        &self,
        error: SharedError,
    ) {
        self.state.lock().error = Some(error);
    }

    fn on_completed(&self) {
        self.state.lock().completed = true;
    }
}
