//! Bridge from push-based observables to async `futures::Stream`s.

use std::pin::Pin;
use std::task::Context;
use std::task::Poll;

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::Observable;
use super::Observer;
use super::Subscription;
use crate::SharedError;

/// Async view over an observable.
///
/// Values arrive as `Ok`, a terminal error as a final `Err`, and completion
/// ends the stream. Dropping the stream disposes the underlying subscription.
pub struct ObservableStream<T> {
    receiver: UnboundedReceiverStream<Result<T, SharedError>>,
    _subscription: Subscription,
}

impl<T: Send + 'static> ObservableStream<T> {
    pub fn new<O>(source: &O) -> Self
    where
        O: Observable<T> + ?Sized,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = source.subscribe(std::sync::Arc::new(ChannelObserver {
            sender: Mutex::new(Some(tx)),
        }));
        Self {
            receiver: UnboundedReceiverStream::new(rx),
            _subscription: subscription,
        }
    }
}

impl<T> Stream for ObservableStream<T> {
    type Item = Result<T, SharedError>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_next(cx)
    }
}

struct ChannelObserver<T> {
    sender: Mutex<Option<mpsc::UnboundedSender<Result<T, SharedError>>>>,
}

impl<T: Send> Observer<T> for ChannelObserver<T> {
    fn on_next(
        &self,
        value: T,
    ) {
        if let Some(sender) = self.sender.lock().as_ref() {
            // Receiver dropped means the stream is gone; nothing left to notify
            let _ = sender.send(Ok(value));
        }
    }

    fn on_error(
        &self,
        error: SharedError,
    ) {
        if let Some(sender) = self.sender.lock().take() {
            let _ = sender.send(Err(error));
        }
    }

    fn on_completed(&self) {
        self.sender.lock().take();
    }
}
