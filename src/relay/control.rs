//! Caller-side cancellation for streamed responses.

use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Cancels the paired [`ControlledStream`]. Dropping the handle without
/// calling [`cancel`](CancelHandle::cancel) leaves the stream running.
pub struct CancelHandle {
    tx: Option<oneshot::Sender<()>>,
}

impl CancelHandle {
    pub fn cancel(mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Stream wrapper that ends as soon as its handle is cancelled. The inner
/// stream is dropped with the wrapper, which releases the upstream
/// connection.
pub struct ControlledStream<S> {
    inner: S,
    cancel: oneshot::Receiver<()>,
    cancel_resolved: bool,
    cancelled: bool,
}

pub fn controlled<S>(inner: S) -> (ControlledStream<S>, CancelHandle) {
    let (tx, rx) = oneshot::channel();
    (
        ControlledStream {
            inner,
            cancel: rx,
            cancel_resolved: false,
            cancelled: false,
        },
        CancelHandle { tx: Some(tx) },
    )
}

impl<S: Stream + Unpin> Stream for ControlledStream<S> {
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.cancelled {
            return Poll::Ready(None);
        }
        if !self.cancel_resolved {
            match Pin::new(&mut self.cancel).poll(cx) {
                Poll::Ready(Ok(())) => {
                    self.cancelled = true;
                    return Poll::Ready(None);
                }
                // Handle dropped without cancelling; keep streaming.
                Poll::Ready(Err(_)) => self.cancel_resolved = true,
                Poll::Pending => {}
            }
        }
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
