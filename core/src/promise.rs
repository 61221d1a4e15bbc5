//! Adapts a continuation-accepting computation into a future.
//!
//! The deferred computation is run immediately with a continuation that
//! sends its result into a oneshot channel. The promise settles on the same
//! call that invokes the continuation, and only once.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use crate::deferred::Deferred;
use crate::error::MuxError;

/// Resolves to the value or error the continuation received. If the
/// continuation is dropped without being invoked, resolves to
/// `MuxError::Abandoned`.
#[must_use = "promises do nothing unless polled or awaited"]
#[derive(Debug)]
pub struct Promise<T> {
    rx: oneshot::Receiver<Result<T, MuxError>>,
}

impl<T: 'static> Promise<T> {
    pub fn from_deferred(deferred: Deferred<T>) -> Self {
        let (tx, rx) = oneshot::channel();
        deferred.run(move |result| {
            // The receiver may already be gone; nobody is listening then.
            let _ = tx.send(result);
        });
        Self { rx }
    }
}

impl<T> Promise<T> {
    /// The settled result, if the continuation has been invoked.
    pub fn try_take(&mut self) -> Option<Result<T, MuxError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(MuxError::Abandoned)),
        }
    }
}

impl<T> Future for Promise<T> {
    type Output = Result<T, MuxError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(MuxError::Abandoned)))
    }
}
