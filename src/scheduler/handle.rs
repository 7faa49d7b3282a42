//! Caller-side future for an enqueued request.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

use crate::error::{Error, Result};

/// Resolves exactly once with the request's result, or with
/// `Superseded`/`Cancelled` if it never reached the transport.
///
/// Dropping the handle does not withdraw the request.
#[must_use = "a RequestHandle does nothing unless awaited"]
#[derive(Debug)]
pub struct RequestHandle<O> {
    id: String,
    rx: oneshot::Receiver<Result<O>>,
}

impl<O> RequestHandle<O> {
    pub(crate) fn new(id: String, rx: oneshot::Receiver<Result<O>>) -> Self {
        Self { id, rx }
    }

    /// Handle that is already settled with `error`.
    pub(crate) fn failed(id: String, error: Error) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(error));
        Self { id, rx }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl<O> Future for RequestHandle<O> {
    type Output = Result<O>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.rx).poll(cx).map(|settled| {
            settled.unwrap_or_else(|_| {
                Err(Error::Other(format!(
                    "request {} was dropped without settlement",
                    this.id
                )))
            })
        })
    }
}
