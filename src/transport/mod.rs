//! The execution collaborator behind the scheduler.
//!
//! A transport performs the actual network or service call for one
//! dispatched request. It owns any per-call timeout; the scheduler never
//! aborts a call once handed over.

pub mod http;

use std::future::Future;

use crate::error::TransportError;

pub use http::{HttpRequest, HttpTransport};

pub trait Transport: Send + Sync + 'static {
    /// Opaque description of one call.
    type Descriptor: Send + 'static;
    /// Successful result handed back to the caller.
    type Output: Send + 'static;

    fn execute(
        &self,
        descriptor: Self::Descriptor,
    ) -> impl Future<Output = Result<Self::Output, TransportError>> + Send;
}
