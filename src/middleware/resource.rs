//! Per-request resource lifecycle.
//!
//! [`Lifecycle`] opens a handle on a shared resource (typically a connection
//! from a pool) before the endpoint runs and closes that same handle from
//! the response's completion hook, after the body has gone out. Concurrent
//! requests each get their own handle.

use std::sync::Arc;

use http::StatusCode;
use tracing::error;

use crate::endpoint::{Endpoint, endpoint_fn};
use crate::middleware::Middleware;
use crate::request::Request;
use crate::response::Response;

/// Error returned by [`Resource::open`].
pub type OpenError = Box<dyn std::error::Error + Send + Sync>;

/// A resource that hands out one handle per request.
pub trait Resource: Send + Sync + 'static {
    type Handle: Send + Sync + 'static;

    fn open(&self) -> Result<Self::Handle, OpenError>;

    /// Releases `handle`. Called once per successful [`open`](Self::open).
    fn close(&self, handle: &Self::Handle);
}

/// Middleware that brackets each request with [`Resource::open`] and
/// [`Resource::close`].
///
/// The open handle is stored in the request extensions as
/// `Arc<R::Handle>`; endpoints reach it through [`Lifecycle::handle`].
/// If `open` fails the endpoint is not invoked and the client receives
/// `503 Service Unavailable`.
pub struct Lifecycle<R> {
    resource: Arc<R>,
}

impl<R: Resource> Lifecycle<R> {
    pub fn new(resource: Arc<R>) -> Self {
        Self { resource }
    }

    /// The handle opened for `req`, if a `Lifecycle<R>` wraps its endpoint.
    pub fn handle(req: &Request) -> Option<Arc<R::Handle>> {
        req.extensions().get::<Arc<R::Handle>>().cloned()
    }
}

impl<R: Resource> Middleware for Lifecycle<R> {
    fn wrap(&self, next: Endpoint) -> Endpoint {
        let resource = Arc::clone(&self.resource);
        endpoint_fn(move |mut req, args| {
            let next = Arc::clone(&next);
            let resource = Arc::clone(&resource);
            async move {
                let handle = match resource.open() {
                    Ok(handle) => Arc::new(handle),
                    Err(e) => {
                        error!(path = req.path(), "resource open failed: {e}");
                        return Response::status(StatusCode::SERVICE_UNAVAILABLE);
                    }
                };
                req.extensions_mut().insert(Arc::clone(&handle));
                let mut res = next.call(req, args).await;
                res.call_on_close(move || resource.close(&handle));
                res
            }
        })
    }
}
