//! Endpoint trait and type erasure.
//!
//! # How endpoints are stored
//!
//! A compiled route table holds endpoints of many different concrete types,
//! every one of them already wrapped by its middleware chain. They are stored
//! uniformly as [`Endpoint`] = `Arc<dyn Invoke>`:
//!
//! ```text
//! async fn hello(req: Request, args: Args) -> Response { … }   ← user writes this
//!        ↓ Action::new(hello)
//! hello.into_endpoint()                                       ← Handler blanket impl
//!        ↓
//! Arc::new(FnEndpoint(hello))                                 ← stored as Endpoint
//!        ↓ middleware.wrap(endpoint)                          ← at compile time
//! endpoint.call(req, args)                                    ← at request time
//! ```
//!
//! Per request this costs one `Arc` clone and one virtual call per layer.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::middleware::Middleware;
use crate::request::Request;
use crate::response::{IntoResponse, Response};
use crate::signature::Param;
use crate::value::Args;

/// A heap-allocated, type-erased future that resolves to a [`Response`].
pub type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// Something that can be invoked with a request and its bound arguments.
///
/// Endpoints and middleware-wrapped endpoints share this interface.
pub trait Invoke: Send + Sync + 'static {
    fn call(&self, req: Request, args: Args) -> BoxFuture;
}

/// A type-erased invocable shared across concurrent requests.
pub type Endpoint = Arc<dyn Invoke>;

/// Turns an async closure `(Request, Args) -> Fut` into an [`Endpoint`].
///
/// This is the building block for writing middleware by hand:
///
/// ```rust
/// use kvist::{endpoint_fn, Endpoint};
///
/// fn add_header(next: Endpoint) -> Endpoint {
///     endpoint_fn(move |req, args| {
///         let next = next.clone();
///         async move {
///             let mut res = next.call(req, args).await;
///             res.headers_mut().insert("x-served-by", "kvist".parse().unwrap());
///             res
///         }
///     })
/// }
/// ```
pub fn endpoint_fn<F, Fut, R>(f: F) -> Endpoint
where
    F: Fn(Request, Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    Arc::new(FnEndpoint(f))
}

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid endpoint function.
///
/// You never implement this yourself. It is satisfied by any `async fn` or
/// closure with the shape:
///
/// ```text
/// async fn name(req: Request, args: Args) -> impl IntoResponse
/// ```
///
/// The trait is sealed: only the blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_endpoint(self) -> Endpoint;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request, Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request, Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_endpoint(self) -> Endpoint {
        endpoint_fn(self)
    }
}

/// Newtype bridging a concrete function to the [`Invoke`] trait object.
struct FnEndpoint<F>(F);

impl<F, Fut, R> Invoke for FnEndpoint<F>
where
    F: Fn(Request, Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request, args: Args) -> BoxFuture {
        let fut = (self.0)(req, args);
        Box::pin(async move { fut.await.into_response() })
    }
}

// ── Action ────────────────────────────────────────────────────────────────────

/// A routable endpoint: the handler plus its declared parameters.
///
/// ```rust
/// use kvist::{Action, Args, Param, Request};
///
/// async fn hello(_req: Request, args: Args) -> String {
///     format!("hello {}", args.str("name").unwrap_or_default())
/// }
///
/// let action = Action::new(hello).param(Param::raw("name").or("world"));
/// assert_eq!(action.params().len(), 1);
/// ```
#[derive(Clone)]
pub struct Action {
    endpoint: Endpoint,
    params: Vec<Param>,
}

impl Action {
    pub fn new(handler: impl Handler) -> Self {
        Self { endpoint: handler.into_endpoint(), params: Vec::new() }
    }

    /// Declares the next positional parameter.
    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    /// Wraps this action's handler with `middleware`, decorator style.
    ///
    /// Each call wraps the result of the previous one, so the last `wrap` is
    /// the outermost of the action-level layers. All of them sit inside any
    /// controller or app middleware.
    pub fn wrap(mut self, middleware: impl Middleware) -> Self {
        self.endpoint = middleware.wrap(self.endpoint);
        self
    }

    pub fn params(&self) -> &[Param] { &self.params }

    pub(crate) fn endpoint(&self) -> Endpoint {
        Arc::clone(&self.endpoint)
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action").field("params", &self.params).finish_non_exhaustive()
    }
}
