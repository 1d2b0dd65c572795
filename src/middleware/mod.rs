//! Middleware layer.
//!
//! A middleware takes the "next" [`Endpoint`] and returns a new one that runs
//! around it. Wrapping happens once, when the route table is compiled; at
//! request time the chain is a plain nest of endpoints.
//!
//! # Ordering
//!
//! For one route the chain is built innermost-first:
//!
//! 1. the action itself, including any [`Action::wrap`](crate::Action::wrap) layers;
//! 2. each ancestor controller, from the owning controller up to the root,
//!    applying that controller's middlewares in reverse attachment order;
//! 3. the app's middlewares, again in reverse attachment order.
//!
//! So at a single level the first-attached middleware is the outermost, and
//! app middlewares always see the request first and the response last.
//!
//! Built-in middleware:
//! - [`trace`]: per-request event with method, path, status, latency
//! - [`session`]: signed-cookie session and login
//! - [`resource`]: open a per-request handle on a shared resource, close it on completion

pub mod resource;
pub mod session;
pub mod trace;

use std::future::Future;
use std::sync::Arc;

use crate::endpoint::{Endpoint, endpoint_fn};
use crate::request::Request;
use crate::response::IntoResponse;
use crate::value::Args;

/// Wraps an endpoint with extra behaviour.
///
/// Implemented for every `Fn(Endpoint) -> Endpoint`, so a plain function can
/// be attached directly.
pub trait Middleware: Send + Sync + 'static {
    fn wrap(&self, next: Endpoint) -> Endpoint;
}

impl<F> Middleware for F
where
    F: Fn(Endpoint) -> Endpoint + Send + Sync + 'static,
{
    fn wrap(&self, next: Endpoint) -> Endpoint {
        self(next)
    }
}

/// A shared, type-erased middleware as stored on controllers and apps.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// Builds a middleware from an async function that receives the next
/// endpoint explicitly.
///
/// ```rust
/// use kvist::middleware::from_fn;
///
/// let timing = from_fn(|req, args, next| async move {
///     let started = std::time::Instant::now();
///     let res = next.call(req, args).await;
///     tracing::debug!(elapsed = ?started.elapsed());
///     res
/// });
/// ```
pub fn from_fn<F, Fut, R>(f: F) -> FromFn<F>
where
    F: Fn(Request, Args, Endpoint) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    FromFn(f)
}

/// Middleware returned by [`from_fn`].
#[derive(Clone)]
pub struct FromFn<F>(F);

impl<F, Fut, R> Middleware for FromFn<F>
where
    F: Fn(Request, Args, Endpoint) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn wrap(&self, next: Endpoint) -> Endpoint {
        let f = self.0.clone();
        endpoint_fn(move |req, args| f(req, args, Arc::clone(&next)))
    }
}

/// Composes the full chain for one endpoint.
///
/// `levels` holds each ancestor controller's middlewares in root-to-leaf
/// order; `app` holds the app's own list. Both inner lists are in attachment
/// order.
pub fn chain<'a>(
    endpoint: Endpoint,
    levels: impl DoubleEndedIterator<Item = &'a [BoxedMiddleware]>,
    app: &[BoxedMiddleware],
) -> Endpoint {
    let wrapped = levels.rev().fold(endpoint, wrap_level);
    wrap_level(wrapped, app)
}

fn wrap_level(endpoint: Endpoint, level: &[BoxedMiddleware]) -> Endpoint {
    level.iter().rev().fold(endpoint, |inner, m| m.wrap(inner))
}
