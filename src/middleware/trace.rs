//! Per-request tracing.
//!
//! Attach at the app level so it observes every route:
//!
//! ```rust,no_run
//! # use kvist::{App, Controller};
//! # fn main() -> Result<(), kvist::Error> {
//! let app = App::new(Controller::new())?;
//! app.add_middleware(kvist::middleware::trace::Trace)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::endpoint::{Endpoint, endpoint_fn};
use crate::middleware::Middleware;

/// Emits one `info` event per request with method, path, status and latency.
#[derive(Clone, Copy, Debug, Default)]
pub struct Trace;

impl Middleware for Trace {
    fn wrap(&self, next: Endpoint) -> Endpoint {
        endpoint_fn(move |req, args| {
            let next = Arc::clone(&next);
            let method = req.method().clone();
            let path = req.path().to_owned();
            async move {
                let started = Instant::now();
                let res = next.call(req, args).await;
                info!(
                    %method,
                    path = %path,
                    status = res.status_code().as_u16(),
                    latency_us = started.elapsed().as_micros() as u64,
                    "request served",
                );
                res
            }
        })
    }
}
