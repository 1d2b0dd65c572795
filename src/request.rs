//! Incoming HTTP request type.
//!
//! The routing core treats a [`Request`] as opaque: it reads the method and
//! path to pick a route and hands the value, untouched, to the middleware
//! chain and the endpoint. Middleware attach per-request state through
//! [`Request::extensions_mut`].

use bytes::Bytes;
use http::header::{COOKIE, HOST};
use http::{Extensions, HeaderMap, Method, Uri};

/// An incoming HTTP request with its body fully read.
#[derive(Debug)]
pub struct Request {
    head: http::request::Parts,
    body: Bytes,
}

impl Request {
    pub fn new(head: http::request::Parts, body: Bytes) -> Self {
        Self { head, body }
    }

    pub fn method(&self) -> &Method { &self.head.method }
    pub fn uri(&self) -> &Uri { &self.head.uri }
    pub fn path(&self) -> &str { self.head.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.head.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    pub fn extensions(&self) -> &Extensions { &self.head.extensions }
    pub fn extensions_mut(&mut self) -> &mut Extensions { &mut self.head.extensions }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the value of the first cookie named `name`.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.head
            .headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.trim_matches('"'))
    }

    /// Reconstructs the full request URL, e.g. `http://example.com/a/b?x=1`.
    ///
    /// Absolute-form request targets are returned as sent. Otherwise the host
    /// comes from the `Host` header and the scheme from `X-Forwarded-Proto`,
    /// defaulting to `http` (TLS is expected to terminate at the proxy).
    pub fn url(&self) -> String {
        let uri = &self.head.uri;
        if uri.scheme().is_some() {
            return uri.to_string();
        }
        let scheme = self.header("x-forwarded-proto").unwrap_or("http");
        let host = self
            .head
            .headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("localhost");
        let path = uri.path_and_query().map_or("/", |pq| pq.as_str());
        format!("{scheme}://{host}{path}")
    }
}

impl<B: Into<Bytes>> From<http::Request<B>> for Request {
    fn from(req: http::Request<B>) -> Self {
        let (head, body) = req.into_parts();
        Self::new(head, body.into())
    }
}
