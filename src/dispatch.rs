//! Request binding and the not-found fallback.
//!
//! Once the route table has picked the longest matching prefix, the leftover
//! path segments are bound positionally to the route's declared parameters.
//! Every failure along the way is a [`DispatchError`]; the app turns each of
//! them into the not-found response instead of letting it escape.

use std::sync::Arc;

use http::StatusCode;

use crate::request::Request;
use crate::response::{ContentType, Response};
use crate::signature::Param;
use crate::value::{Args, CoercionError};

/// Why a request could not be dispatched to an endpoint.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum DispatchError {
    #[error("no matching route")]
    NoRoute,

    #[error("there are too many segments in the URI: {given} left for {declared} parameters")]
    TooManySegments { declared: usize, given: usize },

    #[error("value error for parameter `{param}`: {source}")]
    Coercion {
        param: Arc<str>,
        #[source]
        source: CoercionError,
    },

    #[error("mandatory parameter `{0}` missing")]
    MissingParameter(Arc<str>),
}

/// Replaceable handler that renders the response for a failed dispatch.
pub type NotFoundHandler = Arc<dyn Fn(&Request, &DispatchError) -> Response + Send + Sync>;

/// Percent-decodes a request path and splits it into its non-empty segments.
///
/// Decoding happens first, so an encoded `%2F` separates segments like a
/// literal `/`. `/` and the empty path yield no segments.
pub fn segments(path: &str) -> Vec<String> {
    let decoded = urlencoding::decode_binary(path.as_bytes());
    String::from_utf8_lossy(&decoded)
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Binds leftover segments to `params` in declaration order.
///
/// A segment present for a parameter is coerced; a missing one takes the
/// parameter's default, or fails if the parameter is mandatory.
pub fn bind(params: &[Param], rest: &[String]) -> Result<Args, DispatchError> {
    if rest.len() > params.len() {
        return Err(DispatchError::TooManySegments { declared: params.len(), given: rest.len() });
    }

    let mut args = Args::with_capacity(params.len());
    for (i, param) in params.iter().enumerate() {
        let value = match (rest.get(i), param.default_value()) {
            (Some(segment), _) => param
                .coercion()
                .apply(segment)
                .map_err(|source| DispatchError::Coercion { param: param.shared_name(), source })?,
            (None, Some(default)) => default.clone(),
            (None, None) => return Err(DispatchError::MissingParameter(param.shared_name())),
        };
        args.push(param.shared_name(), value);
    }
    Ok(args)
}

/// The built-in not-found response: `404` with a minimal HTML document that
/// echoes the escaped request URL.
pub fn default_not_found(req: &Request, _reason: &DispatchError) -> Response {
    let body = format!(
        "<!DOCTYPE HTML PUBLIC \"-//W3C//DTD HTML 3.2 Final//EN\">\n\
         <title>404 Not Found</title>\n\
         <h1>Not Found</h1>\n\
         <p>The requested URL <i>{}</i> was not found on the server.</p>",
        escape_html(&req.url()),
    );

    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .bytes(ContentType::Html, body)
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}
