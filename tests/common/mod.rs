#![allow(dead_code)]

use bytes::Bytes;
use http::StatusCode;
use kvist::{App, Args, Request, Response};

pub fn request(method: &str, path: &str) -> Request {
    http::Request::builder()
        .method(method)
        .uri(path)
        .header("host", "test.local")
        .body(Bytes::new())
        .unwrap()
        .into()
}

pub fn get(path: &str) -> Request {
    request("GET", path)
}

pub fn body(res: &Response) -> String {
    String::from_utf8(res.body().to_vec()).unwrap()
}

/// Dispatches and returns status and body text.
pub async fn call(app: &App, method: &str, path: &str) -> (StatusCode, String) {
    let res = app.dispatch(request(method, path)).await;
    (res.status_code(), body(&res))
}

/// An endpoint that answers with a fixed label.
pub fn label(name: &'static str) -> kvist::Action {
    kvist::Action::new(move |_req: Request, _args: Args| async move { name })
}

/// An endpoint that answers with its label and bound arguments.
pub fn echo(name: &'static str) -> kvist::Action {
    kvist::Action::new(move |_req: Request, args: Args| async move {
        let args: Vec<String> = args.values().map(ToString::to_string).collect();
        format!("{name}({})", args.join(","))
    })
}
