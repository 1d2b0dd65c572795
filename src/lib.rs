//! # kvist
//!
//! A controller-tree router for async Rust services.
//!
//! URLs are not declared as patterns. They fall out of how controllers are
//! nested: every named child of a [`Controller`] is one more path segment,
//! and whatever is left of the path after the longest matching prefix is
//! bound positionally to the endpoint's declared [`Param`]s.
//!
//! ## The contract
//!
//! - **Longest prefix wins.** `/users/show/42` reaches `users.show` with
//!   `id = 42`, not the `users` self-endpoint with two leftover segments.
//! - **Verbs refine, they don't restrict.** A controller's `GET` endpoint wins
//!   over its self-endpoint for `GET` requests; every other verb still falls
//!   through to the self-endpoint.
//! - **Bad input is not found.** No route, too many segments, a segment that
//!   fails its coercion, a missing mandatory parameter: all of them answer
//!   with the not-found handler, never with an error.
//! - **The tree is live.** Mutating any controller recompiles every [`App`]
//!   serving it before the call returns. In-flight requests keep the table
//!   they started with.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use kvist::{Action, App, Args, Controller, Param, Request, Server, Verb};
//!
//! async fn hello(_req: Request, args: Args) -> String {
//!     format!("Hello, {}!", args.str("name").unwrap_or_default())
//! }
//!
//! async fn list_users(_req: Request, _args: Args) -> &'static str { "[]" }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), kvist::Error> {
//!     let users = Controller::new();
//!     users.set_verb(Verb::Get, Action::new(list_users))?;
//!
//!     let root = Controller::new();
//!     root.add_action("hello", Action::new(hello).param(Param::raw("name").or("world")))?;
//!     root.add_controller("users", users)?;
//!
//!     let app = App::new(root)?;
//!     app.add_middleware(kvist::middleware::trace::Trace)?;
//!
//!     Server::bind("0.0.0.0:3000")?.serve(app).await
//! }
//! ```

mod app;
mod controller;
mod cookie;
mod dispatch;
mod endpoint;
mod error;
mod request;
mod response;
mod server;
mod signature;
mod table;
mod value;
mod verb;

pub mod middleware;

pub use app::App;
pub use controller::{Child, Controller};
pub use cookie::{Cookie, SameSite};
pub use dispatch::{DispatchError, NotFoundHandler, default_not_found};
pub use endpoint::{Action, BoxFuture, Endpoint, Handler, Invoke, endpoint_fn};
pub use error::{ConfigError, Error};
pub use request::Request;
pub use response::{Body, ContentType, IntoResponse, Response, ResponseBuilder};
pub use server::Server;
pub use signature::{Coercion, Param, Signature};
pub use table::{Route, RouteTable};
pub use value::{Args, Coerce, CoercionError, Value};
pub use verb::{UnknownVerb, Verb};
