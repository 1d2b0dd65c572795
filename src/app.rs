//! The application: a controller tree plus its live route table.
//!
//! An [`App`] compiles its tree on construction and publishes the result
//! through an [`ArcSwap`]. Dispatch loads the current table once per request
//! and never blocks on a recompile. Recompiles (explicit, app middleware
//! changes, or any mutation of a controller in the tree) build a complete new
//! table off to the side and swap it in with a single store, so a request
//! sees either the whole old tree or the whole new one.

use std::fmt;
use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::controller::{Controller, Owner};
use crate::dispatch::{self, DispatchError, NotFoundHandler};
use crate::error::Error;
use crate::middleware::{BoxedMiddleware, Middleware};
use crate::request::Request;
use crate::response::Response;
use crate::table::RouteTable;
use crate::verb::Verb;

/// A routable application.
///
/// Cloning is cheap; clones share the same table, middlewares and tree.
///
/// ```rust
/// use kvist::{Action, App, Args, Controller, Param, Request};
///
/// async fn hello(_req: Request, args: Args) -> String {
///     format!("Hello, {}!", args.str("name").unwrap_or_default())
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), kvist::Error> {
/// let root = Controller::new();
/// root.add_action("hello", Action::new(hello).param(Param::raw("name").or("world")))?;
/// let app = App::new(root)?;
///
/// let req = http::Request::get("/hello/Ann").body(bytes::Bytes::new()).unwrap();
/// let res = app.dispatch(req.into()).await;
/// assert_eq!(res.body(), b"Hello, Ann!");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct App {
    shared: Arc<Shared>,
}

struct Shared {
    root: Arc<Controller>,
    table: ArcSwap<RouteTable>,
    middlewares: RwLock<Vec<BoxedMiddleware>>,
    not_found: RwLock<NotFoundHandler>,
    /// Serializes recompiles so the last store reflects the latest tree.
    compiling: Mutex<()>,
    this: Weak<Shared>,
}

impl Owner for Shared {
    fn recompile(&self) -> Result<(), Error> {
        let _compiling = self.compiling.lock();
        let owner: Weak<dyn Owner> = self.this.clone();
        let middlewares = self.middlewares.read().clone();
        let table = RouteTable::compile(&self.root, &owner, &middlewares)?;
        self.table.store(Arc::new(table));
        Ok(())
    }
}

impl App {
    /// Compiles `root` into a new application.
    pub fn new(root: Arc<Controller>) -> Result<Self, Error> {
        let shared = Arc::new_cyclic(|this| Shared {
            root,
            table: ArcSwap::from_pointee(RouteTable::default()),
            middlewares: RwLock::default(),
            not_found: RwLock::new(Arc::new(dispatch::default_not_found)),
            compiling: Mutex::new(()),
            this: this.clone(),
        });
        shared.recompile()?;
        Ok(Self { shared })
    }

    /// Adds an application-level middleware and recompiles.
    ///
    /// App middlewares wrap every route outside all controller middlewares.
    /// Later additions run closer to the endpoint.
    pub fn add_middleware(&self, middleware: impl Middleware) -> Result<(), Error> {
        self.shared.middlewares.write().push(Arc::new(middleware));
        self.shared.recompile()
    }

    /// Replaces the handler used for every failed dispatch.
    pub fn set_not_found<F>(&self, handler: F)
    where
        F: Fn(&Request, &DispatchError) -> Response + Send + Sync + 'static,
    {
        *self.shared.not_found.write() = Arc::new(handler);
    }

    /// Rebuilds the route table from the current tree.
    pub fn recompile(&self) -> Result<(), Error> {
        self.shared.recompile()
    }

    /// The currently published route table.
    pub fn routes(&self) -> Arc<RouteTable> {
        self.shared.table.load_full()
    }

    pub fn root(&self) -> &Arc<Controller> {
        &self.shared.root
    }

    /// Routes `req` to its endpoint, or to the not-found handler.
    pub async fn dispatch(&self, req: Request) -> Response {
        let segments = dispatch::segments(req.path());
        let verb = Verb::from_method(req.method());

        let found = {
            let table = self.shared.table.load();
            match table.resolve(&segments, verb) {
                Some((route, consumed)) => dispatch::bind(route.params(), &segments[consumed..])
                    .map(|args| (Arc::clone(route.endpoint()), args)),
                None => Err(DispatchError::NoRoute),
            }
        };

        match found {
            Ok((endpoint, args)) => endpoint.call(req, args).await,
            Err(reason) => {
                debug!(method = %req.method(), path = req.path(), %reason, "not found");
                let handler = Arc::clone(&*self.shared.not_found.read());
                handler(&req, &reason)
            }
        }
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("routes", &self.shared.table.load().len())
            .field("middlewares", &self.shared.middlewares.read().len())
            .finish_non_exhaustive()
    }
}
