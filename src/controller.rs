//! The controller tree.
//!
//! A [`Controller`] is a node that may expose:
//!
//! - a self-endpoint, routed at the controller's own path;
//! - named children, each either a directly callable [`Action`] or a nested
//!   controller;
//! - verb endpoints, routed at the controller's own path but only for one
//!   [`Verb`];
//! - locally attached middlewares.
//!
//! Nodes are shared through `Arc`, so the same controller can appear in
//! several trees and be served by several [`App`](crate::App)s. Every app
//! that compiles a tree registers itself on each node it reaches; every
//! mutating call then recompiles all of them before returning.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Weak};
use std::{fmt, ptr};

use parking_lot::{Mutex, RwLock};
use tracing::warn;

use crate::endpoint::Action;
use crate::error::{ConfigError, Error};
use crate::middleware::{BoxedMiddleware, Middleware};
use crate::verb::Verb;

/// Something that must recompile when a controller it compiled changes.
pub(crate) trait Owner: Send + Sync {
    fn recompile(&self) -> Result<(), Error>;
}

/// A named child of a controller.
#[derive(Clone)]
pub enum Child {
    Action(Action),
    Controller(Arc<Controller>),
}

impl fmt::Debug for Child {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action(a) => f.debug_tuple("Action").field(a).finish(),
            Self::Controller(_) => f.write_str("Controller"),
        }
    }
}

#[derive(Default)]
struct Node {
    endpoint: Option<Action>,
    children: BTreeMap<String, Child>,
    verbs: BTreeMap<Verb, Action>,
    middlewares: Vec<BoxedMiddleware>,
}

/// Point-in-time copy of a node, taken by the route compiler.
pub(crate) struct Snapshot {
    pub endpoint: Option<Action>,
    pub actions: Vec<(String, Action)>,
    pub controllers: Vec<(String, Arc<Controller>)>,
    pub verbs: Vec<(Verb, Action)>,
    pub middlewares: Vec<BoxedMiddleware>,
}

/// A node in the routing tree.
///
/// ```rust
/// use kvist::{Action, Args, Controller, Param, Request, Verb};
///
/// async fn list(_req: Request, _args: Args) -> &'static str { "all users" }
/// async fn create(_req: Request, _args: Args) -> &'static str { "created" }
/// async fn show(_req: Request, args: Args) -> String {
///     format!("user {}", args.int("id").unwrap_or_default())
/// }
///
/// # fn main() -> Result<(), kvist::Error> {
/// let users = Controller::new();
/// users.set_verb(Verb::Get, Action::new(list))?;
/// users.set_verb(Verb::Post, Action::new(create))?;
/// users.add_action("show", Action::new(show).param(Param::new::<i64>("id")))?;
///
/// let root = Controller::new();
/// root.add_controller("users", users)?;
/// # Ok(())
/// # }
/// ```
pub struct Controller {
    node: RwLock<Node>,
    owners: Mutex<Vec<Weak<dyn Owner>>>,
}

impl Controller {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { node: RwLock::default(), owners: Mutex::default() })
    }

    /// A controller that is itself callable.
    pub fn with_endpoint(action: Action) -> Arc<Self> {
        let controller = Self::new();
        controller.node.write().endpoint = Some(action);
        controller
    }

    /// Sets the endpoint served at this controller's own path for any verb
    /// without a verb-specific endpoint.
    pub fn set_endpoint(&self, action: Action) -> Result<(), Error> {
        self.mutate(|node| node.endpoint = Some(action))
    }

    pub fn clear_endpoint(&self) -> Result<(), Error> {
        self.mutate(|node| node.endpoint = None)
    }

    /// Adds (or replaces) a directly callable child at `name`.
    pub fn add_action(&self, name: &str, action: Action) -> Result<(), Error> {
        validate_name(name)?;
        self.mutate(|node| {
            node.children.insert(name.to_owned(), Child::Action(action));
        })
    }

    /// Adds (or replaces) a sub-controller at `name`.
    ///
    /// Fails with [`ConfigError::Cycle`] if `controller` is this controller
    /// or already has it as a descendant. The tree is left unchanged.
    pub fn add_controller(&self, name: &str, controller: Arc<Controller>) -> Result<(), Error> {
        validate_name(name)?;
        if controller.reaches(self) {
            return Err(ConfigError::Cycle(name.to_owned()).into());
        }
        self.mutate(|node| {
            node.children.insert(name.to_owned(), Child::Controller(controller));
        })
    }

    /// Detaches the child at `name`, returning it.
    pub fn remove(&self, name: &str) -> Result<Option<Child>, Error> {
        let removed = self.node.write().children.remove(name);
        if removed.is_some() {
            self.notify()?;
        }
        Ok(removed)
    }

    /// Sets the endpoint served at this controller's own path for `verb`.
    pub fn set_verb(&self, verb: Verb, action: Action) -> Result<(), Error> {
        self.mutate(|node| {
            node.verbs.insert(verb, action);
        })
    }

    pub fn clear_verb(&self, verb: Verb) -> Result<(), Error> {
        self.mutate(|node| {
            node.verbs.remove(&verb);
        })
    }

    /// Attaches a middleware to every endpoint at or below this controller.
    ///
    /// Middlewares attached later run closer to the endpoint.
    pub fn add_middleware(&self, middleware: impl Middleware) -> Result<(), Error> {
        let middleware: BoxedMiddleware = Arc::new(middleware);
        self.mutate(|node| node.middlewares.push(middleware))
    }

    pub fn child(&self, name: &str) -> Option<Child> {
        self.node.read().children.get(name).cloned()
    }

    /// Number of live apps this controller would recompile on mutation.
    pub fn owner_count(&self) -> usize {
        self.owners.lock().iter().filter(|w| w.strong_count() > 0).count()
    }

    /// Whether `target` is this controller or sits anywhere below it.
    fn reaches(&self, target: &Controller) -> bool {
        if ptr::eq(self, target) {
            return true;
        }
        let mut seen = HashSet::new();
        let mut stack = self.sub_controllers();
        while let Some(c) = stack.pop() {
            if ptr::eq(Arc::as_ptr(&c), target) {
                return true;
            }
            if seen.insert(Arc::as_ptr(&c)) {
                stack.extend(c.sub_controllers());
            }
        }
        false
    }

    fn sub_controllers(&self) -> Vec<Arc<Controller>> {
        let node = self.node.read();
        node.children
            .values()
            .filter_map(|child| match child {
                Child::Controller(c) => Some(Arc::clone(c)),
                Child::Action(_) => None,
            })
            .collect()
    }

    fn mutate(&self, f: impl FnOnce(&mut Node)) -> Result<(), Error> {
        f(&mut self.node.write());
        self.notify()
    }

    /// Registers `owner` for invalidation. Idempotent per owner.
    pub(crate) fn register(&self, owner: &Weak<dyn Owner>) {
        let mut owners = self.owners.lock();
        owners.retain(|w| w.strong_count() > 0);
        if !owners.iter().any(|w| Weak::ptr_eq(w, owner)) {
            owners.push(Weak::clone(owner));
        }
    }

    /// Recompiles every live owner. All owners are attempted; the first
    /// failure is returned.
    fn notify(&self) -> Result<(), Error> {
        let owners: Vec<_> = self.owners.lock().iter().filter_map(Weak::upgrade).collect();
        let mut first_err = None;
        for owner in owners {
            if let Err(e) = owner.recompile() {
                warn!("recompile after controller change failed: {e}");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        let node = self.node.read();
        let mut actions = Vec::new();
        let mut controllers = Vec::new();
        for (name, child) in &node.children {
            match child {
                Child::Action(a) => actions.push((name.clone(), a.clone())),
                Child::Controller(c) => controllers.push((name.clone(), Arc::clone(c))),
            }
        }
        Snapshot {
            endpoint: node.endpoint.clone(),
            actions,
            controllers,
            verbs: node.verbs.iter().map(|(v, a)| (*v, a.clone())).collect(),
            middlewares: node.middlewares.clone(),
        }
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let node = self.node.read();
        f.debug_struct("Controller")
            .field("endpoint", &node.endpoint.is_some())
            .field("children", &node.children.keys().collect::<Vec<_>>())
            .field("verbs", &node.verbs.keys().collect::<Vec<_>>())
            .field("middlewares", &node.middlewares.len())
            .finish()
    }
}

/// Child names become path segments: non-empty, no `/`, and no leading `_`
/// (reserved for internal members).
fn validate_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() || name.contains('/') || name.starts_with('_') {
        return Err(ConfigError::InvalidName(name.to_owned()));
    }
    Ok(())
}
