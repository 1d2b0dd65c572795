//! Compiled route table.
//!
//! Compilation walks the controller tree depth-first, collecting one
//! [`Route`] per exposed endpoint, keyed by its path-segment tuple and by verb
//! (`None` for the wildcard entry). Routes are then grouped by path length so
//! the dispatcher can try prefixes from longest to shortest with one exact
//! lookup per length.
//!
//! A table is immutable once built. Recompiling builds a new one.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use tracing::debug;

use crate::controller::{Controller, Owner};
use crate::endpoint::{Action, Endpoint};
use crate::error::ConfigError;
use crate::middleware::{self, BoxedMiddleware};
use crate::signature::{Param, Signature};
use crate::verb::Verb;

/// One compiled endpoint: its parameter list and fully wrapped invocable.
#[derive(Clone)]
pub struct Route {
    signature: Signature,
    endpoint: Endpoint,
}

impl Route {
    pub fn params(&self) -> &[Param] { self.signature.params() }

    pub(crate) fn endpoint(&self) -> &Endpoint { &self.endpoint }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route").field("params", &self.signature.params()).finish_non_exhaustive()
    }
}

type Slots = HashMap<Option<Verb>, Route>;

/// Routes grouped by path length → path tuple → verb-or-wildcard.
#[derive(Debug, Default)]
pub struct RouteTable {
    groups: HashMap<usize, HashMap<Vec<String>, Slots>>,
    max_len: usize,
}

impl RouteTable {
    /// Finds the longest registered prefix of `segments` that serves `verb`.
    ///
    /// At each length the verb-specific entry wins over the wildcard. Returns
    /// the route and the number of segments it consumed.
    pub fn resolve(&self, segments: &[String], verb: Option<Verb>) -> Option<(&Route, usize)> {
        let lowest = self.max_len.min(segments.len());
        (0..=lowest).rev().find_map(|i| {
            let slots = self.groups.get(&i)?.get(&segments[..i])?;
            verb.and_then(|v| slots.get(&Some(v)))
                .or_else(|| slots.get(&None))
                .map(|route| (route, i))
        })
    }

    /// Exact lookup, without prefix matching or wildcard fallback.
    pub fn get(&self, path: &[&str], verb: Option<Verb>) -> Option<&Route> {
        let key: Vec<String> = path.iter().map(|s| (*s).to_owned()).collect();
        self.groups.get(&path.len())?.get(&key)?.get(&verb)
    }

    pub fn contains(&self, path: &[&str], verb: Option<Verb>) -> bool {
        self.get(path, verb).is_some()
    }

    /// Longest registered path, in segments.
    pub fn max_len(&self) -> usize { self.max_len }

    /// Total number of (path, verb) entries.
    pub fn len(&self) -> usize {
        self.groups.values().flat_map(HashMap::values).map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Every `(path, verb)` key, sorted.
    pub fn keys(&self) -> Vec<(Vec<String>, Option<Verb>)> {
        let mut keys: Vec<_> = self
            .groups
            .values()
            .flat_map(|group| {
                group.iter().flat_map(|(path, slots)| slots.keys().map(|v| (path.clone(), *v)))
            })
            .collect();
        keys.sort();
        keys
    }

    /// Compiles the tree under `root`, registering `owner` on every node.
    pub(crate) fn compile(
        root: &Arc<Controller>,
        owner: &Weak<dyn Owner>,
        app_middlewares: &[BoxedMiddleware],
    ) -> Result<Self, ConfigError> {
        let mut compiler = Compiler {
            owner,
            app_middlewares,
            entries: HashMap::new(),
            path: Vec::new(),
            levels: Vec::new(),
            ancestors: Vec::new(),
        };
        compiler.visit(root)?;

        let mut table = RouteTable::default();
        for (path, slots) in compiler.entries {
            table.max_len = table.max_len.max(path.len());
            table.groups.entry(path.len()).or_default().insert(path, slots);
        }
        debug!(routes = table.len(), max_len = table.max_len, "route table compiled");
        Ok(table)
    }
}

struct Compiler<'a> {
    owner: &'a Weak<dyn Owner>,
    app_middlewares: &'a [BoxedMiddleware],
    entries: HashMap<Vec<String>, Slots>,
    /// Segment names from the root to the current node.
    path: Vec<String>,
    /// Middlewares of each controller on the current path, root first.
    levels: Vec<Vec<BoxedMiddleware>>,
    ancestors: Vec<*const Controller>,
}

impl Compiler<'_> {
    fn visit(&mut self, controller: &Arc<Controller>) -> Result<(), ConfigError> {
        let id = Arc::as_ptr(controller);
        if self.ancestors.contains(&id) {
            return Err(ConfigError::Cycle(self.path.join("/")));
        }
        controller.register(self.owner);

        let node = controller.snapshot();
        self.ancestors.push(id);
        self.levels.push(node.middlewares);

        if let Some(action) = &node.endpoint {
            self.insert(None, None, action)?;
        }
        for (verb, action) in &node.verbs {
            self.insert(None, Some(*verb), action)?;
        }
        for (name, action) in &node.actions {
            self.insert(Some(name.as_str()), None, action)?;
        }
        for (name, child) in &node.controllers {
            self.path.push(name.clone());
            self.visit(child)?;
            self.path.pop();
        }

        self.levels.pop();
        self.ancestors.pop();
        Ok(())
    }

    fn insert(&mut self, name: Option<&str>, verb: Option<Verb>, action: &Action) -> Result<(), ConfigError> {
        let signature = Signature::extract(action)?;
        let endpoint = middleware::chain(
            action.endpoint(),
            self.levels.iter().map(Vec::as_slice),
            self.app_middlewares,
        );

        let mut path = self.path.clone();
        path.extend(name.map(str::to_owned));
        self.entries.entry(path).or_default().insert(verb, Route { signature, endpoint });
        Ok(())
    }
}
