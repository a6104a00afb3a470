//! The namespace: a lazy, memoizing, hierarchical resolver of wiring names.
//!
//! A [`Namespace`] is the dependency-injection container handed to build
//! callbacks. Resolving a name builds the node on demand, caches it, and
//! re-uses the cached instance on every later request. Namespaces are
//! hierarchical: a [`NamespaceHandler`] decides which node types are built
//! locally, and everything else is fetched from the parent namespace and
//! recorded as an inbound edge.
//!
//! # Resolution
//!
//! `get` walks, in order: the memoization cache, the handler's definition
//! lookup, alias indirection, the accepts/delegate decision, and finally the
//! definition's build callback. The per-namespace build stack powers cycle
//! detection and diagnostic context (every log line carries the call site of
//! the definition currently being built).
//!
//! # Deferred work
//!
//! `defer` appends a continuation to the root namespace's FIFO queue; nested
//! namespaces forward upward. The queue is drained by the application driver
//! after the main build wave, and continuations may enqueue further work
//! into the same drain.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use blueprint_ir::{NodeRef, NodeType};
use indexmap::{IndexMap, IndexSet};
use tracing::{error, info};

use crate::callsite::Callsite;
use crate::error::WiringError;
use crate::spec::{WiringDef, WiringSpec};

/// A deferred continuation, run by the root namespace after the current
/// build wave.
pub type DeferredFn = Box<dyn FnOnce() -> Result<(), WiringError>>;

/// Policy hooks for a namespace.
///
/// A handler decides which node types the namespace builds locally and is
/// informed of every node the namespace comes to own (`add_node`) or borrow
/// from an ancestor (`add_edge`). Each is called at most once per node name.
pub trait NamespaceHandler {
    /// Reports whether this namespace builds nodes of the given type. When
    /// false, resolution is delegated to the parent namespace.
    fn accepts(&self, node_type: NodeType) -> bool;

    /// Resolves a name to its definition. The default consults the wiring
    /// spec; custom handlers may restrict, rewrite, or reject definitions.
    fn lookup_def(&self, namespace: &Namespace, name: &str) -> Result<WiringDef, WiringError> {
        lookup_spec_def(namespace, name)
    }

    /// Called exactly once when this namespace becomes the owner of a newly
    /// built node.
    fn add_node(&self, name: &str, node: &NodeRef) -> Result<(), WiringError>;

    /// Called exactly once when this namespace references a non-metadata
    /// node owned by an ancestor namespace.
    fn add_edge(&self, name: &str, node: &NodeRef) -> Result<(), WiringError>;
}

/// The default definition lookup: consult the namespace's wiring spec.
/// Custom handlers can fall back to this after their own logic.
pub fn lookup_spec_def(namespace: &Namespace, name: &str) -> Result<WiringDef, WiringError> {
    match namespace.wiring().get_def(name)? {
        Some(def) => Ok(def),
        None => Err(WiringError::Undefined {
            name: name.to_string(),
            namespace: namespace.name().to_string(),
        }),
    }
}

/// A handler that collects owned nodes and inbound edges into lists.
///
/// This is the simplest way for a plugin to open a child namespace: accept
/// the node types that belong inside, build, then read back `nodes()` and
/// `edges()` to assemble the enclosing IR node.
pub struct CollectingHandler {
    /// Node types built locally. `None` accepts everything.
    accepts: Option<Vec<NodeType>>,
    nodes: RefCell<Vec<NodeRef>>,
    edges: RefCell<Vec<NodeRef>>,
}

impl CollectingHandler {
    /// Accepts only the given node types; everything else is delegated.
    pub fn accepting(types: impl IntoIterator<Item = NodeType>) -> Self {
        CollectingHandler {
            accepts: Some(types.into_iter().collect()),
            nodes: RefCell::new(Vec::new()),
            edges: RefCell::new(Vec::new()),
        }
    }

    /// Accepts every node type. Used for application roots.
    pub fn accepting_all() -> Self {
        CollectingHandler {
            accepts: None,
            nodes: RefCell::new(Vec::new()),
            edges: RefCell::new(Vec::new()),
        }
    }

    /// Nodes owned by the namespace, in build order.
    pub fn nodes(&self) -> Vec<NodeRef> {
        self.nodes.borrow().clone()
    }

    /// Nodes borrowed from ancestor namespaces, in reference order.
    pub fn edges(&self) -> Vec<NodeRef> {
        self.edges.borrow().clone()
    }
}

impl NamespaceHandler for CollectingHandler {
    fn accepts(&self, node_type: NodeType) -> bool {
        match &self.accepts {
            Some(types) => types.contains(&node_type),
            None => true,
        }
    }

    fn add_node(&self, _name: &str, node: &NodeRef) -> Result<(), WiringError> {
        self.nodes.borrow_mut().push(Rc::clone(node));
        Ok(())
    }

    fn add_edge(&self, _name: &str, node: &NodeRef) -> Result<(), WiringError> {
        self.edges.borrow_mut().push(Rc::clone(node));
        Ok(())
    }
}

struct BuildFrame {
    /// The name as requested (before alias resolution); cycle detection
    /// keys on this so alias hops are not false positives.
    requested: String,
    callsite: Option<Callsite>,
}

#[derive(Default)]
struct NamespaceState {
    /// Memoization cache, including results fetched from parents and alias
    /// entries sharing their target's node.
    seen: IndexMap<String, NodeRef>,
    /// Node names already reported to the handler; prevents double
    /// add_node/add_edge calls.
    added: IndexSet<String>,
    /// Definitions currently being built, innermost last.
    stack: Vec<BuildFrame>,
    children: IndexMap<String, Namespace>,
    /// Deferred continuations; populated only on the root namespace.
    deferred: VecDeque<DeferredFn>,
}

struct NamespaceInner {
    name: String,
    namespace_type: String,
    parent: Option<Namespace>,
    wiring: WiringSpec,
    handler: Rc<dyn NamespaceHandler>,
    state: RefCell<NamespaceState>,
}

/// Cloneable handle to a namespace.
#[derive(Clone)]
pub struct Namespace {
    inner: Rc<NamespaceInner>,
}

impl Namespace {
    /// Creates a root namespace. Plugins derive children with
    /// [`Namespace::derive_namespace`] instead.
    pub fn root(
        wiring: &WiringSpec,
        name: impl Into<String>,
        namespace_type: impl Into<String>,
        handler: Rc<dyn NamespaceHandler>,
    ) -> Self {
        Namespace {
            inner: Rc::new(NamespaceInner {
                name: name.into(),
                namespace_type: namespace_type.into(),
                parent: None,
                wiring: wiring.clone(),
                handler,
                state: RefCell::new(NamespaceState::default()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// A descriptive label for the kind of namespace, used in diagnostics.
    pub fn namespace_type(&self) -> &str {
        &self.inner.namespace_type
    }

    pub fn wiring(&self) -> &WiringSpec {
        &self.inner.wiring
    }

    pub fn parent(&self) -> Option<&Namespace> {
        self.inner.parent.as_ref()
    }

    /// Resolves `name` to a built node, recording a cross-namespace edge if
    /// the node turns out to be owned by an ancestor.
    pub fn get(&self, name: &str) -> Result<NodeRef, WiringError> {
        self.resolve(name, true)
    }

    /// Resolves `name` without recording an edge into this namespace. Most
    /// plugins should use [`Namespace::get`] instead.
    pub fn instantiate(&self, name: &str) -> Result<NodeRef, WiringError> {
        self.resolve(name, false)
    }

    /// Resolves `name` and downcasts the result.
    pub fn get_as<T: blueprint_ir::IrNode>(&self, name: &str) -> Result<Rc<T>, WiringError> {
        let node = self.get(name)?;
        blueprint_ir::downcast_node::<T>(&node).ok_or_else(|| WiringError::WrongNodeKind {
            name: name.to_string(),
            expected: std::any::type_name::<T>(),
        })
    }

    fn resolve(&self, name: &str, record_edge: bool) -> Result<NodeRef, WiringError> {
        if let Some(node) = self.inner.state.borrow().seen.get(name) {
            return Ok(Rc::clone(node));
        }

        let def = self.inner.handler.lookup_def(self, name)?;

        // Re-entering a name that is still being built is a cycle.
        {
            let state = self.inner.state.borrow();
            if state.stack.iter().any(|frame| frame.requested == name) {
                let mut stack: Vec<String> =
                    state.stack.iter().map(|f| f.requested.clone()).collect();
                stack.push(name.to_string());
                return Err(WiringError::BuildCycle {
                    name: name.to_string(),
                    namespace: self.inner.name.clone(),
                    stack,
                });
            }
        }

        self.inner.state.borrow_mut().stack.push(BuildFrame {
            requested: name.to_string(),
            callsite: def.callsite(),
        });
        let result = self.resolve_def(name, &def, record_edge);
        self.inner.state.borrow_mut().stack.pop();

        if let Err(err) = &result {
            error!(
                namespace = %self.inner.name,
                namespace_type = %self.inner.namespace_type,
                callsite = %OptCallsite(def.callsite()),
                "unable to build {name}: {err}"
            );
        }
        result
    }

    fn resolve_def(
        &self,
        name: &str,
        def: &WiringDef,
        record_edge: bool,
    ) -> Result<NodeRef, WiringError> {
        // Alias: resolve the canonical name and memoize both entries. No
        // add_node/add_edge is issued for the alias name itself.
        if def.name != name {
            self.log_info(format!("resolved {name} to {}", def.name));
            let node = self.resolve(&def.name, record_edge)?;
            self.inner
                .state
                .borrow_mut()
                .seen
                .insert(name.to_string(), Rc::clone(&node));
            return Ok(node);
        }

        // Nodes of unsupported types are built in the parent namespace.
        if !self.inner.handler.accepts(def.node_type) {
            let Some(parent) = &self.inner.parent else {
                return Err(WiringError::NoAcceptingNamespace {
                    name: name.to_string(),
                    node_type: def.node_type,
                    namespace: self.inner.name.clone(),
                });
            };
            self.log_info(format!(
                "getting {name} of type {} from parent namespace {}",
                def.node_type,
                parent.name()
            ));
            let node = if record_edge {
                parent.get(name)?
            } else {
                parent.instantiate(name)?
            };
            {
                let mut state = self.inner.state.borrow_mut();
                let newly_added = state.added.insert(node.name().to_string());
                drop(state);
                if newly_added && record_edge && !node.is_metadata() {
                    self.inner.handler.add_edge(name, &node)?;
                }
            }
            self.inner
                .state
                .borrow_mut()
                .seen
                .insert(name.to_string(), Rc::clone(&node));
            return Ok(node);
        }

        // Build here.
        self.log_info(format!("building {name} of type {}", def.node_type));
        let build = def
            .build
            .clone()
            .ok_or_else(|| WiringError::NoBuildFunc {
                name: name.to_string(),
            })?;
        let node = (*build)(self).map_err(|err| self.wrap_build_failure(name, def, err))?;

        {
            let mut state = self.inner.state.borrow_mut();
            let newly_added = state.added.insert(node.name().to_string());
            drop(state);
            if newly_added {
                self.inner.handler.add_node(name, &node)?;
            }
        }
        self.log_info(format!("finished building {name}"));
        self.inner
            .state
            .borrow_mut()
            .seen
            .insert(name.to_string(), Rc::clone(&node));
        Ok(node)
    }

    fn wrap_build_failure(&self, name: &str, def: &WiringDef, err: WiringError) -> WiringError {
        WiringError::BuildFailed {
            name: name.to_string(),
            namespace: self.inner.name.clone(),
            callsite: def.callsite().unwrap_or(Callsite {
                file: "<unknown>",
                line: 0,
                column: 0,
            }),
            source: Box::new(err),
        }
    }

    /// Injects an externally built node. If the handler accepts the name's
    /// node type the node is stored as namespace-owned; otherwise it is
    /// pushed to the parent and recorded locally as an edge.
    pub fn put(&self, name: &str, node: NodeRef) -> Result<(), WiringError> {
        self.inner
            .state
            .borrow_mut()
            .seen
            .insert(name.to_string(), Rc::clone(&node));

        // Without a definition there is no placement tag; own it here.
        let def = self.inner.wiring.get_def(name)?;
        let accepted = match &def {
            Some(def) => self.inner.handler.accepts(def.node_type),
            None => true,
        };

        if accepted {
            let newly_added = self
                .inner
                .state
                .borrow_mut()
                .added
                .insert(node.name().to_string());
            if newly_added {
                self.inner.handler.add_node(name, &node)?;
            }
            self.log_info(format!("{name} added to namespace"));
            return Ok(());
        }

        let Some(parent) = &self.inner.parent else {
            let node_type = def.map(|d| d.node_type).unwrap_or(NodeType::Metadata);
            return Err(WiringError::NoAcceptingNamespace {
                name: name.to_string(),
                node_type,
                namespace: self.inner.name.clone(),
            });
        };
        self.log_info(format!(
            "{name} does not belong in this namespace; pushing to parent namespace {}",
            parent.name()
        ));
        parent.put(name, Rc::clone(&node))?;
        let newly_added = self
            .inner
            .state
            .borrow_mut()
            .added
            .insert(node.name().to_string());
        if newly_added && !node.is_metadata() {
            self.inner.handler.add_edge(name, &node)?;
        }
        Ok(())
    }

    /// The single value of property `key` on `name`, via the handler's
    /// definition lookup.
    pub fn get_property<T: Clone + 'static>(&self, name: &str, key: &str) -> Result<T, WiringError> {
        let def = self.inner.handler.lookup_def(self, name)?;
        def.get_property(key)
    }

    /// All values of property `key` on `name`, via the handler's definition
    /// lookup.
    pub fn get_properties<T: Clone + 'static>(
        &self,
        name: &str,
        key: &str,
    ) -> Result<Vec<T>, WiringError> {
        let def = self.inner.handler.lookup_def(self, name)?;
        def.get_properties(key)
    }

    /// Creates a child namespace governed by `handler`. Fails if a child
    /// with this name was already derived.
    pub fn derive_namespace(
        &self,
        name: &str,
        namespace_type: &str,
        handler: Rc<dyn NamespaceHandler>,
    ) -> Result<Namespace, WiringError> {
        if self.inner.state.borrow().children.contains_key(name) {
            return Err(WiringError::DuplicateNamespace {
                name: name.to_string(),
                namespace: self.inner.name.clone(),
            });
        }
        let child = Namespace {
            inner: Rc::new(NamespaceInner {
                name: name.to_string(),
                namespace_type: namespace_type.to_string(),
                parent: Some(self.clone()),
                wiring: self.inner.wiring.clone(),
                handler,
                state: RefCell::new(NamespaceState::default()),
            }),
        };
        self.inner
            .state
            .borrow_mut()
            .children
            .insert(name.to_string(), child.clone());
        self.log_info(format!("created child namespace {name}"));
        Ok(child)
    }

    /// Returns the child namespace previously created with
    /// [`Namespace::derive_namespace`].
    pub fn get_namespace(&self, name: &str) -> Result<Namespace, WiringError> {
        self.inner
            .state
            .borrow()
            .children
            .get(name)
            .cloned()
            .ok_or_else(|| WiringError::NamespaceNotFound {
                name: name.to_string(),
                namespace: self.inner.name.clone(),
            })
    }

    /// Enqueues a continuation to run after all currently-queued work. The
    /// queue lives on the root namespace; nested namespaces forward upward.
    pub fn defer(&self, f: impl FnOnce() -> Result<(), WiringError> + 'static) {
        self.root_namespace()
            .inner
            .state
            .borrow_mut()
            .deferred
            .push_back(Box::new(f));
    }

    /// Like [`Namespace::defer`], but pushes to the front of the queue.
    pub fn defer_front(&self, f: impl FnOnce() -> Result<(), WiringError> + 'static) {
        self.root_namespace()
            .inner
            .state
            .borrow_mut()
            .deferred
            .push_front(Box::new(f));
    }

    fn root_namespace(&self) -> Namespace {
        let mut current = self.clone();
        while let Some(parent) = current.inner.parent.clone() {
            current = parent;
        }
        current
    }

    /// Runs deferred continuations in FIFO order until the queue is empty,
    /// including work enqueued by the continuations themselves. Stops at the
    /// first error.
    pub(crate) fn drain_deferred(&self) -> Result<(), WiringError> {
        loop {
            let next = self.inner.state.borrow_mut().deferred.pop_front();
            match next {
                Some(f) => f()?,
                None => return Ok(()),
            }
        }
    }

    fn current_callsite(&self) -> Option<Callsite> {
        self.inner
            .state
            .borrow()
            .stack
            .last()
            .and_then(|frame| frame.callsite)
    }

    fn log_info(&self, message: String) {
        info!(
            namespace = %self.inner.name,
            namespace_type = %self.inner.namespace_type,
            callsite = %OptCallsite(self.current_callsite()),
            "{message}"
        );
    }
}

impl std::fmt::Debug for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Namespace")
            .field("name", &self.inner.name)
            .field("type", &self.inner.namespace_type)
            .finish()
    }
}

struct OptCallsite(Option<Callsite>);

impl std::fmt::Display for OptCallsite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(cs) => write!(f, "{cs}"),
            None => write!(f, "-"),
        }
    }
}
