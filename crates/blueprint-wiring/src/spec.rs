//! The wiring spec: a mutable registry of named definitions and aliases.
//!
//! A [`WiringSpec`] is the declarative input to IR evaluation. Plugins add
//! named definitions (a placement tag plus a build callback), aliases that
//! forward one name to another, and keyed properties on definitions. Errors
//! raised while wiring accumulate in the spec rather than aborting it, and
//! are surfaced together after the build.
//!
//! The spec is a cloneable handle; build callbacks re-enter it mid-build
//! (pointers define modifier sentinels from inside callbacks), so no borrow
//! of the internal state is held across callback invocations.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use blueprint_ir::{NodeRef, NodeType};
use indexmap::IndexMap;
use smallvec::{smallvec, SmallVec};

use crate::application::{build_application, ApplicationBuildError};
use crate::callsite::Callsite;
use crate::error::WiringError;
use crate::namespace::Namespace;

/// The property key under which `define` records its call site.
pub const CALLSITE_PROPERTY: &str = "callsite";

/// A build callback: invoked with the namespace the node is being built in.
pub type BuildFn = Rc<dyn Fn(&Namespace) -> Result<NodeRef, WiringError>>;

/// An opaque property value. Retrieved by downcasting to the stored type.
pub type PropertyValue = Rc<dyn Any>;

/// A named entry in the wiring spec.
#[derive(Clone)]
pub struct WiringDef {
    pub name: String,
    pub node_type: NodeType,
    /// Absent on entries auto-created by a property write that were never
    /// `define`d.
    pub build: Option<BuildFn>,
    /// Keyed property lists. Writes append; `set` replaces the list.
    pub properties: IndexMap<String, SmallVec<[PropertyValue; 1]>>,
}

impl WiringDef {
    fn new(name: &str) -> Self {
        WiringDef {
            name: name.to_string(),
            node_type: NodeType::Metadata,
            build: None,
            properties: IndexMap::new(),
        }
    }

    pub fn add_property<T: Any>(&mut self, key: &str, value: T) {
        self.properties
            .entry(key.to_string())
            .or_default()
            .push(Rc::new(value));
    }

    /// Returns the single value stored under `key`. Fails if the list does
    /// not hold exactly one value of the requested type.
    pub fn get_property<T: Clone + 'static>(&self, key: &str) -> Result<T, WiringError> {
        let values = self.properties.get(key).map(|v| v.as_slice()).unwrap_or(&[]);
        if values.len() != 1 {
            return Err(WiringError::PropertyArity {
                name: self.name.clone(),
                key: key.to_string(),
                count: values.len(),
            });
        }
        values[0]
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| WiringError::PropertyType {
                name: self.name.clone(),
                key: key.to_string(),
            })
    }

    /// Returns all values stored under `key` that are of the requested type.
    pub fn get_properties<T: Clone + 'static>(&self, key: &str) -> Result<Vec<T>, WiringError> {
        let values = self.properties.get(key).map(|v| v.as_slice()).unwrap_or(&[]);
        values
            .iter()
            .map(|v| {
                v.downcast_ref::<T>()
                    .cloned()
                    .ok_or_else(|| WiringError::PropertyType {
                        name: self.name.clone(),
                        key: key.to_string(),
                    })
            })
            .collect()
    }

    /// The call site recorded when this definition was registered.
    pub fn callsite(&self) -> Option<Callsite> {
        self.get_property::<Callsite>(CALLSITE_PROPERTY).ok()
    }
}

impl fmt::Debug for WiringDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WiringDef")
            .field("name", &self.name)
            .field("node_type", &self.node_type)
            .field("has_build", &self.build.is_some())
            .field("property_keys", &self.properties.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl fmt::Display for WiringDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let props = self
            .properties
            .iter()
            .filter(|(key, _)| key.as_str() != CALLSITE_PROPERTY)
            .map(|(key, values)| format!("{key}[{}]", values.len()))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{} = {}({props})", self.name, self.node_type)
    }
}

struct SpecState {
    defs: IndexMap<String, WiringDef>,
    aliases: IndexMap<String, String>,
    errors: Vec<WiringError>,
}

struct SpecInner {
    name: String,
    state: RefCell<SpecState>,
}

/// Cloneable handle to a wiring spec.
#[derive(Clone)]
pub struct WiringSpec {
    inner: Rc<SpecInner>,
}

impl WiringSpec {
    pub fn new(name: impl Into<String>) -> Self {
        WiringSpec {
            inner: Rc::new(SpecInner {
                name: name.into(),
                state: RefCell::new(SpecState {
                    defs: IndexMap::new(),
                    aliases: IndexMap::new(),
                    errors: Vec::new(),
                }),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Registers (or overwrites) a named definition. Removes any alias with
    /// the same name and records the caller's location under the reserved
    /// `callsite` property.
    ///
    /// The node type indicates where in the namespace hierarchy the node is
    /// built; the build callback is not required to return a node of any
    /// particular kind.
    #[track_caller]
    pub fn define(
        &self,
        name: impl AsRef<str>,
        node_type: NodeType,
        build: impl Fn(&Namespace) -> Result<NodeRef, WiringError> + 'static,
    ) {
        let callsite = Callsite::capture();
        let name = name.as_ref();
        let mut state = self.inner.state.borrow_mut();
        state.aliases.shift_remove(name);
        let def = state
            .defs
            .entry(name.to_string())
            .or_insert_with(|| WiringDef::new(name));
        def.node_type = node_type;
        def.build = Some(Rc::new(build));
        def.properties
            .insert(CALLSITE_PROPERTY.to_string(), smallvec![Rc::new(callsite) as PropertyValue]);
    }

    /// Defines `alias` to forward to `points_to`. Deletes any existing
    /// definition under `alias`. Aliases chain.
    pub fn alias(&self, alias: impl AsRef<str>, points_to: impl AsRef<str>) {
        let alias = alias.as_ref();
        let mut state = self.inner.state.borrow_mut();
        state.defs.shift_remove(alias);
        state
            .aliases
            .insert(alias.to_string(), points_to.as_ref().to_string());
    }

    /// If `alias` is an alias, returns what it directly points to.
    pub fn get_alias(&self, alias: &str) -> Option<String> {
        self.inner.state.borrow().aliases.get(alias).cloned()
    }

    /// Resolves aliases transitively and returns the definition, if any.
    /// Fails if the alias chain revisits a name.
    pub fn get_def(&self, name: &str) -> Result<Option<WiringDef>, WiringError> {
        let state = self.inner.state.borrow();
        let mut chain = vec![name.to_string()];
        let mut current = name;
        while let Some(next) = state.aliases.get(current) {
            if chain.iter().any(|seen| seen == next) {
                chain.push(next.clone());
                return Err(WiringError::AliasCycle {
                    name: name.to_string(),
                    chain,
                });
            }
            chain.push(next.clone());
            current = next;
        }
        Ok(state.defs.get(current).cloned())
    }

    /// Names of all registered definitions, in insertion order.
    pub fn defs(&self) -> Vec<String> {
        self.inner.state.borrow().defs.keys().cloned().collect()
    }

    /// Replaces the property list of `key` on `name` with a single value.
    /// Auto-creates a bare definition entry if `name` is not yet defined.
    pub fn set_property<T: Any>(&self, name: &str, key: &str, value: T) {
        let mut state = self.inner.state.borrow_mut();
        state.aliases.shift_remove(name);
        let def = state
            .defs
            .entry(name.to_string())
            .or_insert_with(|| WiringDef::new(name));
        def.properties
            .insert(key.to_string(), smallvec![Rc::new(value) as PropertyValue]);
    }

    /// Appends a value to the property list of `key` on `name`.
    pub fn add_property<T: Any>(&self, name: &str, key: &str, value: T) {
        let mut state = self.inner.state.borrow_mut();
        state.aliases.shift_remove(name);
        let def = state
            .defs
            .entry(name.to_string())
            .or_insert_with(|| WiringDef::new(name));
        def.add_property(key, value);
    }

    /// Returns the single value of property `key` on `name` (following
    /// aliases). Fails if the list does not hold exactly one value.
    pub fn get_property<T: Clone + 'static>(&self, name: &str, key: &str) -> Result<T, WiringError> {
        match self.get_def(name)? {
            Some(def) => def.get_property(key),
            None => Err(WiringError::PropertyArity {
                name: name.to_string(),
                key: key.to_string(),
                count: 0,
            }),
        }
    }

    /// Returns all values of property `key` on `name` (following aliases).
    pub fn get_properties<T: Clone + 'static>(
        &self,
        name: &str,
        key: &str,
    ) -> Result<Vec<T>, WiringError> {
        match self.get_def(name)? {
            Some(def) => def.get_properties(key),
            None => Ok(Vec::new()),
        }
    }

    /// Records an error without aborting wiring. All accumulated errors are
    /// surfaced together by [`WiringSpec::err`] and by the build driver.
    pub fn add_error(&self, err: WiringError) {
        self.inner.state.borrow_mut().errors.push(err);
    }

    /// The union of accumulated errors, if any.
    pub fn err(&self) -> Option<WiringError> {
        let state = self.inner.state.borrow();
        if state.errors.is_empty() {
            None
        } else {
            Some(WiringError::Composite(state.errors.clone()))
        }
    }

    /// Builds the IR for the named nodes (and, recursively, everything they
    /// depend on). With no names, every definition is instantiated.
    pub fn build_ir(
        &self,
        nodes_to_instantiate: &[&str],
    ) -> Result<blueprint_ir::ApplicationNode, ApplicationBuildError> {
        build_application(self, self.name(), nodes_to_instantiate)
    }
}

impl fmt::Display for WiringSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        let mut lines = Vec::new();
        for def in state.defs.values() {
            lines.push(def.to_string());
        }
        for (alias, points_to) in &state.aliases {
            lines.push(format!("{alias} -> {points_to}"));
        }
        write!(
            f,
            "{} = WiringSpec {{\n{}\n}}",
            self.inner.name,
            blueprint_ir::stringutil::indent(&lines.join("\n"), 2)
        )
    }
}

impl fmt::Debug for WiringSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WiringSpec({})", self.inner.name)
    }
}
