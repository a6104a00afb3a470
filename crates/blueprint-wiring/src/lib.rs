//! The wiring spec and its evaluator.
//!
//! A wiring spec is the declarative description of an application: named node
//! definitions, aliases, and properties, registered by plugins. Evaluation
//! turns the spec into an IR tree by resolving names on demand inside a
//! hierarchy of namespaces:
//!
//! - [`WiringSpec`]: the mutable registry (definitions, aliases, properties,
//!   accumulated errors).
//! - [`Namespace`]: the lazy, memoizing, hierarchical resolver. A
//!   [`NamespaceHandler`] decides which node types are built locally and is
//!   informed of owned nodes and inbound edges.
//! - [`build_application`]: the entry point. Queues the requested names,
//!   drains the root namespace's deferred work in FIFO order, and returns
//!   the root [`blueprint_ir::ApplicationNode`] — partial on failure.
//!
//! Evaluation is single-threaded and cooperative; build callbacks may
//! re-enter the spec and the namespace, and may suspend work with
//! [`Namespace::defer`].

pub mod application;
pub mod callsite;
pub mod error;
pub mod namespace;
pub mod spec;

pub use application::{build_application, ApplicationBuildError, ROOT_NAMESPACE_TYPE};
pub use callsite::Callsite;
pub use error::WiringError;
pub use namespace::{
    lookup_spec_def, CollectingHandler, DeferredFn, Namespace, NamespaceHandler,
};
pub use spec::{BuildFn, PropertyValue, WiringDef, WiringSpec, CALLSITE_PROPERTY};
