//! The application driver: turns a wiring spec into an IR tree.
//!
//! [`build_application`] creates a root namespace whose handler accepts every
//! node type, enqueues each requested name as a deferred lookup, then drains
//! the deferred queue in FIFO order. The drain halts at the first error, but
//! the partial application node (holding everything built so far) is always
//! returned, carried inside [`ApplicationBuildError`] on failure.

use std::rc::Rc;

use blueprint_ir::{ApplicationNode, IrNode};
use thiserror::Error;
use tracing::info;

use crate::error::WiringError;
use crate::namespace::{CollectingHandler, Namespace};
use crate::spec::WiringSpec;

/// The namespace-type label of the application root.
pub const ROOT_NAMESPACE_TYPE: &str = "BlueprintApplication";

/// An application build that failed partway.
///
/// `partial` holds the application node with every top-level node that was
/// built before the failure, for debugging; `error` is the union of the
/// halting error and all errors accumulated in the wiring spec.
#[derive(Debug, Error)]
#[error("building application {} failed: {error}", .partial.name())]
pub struct ApplicationBuildError {
    pub partial: ApplicationNode,
    pub error: WiringError,
}

/// Builds the IR of an application from the definitions of `spec`.
///
/// `nodes_to_instantiate` names the nodes to build; their dependencies are
/// instantiated recursively. When empty, every definition in the spec is
/// instantiated — usually not the topology you want, so callers should
/// normally be explicit.
pub fn build_application(
    spec: &WiringSpec,
    name: &str,
    nodes_to_instantiate: &[&str],
) -> Result<ApplicationNode, ApplicationBuildError> {
    let handler = Rc::new(CollectingHandler::accepting_all());
    let root = Namespace::root(spec, name, ROOT_NAMESPACE_TYPE, handler.clone());

    let names: Vec<String> = if nodes_to_instantiate.is_empty() {
        spec.defs()
    } else {
        nodes_to_instantiate.iter().map(|s| s.to_string()).collect()
    };

    // Queue up the nodes to be built, then run the build wave. Deferred
    // continuations enqueued mid-build run in the same drain.
    for node_name in names {
        let namespace = root.clone();
        root.defer(move || {
            info!(application = %namespace.name(), "instantiating {node_name}");
            namespace.get(&node_name).map(|_| ())
        });
    }
    let drained = root.drain_deferred();

    let app = ApplicationNode::new(name, handler.nodes());

    if let Err(err) = drained {
        spec.add_error(err);
    }
    match spec.err() {
        None => Ok(app),
        Some(error) => Err(ApplicationBuildError {
            partial: app,
            error,
        }),
    }
}
