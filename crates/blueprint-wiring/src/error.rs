//! Error types for wiring spec construction and IR evaluation.
//!
//! Uses `thiserror` for structured, matchable variants covering definition
//! errors, build errors, scope errors, type errors, port errors, and property
//! errors. Errors are `Clone` because a failure is both propagated up the
//! build chain and recorded in the wiring spec's accumulator.

use blueprint_ir::{NodeType, NodeTypeError};
use thiserror::Error;

use crate::callsite::Callsite;

/// Errors produced while defining or evaluating a wiring spec.
#[derive(Debug, Clone, Error)]
pub enum WiringError {
    /// A name was requested that has no definition in the wiring spec.
    #[error("{name} does not exist in the wiring spec of namespace {namespace}")]
    Undefined { name: String, namespace: String },

    /// A definition exists (e.g. created by a property write) but was never
    /// given a build function.
    #[error("{name} has no build function")]
    NoBuildFunc { name: String },

    /// Alias resolution revisited a name.
    #[error("alias cycle detected resolving {name}: {}", .chain.join(" -> "))]
    AliasCycle { name: String, chain: Vec<String> },

    /// A definition was re-entered while it was already being built.
    #[error("cycle detected while building {name} in namespace {namespace}: {}", .stack.join(" -> "))]
    BuildCycle {
        name: String,
        namespace: String,
        stack: Vec<String>,
    },

    /// A namespace refused a node type and had no parent to delegate to.
    #[error("namespace {namespace} does not accept node {name} of type {node_type} and has no parent namespace to get it from")]
    NoAcceptingNamespace {
        name: String,
        node_type: NodeType,
        namespace: String,
    },

    /// A build callback failed; carries the namespace and the call site of
    /// the failing definition.
    #[error("failed to build {name} (defined at {callsite}) in namespace {namespace}: {source}")]
    BuildFailed {
        name: String,
        namespace: String,
        callsite: Callsite,
        #[source]
        source: Box<WiringError>,
    },

    /// A node resolved successfully but was not of the requested Rust type.
    #[error("{name} is not a {expected}")]
    WrongNodeKind { name: String, expected: &'static str },

    /// An addressable node rejected its destination.
    #[error(transparent)]
    DestinationType(#[from] NodeTypeError),

    /// `create_pointer` was called for a name that already has a pointer.
    #[error("{name} already has a pointer")]
    PointerRedefined { name: String },

    /// An address name has no address metadata in the wiring spec.
    #[error("{name} is not a defined address")]
    AddressNotDefined { name: String },

    /// Two bind configs were pre-assigned the same port.
    #[error("{first} and {second} both pre-assigned to port {port}")]
    PortConflict {
        port: u16,
        first: String,
        second: String,
    },

    /// Bind configs were left without a port after assignment.
    #[error("unassigned bind addresses {}", .names.join(", "))]
    UnassignedPorts { names: Vec<String> },

    /// `get_property` requires the key to hold exactly one value.
    #[error("expected exactly one value for property {key} of {name}, found {count}")]
    PropertyArity {
        name: String,
        key: String,
        count: usize,
    },

    /// A property value was not of the requested type.
    #[error("property {key} of {name} has a different type than requested")]
    PropertyType { name: String, key: String },

    /// `derive_namespace` was called twice with the same name.
    #[error("child namespace {name} already exists in namespace {namespace}")]
    DuplicateNamespace { name: String, namespace: String },

    /// `get_namespace` was called for a child that was never derived.
    #[error("child namespace {name} does not exist in namespace {namespace}")]
    NamespaceNotFound { name: String, namespace: String },

    /// A free-form failure raised by a plugin's build callback.
    #[error("{0}")]
    Build(String),

    /// The union of all errors accumulated during a build.
    #[error("{}", fmt_error_list(.0))]
    Composite(Vec<WiringError>),
}

fn fmt_error_list(errors: &[WiringError]) -> String {
    errors
        .iter()
        .enumerate()
        .map(|(i, err)| format!("Error {i}: {err}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_numbers_each_error() {
        let err = WiringError::Composite(vec![
            WiringError::Build("boom".to_string()),
            WiringError::Undefined {
                name: "a".to_string(),
                namespace: "app".to_string(),
            },
        ]);
        let s = err.to_string();
        assert!(s.contains("Error 0: boom"));
        assert!(s.contains("Error 1: a does not exist"));
    }

    #[test]
    fn build_cycle_prints_stack() {
        let err = WiringError::BuildCycle {
            name: "a".to_string(),
            namespace: "app".to_string(),
            stack: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        };
        assert!(err.to_string().contains("a -> b -> a"));
    }
}
