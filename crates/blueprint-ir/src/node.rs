//! The [`IrNode`] trait and its capability hooks.
//!
//! IR nodes are built once by the evaluator and then shared by reference;
//! [`NodeRef`] is the shared handle. Node identity is pointer identity:
//! resolving the same name twice within a namespace yields the same `Rc`.
//!
//! Nodes that must be filled in after construction (an address learning its
//! destination, a bind config receiving a port) use interior mutability;
//! evaluation is single-threaded, so `Cell`/`RefCell` suffice.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

/// Shared handle to a built IR node.
pub type NodeRef = Rc<dyn IrNode>;

/// The interface implemented by every IR node.
///
/// `name` identifies the node; `Display` renders the diagnostic description.
/// The capability hooks default to "plain node" and are overridden by the
/// node kinds that need them.
pub trait IrNode: Any + fmt::Debug + fmt::Display {
    /// The node's unique name within its owning namespace.
    fn name(&self) -> &str;

    /// Borrowed downcast hook.
    fn as_any(&self) -> &dyn Any;

    /// Owned downcast hook, for recovering a typed `Rc` from a [`NodeRef`].
    fn as_any_rc(self: Rc<Self>) -> Rc<dyn Any>;

    /// Metadata nodes are consumed in place by the plugin that resolves them
    /// and never become edges of a referencing namespace.
    fn is_metadata(&self) -> bool {
        false
    }

    /// Returns the configuration view of this node, if it is a config node.
    fn as_config(&self) -> Option<&dyn IrConfig> {
        None
    }

    /// Returns the addressable view of this node, if it stands for a
    /// lazily-instantiated destination.
    fn as_addressable(&self) -> Option<&dyn Addressable> {
        None
    }

    /// Namespace-like nodes (application, container, process) expose the
    /// nodes they own so that generators can recurse.
    fn children(&self) -> Option<Vec<NodeRef>> {
        None
    }
}

/// A configured or configurable variable in the IR.
///
/// Config nodes typically map down to environment variables or command line
/// arguments in a generated application. Values are always strings.
pub trait IrConfig: IrNode {
    /// Whether the application can start without this value being set.
    fn optional(&self) -> bool;

    /// Whether a concrete value has been bound yet.
    fn has_value(&self) -> bool;

    /// The bound value, if any.
    fn value(&self) -> Option<String>;
}

/// An IR node that stands for a destination instantiated elsewhere, later.
///
/// The evaluator uses this to guarantee a pointer's destination is built
/// exactly once: the first resolution that reaches the addressable node and
/// finds no destination triggers instantiation; every later one is a no-op.
pub trait Addressable: IrNode {
    /// The destination node, if it has been instantiated.
    fn destination(&self) -> Option<NodeRef>;

    /// Records the destination node. Fails if the node is not of the kind
    /// this address was declared to point at.
    fn set_destination(&self, node: NodeRef) -> Result<(), NodeTypeError>;
}

/// The destination offered to an addressable node was of the wrong kind.
#[derive(Debug, Clone, Error)]
#[error("address {address} expected a destination of type {expected}, got {actual}")]
pub struct NodeTypeError {
    pub address: String,
    pub expected: &'static str,
    pub actual: String,
}

/// Recovers a typed `Rc` from a [`NodeRef`], if the node is a `T`.
pub fn downcast_node<T: IrNode>(node: &NodeRef) -> Option<Rc<T>> {
    Rc::clone(node).as_any_rc().downcast::<T>().ok()
}

/// Filters a node list down to the nodes of a particular type.
pub fn filter_nodes<T: IrNode>(nodes: &[NodeRef]) -> Vec<Rc<T>> {
    nodes.iter().filter_map(downcast_node::<T>).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Plain {
        name: String,
    }

    impl fmt::Display for Plain {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.name)
        }
    }

    impl IrNode for Plain {
        fn name(&self) -> &str {
            &self.name
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_rc(self: Rc<Self>) -> Rc<dyn Any> {
            self
        }
    }

    #[derive(Debug)]
    struct Marker;

    impl fmt::Display for Marker {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "marker")
        }
    }

    impl IrNode for Marker {
        fn name(&self) -> &str {
            "marker"
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_rc(self: Rc<Self>) -> Rc<dyn Any> {
            self
        }
        fn is_metadata(&self) -> bool {
            true
        }
    }

    #[test]
    fn downcast_recovers_concrete_type() {
        let node: NodeRef = Rc::new(Plain {
            name: "a".to_string(),
        });
        let typed = downcast_node::<Plain>(&node).unwrap();
        assert_eq!(typed.name(), "a");
        assert!(downcast_node::<Marker>(&node).is_none());
    }

    #[test]
    fn filter_selects_matching_nodes() {
        let nodes: Vec<NodeRef> = vec![
            Rc::new(Plain {
                name: "a".to_string(),
            }),
            Rc::new(Marker),
            Rc::new(Plain {
                name: "b".to_string(),
            }),
        ];
        let plains = filter_nodes::<Plain>(&nodes);
        assert_eq!(plains.len(), 2);
        assert_eq!(plains[1].name(), "b");
    }

    #[test]
    fn default_capabilities_are_absent() {
        let node: NodeRef = Rc::new(Plain {
            name: "a".to_string(),
        });
        assert!(!node.is_metadata());
        assert!(node.as_config().is_none());
        assert!(node.as_addressable().is_none());
        assert!(node.children().is_none());
    }
}
