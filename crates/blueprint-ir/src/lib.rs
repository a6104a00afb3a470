//! Core IR node contracts for Blueprint's intermediate representation.
//!
//! Building a wiring spec produces a tree of IR nodes rooted at an
//! [`ApplicationNode`]. Every node implements [`IrNode`]; capability hooks on
//! the trait distinguish the node kinds the evaluator cares about:
//!
//! - [`IrNode::is_metadata`]: metadata nodes participate in resolution but are
//!   never recorded as cross-namespace edges.
//! - [`IrNode::as_config`]: configuration nodes carry a late-bound string
//!   value (environment variables, addresses).
//! - [`IrNode::as_addressable`]: nodes that stand for a lazily-instantiated
//!   destination (addresses).
//! - [`IrNode::children`]: namespace-like nodes (application, container,
//!   process) expose the nodes they own.
//!
//! Downstream artifact generators consume the finished tree through
//! [`ArtifactGenerator`] and use [`VisitTracker`] to avoid duplicate emission.

pub mod application;
pub mod gen;
pub mod node;
pub mod node_type;
pub mod stringutil;
pub mod topology;

pub use application::ApplicationNode;
pub use gen::{ArtifactGenerator, VisitTracker};
pub use node::{downcast_node, filter_nodes, Addressable, IrConfig, IrNode, NodeRef, NodeTypeError};
pub use node_type::NodeType;
