//! Topology export of a built IR tree.
//!
//! Walks an [`ApplicationNode`] through the [`IrNode::children`] hook and
//! produces a directed containment graph, renderable as Graphviz DOT for
//! debugging. The rendering is diagnostic only; nothing parses it back.

use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};

use crate::application::ApplicationNode;
use crate::node::{IrNode, NodeRef};

/// Builds the containment graph of an application: one graph node per IR
/// node, one edge from each namespace-like node to each of its children.
pub fn containment_graph(app: &ApplicationNode) -> DiGraph<String, ()> {
    let mut graph = DiGraph::new();
    let root = graph.add_node(app.name().to_string());
    if let Some(children) = app.children() {
        for child in &children {
            add_subtree(&mut graph, root, child);
        }
    }
    graph
}

fn add_subtree(graph: &mut DiGraph<String, ()>, parent: NodeIndex, node: &NodeRef) {
    let idx = graph.add_node(node.name().to_string());
    graph.add_edge(parent, idx, ());
    if let Some(children) = node.children() {
        for child in &children {
            add_subtree(graph, idx, child);
        }
    }
}

/// Renders the application's containment graph in Graphviz DOT format.
pub fn to_dot(app: &ApplicationNode) -> String {
    let graph = containment_graph(app);
    format!("{:?}", Dot::with_config(&graph, &[Config::EdgeNoLabel]))
}
