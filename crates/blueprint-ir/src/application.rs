//! The root IR node of a compiled application.
//!
//! Building a wiring spec yields an [`ApplicationNode`] whose children are
//! the top-level nodes built in the root namespace. The node is returned even
//! when evaluation fails partway, carrying whatever was built so far.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::node::{IrNode, NodeRef};
use crate::stringutil::indent;

/// The IR node representing the whole application.
#[derive(Debug)]
pub struct ApplicationNode {
    name: String,
    children: Vec<NodeRef>,
}

impl ApplicationNode {
    pub fn new(name: impl Into<String>, children: Vec<NodeRef>) -> Self {
        ApplicationNode {
            name: name.into(),
            children,
        }
    }

    /// The top-level nodes built in the root namespace, in build order.
    pub fn child_nodes(&self) -> &[NodeRef] {
        &self.children
    }
}

impl fmt::Display for ApplicationNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} = BlueprintApplication() {{", self.name)?;
        for child in &self.children {
            writeln!(f, "{}", indent(&child.to_string(), 2))?;
        }
        write!(f, "}}")
    }
}

impl IrNode for ApplicationNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_rc(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }

    fn children(&self) -> Option<Vec<NodeRef>> {
        Some(self.children.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Leaf(&'static str);

    impl fmt::Display for Leaf {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{} = Leaf()", self.0)
        }
    }

    impl IrNode for Leaf {
        fn name(&self) -> &str {
            self.0
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_rc(self: Rc<Self>) -> Rc<dyn Any> {
            self
        }
    }

    #[test]
    fn renders_children_indented() {
        let app = ApplicationNode::new("app", vec![Rc::new(Leaf("a")), Rc::new(Leaf("b"))]);
        let s = app.to_string();
        assert!(s.starts_with("app = BlueprintApplication() {"));
        assert!(s.contains("  a = Leaf()"));
        assert!(s.contains("  b = Leaf()"));
        assert!(s.ends_with("}"));
    }

    #[test]
    fn exposes_children() {
        let app = ApplicationNode::new("app", vec![Rc::new(Leaf("a"))]);
        assert_eq!(app.children().unwrap().len(), 1);
        assert_eq!(app.name(), "app");
    }
}
