//! End-to-end tests for wiring spec evaluation.
//!
//! Each test authors a small wiring spec the way a plugin would, builds the
//! application IR, and verifies the resulting tree: which namespace owns
//! each node, which references became edges, and what survives a failed
//! build.

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use blueprint_ir::{IrNode, NodeRef, NodeType};
use blueprint_wiring::{
    build_application, CollectingHandler, Namespace, WiringError, WiringSpec,
};

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

// ---------------------------------------------------------------------------
// Test IR node types
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct ServiceNode {
    name: String,
    args: Vec<NodeRef>,
}

impl ServiceNode {
    fn new(name: &str) -> Self {
        ServiceNode {
            name: name.to_string(),
            args: Vec::new(),
        }
    }

    fn with_args(name: &str, args: Vec<NodeRef>) -> Self {
        ServiceNode {
            name: name.to_string(),
            args,
        }
    }
}

impl fmt::Display for ServiceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<_> = self.args.iter().map(|a| a.name()).collect();
        write!(f, "{} = Service({})", self.name, args.join(", "))
    }
}

impl IrNode for ServiceNode {
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

/// A container-like node owning the nodes built in its child namespace.
#[derive(Debug)]
struct ContainerNode {
    name: String,
    contained: Vec<NodeRef>,
    args: Vec<NodeRef>,
}

impl fmt::Display for ContainerNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let contained: Vec<_> = self.contained.iter().map(|n| n.name()).collect();
        write!(f, "{} = Container({})", self.name, contained.join(", "))
    }
}

impl IrNode for ContainerNode {
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
        Some(self.contained.clone())
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

/// Basic resolution: a trunk that gets a leaf; both end up as application
/// children, and repeated resolution reuses the same node.
#[test]
fn basic_resolution() {
    init_logging();
    let spec = WiringSpec::new("test");
    spec.define("leaf", NodeType::Service, |_| {
        Ok(Rc::new(ServiceNode::new("leaf")) as NodeRef)
    });
    spec.define("trunk", NodeType::Service, |ns| {
        let leaf = ns.get("leaf")?;
        Ok(Rc::new(ServiceNode::with_args("trunk", vec![leaf])) as NodeRef)
    });

    let app = build_application(&spec, "app", &["trunk"]).unwrap();

    let names: Vec<_> = app.child_nodes().iter().map(|n| n.name()).collect();
    assert_eq!(names, vec!["leaf", "trunk"]);

    let rendered = app.to_string();
    assert!(rendered.contains("trunk = Service(leaf)"));
}

/// Alias chain: a -> b -> c yields one child named c; both alias names
/// memoize to the same node.
#[test]
fn alias_chain_builds_target_once() {
    let spec = WiringSpec::new("test");
    let builds = Rc::new(Cell::new(0u32));
    let counter = builds.clone();
    spec.define("c", NodeType::Service, move |_| {
        counter.set(counter.get() + 1);
        Ok(Rc::new(ServiceNode::new("c")) as NodeRef)
    });
    spec.alias("b", "c");
    spec.alias("a", "b");

    let app = build_application(&spec, "app", &["a"]).unwrap();

    assert_eq!(app.child_nodes().len(), 1);
    assert_eq!(app.child_nodes()[0].name(), "c");
    assert_eq!(builds.get(), 1);
}

/// Cross-namespace edge: a container namespace accepts Process definitions
/// and delegates Service ones to its parent. The service ends up owned by
/// the application, recorded as an edge of the container.
#[test]
fn cross_namespace_edge() {
    init_logging();
    let spec = WiringSpec::new("test");
    spec.define("svc", NodeType::Service, |_| {
        Ok(Rc::new(ServiceNode::new("svc")) as NodeRef)
    });
    spec.define("proc", NodeType::Process, |ns| {
        let svc = ns.get("svc")?;
        Ok(Rc::new(ServiceNode::with_args("proc", vec![svc])) as NodeRef)
    });
    spec.define("ctr", NodeType::Container, |ns| {
        let handler = Rc::new(CollectingHandler::accepting([NodeType::Process]));
        let child = ns.derive_namespace("ctr.namespace", "Container", handler.clone())?;
        child.get("proc")?;
        Ok(Rc::new(ContainerNode {
            name: "ctr".to_string(),
            contained: handler.nodes(),
            args: handler.edges(),
        }) as NodeRef)
    });

    let app = build_application(&spec, "app", &["ctr"]).unwrap();

    // The service was delegated upward and owned by the application root.
    let names: Vec<_> = app.child_nodes().iter().map(|n| n.name()).collect();
    assert!(names.contains(&"svc"));
    assert!(names.contains(&"ctr"));

    let ctr = app
        .child_nodes()
        .iter()
        .find(|n| n.name() == "ctr")
        .unwrap();
    let ctr = blueprint_ir::downcast_node::<ContainerNode>(ctr).unwrap();
    assert_eq!(ctr.contained.len(), 1);
    assert_eq!(ctr.contained[0].name(), "proc");
    assert_eq!(ctr.args.len(), 1);
    assert_eq!(ctr.args[0].name(), "svc");
}

/// Error recovery: the first top-level build fails, the second succeeds. The
/// partial application holds only the second, and the error carries the
/// failing definition's call site.
#[test]
fn error_recovery_returns_partial_ir() {
    let spec = WiringSpec::new("test");
    spec.define("broken", NodeType::Service, |_| {
        Err(WiringError::Build("database exploded".to_string()))
    });
    spec.define("fine", NodeType::Service, |_| {
        Ok(Rc::new(ServiceNode::new("fine")) as NodeRef)
    });

    // "fine" is queued first so it is built before the drain halts.
    let err = build_application(&spec, "app", &["fine", "broken"]).unwrap_err();

    assert_eq!(err.partial.child_nodes().len(), 1);
    assert_eq!(err.partial.child_nodes()[0].name(), "fine");

    let message = err.error.to_string();
    assert!(message.contains("database exploded"));
    assert!(message.contains("build_ir.rs"), "missing callsite: {message}");
}

/// The driver halts the drain at the first error: nodes queued after the
/// failing one are not built.
#[test]
fn drain_halts_on_first_error() {
    let spec = WiringSpec::new("test");
    let late_builds = Rc::new(Cell::new(0u32));
    let counter = late_builds.clone();
    spec.define("broken", NodeType::Service, |_| {
        Err(WiringError::Build("boom".to_string()))
    });
    spec.define("late", NodeType::Service, move |_| {
        counter.set(counter.get() + 1);
        Ok(Rc::new(ServiceNode::new("late")) as NodeRef)
    });

    let err = build_application(&spec, "app", &["broken", "late"]).unwrap_err();
    assert_eq!(err.partial.child_nodes().len(), 0);
    assert_eq!(late_builds.get(), 0);
}

/// A namespace derived inside a build callback can defer work that runs in
/// the same drain, after the currently queued instantiations.
#[test]
fn deferred_work_from_nested_namespace_runs_in_same_drain() {
    let spec = WiringSpec::new("test");
    spec.define("svc", NodeType::Service, |_| {
        Ok(Rc::new(ServiceNode::new("svc")) as NodeRef)
    });
    spec.define("proc", NodeType::Process, |ns: &Namespace| {
        let deferred_ns = ns.clone();
        ns.defer(move || deferred_ns.get("svc").map(|_| ()));
        Ok(Rc::new(ServiceNode::new("proc")) as NodeRef)
    });

    let app = build_application(&spec, "app", &["proc"]).unwrap();
    let names: Vec<_> = app.child_nodes().iter().map(|n| n.name()).collect();
    assert_eq!(names, vec!["proc", "svc"]);
}

/// The diagnostic rendering of the wiring spec lists definitions and
/// aliases; the rendering of the application lists children.
#[test]
fn diagnostic_renderings() {
    let spec = WiringSpec::new("shop");
    spec.define("cart", NodeType::Service, |_| {
        Ok(Rc::new(ServiceNode::new("cart")) as NodeRef)
    });
    spec.alias("basket", "cart");

    let spec_str = spec.to_string();
    assert!(spec_str.contains("shop = WiringSpec {"));
    assert!(spec_str.contains("basket -> cart"));

    let app = build_application(&spec, "shop", &["cart"]).unwrap();
    assert!(app.to_string().contains("cart = Service()"));
}
