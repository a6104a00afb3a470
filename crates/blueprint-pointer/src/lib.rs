//! Pointers: modifier pipelines around a destination node.
//!
//! When a plugin declares a node whose interface can be wrapped by other
//! plugins (tracing, RPC, load balancing, ...), it should also declare a
//! pointer to that node. Other plugins then splice modifiers into the
//! pointer without any knowledge of each other:
//!
//! ```text
//! caller -> [src modifier 1 .. n] -> (interface / address) -> [dst modifier m .. 1] -> destination
//! ```
//!
//! Source-side modifiers grow at the tail, so they compose in the order they
//! were added (caller to wire). Destination-side modifiers grow at the head,
//! so later modifiers wrap earlier ones on the server side.
//!
//! The splicing is implemented with alias rewrites in the wiring spec: every
//! modifier owns a sentinel alias (`<modifier>.ptr.src.next`) that points at
//! the current interface node, and resolving the pointer name walks the
//! whole chain. The destination side is instantiated by a deferred
//! continuation in the namespace of the pointer's first caller, exactly
//! once.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use blueprint_address::get_address;
use blueprint_ir::{Addressable, NodeRef, NodeType};
use blueprint_wiring::{Namespace, WiringError, WiringSpec};
use tracing::info;

/// The property key under which pointer metadata is stored.
pub const POINTER_PROPERTY: &str = "ptr";

struct PointerState {
    name: String,
    src_head: String,
    src_modifiers: Vec<String>,
    src_tail: String,
    /// The node at the client/destination boundary. Starts as the
    /// destination itself; retargeted as dst modifiers and addresses are
    /// added.
    interface_node: String,
    /// Destination-side chain, outermost first; the final entry is the
    /// destination.
    dst_chain: Vec<String>,
}

/// Metadata for a pointer created with [`create_pointer`].
///
/// A cloneable handle stored as the `ptr` property of the pointer's name;
/// plugins retrieve it with [`get_pointer`] to add modifiers.
#[derive(Clone)]
pub struct PointerDef {
    inner: Rc<RefCell<PointerState>>,
}

impl fmt::Display for PointerDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.borrow();
        write!(
            f,
            "[{}] -> [{}]",
            state.src_modifiers.join(" -> "),
            state.dst_chain.join(" -> ")
        )
    }
}

impl fmt::Debug for PointerDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.borrow();
        write!(
            f,
            "PointerDef({} [{}] -> [{}])",
            state.name,
            state.src_modifiers.join(" -> "),
            state.dst_chain.join(" -> ")
        )
    }
}

/// Creates a pointer called `name` that points at `dst`.
///
/// Resolving `name` resolves the source-side chain head, which initially
/// aliases straight to `dst`. Resolution also schedules a deferred
/// continuation that instantiates the destination side, guaranteeing the
/// destination is built exactly once, in the namespace of the first caller.
///
/// Fails if `name` already has a pointer.
pub fn create_pointer(
    spec: &WiringSpec,
    name: &str,
    ptr_type: NodeType,
    dst: &str,
) -> Result<PointerDef, WiringError> {
    if get_pointer(spec, name).is_some() {
        return Err(WiringError::PointerRedefined {
            name: name.to_string(),
        });
    }

    let src_head = format!("{name}.ptr.src");
    spec.alias(&src_head, dst);

    let ptr = PointerDef {
        inner: Rc::new(RefCell::new(PointerState {
            name: name.to_string(),
            src_head: src_head.clone(),
            src_modifiers: Vec::new(),
            src_tail: src_head.clone(),
            interface_node: dst.to_string(),
            dst_chain: vec![dst.to_string()],
        })),
    };

    let build_ptr = ptr.clone();
    spec.define(name, ptr_type, move |ns| {
        // Lazy implicit instantiation of the destination side, in case no
        // namespace instantiates it explicitly.
        let deferred_ptr = build_ptr.clone();
        let deferred_ns = ns.clone();
        ns.defer(move || deferred_ptr.instantiate_dst(&deferred_ns).map(|_| ()));

        ns.get(&src_head)
    });

    spec.set_property(name, POINTER_PROPERTY, ptr.clone());
    Ok(ptr)
}

/// Gets the [`PointerDef`] for a name, if one was created.
pub fn get_pointer(spec: &WiringSpec, name: &str) -> Option<PointerDef> {
    spec.get_property::<PointerDef>(name, POINTER_PROPERTY).ok()
}

impl PointerDef {
    /// The pointer's name.
    pub fn name(&self) -> String {
        self.inner.borrow().name.clone()
    }

    /// Source-side modifier names, in application order (caller to wire).
    pub fn src_modifiers(&self) -> Vec<String> {
        self.inner.borrow().src_modifiers.clone()
    }

    /// Destination-side chain, outermost modifier first, destination last.
    pub fn dst_chain(&self) -> Vec<String> {
        self.inner.borrow().dst_chain.clone()
    }

    /// Appends `modifier` to the source-side modifiers of the pointer.
    ///
    /// Returns the name of the next hop; the modifier's build function
    /// should resolve that name to wrap the downstream chain.
    pub fn add_src_modifier(&self, spec: &WiringSpec, modifier: &str) -> String {
        let mut state = self.inner.borrow_mut();
        spec.alias(&state.src_tail, modifier);
        state.src_tail = format!("{modifier}.ptr.src.next");
        spec.alias(&state.src_tail, &state.interface_node);
        state.src_modifiers.push(modifier.to_string());
        state.src_tail.clone()
    }

    /// Inserts `modifier` at the head of the destination-side chain.
    ///
    /// Returns the name of the previous head; the modifier's build function
    /// should resolve that name to wrap what it now encloses.
    pub fn add_dst_modifier(&self, spec: &WiringSpec, modifier: &str) -> String {
        let mut state = self.inner.borrow_mut();
        let next = state.dst_chain[0].clone();
        state.dst_chain.insert(0, modifier.to_string());
        state.interface_node = modifier.to_string();
        spec.alias(&state.src_tail, &state.interface_node);
        next
    }

    /// Inserts an address at the client/destination boundary of the pointer.
    ///
    /// The address's `points_to` definition becomes the head of the
    /// destination-side chain, and the pointer's interface is retargeted at
    /// the address node itself, so clients resolve the address rather than
    /// the destination. Returns the name of the previous head.
    pub fn add_addr_modifier(
        &self,
        spec: &WiringSpec,
        addr_name: &str,
    ) -> Result<String, WiringError> {
        let addr = get_address(spec, addr_name).ok_or_else(|| WiringError::AddressNotDefined {
            name: addr_name.to_string(),
        })?;
        let next = self.add_dst_modifier(spec, &addr.points_to);

        let mut state = self.inner.borrow_mut();
        state.interface_node = addr_name.to_string();
        spec.alias(&state.src_tail, &state.interface_node);
        Ok(next)
    }

    /// Instantiates the destination side of the pointer in `namespace`.
    ///
    /// When the interface node is an address, the destination chain is only
    /// built if the address has no destination yet; repeat calls (from other
    /// callers of the same pointer) are no-ops. Returns the destination
    /// node, or the interface node itself when no address is involved.
    pub fn instantiate_dst(&self, namespace: &Namespace) -> Result<NodeRef, WiringError> {
        let (name, interface, dst_head) = {
            let state = self.inner.borrow();
            (
                state.name.clone(),
                state.interface_node.clone(),
                state.dst_chain[0].clone(),
            )
        };
        info!(
            pointer = %name,
            namespace = %namespace.name(),
            "instantiating pointer destination"
        );

        let node = namespace.get(&interface)?;
        let Some(addr) = node.as_addressable() else {
            // No address boundary: resolving the interface already built the
            // destination chain.
            return Ok(node);
        };

        if let Some(existing) = addr.destination() {
            return Ok(existing);
        }

        // Building the head of the destination chain cascades down to the
        // destination, which binds itself to the address.
        namespace.instantiate(&dst_head)?;
        addr.destination().ok_or_else(|| {
            WiringError::Build(format!(
                "attempted to instantiate the destination of address {} starting from {dst_head}, \
                 but the destination was never set",
                node.name()
            ))
        })
    }
}

/// Resolves each name, using the pointer destination-instantiation path for
/// names that have pointers. Intended for namespace plugins instantiating
/// the server side of their contents.
pub fn instantiate(
    namespace: &Namespace,
    spec: &WiringSpec,
    names: &[&str],
) -> Result<Vec<NodeRef>, WiringError> {
    let mut nodes = Vec::with_capacity(names.len());
    for name in names {
        let node = match get_pointer(spec, name) {
            Some(ptr) => ptr.instantiate_dst(namespace)?,
            None => namespace.get(name)?,
        };
        nodes.push(node);
    }
    Ok(nodes)
}

/// Resolves each name through [`Namespace::get`], instantiating only the
/// client side of any pointers.
pub fn instantiate_clients(
    namespace: &Namespace,
    names: &[&str],
) -> Result<Vec<NodeRef>, WiringError> {
    names.iter().map(|name| namespace.get(name)).collect()
}
