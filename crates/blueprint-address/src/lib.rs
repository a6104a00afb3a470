//! Addressing between clients and servers in the IR.
//!
//! An address adds one layer of indirection between a client and the node it
//! calls: when a client is built it resolves the address (a metadata node)
//! instead of the destination itself, so the destination is never
//! accidentally instantiated in the wrong namespace. The destination is
//! recorded on the address when the server side is eventually built.
//!
//! An address comes with two configuration nodes: a [`BindConfig`] the
//! server binds to, and a [`DialConfig`] clients dial. [`define`] registers
//! all three under a chosen reachability scope; [`bind`] and [`dial`] are
//! the lookup helpers plugins use inside their build callbacks. Port
//! assignment over a set of bind configs lives in [`ports`].

pub mod ports;

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use blueprint_ir::{
    downcast_node, Addressable, IrConfig, IrNode, NodeRef, NodeType, NodeTypeError,
};
use blueprint_wiring::{Namespace, WiringError, WiringSpec};
use tracing::debug;

pub use ports::{assign_ports, check_ports, reset_ports};

/// The property key under which address metadata is stored.
pub const ADDRESS_PROPERTY: &str = "addr";

/// Address metadata recorded in the wiring spec by [`define`].
#[derive(Debug, Clone)]
pub struct AddressDef {
    pub name: String,
    /// The name of the definition the address points at (the server side).
    pub points_to: String,
    /// The namespace type at which the address and its configs are built.
    pub reachability: NodeType,
}

/// An address IR node: a metadata node holding the (lazily set) destination
/// plus its bind and dial config nodes.
///
/// The type parameter is the node type the destination must downcast to;
/// offering any other node fails with a type error.
#[derive(Debug)]
pub struct Address<T: IrNode> {
    addr_name: String,
    destination: RefCell<Option<Rc<T>>>,
    bind: RefCell<Option<Rc<BindConfig>>>,
    dial: RefCell<Option<Rc<DialConfig>>>,
}

impl<T: IrNode> Address<T> {
    fn new(addr_name: &str) -> Self {
        Address {
            addr_name: addr_name.to_string(),
            destination: RefCell::new(None),
            bind: RefCell::new(None),
            dial: RefCell::new(None),
        }
    }

    /// The destination, if the server side has been instantiated.
    pub fn destination_typed(&self) -> Option<Rc<T>> {
        self.destination.borrow().clone()
    }

    /// The bind config, once resolved via [`bind`].
    pub fn bind_config(&self) -> Option<Rc<BindConfig>> {
        self.bind.borrow().clone()
    }

    /// The dial config, once resolved via [`dial`].
    pub fn dial_config(&self) -> Option<Rc<DialConfig>> {
        self.dial.borrow().clone()
    }
}

impl<T: IrNode> fmt::Display for Address<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.addr_name)
    }
}

impl<T: IrNode> IrNode for Address<T> {
    fn name(&self) -> &str {
        &self.addr_name
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

    fn as_addressable(&self) -> Option<&dyn Addressable> {
        Some(self)
    }
}

impl<T: IrNode> Addressable for Address<T> {
    fn destination(&self) -> Option<NodeRef> {
        self.destination
            .borrow()
            .clone()
            .map(|node| node as NodeRef)
    }

    fn set_destination(&self, node: NodeRef) -> Result<(), NodeTypeError> {
        let actual = node.name().to_string();
        let typed = downcast_node::<T>(&node).ok_or_else(|| NodeTypeError {
            address: self.addr_name.clone(),
            expected: std::any::type_name::<T>(),
            actual,
        })?;
        *self.destination.borrow_mut() = Some(typed);
        Ok(())
    }
}

/// Shared state of the bind and dial config nodes. Hostname and port are
/// bound late, during port assignment.
#[derive(Debug, Default)]
struct AddressConfig {
    hostname: RefCell<Option<String>>,
    port: Cell<u16>,
}

impl AddressConfig {
    fn has_value(&self) -> bool {
        self.hostname.borrow().is_some() && self.port.get() != 0
    }

    fn value(&self) -> Option<String> {
        let hostname = self.hostname.borrow();
        match (hostname.as_deref(), self.port.get()) {
            (Some(host), port) if port != 0 => Some(format!("{host}:{port}")),
            _ => None,
        }
    }
}

/// IR config node for the address a server should bind to.
#[derive(Debug)]
pub struct BindConfig {
    address_name: String,
    key: String,
    config: AddressConfig,
    preferred_port: Cell<u16>,
}

impl BindConfig {
    /// The name of the address metadata node this config belongs to.
    pub fn address_name(&self) -> &str {
        &self.address_name
    }

    pub fn port(&self) -> u16 {
        self.config.port.get()
    }

    /// Pre-assigns a concrete port. Port assignment preserves it.
    pub fn set_port(&self, port: u16) {
        self.config.port.set(port);
    }

    pub fn preferred_port(&self) -> u16 {
        self.preferred_port.get()
    }

    /// Requests a port; granted by port assignment if still free.
    pub fn set_preferred_port(&self, port: u16) {
        self.preferred_port.set(port);
    }

    pub fn hostname(&self) -> Option<String> {
        self.config.hostname.borrow().clone()
    }

    pub(crate) fn assign(&self, hostname: &str, port: u16) {
        *self.config.hostname.borrow_mut() = Some(hostname.to_string());
        self.config.port.set(port);
    }

    pub(crate) fn clear(&self) {
        *self.config.hostname.borrow_mut() = None;
        self.config.port.set(0);
    }
}

impl fmt::Display for BindConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = BindConfig()", self.key)
    }
}

impl IrNode for BindConfig {
    fn name(&self) -> &str {
        &self.key
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_rc(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
    fn as_config(&self) -> Option<&dyn IrConfig> {
        Some(self)
    }
}

impl IrConfig for BindConfig {
    fn optional(&self) -> bool {
        false
    }
    fn has_value(&self) -> bool {
        self.config.has_value()
    }
    fn value(&self) -> Option<String> {
        self.config.value()
    }
}

/// IR config node for the address a client should dial.
#[derive(Debug)]
pub struct DialConfig {
    address_name: String,
    key: String,
    config: AddressConfig,
}

impl DialConfig {
    /// The name of the address metadata node this config belongs to.
    pub fn address_name(&self) -> &str {
        &self.address_name
    }

    pub fn port(&self) -> u16 {
        self.config.port.get()
    }

    pub fn hostname(&self) -> Option<String> {
        self.config.hostname.borrow().clone()
    }
}

impl fmt::Display for DialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = DialConfig()", self.key)
    }
}

impl IrNode for DialConfig {
    fn name(&self) -> &str {
        &self.key
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_rc(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
    fn as_config(&self) -> Option<&dyn IrConfig> {
        Some(self)
    }
}

impl IrConfig for DialConfig {
    fn optional(&self) -> bool {
        false
    }
    fn has_value(&self) -> bool {
        self.config.has_value()
    }
    fn value(&self) -> Option<String> {
        self.config.value()
    }
}

fn bind_name(addr_name: &str) -> String {
    format!("{addr_name}.bind_addr")
}

fn dial_name(addr_name: &str) -> String {
    format!("{addr_name}.dial_addr")
}

/// Defines an address called `addr_name` whose server side is `points_to`.
///
/// Registers three definitions, all scoped at `reachability`: the address
/// metadata node itself, its bind config, and its dial config. The type
/// parameter is the node type the destination must eventually be.
pub fn define<T: IrNode>(
    spec: &WiringSpec,
    addr_name: &str,
    points_to: &str,
    reachability: NodeType,
) {
    spec.set_property(
        addr_name,
        ADDRESS_PROPERTY,
        AddressDef {
            name: addr_name.to_string(),
            points_to: points_to.to_string(),
            reachability,
        },
    );

    let name = addr_name.to_string();
    spec.define(addr_name, reachability, move |_ns| {
        Ok(Rc::new(Address::<T>::new(&name)) as NodeRef)
    });

    let name = addr_name.to_string();
    spec.define(bind_name(addr_name), reachability, move |_ns| {
        Ok(Rc::new(BindConfig {
            address_name: name.clone(),
            key: bind_name(&name),
            config: AddressConfig::default(),
            preferred_port: Cell::new(0),
        }) as NodeRef)
    });

    let name = addr_name.to_string();
    spec.define(dial_name(addr_name), reachability, move |_ns| {
        Ok(Rc::new(DialConfig {
            address_name: name.clone(),
            key: dial_name(&name),
            config: AddressConfig::default(),
        }) as NodeRef)
    });

    debug!(address = addr_name, points_to, "defined address");
}

/// Gets the [`AddressDef`] metadata for an address defined with [`define`].
pub fn get_address(spec: &WiringSpec, name: &str) -> Option<AddressDef> {
    spec.get_property::<AddressDef>(name, ADDRESS_PROPERTY).ok()
}

/// Resolves the address and its dial config from `namespace`.
///
/// Getting the dial config here implicitly records it as an edge of every
/// namespace between the caller and the config's owner.
pub fn dial<T: IrNode>(
    namespace: &Namespace,
    addr_name: &str,
) -> Result<Rc<Address<T>>, WiringError> {
    let addr = namespace.get_as::<Address<T>>(addr_name)?;
    let conf = namespace.get_as::<DialConfig>(&dial_name(addr_name))?;
    *addr.dial.borrow_mut() = Some(conf);
    Ok(addr)
}

/// Resolves the address and its bind config from `namespace`, recording
/// `server` as the address's destination.
///
/// Getting the bind config here implicitly records it as an edge of every
/// namespace between the caller and the config's owner.
pub fn bind<T: IrNode>(
    namespace: &Namespace,
    addr_name: &str,
    server: NodeRef,
) -> Result<Rc<BindConfig>, WiringError> {
    let addr = namespace.get_as::<Address<T>>(addr_name)?;
    let conf = namespace.get_as::<BindConfig>(&bind_name(addr_name))?;
    addr.set_destination(server)?;
    *addr.bind.borrow_mut() = Some(Rc::clone(&conf));
    Ok(conf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use blueprint_wiring::{build_application, CollectingHandler};

    #[derive(Debug)]
    pub(crate) struct ServerNode(pub &'static str);

    impl fmt::Display for ServerNode {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{} = Server()", self.0)
        }
    }

    impl IrNode for ServerNode {
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

    #[derive(Debug)]
    struct OtherNode;

    impl fmt::Display for OtherNode {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "other")
        }
    }

    impl IrNode for OtherNode {
        fn name(&self) -> &str {
            "other"
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_rc(self: Rc<Self>) -> Rc<dyn Any> {
            self
        }
    }

    #[test]
    fn define_registers_addr_and_configs() {
        let spec = WiringSpec::new("test");
        define::<ServerNode>(&spec, "svc.addr", "svc.server", NodeType::Application);

        let def = get_address(&spec, "svc.addr").unwrap();
        assert_eq!(def.points_to, "svc.server");
        assert_eq!(def.reachability, NodeType::Application);

        let defs = spec.defs();
        assert!(defs.contains(&"svc.addr".to_string()));
        assert!(defs.contains(&"svc.addr.bind_addr".to_string()));
        assert!(defs.contains(&"svc.addr.dial_addr".to_string()));
    }

    #[test]
    fn address_is_metadata_and_not_an_edge() {
        let spec = WiringSpec::new("test");
        define::<ServerNode>(&spec, "svc.addr", "svc.server", NodeType::Application);

        let root = Namespace::root(
            &spec,
            "app",
            "TestRoot",
            Rc::new(CollectingHandler::accepting_all()),
        );
        let child_handler = Rc::new(CollectingHandler::accepting([NodeType::Process]));
        let child = root
            .derive_namespace("proc1", "TestProcess", child_handler.clone())
            .unwrap();

        let node = child.get("svc.addr").unwrap();
        assert!(node.is_metadata());
        assert!(node.as_addressable().is_some());
        assert_eq!(child_handler.edges().len(), 0);
    }

    #[test]
    fn dial_attaches_the_dial_config() {
        let spec = WiringSpec::new("test");
        define::<ServerNode>(&spec, "svc.addr", "svc.server", NodeType::Application);
        spec.define("client", NodeType::Service, |ns| {
            let addr = dial::<ServerNode>(ns, "svc.addr")?;
            assert!(addr.dial_config().is_some());
            assert!(!addr.dial_config().unwrap().has_value());
            Ok(Rc::new(ServerNode("client")) as NodeRef)
        });

        build_application(&spec, "app", &["client"]).unwrap();
    }

    #[test]
    fn bind_sets_destination_and_rejects_wrong_kind() {
        let spec = WiringSpec::new("test");
        define::<ServerNode>(&spec, "svc.addr", "svc.server", NodeType::Application);

        let root = Namespace::root(
            &spec,
            "app",
            "TestRoot",
            Rc::new(CollectingHandler::accepting_all()),
        );

        let conf = bind::<ServerNode>(&root, "svc.addr", Rc::new(ServerNode("impl"))).unwrap();
        assert_eq!(conf.address_name(), "svc.addr");

        let addr = root.get_as::<Address<ServerNode>>("svc.addr").unwrap();
        assert_eq!(addr.destination_typed().unwrap().name(), "impl");

        // A second bind with the wrong node kind is a type error.
        let err = bind::<ServerNode>(&root, "svc.addr", Rc::new(OtherNode)).unwrap_err();
        assert!(matches!(err, WiringError::DestinationType(_)));
    }

    #[test]
    fn config_value_renders_hostname_and_port() {
        let spec = WiringSpec::new("test");
        define::<ServerNode>(&spec, "svc.addr", "svc.server", NodeType::Application);
        let root = Namespace::root(
            &spec,
            "app",
            "TestRoot",
            Rc::new(CollectingHandler::accepting_all()),
        );
        let conf = root.get_as::<BindConfig>("svc.addr.bind_addr").unwrap();

        assert!(!conf.has_value());
        assert_eq!(conf.value(), None);
        conf.assign("svchost", 8080);
        assert!(conf.has_value());
        assert_eq!(conf.value().unwrap(), "svchost:8080");
    }
}
