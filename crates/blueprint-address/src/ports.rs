//! Port assignment over a set of bind configs.
//!
//! Intended for use by namespace nodes when concrete ports must be chosen
//! for the [`BindConfig`] nodes they contain. Assignment is deterministic
//! given input order and applies three rules in sequence: pre-assigned ports
//! are preserved, preferred ports are granted if free, and everything else
//! receives the lowest free port at or above its starting point.

use std::collections::HashMap;
use std::rc::Rc;

use blueprint_ir::{filter_nodes, IrNode, NodeRef};
use blueprint_wiring::WiringError;
use tracing::debug;

use crate::BindConfig;

/// The first port handed out when a config expresses no preference.
const DEFAULT_FIRST_PORT: u16 = 2000;

/// Assigns hostname and port to every [`BindConfig`] in `nodes`; other node
/// kinds are ignored.
///
/// Configs arriving with a nonzero port keep it; two such configs on the
/// same port are a conflict. Configs with a preferred port receive it if
/// still free. The rest receive the lowest free port at or above their
/// preferred port, or above 2000 when no preference was given. Ports
/// assigned within one call are pairwise distinct.
///
/// After assignment, each config's preferred port is updated to its assigned
/// port, so a later reassignment round reproduces the same layout.
pub fn assign_ports(hostname: &str, nodes: &[NodeRef]) -> Result<(), WiringError> {
    let addrs = filter_nodes::<BindConfig>(nodes);

    let mut ports: HashMap<u16, Rc<BindConfig>> = HashMap::new();

    // Pre-assigned ports are preserved; collisions between them are errors.
    for addr in &addrs {
        if addr.port() != 0 {
            if let Some(other) = ports.get(&addr.port()) {
                return Err(WiringError::PortConflict {
                    port: addr.port(),
                    first: other.name().to_string(),
                    second: addr.name().to_string(),
                });
            }
            ports.insert(addr.port(), Rc::clone(addr));
        }
    }

    // Preferred ports are granted when free.
    for addr in &addrs {
        if addr.port() == 0 && addr.preferred_port() != 0 {
            let preferred = addr.preferred_port();
            if !ports.contains_key(&preferred) {
                addr.assign(hostname, preferred);
                ports.insert(preferred, Rc::clone(addr));
            }
        }
    }

    // Everything else gets the lowest free port at or above its start.
    for addr in &addrs {
        if addr.port() == 0 {
            let mut candidate = addr.preferred_port();
            if candidate == 0 {
                candidate = DEFAULT_FIRST_PORT;
            }
            while ports.contains_key(&candidate) {
                candidate += 1;
            }
            addr.assign(hostname, candidate);
            ports.insert(candidate, Rc::clone(addr));
        }
    }

    for addr in &addrs {
        addr.set_preferred_port(addr.port());
        debug!(config = addr.name(), port = addr.port(), "assigned port");
    }
    Ok(())
}

/// Fails if any [`BindConfig`] in `nodes` is still missing a port.
pub fn check_ports(nodes: &[NodeRef]) -> Result<(), WiringError> {
    let missing: Vec<String> = filter_nodes::<BindConfig>(nodes)
        .iter()
        .filter(|addr| addr.port() == 0)
        .map(|addr| addr.name().to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(WiringError::UnassignedPorts { names: missing })
    }
}

/// Clears hostname and port from every [`BindConfig`] in `nodes`.
///
/// Used when translating addresses at a namespace boundary, e.g. between
/// ports inside a container and ports exposed outside it.
pub fn reset_ports(nodes: &[NodeRef]) {
    for addr in filter_nodes::<BindConfig>(nodes) {
        addr.clear();
    }
}
