//! The [`NodeType`] tag attached to every wiring definition.
//!
//! The tag governs where in the namespace hierarchy a definition is built: a
//! namespace handler either accepts a tag (builds the node locally) or defers
//! to its parent. Tags say nothing about the Rust type the build callback
//! returns; they are purely a placement policy.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Placement tag for wiring definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    /// Built only at the application root.
    Application,
    /// A container (e.g. a Docker container) holding processes.
    Container,
    /// An OS process holding service instances.
    Process,
    /// A service instance or client.
    Service,
    /// A configuration value.
    Config,
    /// Resolution-only metadata (addresses, visibility markers).
    Metadata,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeType::Application => "Application",
            NodeType::Container => "Container",
            NodeType::Process => "Process",
            NodeType::Service => "Service",
            NodeType::Config => "Config",
            NodeType::Metadata => "Metadata",
        };
        write!(f, "{s}")
    }
}
