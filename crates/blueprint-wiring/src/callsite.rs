//! Call-site capture for wiring definitions.
//!
//! Every `define` records where in the wiring spec it was called from, via
//! `#[track_caller]`. The capture is attached to the definition under the
//! reserved `callsite` property key and surfaced in build-failure errors and
//! log lines.

use std::fmt;
use std::panic::Location;

use serde::Serialize;

/// The source location of a `define` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Callsite {
    pub file: &'static str,
    pub line: u32,
    pub column: u32,
}

impl Callsite {
    /// Captures the caller's location. Propagates through `#[track_caller]`
    /// frames, so a tracked wrapper reports its own caller.
    #[track_caller]
    pub fn capture() -> Self {
        let loc = Location::caller();
        Callsite {
            file: loc.file(),
            line: loc.line(),
            column: loc.column(),
        }
    }
}

impl fmt::Display for Callsite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}
