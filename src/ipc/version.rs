//! Protocol versioning.
//!
//! The worker protocol carries its own semver triple, independent of the
//! crate version. The canonical copy lives in the repo-root
//! `PROTOCOL_VERSION` file; `HEDDLE_PROTOCOL_VERSION` overrides it (used by
//! tests), and a compiled-in copy backs installed binaries running away
//! from a checkout.

use std::fmt;
use std::str::FromStr;

/// Baked-in copy of the sibling `PROTOCOL_VERSION` file.
const COMPILED_PROTOCOL_VERSION: &str = include_str!("../../PROTOCOL_VERSION");

/// Semver triple compared component-wise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for ProtocolVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        let &[major, minor, patch] = parts.as_slice() else {
            return Err(format!("invalid protocol version: {s}"));
        };
        let parse = |part: &str| {
            part.parse::<u32>()
                .map_err(|_| format!("invalid protocol version: {s}"))
        };
        Ok(Self {
            major: parse(major)?,
            minor: parse(minor)?,
            patch: parse(patch)?,
        })
    }
}

/// Outcome of comparing the controller's version against ours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compatibility {
    Exact,
    /// Patch differs; fully compatible.
    PatchDiffers,
    /// Minor differs; compatible, worth a debug note.
    MinorDiffers,
    /// Major differs; the worker must refuse and exit.
    Incompatible,
}

/// Component-wise compatibility check.
pub fn check_compatibility(ours: ProtocolVersion, theirs: ProtocolVersion) -> Compatibility {
    if ours.major != theirs.major {
        Compatibility::Incompatible
    } else if ours.minor != theirs.minor {
        Compatibility::MinorDiffers
    } else if ours.patch != theirs.patch {
        Compatibility::PatchDiffers
    } else {
        Compatibility::Exact
    }
}

/// Resolve this worker's protocol version.
///
/// Order: `HEDDLE_PROTOCOL_VERSION` env, `PROTOCOL_VERSION` file in the
/// current directory, then the compiled-in copy.
pub fn own_version() -> ProtocolVersion {
    if let Ok(raw) = std::env::var("HEDDLE_PROTOCOL_VERSION") {
        if let Ok(version) = raw.parse() {
            return version;
        }
    }
    if let Ok(raw) = std::fs::read_to_string("PROTOCOL_VERSION") {
        if let Ok(version) = raw.parse() {
            return version;
        }
    }
    COMPILED_PROTOCOL_VERSION
        .parse()
        .unwrap_or(ProtocolVersion {
            major: 0,
            minor: 1,
            patch: 0,
        })
}
