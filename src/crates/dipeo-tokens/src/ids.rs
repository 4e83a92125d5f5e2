//! Opaque identifiers shared by the token layer and the engine.
//!
//! All four are thin newtypes over `String`: they carry no behavior beyond
//! equality/hashing/display, are unique only *within* a single execution,
//! and are never interpreted by this crate (no parsing, no structure
//! assumed). Keeping them as distinct types rather than bare `String`
//! prevents accidentally passing a `NodeId` where an `EdgeId` is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! opaque_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

opaque_id!(NodeId, "Unique identifier of a node within an execution.");
opaque_id!(EdgeId, "Unique identifier of an edge within an execution.");
opaque_id!(ExecutionId, "Unique identifier of a running or completed execution.");

/// Direction a [`HandleId`] faces on its owning node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Input,
    Output,
}

/// A named, directed port on a node (§3, "HandleId carries direction and a label").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandleId {
    pub direction: Direction,
    pub label: String,
}

impl HandleId {
    pub fn input(label: impl Into<String>) -> Self {
        Self {
            direction: Direction::Input,
            label: label.into(),
        }
    }

    pub fn output(label: impl Into<String>) -> Self {
        Self {
            direction: Direction::Output,
            label: label.into(),
        }
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = match self.direction {
            Direction::Input => "in",
            Direction::Output => "out",
        };
        write!(f, "{dir}:{}", self.label)
    }
}

/// Well-known output handles for CONDITION nodes (§4.1).
pub const BRANCH_TRUE: &str = "true";
pub const BRANCH_FALSE: &str = "false";

/// Well-known node names for the diagram boundary (§3).
pub const START_NODE: &str = "START";
pub const ENDPOINT_NODE: &str = "ENDPOINT";
