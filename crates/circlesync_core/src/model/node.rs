//! Circle node model.
//!
//! # Responsibility
//! - Define the canonical record for one circle in the governance hierarchy.
//!
//! # Invariants
//! - `ROOT_ID` is self-parented and always exists.
//! - Following `parent_id` from any node reaches `ROOT_ID`.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Stable circle identifier assigned by the remote ledger.
pub type NodeId = u64;

/// Identifier of the root (anchor) circle.
pub const ROOT_ID: NodeId = 0;

/// Circle category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Governance circle (ledger code `0`).
    #[default]
    Policy,
    /// Operational circle (ledger code `1`).
    Implementation,
}

impl NodeKind {
    /// Maps ledger numeric code to kind.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Policy),
            1 => Some(Self::Implementation),
            _ => None,
        }
    }

    /// Returns ledger numeric code.
    pub fn code(self) -> u8 {
        match self {
            Self::Policy => 0,
            Self::Implementation => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Policy => "policy",
            Self::Implementation => "implementation",
        }
    }
}

impl Display for NodeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest known record for one circle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// Circle purpose shown as the node label.
    pub label: String,
    pub kind: NodeKind,
    /// Parent circle. Root points at itself.
    pub parent_id: NodeId,
    /// Ledger existence flag.
    pub exists: bool,
}

impl Node {
    /// Creates an existing, non-root circle record.
    pub fn new(id: NodeId, label: impl Into<String>, kind: NodeKind, parent_id: NodeId) -> Self {
        Self {
            id,
            label: label.into(),
            kind,
            parent_id,
            exists: true,
        }
    }

    /// Creates the self-parented root record.
    pub fn root(label: impl Into<String>) -> Self {
        Self::new(ROOT_ID, label, NodeKind::Policy, ROOT_ID)
    }

    pub fn is_root(&self) -> bool {
        self.id == ROOT_ID
    }
}
