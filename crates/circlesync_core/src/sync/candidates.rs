//! Candidate lists for edit/move forms.
//!
//! # Invariants
//! - Root never appears as an editable or movable candidate.
//! - Move targets for a node exclude the node itself and its descendants,
//!   so a selected target can never create a cycle in the local view.

use crate::model::node::{Node, NodeId};
use crate::store::node_store::NodeStore;

/// Selectable circle entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateOption {
    pub id: NodeId,
    /// `"<label> [<kind>] (id <id>)"`.
    pub display: String,
}

impl CandidateOption {
    fn from_node(node: &Node) -> Self {
        Self {
            id: node.id,
            display: format!("{} [{}] (id {})", node.label, node.kind, node.id),
        }
    }
}

/// Circles whose label/kind may be edited.
pub fn editable_candidates(store: &NodeStore) -> Vec<CandidateOption> {
    non_root(store)
}

/// Circles that may be moved.
pub fn movable_candidates(store: &NodeStore) -> Vec<CandidateOption> {
    non_root(store)
}

/// Valid new parents for `node_id`.
pub fn move_targets(store: &NodeStore, node_id: NodeId) -> Vec<CandidateOption> {
    let excluded = store.descendants_of(node_id);
    store
        .iter()
        .filter(|node| node.id != node_id && !excluded.contains(&node.id))
        .map(CandidateOption::from_node)
        .collect()
}

fn non_root(store: &NodeStore) -> Vec<CandidateOption> {
    store
        .iter()
        .filter(|node| !node.is_root())
        .map(CandidateOption::from_node)
        .collect()
}
