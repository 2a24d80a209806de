//! Keyed store of the latest known circle records.
//!
//! # Responsibility
//! - Serve every local read of circle records.
//! - Run the breadth-first flat pull that rebuilds the store from the ledger.
//!
//! # Invariants
//! - The store is replaced wholesale by each pull; records are never patched.
//! - Each id is enqueued at most once per pull, so traversal terminates even
//!   if the ledger reports a cycle.
//! - A failed record fetch prunes that id and everything only reachable
//!   through it; a failed children fetch keeps the record as a leaf.

use crate::model::node::{Node, NodeId, ROOT_ID};
use crate::remote::QueryInterface;
use log::warn;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

/// Flat circle map keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeStore {
    nodes: BTreeMap<NodeId, Node>,
}

/// Result of one flat pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatPull {
    pub store: NodeStore,
    /// Ids dequeued, in visit order.
    pub visited: Vec<NodeId>,
    /// Ids whose record fetch failed.
    pub pruned: Vec<NodeId>,
}

impl NodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from records, last record per id wins.
    pub fn from_nodes(nodes: impl IntoIterator<Item = Node>) -> Self {
        Self {
            nodes: nodes.into_iter().map(|node| (node.id, node)).collect(),
        }
    }

    /// Breadth-first pull from root.
    ///
    /// The queue is processed sequentially; fetch failures are logged and
    /// pruned rather than surfaced.
    pub async fn pull(query: &dyn QueryInterface) -> FlatPull {
        let mut queue = VecDeque::from([ROOT_ID]);
        let mut enqueued = HashSet::from([ROOT_ID]);
        let mut nodes = Vec::new();
        let mut visited = Vec::new();
        let mut pruned = Vec::new();

        while let Some(id) = queue.pop_front() {
            visited.push(id);
            let node = match query.get_node(id).await {
                Ok(node) => node,
                Err(err) => {
                    warn!("event=flat_pull_node module=store status=pruned node_id={id} error={err}");
                    pruned.push(id);
                    continue;
                }
            };
            nodes.push(node);

            let children = match query.get_children(id).await {
                Ok(children) => children,
                Err(err) => {
                    warn!("event=flat_pull_children module=store status=leaf node_id={id} error={err}");
                    continue;
                }
            };
            for child in children {
                if enqueued.insert(child) {
                    queue.push_back(child);
                }
            }
        }

        FlatPull {
            store: Self::from_nodes(nodes),
            visited,
            pruned,
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Records in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    /// Direct children of `id` known locally, ascending id order.
    pub fn children_of(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|node| node.parent_id == id && node.id != id)
            .map(|node| node.id)
            .collect()
    }

    /// Returns the `parent_id` chain from `id` up to root, inclusive.
    ///
    /// Returns `None` when the chain leaves the store or does not reach root
    /// within `len()` steps.
    pub fn path_to_root(&self, id: NodeId) -> Option<Vec<NodeId>> {
        let mut path = vec![id];
        let mut cursor = self.nodes.get(&id)?;
        for _ in 0..self.nodes.len() {
            if cursor.id == ROOT_ID {
                return Some(path);
            }
            cursor = self.nodes.get(&cursor.parent_id)?;
            path.push(cursor.id);
        }
        (cursor.id == ROOT_ID).then_some(path)
    }

    /// Returns whether every stored record reaches root.
    pub fn is_rooted(&self) -> bool {
        self.nodes.keys().all(|id| self.path_to_root(*id).is_some())
    }

    /// All ids below `id` in the local hierarchy.
    pub fn descendants_of(&self, id: NodeId) -> BTreeSet<NodeId> {
        let mut found = BTreeSet::new();
        let mut stack = self.children_of(id);
        while let Some(current) = stack.pop() {
            if current == id || !found.insert(current) {
                continue;
            }
            stack.extend(self.children_of(current));
        }
        found
    }
}
