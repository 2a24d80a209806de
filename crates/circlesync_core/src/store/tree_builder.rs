//! Nested display tree assembly.
//!
//! # Responsibility
//! - Pull the display tree recursively from the ledger (tree pull).
//! - Render the pulled tree as an indented outline.
//!
//! # Invariants
//! - A subtree whose record fetch fails is absent; siblings and ancestors stay.
//! - A node whose children fetch fails is kept as a leaf.
//! - Sibling order follows the ledger's child listing.
//! - An id already on the current ancestry path is never expanded again.

use crate::model::node::{NodeId, NodeKind, ROOT_ID};
use crate::remote::QueryInterface;
use futures::future::{join_all, BoxFuture};
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use log::{debug, warn};
use serde::Serialize;

/// Metadata attached to every display node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMeta {
    pub id: NodeId,
    pub kind: NodeKind,
    pub parent_id: NodeId,
}

/// Nested display node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayTree {
    pub label: String,
    pub meta: NodeMeta,
    pub children: Vec<DisplayTree>,
}

impl DisplayTree {
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Self::node_count).sum::<usize>()
    }

    /// Depth of the deepest node, root = 0.
    pub fn depth(&self) -> usize {
        self.children
            .iter()
            .map(|child| child.depth() + 1)
            .max()
            .unwrap_or(0)
    }

    /// Ids in pre-order.
    pub fn ids(&self) -> Vec<NodeId> {
        let mut ids = Vec::with_capacity(self.node_count());
        self.collect_ids(&mut ids);
        ids
    }

    fn collect_ids(&self, ids: &mut Vec<NodeId>) {
        ids.push(self.meta.id);
        for child in &self.children {
            child.collect_ids(ids);
        }
    }

    pub fn find(&self, id: NodeId) -> Option<&DisplayTree> {
        if self.meta.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }

    /// Renders an indented outline, one node per line.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        self.write_outline(0, &mut out);
        out
    }

    fn write_outline(&self, level: usize, out: &mut String) {
        out.push_str(&"  ".repeat(level));
        out.push_str(&format!(
            "{} [{}] (id {})\n",
            self.label, self.meta.kind, self.meta.id
        ));
        for child in &self.children {
            child.write_outline(level + 1, out);
        }
    }
}

/// Pulls display trees from the ledger.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeBuilder {
    /// Max concurrent sibling fetches; `0` fans out without limit.
    fanout: usize,
}

impl TreeBuilder {
    pub fn new(fanout: usize) -> Self {
        Self { fanout }
    }

    /// Recursively pulls the tree from root. Returns `None` if root is unreadable.
    pub async fn pull(&self, query: &dyn QueryInterface) -> Option<DisplayTree> {
        self.pull_subtree(query, ROOT_ID, Vec::new()).await
    }

    fn pull_subtree<'a>(
        &'a self,
        query: &'a dyn QueryInterface,
        id: NodeId,
        mut ancestry: Vec<NodeId>,
    ) -> BoxFuture<'a, Option<DisplayTree>> {
        async move {
            let node = match query.get_node(id).await {
                Ok(node) => node,
                Err(err) => {
                    warn!("event=tree_pull_node module=store status=pruned node_id={id} error={err}");
                    return None;
                }
            };

            let child_ids = match query.get_children(id).await {
                Ok(child_ids) => child_ids,
                Err(err) => {
                    warn!("event=tree_pull_children module=store status=leaf node_id={id} error={err}");
                    Vec::new()
                }
            };

            ancestry.push(id);
            let pending: Vec<_> = child_ids
                .into_iter()
                .filter(|child| {
                    let revisits = ancestry.contains(child);
                    if revisits {
                        debug!("event=tree_pull_cycle module=store status=skipped node_id={child}");
                    }
                    !revisits
                })
                .map(|child| self.pull_subtree(query, child, ancestry.clone()))
                .collect();

            let children: Vec<Option<DisplayTree>> = if self.fanout == 0 {
                join_all(pending).await
            } else {
                stream::iter(pending)
                    .buffered(self.fanout)
                    .collect()
                    .await
            };

            Some(DisplayTree {
                label: node.label,
                meta: NodeMeta {
                    id: node.id,
                    kind: node.kind,
                    parent_id: node.parent_id,
                },
                children: children.into_iter().flatten().collect(),
            })
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::TreeBuilder;
    use crate::model::node::{NodeKind, ROOT_ID};
    use crate::remote::memory::InMemoryLedger;

    #[tokio::test]
    async fn pull_prunes_failed_subtree_and_keeps_siblings() {
        let ledger = InMemoryLedger::new("Anchor");
        let a = ledger.seed(ROOT_ID, "A", NodeKind::Policy);
        let b = ledger.seed(ROOT_ID, "B", NodeKind::Policy);
        let a_child = ledger.seed(a, "A1", NodeKind::Implementation);
        let b_child = ledger.seed(b, "B1", NodeKind::Implementation);
        ledger.fail_node(a);

        let tree = TreeBuilder::new(0).pull(&ledger).await.unwrap();
        assert!(tree.find(a).is_none());
        assert!(tree.find(a_child).is_none());
        assert!(tree.find(b_child).is_some());
        assert_eq!(tree.ids(), vec![ROOT_ID, b, b_child]);
    }

    #[tokio::test]
    async fn pull_treats_children_failure_as_leaf() {
        let ledger = InMemoryLedger::new("Anchor");
        let a = ledger.seed(ROOT_ID, "A", NodeKind::Policy);
        ledger.seed(a, "A1", NodeKind::Policy);
        ledger.fail_children(a);

        let tree = TreeBuilder::new(2).pull(&ledger).await.unwrap();
        let node = tree.find(a).unwrap();
        assert!(node.children.is_empty());
        assert_eq!(tree.node_count(), 2);
    }

    #[tokio::test]
    async fn pull_returns_none_when_root_unreadable() {
        let ledger = InMemoryLedger::new("Anchor");
        ledger.fail_node(ROOT_ID);
        assert!(TreeBuilder::default().pull(&ledger).await.is_none());
    }

    #[tokio::test]
    async fn outline_indents_children_under_parents() {
        let ledger = InMemoryLedger::new("Anchor");
        let a = ledger.seed(ROOT_ID, "A", NodeKind::Policy);
        ledger.seed(a, "A1", NodeKind::Implementation);

        let tree = TreeBuilder::default().pull(&ledger).await.unwrap();
        assert_eq!(tree.depth(), 2);
        assert_eq!(
            tree.outline(),
            "Anchor [policy] (id 0)\n  A [policy] (id 1)\n    A1 [implementation] (id 2)\n"
        );
    }
}
