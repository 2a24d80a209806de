//! In-process ledger implementing both remote interfaces.
//!
//! # Responsibility
//! - Provide a deterministic remote for the CLI demo and tests.
//! - Emit `Created`/`Moved`/`Edited` events after each confirmed write.
//! - Allow fault injection: failing record/children fetches, rejected
//!   writes, and a read gate that suspends every read until released.
//!
//! # Invariants
//! - Root (`ROOT_ID`) always exists and rejects edit/move.
//! - Child listings are ordered by ascending id.
//! - Moves that would create a cycle are rejected.

use crate::model::node::{Node, NodeId, NodeKind, ROOT_ID};
use crate::remote::{
    CommandInterface, Confirmation, EventHandler, QueryInterface, RemoteError, RemoteEvent,
    RemoteEventKind, RemoteResult, Subscription,
};
use crate::workflow::payload::CommitPayload;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

#[derive(Default)]
struct LedgerState {
    nodes: BTreeMap<NodeId, Node>,
    next_id: NodeId,
    dangling_children: BTreeMap<NodeId, Vec<NodeId>>,
    failing_nodes: HashSet<NodeId>,
    failing_children: HashSet<NodeId>,
    reject_writes: Option<String>,
    commit_metadata: Option<Value>,
    organizations: Vec<CommitPayload>,
    node_fetches: Vec<NodeId>,
}

#[derive(Default)]
struct ListenerTable {
    next_key: u64,
    handlers: Vec<(u64, RemoteEventKind, EventHandler)>,
}

/// Deterministic in-memory ledger.
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
    listeners: Arc<Mutex<ListenerTable>>,
    reads_open: AtomicBool,
    read_gate: Notify,
}

impl InMemoryLedger {
    /// Creates a ledger holding only the root circle.
    pub fn new(root_label: impl Into<String>) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(ROOT_ID, Node::root(root_label));
        Self {
            state: Mutex::new(LedgerState {
                nodes,
                next_id: ROOT_ID + 1,
                ..LedgerState::default()
            }),
            listeners: Arc::new(Mutex::new(ListenerTable::default())),
            reads_open: AtomicBool::new(true),
            read_gate: Notify::new(),
        }
    }

    /// Inserts one circle without emitting an event. Returns its id.
    pub fn seed(&self, parent_id: NodeId, label: &str, kind: NodeKind) -> NodeId {
        let mut state = self.lock_state();
        let id = state.next_id;
        state.next_id += 1;
        state.nodes.insert(id, Node::new(id, label, kind, parent_id));
        id
    }

    /// Lists `child_id` under `parent_id` without a backing record.
    pub fn add_dangling_child(&self, parent_id: NodeId, child_id: NodeId) {
        self.lock_state()
            .dangling_children
            .entry(parent_id)
            .or_default()
            .push(child_id);
    }

    /// Makes `get_node(id)` fail until cleared.
    pub fn fail_node(&self, id: NodeId) {
        self.lock_state().failing_nodes.insert(id);
    }

    /// Makes `get_children(id)` fail until cleared.
    pub fn fail_children(&self, id: NodeId) {
        self.lock_state().failing_children.insert(id);
    }

    pub fn clear_faults(&self) {
        let mut state = self.lock_state();
        state.failing_nodes.clear();
        state.failing_children.clear();
        state.reject_writes = None;
    }

    /// Rejects every write with `message` until cleared.
    pub fn reject_writes(&self, message: impl Into<String>) {
        self.lock_state().reject_writes = Some(message.into());
    }

    /// Overrides the metadata returned by `commit_organization`.
    pub fn set_commit_metadata(&self, metadata: Value) {
        self.lock_state().commit_metadata = Some(metadata);
    }

    /// Suspends every read until `open_reads` is called.
    pub fn hold_reads(&self) {
        self.reads_open.store(false, Ordering::SeqCst);
    }

    pub fn open_reads(&self) {
        self.reads_open.store(true, Ordering::SeqCst);
        self.read_gate.notify_waiters();
    }

    /// Returns ids passed to `get_node`, in call order.
    pub fn node_fetches(&self) -> Vec<NodeId> {
        self.lock_state().node_fetches.clone()
    }

    pub fn organizations(&self) -> Vec<CommitPayload> {
        self.lock_state().organizations.clone()
    }

    pub fn node(&self, id: NodeId) -> Option<Node> {
        self.lock_state().nodes.get(&id).cloned()
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).handlers.len()
    }

    /// Delivers one event to matching listeners, as another writer would.
    pub fn emit(&self, kind: RemoteEventKind, node_id: Option<NodeId>) {
        let event = RemoteEvent { kind, node_id };
        let handlers: Vec<EventHandler> = lock(&self.listeners)
            .handlers
            .iter()
            .filter(|(_, handler_kind, _)| *handler_kind == kind)
            .map(|(_, _, handler)| Arc::clone(handler))
            .collect();
        for handler in handlers {
            handler(&event);
        }
    }

    async fn wait_for_reads(&self) {
        loop {
            let notified = self.read_gate.notified();
            if self.reads_open.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, LedgerState> {
        lock(&self.state)
    }

    fn ensure_writable(state: &LedgerState) -> RemoteResult<()> {
        match &state.reject_writes {
            Some(message) => Err(RemoteError::Rejected(message.clone())),
            None => Ok(()),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn would_create_cycle(
    nodes: &BTreeMap<NodeId, Node>,
    node_id: NodeId,
    candidate_parent: NodeId,
) -> bool {
    let mut visited = HashSet::new();
    let mut cursor = candidate_parent;
    loop {
        if cursor == node_id || !visited.insert(cursor) {
            return true;
        }
        if cursor == ROOT_ID {
            return false;
        }
        match nodes.get(&cursor) {
            Some(node) => cursor = node.parent_id,
            None => return true,
        }
    }
}

#[async_trait]
impl QueryInterface for InMemoryLedger {
    async fn get_node(&self, id: NodeId) -> RemoteResult<Node> {
        self.wait_for_reads().await;
        let mut state = self.lock_state();
        state.node_fetches.push(id);
        if state.failing_nodes.contains(&id) {
            return Err(RemoteError::Unavailable(format!("read of circle {id} failed")));
        }
        state.nodes.get(&id).cloned().ok_or(RemoteError::NotFound(id))
    }

    async fn get_children(&self, id: NodeId) -> RemoteResult<Vec<NodeId>> {
        self.wait_for_reads().await;
        let state = self.lock_state();
        if state.failing_children.contains(&id) {
            return Err(RemoteError::Unavailable(format!(
                "children read of circle {id} failed"
            )));
        }
        if !state.nodes.contains_key(&id) {
            return Err(RemoteError::NotFound(id));
        }
        let mut children: Vec<NodeId> = state
            .nodes
            .values()
            .filter(|node| node.parent_id == id && !node.is_root())
            .map(|node| node.id)
            .collect();
        if let Some(extra) = state.dangling_children.get(&id) {
            children.extend(extra.iter().copied());
        }
        Ok(children)
    }

    fn subscribe(&self, kind: RemoteEventKind, handler: EventHandler) -> Subscription {
        let key = {
            let mut table = lock(&self.listeners);
            let key = table.next_key;
            table.next_key += 1;
            table.handlers.push((key, kind, handler));
            key
        };
        let listeners = Arc::clone(&self.listeners);
        Subscription::new(move || {
            lock(&listeners)
                .handlers
                .retain(|(entry_key, _, _)| *entry_key != key);
        })
    }
}

#[async_trait]
impl CommandInterface for InMemoryLedger {
    async fn create(
        &self,
        parent_id: NodeId,
        label: &str,
        kind: NodeKind,
    ) -> RemoteResult<Confirmation> {
        let id = {
            let mut state = self.lock_state();
            Self::ensure_writable(&state)?;
            if !state.nodes.contains_key(&parent_id) {
                return Err(RemoteError::Rejected(format!(
                    "parent circle {parent_id} does not exist"
                )));
            }
            let id = state.next_id;
            state.next_id += 1;
            state.nodes.insert(id, Node::new(id, label, kind, parent_id));
            id
        };
        self.emit(RemoteEventKind::Created, Some(id));
        Ok(Confirmation::new(json!({ "created_id": id })))
    }

    async fn edit(&self, id: NodeId, label: &str, kind: NodeKind) -> RemoteResult<Confirmation> {
        {
            let mut state = self.lock_state();
            Self::ensure_writable(&state)?;
            if id == ROOT_ID {
                return Err(RemoteError::Rejected("root circle is immutable".to_string()));
            }
            let node = state.nodes.get_mut(&id).ok_or(RemoteError::NotFound(id))?;
            node.label = label.to_string();
            node.kind = kind;
        }
        self.emit(RemoteEventKind::Edited, Some(id));
        Ok(Confirmation::new(json!({ "id": id })))
    }

    async fn move_node(&self, id: NodeId, new_parent_id: NodeId) -> RemoteResult<Confirmation> {
        {
            let mut state = self.lock_state();
            Self::ensure_writable(&state)?;
            if id == ROOT_ID {
                return Err(RemoteError::Rejected("root circle cannot move".to_string()));
            }
            if !state.nodes.contains_key(&id) {
                return Err(RemoteError::NotFound(id));
            }
            if !state.nodes.contains_key(&new_parent_id) {
                return Err(RemoteError::Rejected(format!(
                    "parent circle {new_parent_id} does not exist"
                )));
            }
            if would_create_cycle(&state.nodes, id, new_parent_id) {
                return Err(RemoteError::Rejected(format!(
                    "moving circle {id} under {new_parent_id} would create a cycle"
                )));
            }
            if let Some(node) = state.nodes.get_mut(&id) {
                node.parent_id = new_parent_id;
            }
        }
        self.emit(RemoteEventKind::Moved, Some(id));
        Ok(Confirmation::new(json!({ "id": id, "parent_id": new_parent_id })))
    }

    async fn commit_organization(&self, payload: &CommitPayload) -> RemoteResult<Confirmation> {
        let mut state = self.lock_state();
        Self::ensure_writable(&state)?;
        state.organizations.push(payload.clone());
        let metadata = match &state.commit_metadata {
            Some(metadata) => metadata.clone(),
            None => json!({ "created_id": format!("org-{}", state.organizations.len()) }),
        };
        Ok(Confirmation::new(metadata))
    }
}
