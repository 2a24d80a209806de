//! Remote ledger contracts consumed by the synchronizer and gateway.
//!
//! # Responsibility
//! - Define the read (`QueryInterface`) and write (`CommandInterface`) seams.
//! - Define remote event kinds and disposable subscription handles.
//!
//! # Invariants
//! - Every remote call is a suspending operation.
//! - A `Subscription` unregisters its handler exactly once, on `dispose` or drop.

pub mod memory;

use crate::model::node::{Node, NodeId, NodeKind};
use crate::workflow::payload::CommitPayload;
use async_trait::async_trait;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Result type used by remote ledger calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Errors reported by the remote ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Requested circle does not exist.
    NotFound(NodeId),
    /// Transport or node failure.
    Unavailable(String),
    /// Ledger refused the write (revert reason, user rejection).
    Rejected(String),
}

impl Display for RemoteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "circle not found: {id}"),
            Self::Unavailable(message) => write!(f, "remote unavailable: {message}"),
            Self::Rejected(message) => write!(f, "{message}"),
        }
    }
}

impl Error for RemoteError {}

/// Remote mutation event kinds that invalidate the local view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteEventKind {
    Created,
    Moved,
    Edited,
}

impl RemoteEventKind {
    /// Kinds the synchronizer listens to.
    pub const ALL: [RemoteEventKind; 3] = [Self::Created, Self::Moved, Self::Edited];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Moved => "moved",
            Self::Edited => "edited",
        }
    }
}

/// One remote mutation notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEvent {
    pub kind: RemoteEventKind,
    /// Affected circle, when the ledger reports it.
    pub node_id: Option<NodeId>,
}

/// Callback invoked for matching remote events.
pub type EventHandler = Arc<dyn Fn(&RemoteEvent) + Send + Sync>;

/// Ledger confirmation of one write.
#[derive(Debug, Clone, PartialEq)]
pub struct Confirmation {
    /// Receipt metadata (emitted event arguments).
    pub metadata: Value,
}

impl Confirmation {
    pub fn new(metadata: Value) -> Self {
        Self { metadata }
    }
}

/// Disposable registration handle returned by `QueryInterface::subscribe`.
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Handle that owns no registration.
    pub fn inert() -> Self {
        Self { release: None }
    }

    pub fn is_active(&self) -> bool {
        self.release.is_some()
    }

    /// Unregisters the handler now.
    pub fn dispose(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Read side of the remote ledger.
#[async_trait]
pub trait QueryInterface: Send + Sync {
    /// Loads one circle record. Fails with `NotFound` when absent.
    async fn get_node(&self, id: NodeId) -> RemoteResult<Node>;
    /// Lists direct child ids of one circle.
    async fn get_children(&self, id: NodeId) -> RemoteResult<Vec<NodeId>>;
    /// Registers a handler for one event kind.
    fn subscribe(&self, kind: RemoteEventKind, handler: EventHandler) -> Subscription;
}

/// Write side of the remote ledger. Each call resolves once the write is confirmed.
#[async_trait]
pub trait CommandInterface: Send + Sync {
    async fn create(
        &self,
        parent_id: NodeId,
        label: &str,
        kind: NodeKind,
    ) -> RemoteResult<Confirmation>;
    async fn edit(&self, id: NodeId, label: &str, kind: NodeKind) -> RemoteResult<Confirmation>;
    async fn move_node(&self, id: NodeId, new_parent_id: NodeId) -> RemoteResult<Confirmation>;
    /// Creates a whole organization in one atomic write.
    async fn commit_organization(&self, payload: &CommitPayload) -> RemoteResult<Confirmation>;
}
