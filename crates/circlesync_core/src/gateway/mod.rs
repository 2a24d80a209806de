//! Mutation gateway.
//!
//! # Responsibility
//! - Wrap every remote write with pending-state tracking.
//! - Trigger a hierarchy refresh after each confirmed write.
//! - Convert remote failures into structured `Failed` operations.
//!
//! # Invariants
//! - Exactly one remote write per `submit`; failures are never retried here.
//! - `is_pending()` is true iff some operation is `InFlight`.
//! - Pending state is cleared on every exit path, including a dropped
//!   `submit` future.
//! - Concurrent submissions are not serialized; two racing moves of the same
//!   circle resolve to whichever confirmation the ledger applies last.

use crate::model::node::{NodeId, NodeKind, ROOT_ID};
use crate::model::operation::{OperationId, OperationKind, PendingOperation};
use crate::remote::{CommandInterface, RemoteError};
use crate::sync::synchronizer::Synchronizer;
use crate::workflow::payload::CommitPayload;
use log::{info, warn};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const ABANDONED_MESSAGE: &str = "submission dropped before confirmation";

/// One remote write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Create {
        parent_id: NodeId,
        label: String,
        kind: NodeKind,
    },
    Edit {
        id: NodeId,
        label: String,
        kind: NodeKind,
    },
    Move {
        id: NodeId,
        new_parent_id: NodeId,
    },
    Commit(CommitPayload),
}

impl Mutation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Create { .. } => OperationKind::Create,
            Self::Edit { .. } => OperationKind::Edit,
            Self::Move { .. } => OperationKind::Move,
            Self::Commit(_) => OperationKind::Commit,
        }
    }

    /// Local checks that never need the ledger.
    pub fn precheck(&self) -> Result<(), GatewayError> {
        match self {
            Self::Create { label, .. } => ensure_label(label),
            Self::Edit { id, label, .. } => {
                if *id == ROOT_ID {
                    return Err(GatewayError::RootImmutable);
                }
                ensure_label(label)
            }
            Self::Move { id, new_parent_id } => {
                if *id == ROOT_ID {
                    return Err(GatewayError::RootImmutable);
                }
                if id == new_parent_id {
                    return Err(GatewayError::SelfParent(*id));
                }
                Ok(())
            }
            Self::Commit(_) => Ok(()),
        }
    }
}

fn ensure_label(label: &str) -> Result<(), GatewayError> {
    if label.trim().is_empty() {
        return Err(GatewayError::BlankLabel);
    }
    Ok(())
}

/// Errors raised at the gateway boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Circle label is blank after trim.
    BlankLabel,
    /// Root circle cannot be edited or moved.
    RootImmutable,
    /// Circle cannot become its own parent.
    SelfParent(NodeId),
    /// Ledger failure, message kept verbatim.
    Remote(RemoteError),
}

impl Display for GatewayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankLabel => write!(f, "circle purpose must not be blank"),
            Self::RootImmutable => write!(f, "root circle cannot be edited or moved"),
            Self::SelfParent(id) => write!(f, "circle {id} cannot be its own parent"),
            Self::Remote(err) => write!(f, "{err}"),
        }
    }
}

impl Error for GatewayError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Remote(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RemoteError> for GatewayError {
    fn from(value: RemoteError) -> Self {
        Self::Remote(value)
    }
}

#[derive(Debug, Default)]
struct GatewayState {
    in_flight: BTreeMap<OperationId, PendingOperation>,
    history: Vec<PendingOperation>,
}

/// Submits writes and tracks their lifecycle.
pub struct MutationGateway {
    commands: Arc<dyn CommandInterface>,
    synchronizer: Arc<Synchronizer>,
    state: Mutex<GatewayState>,
}

impl MutationGateway {
    pub fn new(commands: Arc<dyn CommandInterface>, synchronizer: Arc<Synchronizer>) -> Self {
        Self {
            commands,
            synchronizer,
            state: Mutex::new(GatewayState::default()),
        }
    }

    /// Issues one write and waits for confirmation.
    ///
    /// Returns the final record: `Confirmed` (refresh already triggered) or
    /// `Failed` with the raw error message. Never returns `InFlight`.
    pub async fn submit(&self, mutation: Mutation) -> PendingOperation {
        let mut operation = PendingOperation::submitted(mutation.kind());
        let kind = operation.kind.as_str();

        if let Err(err) = mutation.precheck() {
            warn!("event=mutation_precheck module=gateway status=rejected kind={kind} error={err}");
            operation.fail(err.to_string());
            self.lock_state().history.push(operation.clone());
            return operation;
        }

        let mut tracked = TrackedOperation::start(self, operation);
        info!(
            "event=mutation_submit module=gateway status=in_flight kind={kind} op_id={}",
            tracked.operation.id
        );

        match self.dispatch(&mutation).await {
            Ok(metadata) => {
                tracked.operation.confirm(metadata);
                info!(
                    "event=mutation_confirm module=gateway status=ok kind={kind} op_id={}",
                    tracked.operation.id
                );
                self.synchronizer.refresh().await;
            }
            Err(err) => {
                warn!(
                    "event=mutation_confirm module=gateway status=failed kind={kind} op_id={} error={err}",
                    tracked.operation.id
                );
                tracked.operation.fail(err.to_string());
            }
        }

        tracked.operation.clone()
    }

    async fn dispatch(&self, mutation: &Mutation) -> Result<serde_json::Value, GatewayError> {
        let confirmation = match mutation {
            Mutation::Create {
                parent_id,
                label,
                kind,
            } => self.commands.create(*parent_id, label.trim(), *kind).await?,
            Mutation::Edit { id, label, kind } => {
                self.commands.edit(*id, label.trim(), *kind).await?
            }
            Mutation::Move { id, new_parent_id } => {
                self.commands.move_node(*id, *new_parent_id).await?
            }
            Mutation::Commit(payload) => self.commands.commit_organization(payload).await?,
        };
        Ok(confirmation.metadata)
    }

    /// True iff some operation is in flight.
    pub fn is_pending(&self) -> bool {
        !self.lock_state().in_flight.is_empty()
    }

    /// True iff a commit operation is in flight.
    pub fn is_commit_pending(&self) -> bool {
        self.lock_state()
            .in_flight
            .values()
            .any(|operation| operation.kind == OperationKind::Commit)
    }

    pub fn in_flight(&self) -> Vec<PendingOperation> {
        self.lock_state().in_flight.values().cloned().collect()
    }

    /// Finished operations, oldest first.
    pub fn operations(&self) -> Vec<PendingOperation> {
        self.lock_state().history.clone()
    }

    pub fn synchronizer(&self) -> &Arc<Synchronizer> {
        &self.synchronizer
    }

    fn lock_state(&self) -> MutexGuard<'_, GatewayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keeps one operation in `in_flight` for as long as its `submit` lives.
///
/// Dropping the guard moves the operation to history. A drop while the status
/// is still `InFlight` means the caller abandoned the submission, so the
/// record is closed as `Failed`.
struct TrackedOperation<'a> {
    gateway: &'a MutationGateway,
    operation: PendingOperation,
}

impl<'a> TrackedOperation<'a> {
    fn start(gateway: &'a MutationGateway, operation: PendingOperation) -> Self {
        gateway
            .lock_state()
            .in_flight
            .insert(operation.id, operation.clone());
        Self { gateway, operation }
    }
}

impl Drop for TrackedOperation<'_> {
    fn drop(&mut self) {
        if self.operation.is_in_flight() {
            warn!(
                "event=mutation_confirm module=gateway status=abandoned kind={} op_id={}",
                self.operation.kind.as_str(),
                self.operation.id
            );
            self.operation.fail(ABANDONED_MESSAGE);
        }
        let mut state = self.gateway.lock_state();
        state.in_flight.remove(&self.operation.id);
        state.history.push(self.operation.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::{GatewayError, Mutation, MutationGateway, ABANDONED_MESSAGE};
    use crate::model::node::{NodeId, NodeKind, ROOT_ID};
    use crate::model::operation::{OperationKind, OperationStatus};
    use crate::remote::memory::InMemoryLedger;
    use crate::remote::{CommandInterface, Confirmation, RemoteResult};
    use crate::store::tree_builder::TreeBuilder;
    use crate::sync::synchronizer::Synchronizer;
    use crate::workflow::payload::CommitPayload;
    use async_trait::async_trait;
    use futures::FutureExt;
    use std::sync::Arc;

    /// Writes that never confirm.
    struct StalledCommands;

    #[async_trait]
    impl CommandInterface for StalledCommands {
        async fn create(&self, _: NodeId, _: &str, _: NodeKind) -> RemoteResult<Confirmation> {
            std::future::pending().await
        }

        async fn edit(&self, _: NodeId, _: &str, _: NodeKind) -> RemoteResult<Confirmation> {
            std::future::pending().await
        }

        async fn move_node(&self, _: NodeId, _: NodeId) -> RemoteResult<Confirmation> {
            std::future::pending().await
        }

        async fn commit_organization(&self, _: &CommitPayload) -> RemoteResult<Confirmation> {
            std::future::pending().await
        }
    }

    fn stalled_gateway() -> MutationGateway {
        let ledger = Arc::new(InMemoryLedger::new("Anchor"));
        let sync = Arc::new(Synchronizer::new(ledger, TreeBuilder::default()));
        MutationGateway::new(Arc::new(StalledCommands), sync)
    }

    #[test]
    fn precheck_rejects_root_and_blank_labels() {
        let edit_root = Mutation::Edit {
            id: ROOT_ID,
            label: "x".to_string(),
            kind: NodeKind::Policy,
        };
        assert_eq!(edit_root.precheck(), Err(GatewayError::RootImmutable));

        let move_root = Mutation::Move {
            id: ROOT_ID,
            new_parent_id: 3,
        };
        assert_eq!(move_root.precheck(), Err(GatewayError::RootImmutable));

        let blank = Mutation::Create {
            parent_id: ROOT_ID,
            label: "   ".to_string(),
            kind: NodeKind::Implementation,
        };
        assert_eq!(blank.precheck(), Err(GatewayError::BlankLabel));
        assert_eq!(blank.kind(), OperationKind::Create);

        let onto_self = Mutation::Move {
            id: 4,
            new_parent_id: 4,
        };
        assert_eq!(onto_self.precheck(), Err(GatewayError::SelfParent(4)));
    }

    #[test]
    fn dropped_submission_is_closed_as_failed() {
        let gateway = stalled_gateway();
        {
            let mut submit = Box::pin(gateway.submit(Mutation::Commit(CommitPayload {
                members: Vec::new(),
                anchor_purpose: "P".to_string(),
                roles: Vec::new(),
                assignments: Vec::new(),
            })));
            assert!((&mut submit).now_or_never().is_none());
            assert!(gateway.is_pending());
            assert!(gateway.is_commit_pending());
        }

        assert!(!gateway.is_pending());
        assert!(!gateway.is_commit_pending());
        let operations = gateway.operations();
        assert_eq!(operations.len(), 1);
        assert_eq!(operations[0].status, OperationStatus::Failed);
        assert_eq!(operations[0].error.as_deref(), Some(ABANDONED_MESSAGE));
    }

    #[tokio::test]
    async fn timed_out_submission_releases_pending_state() {
        let gateway = stalled_gateway();
        let result = tokio::time::timeout(
            std::time::Duration::from_millis(10),
            gateway.submit(Mutation::Create {
                parent_id: ROOT_ID,
                label: "Ops".to_string(),
                kind: NodeKind::Policy,
            }),
        )
        .await;

        assert!(result.is_err());
        assert!(!gateway.is_pending());
        assert!(gateway.in_flight().is_empty());
        assert!(gateway.operations()[0].is_failed());
    }
}
