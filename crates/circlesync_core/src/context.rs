//! Explicit owner of one ledger connection.
//!
//! # Responsibility
//! - Wire the synchronizer, gateway and workflow factories to one pair of
//!   remote interfaces.
//! - Hold the remote event subscription between `start` and `dispose`.
//!
//! # Invariants
//! - After `dispose` no remote handler stays registered and every operation
//!   returns `ContextError::Disposed`.
//! - Contexts share no state; two contexts over the same ledger refresh
//!   independently.

use crate::config::CoreConfig;
use crate::gateway::{Mutation, MutationGateway};
use crate::model::draft::{Identity, Initiative};
use crate::model::node::NodeId;
use crate::model::operation::PendingOperation;
use crate::remote::{CommandInterface, QueryInterface};
use crate::store::tree_builder::TreeBuilder;
use crate::sync::candidates::{self, CandidateOption};
use crate::sync::synchronizer::{
    ChangeObserver, RefreshOutcome, SyncError, SyncSubscription, Synchronizer,
};
use crate::workflow::engine::WorkflowEngine;
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Errors from context operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    Disposed,
    Sync(SyncError),
}

impl Display for ContextError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disposed => write!(f, "hierarchy context was disposed"),
            Self::Sync(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ContextError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sync(err) => Some(err),
            Self::Disposed => None,
        }
    }
}

impl From<SyncError> for ContextError {
    fn from(value: SyncError) -> Self {
        Self::Sync(value)
    }
}

pub type ContextResult<T> = Result<T, ContextError>;

/// Synchronizer, gateway and workflow factory bound to one ledger.
pub struct HierarchyContext {
    config: CoreConfig,
    synchronizer: Arc<Synchronizer>,
    gateway: Arc<MutationGateway>,
    subscription: Mutex<Option<SyncSubscription>>,
    disposed: AtomicBool,
}

impl HierarchyContext {
    pub fn create(
        query: Arc<dyn QueryInterface>,
        commands: Arc<dyn CommandInterface>,
        config: CoreConfig,
    ) -> Self {
        let synchronizer = Arc::new(Synchronizer::new(
            query,
            TreeBuilder::new(config.tree_fanout),
        ));
        let gateway = Arc::new(MutationGateway::new(commands, Arc::clone(&synchronizer)));
        info!(
            "event=context_create module=context status=ok tree_fanout={}",
            config.tree_fanout
        );
        Self {
            config,
            synchronizer,
            gateway,
            subscription: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    /// Subscribes to remote events and runs the initial refresh.
    ///
    /// Calling it again replaces the previous subscription.
    pub async fn start(&self, on_change: ChangeObserver) -> ContextResult<RefreshOutcome> {
        self.ensure_active()?;
        let subscription = self.synchronizer.subscribe(on_change)?;
        let previous = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(subscription);
        drop(previous);
        Ok(self.synchronizer.refresh().await)
    }

    pub async fn refresh(&self) -> ContextResult<RefreshOutcome> {
        self.ensure_active()?;
        Ok(self.synchronizer.refresh().await)
    }

    pub async fn submit(&self, mutation: Mutation) -> ContextResult<PendingOperation> {
        self.ensure_active()?;
        Ok(self.gateway.submit(mutation).await)
    }

    pub fn synchronizer(&self) -> &Arc<Synchronizer> {
        &self.synchronizer
    }

    pub fn gateway(&self) -> &Arc<MutationGateway> {
        &self.gateway
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Founding workflow starting from an empty draft.
    pub fn new_workflow(&self) -> ContextResult<WorkflowEngine> {
        self.ensure_active()?;
        Ok(WorkflowEngine::new(Arc::clone(&self.gateway))
            .with_placeholder(self.config.placeholder_created_id.clone()))
    }

    /// Founding workflow with `founder` as the locked first member.
    pub fn founding_workflow(&self, founder: Identity) -> ContextResult<WorkflowEngine> {
        self.ensure_active()?;
        Ok(
            WorkflowEngine::with_founder(Arc::clone(&self.gateway), founder)
                .with_placeholder(self.config.placeholder_created_id.clone()),
        )
    }

    pub fn initiative_workflow(&self, initiative: &Initiative) -> ContextResult<WorkflowEngine> {
        self.ensure_active()?;
        Ok(
            WorkflowEngine::from_initiative(Arc::clone(&self.gateway), initiative)
                .with_placeholder(self.config.placeholder_created_id.clone()),
        )
    }

    pub fn editable_candidates(&self) -> Vec<CandidateOption> {
        candidates::editable_candidates(&self.synchronizer.flat_node_map())
    }

    pub fn movable_candidates(&self) -> Vec<CandidateOption> {
        candidates::movable_candidates(&self.synchronizer.flat_node_map())
    }

    pub fn move_targets(&self, node_id: NodeId) -> Vec<CandidateOption> {
        candidates::move_targets(&self.synchronizer.flat_node_map(), node_id)
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Unregisters remote handlers and stops the event worker. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let subscription = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(subscription);
        info!("event=context_dispose module=context status=ok");
    }

    fn ensure_active(&self) -> ContextResult<()> {
        if self.is_disposed() {
            return Err(ContextError::Disposed);
        }
        Ok(())
    }
}

impl Drop for HierarchyContext {
    fn drop(&mut self) {
        self.dispose();
    }
}
