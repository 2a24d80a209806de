//! Core domain logic for CircleSync.
//! Mirrors a remote circle hierarchy and drives organization founding.

pub mod config;
pub mod context;
pub mod gateway;
pub mod logging;
pub mod model;
pub mod remote;
pub mod store;
pub mod sync;
pub mod workflow;

pub use config::CoreConfig;
pub use context::{ContextError, ContextResult, HierarchyContext};
pub use gateway::{GatewayError, Mutation, MutationGateway};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::draft::{Draft, Identity, Initiative, ListEditError, RepeatableList, Role};
pub use model::node::{Node, NodeId, NodeKind, ROOT_ID};
pub use model::operation::{OperationId, OperationKind, OperationStatus, PendingOperation};
pub use remote::memory::InMemoryLedger;
pub use remote::{
    CommandInterface, Confirmation, QueryInterface, RemoteError, RemoteEvent, RemoteEventKind,
    RemoteResult, Subscription,
};
pub use store::node_store::{FlatPull, NodeStore};
pub use store::tree_builder::{DisplayTree, NodeMeta, TreeBuilder};
pub use sync::candidates::CandidateOption;
pub use sync::synchronizer::{
    RefreshOutcome, SyncError, SyncSnapshot, SyncSubscription, Synchronizer,
};
pub use workflow::engine::{CommitReceipt, RoleField, StepView, WorkflowEngine, WorkflowError};
pub use workflow::payload::{AssignmentPayload, CommitPayload, RolePayload};
pub use workflow::step::WorkflowStep;
pub use workflow::validation::ValidationError;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
