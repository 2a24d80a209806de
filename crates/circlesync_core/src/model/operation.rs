//! Lifecycle record of one remote mutation.
//!
//! # Invariants
//! - Status only moves `InFlight -> Confirmed` or `InFlight -> Failed`.
//! - `error` is set iff status is `Failed`.

use crate::workflow::payload::parse_created_id;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Stable identifier of one submission.
pub type OperationId = Uuid;

/// Mutation category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Edit,
    Move,
    Commit,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Edit => "edit",
            Self::Move => "move",
            Self::Commit => "commit",
        }
    }
}

/// Submission status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    InFlight,
    Confirmed,
    Failed,
}

/// One submitted mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub id: OperationId,
    pub kind: OperationKind,
    pub status: OperationStatus,
    /// Raw failure message, surfaced verbatim.
    pub error: Option<String>,
    /// Confirmation metadata returned by the ledger.
    pub metadata: Option<Value>,
}

impl PendingOperation {
    /// Creates a new in-flight record.
    pub fn submitted(kind: OperationKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            status: OperationStatus::InFlight,
            error: None,
            metadata: None,
        }
    }

    pub fn confirm(&mut self, metadata: Value) {
        self.status = OperationStatus::Confirmed;
        self.metadata = Some(metadata);
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = OperationStatus::Failed;
        self.error = Some(message.into());
    }

    pub fn is_in_flight(&self) -> bool {
        self.status == OperationStatus::InFlight
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == OperationStatus::Confirmed
    }

    pub fn is_failed(&self) -> bool {
        self.status == OperationStatus::Failed
    }

    /// Created entity id carried by the confirmation metadata, if any.
    pub fn created_id(&self) -> Option<String> {
        parse_created_id(self.metadata.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::{OperationKind, OperationStatus, PendingOperation};
    use serde_json::json;

    #[test]
    fn confirm_and_fail_transitions() {
        let mut confirmed = PendingOperation::submitted(OperationKind::Create);
        assert!(confirmed.is_in_flight());
        confirmed.confirm(json!({ "created_id": 4 }));
        assert_eq!(confirmed.status, OperationStatus::Confirmed);
        assert!(confirmed.error.is_none());
        assert_eq!(confirmed.created_id().as_deref(), Some("4"));

        let mut failed = PendingOperation::submitted(OperationKind::Move);
        failed.fail("execution reverted");
        assert!(failed.is_failed());
        assert_eq!(failed.error.as_deref(), Some("execution reverted"));
    }

    #[test]
    fn submissions_get_distinct_ids() {
        let first = PendingOperation::submitted(OperationKind::Edit);
        let second = PendingOperation::submitted(OperationKind::Edit);
        assert_ne!(first.id, second.id);
    }
}
