//! Founding workflow stepper.
//!
//! # Responsibility
//! - Hold the draft and current step; gate `advance` behind step validation.
//! - Edit repeatable fields (members, roles, per-role domains and
//!   accountabilities) and role assignments.
//! - Commit the draft once through the mutation gateway.
//!
//! # Invariants
//! - A rejected `advance` changes neither step nor draft.
//! - `retreat` never validates.
//! - A failed commit keeps the draft intact for retry.
//! - After a successful commit the draft is consumed and every edit or
//!   further commit is rejected.

use crate::gateway::{Mutation, MutationGateway};
use crate::model::draft::{Draft, Identity, Initiative, ListEditError, RepeatableList, Role};
use crate::model::operation::PendingOperation;
use crate::workflow::payload::{parse_created_id, CommitPayload};
use crate::workflow::step::WorkflowStep;
use crate::workflow::validation::{validate, ValidationError};
use log::{info, warn};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Created id used when confirmation metadata carries none.
pub const DEFAULT_PLACEHOLDER_ID: &str = "unknown";

/// Errors from workflow operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    /// A step gate rejected the draft.
    Validation(ValidationError),
    /// Commit requested before reaching review.
    NotAtReview(WorkflowStep),
    /// Draft already consumed by a successful commit.
    AlreadyCommitted,
    /// Repeatable-list edit refused.
    List(ListEditError),
    /// Role index does not exist.
    RoleOutOfRange(usize),
    /// The connected founder entry cannot be removed or replaced.
    FounderLocked,
    /// Ledger refused the commit; message kept verbatim.
    CommitFailed(String),
}

impl Display for WorkflowError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotAtReview(step) => write!(f, "cannot commit from step `{step}`"),
            Self::AlreadyCommitted => write!(f, "organization was already created"),
            Self::List(err) => write!(f, "{err}"),
            Self::RoleOutOfRange(index) => write!(f, "role {} does not exist", index + 1),
            Self::FounderLocked => write!(f, "the connected founder cannot be removed"),
            Self::CommitFailed(message) => write!(f, "{message}"),
        }
    }
}

impl Error for WorkflowError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::List(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for WorkflowError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<ListEditError> for WorkflowError {
    fn from(value: ListEditError) -> Self {
        Self::List(value)
    }
}

/// Which per-role repeatable list an edit targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleField {
    Domains,
    Accountabilities,
}

/// Outcome of a successful commit.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitReceipt {
    pub operation: PendingOperation,
    /// Parsed organization id, or the placeholder.
    pub created_id: String,
    pub payload: CommitPayload,
}

/// Presentation view-model of the current step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepView {
    pub step: WorkflowStep,
    pub index: usize,
    pub total: usize,
    pub title: &'static str,
    pub can_advance: bool,
    pub can_retreat: bool,
    pub can_commit: bool,
    pub committed: bool,
    /// Inline validation or commit failure message.
    pub message: Option<String>,
}

/// Validated stepper over a founding draft.
pub struct WorkflowEngine {
    gateway: Arc<MutationGateway>,
    step: WorkflowStep,
    draft: Draft,
    founder: Option<Identity>,
    last_error: Option<String>,
    receipt: Option<CommitReceipt>,
    placeholder_id: String,
}

impl WorkflowEngine {
    /// Starts at the first step with an empty draft.
    pub fn new(gateway: Arc<MutationGateway>) -> Self {
        Self {
            gateway,
            step: WorkflowStep::first(),
            draft: Draft::default(),
            founder: None,
            last_error: None,
            receipt: None,
            placeholder_id: DEFAULT_PLACEHOLDER_ID.to_string(),
        }
    }

    /// Starts with the connected account as the locked first member.
    pub fn with_founder(gateway: Arc<MutationGateway>, founder: Identity) -> Self {
        let mut engine = Self::new(gateway);
        engine.draft.members = RepeatableList::from_vec(vec![founder.clone()]);
        engine.founder = Some(founder);
        engine
    }

    /// Starts with the members collected by an initiative.
    pub fn from_initiative(gateway: Arc<MutationGateway>, initiative: &Initiative) -> Self {
        let mut engine = Self::new(gateway);
        engine.draft.members = initiative.member_seed();
        info!(
            "event=workflow_start module=workflow status=ok source=initiative members={}",
            engine.draft.members.len()
        );
        engine
    }

    /// Overrides the created-id placeholder.
    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder_id = placeholder.into();
        self
    }

    pub fn step(&self) -> WorkflowStep {
        self.step
    }

    pub fn draft(&self) -> &Draft {
        &self.draft
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn receipt(&self) -> Option<&CommitReceipt> {
        self.receipt.as_ref()
    }

    pub fn is_committed(&self) -> bool {
        self.receipt.is_some()
    }

    /// Moves forward when the current step validates.
    ///
    /// Returns `false` and records an inline message otherwise.
    pub fn advance(&mut self) -> bool {
        self.try_advance().is_ok()
    }

    pub fn try_advance(&mut self) -> Result<WorkflowStep, WorkflowError> {
        if self.is_committed() {
            return Err(WorkflowError::AlreadyCommitted);
        }
        let result = validate(self.step, &self.draft, self.gateway.is_commit_pending())
            .and_then(|()| self.step.next().ok_or(ValidationError::FinalStep));
        match result {
            Ok(next) => {
                info!(
                    "event=workflow_advance module=workflow status=ok from={} to={}",
                    self.step.index(),
                    next.index()
                );
                self.step = next;
                self.last_error = None;
                Ok(next)
            }
            Err(err) => {
                info!(
                    "event=workflow_advance module=workflow status=blocked step={}",
                    self.step.index()
                );
                self.last_error = Some(err.to_string());
                Err(err.into())
            }
        }
    }

    /// Moves back one step without validating.
    pub fn retreat(&mut self) -> bool {
        if self.is_committed() {
            return false;
        }
        match self.step.previous() {
            Some(previous) => {
                self.step = previous;
                self.last_error = None;
                true
            }
            None => false,
        }
    }

    /// Discards the draft and returns to the first step.
    pub fn cancel(&mut self) {
        self.draft = Draft::default();
        if let Some(founder) = &self.founder {
            self.draft.members = RepeatableList::from_vec(vec![founder.clone()]);
        }
        self.step = WorkflowStep::first();
        self.last_error = None;
        self.receipt = None;
        info!("event=workflow_cancel module=workflow status=ok");
    }

    /// Appends a blank member row; returns its index.
    pub fn append_member(&mut self) -> Result<usize, WorkflowError> {
        Ok(self.draft_mut()?.members.append())
    }

    pub fn set_member(&mut self, index: usize, value: impl Into<String>) -> Result<(), WorkflowError> {
        let value = Identity::new(value);
        if self.is_locked_founder(index) && Some(&value) != self.founder.as_ref() {
            return Err(WorkflowError::FounderLocked);
        }
        self.draft_mut()?.members.set(index, value)?;
        Ok(())
    }

    pub fn remove_member(&mut self, index: usize) -> Result<Identity, WorkflowError> {
        if self.is_locked_founder(index) {
            return Err(WorkflowError::FounderLocked);
        }
        Ok(self.draft_mut()?.members.remove(index)?)
    }

    pub fn set_consent(&mut self, agreed: bool) -> Result<(), WorkflowError> {
        self.draft_mut()?.consent = agreed;
        Ok(())
    }

    pub fn set_anchor_purpose(&mut self, purpose: impl Into<String>) -> Result<(), WorkflowError> {
        self.draft_mut()?.anchor_purpose = purpose.into();
        Ok(())
    }

    /// Adds a blank role; returns its index.
    pub fn add_role(&mut self) -> Result<usize, WorkflowError> {
        let draft = self.draft_mut()?;
        draft.roles.push(Role::blank());
        Ok(draft.roles.len() - 1)
    }

    /// Removes a role and its assignment; later assignments shift down.
    pub fn remove_role(&mut self, index: usize) -> Result<Role, WorkflowError> {
        self.draft_mut()?
            .remove_role(index)
            .ok_or(WorkflowError::RoleOutOfRange(index))
    }

    pub fn set_role_name(&mut self, index: usize, name: impl Into<String>) -> Result<(), WorkflowError> {
        self.role_mut(index)?.name = name.into();
        Ok(())
    }

    pub fn set_role_purpose(
        &mut self,
        index: usize,
        purpose: impl Into<String>,
    ) -> Result<(), WorkflowError> {
        self.role_mut(index)?.purpose = purpose.into();
        Ok(())
    }

    /// Appends a blank domain or accountability row to one role.
    pub fn append_role_entry(&mut self, role: usize, field: RoleField) -> Result<usize, WorkflowError> {
        Ok(role_list(self.role_mut(role)?, field).append())
    }

    pub fn set_role_entry(
        &mut self,
        role: usize,
        field: RoleField,
        index: usize,
        value: impl Into<String>,
    ) -> Result<(), WorkflowError> {
        role_list(self.role_mut(role)?, field).set(index, value.into())?;
        Ok(())
    }

    /// Removes one row; refused when it is the role's last row for `field`.
    pub fn remove_role_entry(
        &mut self,
        role: usize,
        field: RoleField,
        index: usize,
    ) -> Result<String, WorkflowError> {
        Ok(role_list(self.role_mut(role)?, field).remove(index)?)
    }

    pub fn assign(&mut self, role: usize, member: Identity) -> Result<(), WorkflowError> {
        let draft = self.draft_mut()?;
        if role >= draft.roles.len() {
            return Err(WorkflowError::RoleOutOfRange(role));
        }
        draft.assignments.insert(role, member);
        Ok(())
    }

    pub fn unassign(&mut self, role: usize) -> Result<Option<Identity>, WorkflowError> {
        Ok(self.draft_mut()?.assignments.remove(&role))
    }

    /// True on review with no commit in flight and nothing committed yet.
    pub fn can_commit(&self) -> bool {
        self.step.is_terminal()
            && !self.is_committed()
            && validate(WorkflowStep::Review, &self.draft, self.gateway.is_commit_pending()).is_ok()
    }

    /// Serializes the draft and submits it as one atomic write.
    ///
    /// Every step gate is re-checked first, since fields stay editable after
    /// their step was passed.
    pub async fn commit(&mut self) -> Result<CommitReceipt, WorkflowError> {
        if self.is_committed() {
            return Err(WorkflowError::AlreadyCommitted);
        }
        if !self.step.is_terminal() {
            return Err(WorkflowError::NotAtReview(self.step));
        }
        let commit_pending = self.gateway.is_commit_pending();
        if let Err(err) = WorkflowStep::ALL
            .iter()
            .try_for_each(|step| validate(*step, &self.draft, commit_pending))
        {
            self.last_error = Some(err.to_string());
            return Err(err.into());
        }

        let payload = CommitPayload::from_draft(&self.draft);
        info!(
            "event=workflow_commit module=workflow status=submit members={} roles={} assignments={}",
            payload.members.len(),
            payload.roles.len(),
            payload.assignments.len()
        );
        let operation = self.gateway.submit(Mutation::Commit(payload.clone())).await;

        if operation.is_failed() {
            let message = operation.error.clone().unwrap_or_default();
            warn!("event=workflow_commit module=workflow status=failed error={message}");
            self.last_error = Some(message.clone());
            return Err(WorkflowError::CommitFailed(message));
        }

        let created_id = match parse_created_id(operation.metadata.as_ref()) {
            Some(created_id) => created_id,
            None => {
                warn!("event=workflow_commit module=workflow status=placeholder_id");
                self.placeholder_id.clone()
            }
        };
        info!("event=workflow_commit module=workflow status=ok created_id={created_id}");

        self.draft = Draft::default();
        self.last_error = None;
        let receipt = CommitReceipt {
            operation,
            created_id,
            payload,
        };
        self.receipt = Some(receipt.clone());
        Ok(receipt)
    }

    /// Current step view-model.
    pub fn view(&self) -> StepView {
        let can_advance = !self.is_committed()
            && !self.step.is_terminal()
            && validate(self.step, &self.draft, false).is_ok();
        StepView {
            step: self.step,
            index: self.step.index(),
            total: WorkflowStep::ALL.len(),
            title: self.step.title(),
            can_advance,
            can_retreat: !self.is_committed() && self.step.previous().is_some(),
            can_commit: self.can_commit(),
            committed: self.is_committed(),
            message: self.last_error.clone(),
        }
    }

    fn draft_mut(&mut self) -> Result<&mut Draft, WorkflowError> {
        if self.is_committed() {
            return Err(WorkflowError::AlreadyCommitted);
        }
        Ok(&mut self.draft)
    }

    fn role_mut(&mut self, index: usize) -> Result<&mut Role, WorkflowError> {
        self.draft_mut()?
            .roles
            .get_mut(index)
            .ok_or(WorkflowError::RoleOutOfRange(index))
    }

    fn is_locked_founder(&self, index: usize) -> bool {
        index == 0
            && self.founder.is_some()
            && self.draft.members.get(0) == self.founder.as_ref()
    }
}

fn role_list(role: &mut Role, field: RoleField) -> &mut RepeatableList<String> {
    match field {
        RoleField::Domains => &mut role.domains,
        RoleField::Accountabilities => &mut role.accountabilities,
    }
}
