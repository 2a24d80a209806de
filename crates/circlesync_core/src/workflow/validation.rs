//! Per-step gate rules.
//!
//! | Step | Gate |
//! |---|---|
//! | Members | non-empty; every entry is a well-formed identity; duplicates allowed |
//! | Consent | acknowledgment set |
//! | AnchorPurpose | non-blank after trim |
//! | Roles | non-empty; each role has a non-blank name and purpose |
//! | Assignments | none |
//! | Review | no commit in flight |

use crate::model::draft::Draft;
use crate::workflow::step::WorkflowStep;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Inline validation message for one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    NoMembers,
    MalformedMember { index: usize, value: String },
    ConsentRequired,
    BlankAnchorPurpose,
    NoRoles,
    RoleNameRequired { index: usize },
    RolePurposeRequired { index: usize },
    CommitInFlight,
    /// `advance` was called on the terminal step.
    FinalStep,
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoMembers => write!(f, "add at least one founding member"),
            Self::MalformedMember { index, value } => write!(
                f,
                "member {} is not a valid address: `{value}`",
                index + 1
            ),
            Self::ConsentRequired => write!(f, "you must agree to the constitution to continue"),
            Self::BlankAnchorPurpose => write!(f, "anchor circle purpose must not be blank"),
            Self::NoRoles => write!(f, "define at least one role"),
            Self::RoleNameRequired { index } => write!(f, "role {} needs a name", index + 1),
            Self::RolePurposeRequired { index } => {
                write!(f, "role {} needs a purpose", index + 1)
            }
            Self::CommitInFlight => write!(f, "organization creation is already in progress"),
            Self::FinalStep => write!(f, "review is the final step; create the organization"),
        }
    }
}

impl Error for ValidationError {}

/// Checks the gate of `step` against `draft`.
pub fn validate(
    step: WorkflowStep,
    draft: &Draft,
    commit_in_flight: bool,
) -> Result<(), ValidationError> {
    match step {
        WorkflowStep::Members => validate_members(draft),
        WorkflowStep::Consent => {
            if draft.consent {
                Ok(())
            } else {
                Err(ValidationError::ConsentRequired)
            }
        }
        WorkflowStep::AnchorPurpose => {
            if draft.anchor_purpose.trim().is_empty() {
                Err(ValidationError::BlankAnchorPurpose)
            } else {
                Ok(())
            }
        }
        WorkflowStep::Roles => validate_roles(draft),
        WorkflowStep::Assignments => Ok(()),
        WorkflowStep::Review => {
            if commit_in_flight {
                Err(ValidationError::CommitInFlight)
            } else {
                Ok(())
            }
        }
    }
}

fn validate_members(draft: &Draft) -> Result<(), ValidationError> {
    if draft.members.is_empty() {
        return Err(ValidationError::NoMembers);
    }
    for (index, member) in draft.members.iter().enumerate() {
        if !member.is_well_formed() {
            return Err(ValidationError::MalformedMember {
                index,
                value: member.as_str().to_string(),
            });
        }
    }
    Ok(())
}

fn validate_roles(draft: &Draft) -> Result<(), ValidationError> {
    if draft.roles.is_empty() {
        return Err(ValidationError::NoRoles);
    }
    for (index, role) in draft.roles.iter().enumerate() {
        if role.name.trim().is_empty() {
            return Err(ValidationError::RoleNameRequired { index });
        }
        if role.purpose.trim().is_empty() {
            return Err(ValidationError::RolePurposeRequired { index });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{validate, ValidationError};
    use crate::model::draft::{Draft, Identity, RepeatableList, Role};
    use crate::workflow::step::WorkflowStep;

    const ALICE: &str = "0x1111111111111111111111111111111111111111";

    #[test]
    fn members_allow_duplicates_but_not_malformed_entries() {
        let mut draft = Draft::default();
        assert_eq!(
            validate(WorkflowStep::Members, &draft, false),
            Err(ValidationError::NoMembers)
        );

        draft.members = RepeatableList::from_vec(vec![Identity::new(ALICE), Identity::new(ALICE)]);
        assert!(validate(WorkflowStep::Members, &draft, false).is_ok());

        draft.members = RepeatableList::from_vec(vec![Identity::new(ALICE), Identity::new("0x12")]);
        assert!(matches!(
            validate(WorkflowStep::Members, &draft, false),
            Err(ValidationError::MalformedMember { index: 1, .. })
        ));
    }

    #[test]
    fn roles_need_name_and_purpose_but_not_domains() {
        let mut draft = Draft {
            roles: vec![Role::new("Lead", "Coordinate")],
            ..Draft::default()
        };
        assert!(validate(WorkflowStep::Roles, &draft, false).is_ok());

        draft.roles.push(Role::new("Scribe", "  "));
        assert_eq!(
            validate(WorkflowStep::Roles, &draft, false),
            Err(ValidationError::RolePurposeRequired { index: 1 })
        );
    }

    #[test]
    fn review_blocks_while_commit_in_flight() {
        let draft = Draft::default();
        assert!(validate(WorkflowStep::Assignments, &draft, false).is_ok());
        assert!(validate(WorkflowStep::Review, &draft, false).is_ok());
        assert_eq!(
            validate(WorkflowStep::Review, &draft, true),
            Err(ValidationError::CommitInFlight)
        );
    }
}
