//! Workflow step sequence.

use serde::Serialize;
use std::fmt::{Display, Formatter};

/// Ordered founding steps. `Review` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    Members,
    Consent,
    AnchorPurpose,
    Roles,
    Assignments,
    Review,
}

impl WorkflowStep {
    pub const ALL: [WorkflowStep; 6] = [
        Self::Members,
        Self::Consent,
        Self::AnchorPurpose,
        Self::Roles,
        Self::Assignments,
        Self::Review,
    ];

    pub fn first() -> Self {
        Self::Members
    }

    pub fn index(self) -> usize {
        match self {
            Self::Members => 0,
            Self::Consent => 1,
            Self::AnchorPurpose => 2,
            Self::Roles => 3,
            Self::Assignments => 4,
            Self::Review => 5,
        }
    }

    pub fn next(self) -> Option<Self> {
        Self::ALL.get(self.index() + 1).copied()
    }

    pub fn previous(self) -> Option<Self> {
        self.index().checked_sub(1).map(|index| Self::ALL[index])
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Review
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Members => "Enter founding members",
            Self::Consent => "Agree to the constitution",
            Self::AnchorPurpose => "Enter anchor circle purpose",
            Self::Roles => "Define initial roles",
            Self::Assignments => "Assign members to roles",
            Self::Review => "Review and create organization",
        }
    }
}

impl Display for WorkflowStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.title())
    }
}
