//! Commit payload serialization.
//!
//! # Invariants
//! - Blank domain/accountability entries never reach the ledger.
//! - Assignments are emitted only for assigned, existing roles, in ascending
//!   role order.

use crate::model::draft::{Draft, Identity};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metadata keys that may carry the created organization id.
const CREATED_ID_KEYS: [&str; 2] = ["created_id", "organization"];

/// Role entry of the commit command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolePayload {
    pub name: String,
    pub purpose: String,
    pub domains: Vec<String>,
    pub accountabilities: Vec<String>,
}

/// Role assignment entry of the commit command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentPayload {
    pub role_index: usize,
    pub assigned_to: Identity,
}

/// Atomic organization creation command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitPayload {
    pub members: Vec<Identity>,
    pub anchor_purpose: String,
    pub roles: Vec<RolePayload>,
    pub assignments: Vec<AssignmentPayload>,
}

impl CommitPayload {
    /// Projects a draft into the ledger command shape.
    pub fn from_draft(draft: &Draft) -> Self {
        let roles = draft
            .roles
            .iter()
            .map(|role| RolePayload {
                name: role.name.trim().to_string(),
                purpose: role.purpose.trim().to_string(),
                domains: non_blank(role.domains.iter()),
                accountabilities: non_blank(role.accountabilities.iter()),
            })
            .collect::<Vec<_>>();

        let assignments = draft
            .assignments
            .iter()
            .filter(|(role_index, identity)| **role_index < roles.len() && !identity.is_blank())
            .map(|(role_index, identity)| AssignmentPayload {
                role_index: *role_index,
                assigned_to: identity.clone(),
            })
            .collect();

        Self {
            members: draft.members.iter().cloned().collect(),
            anchor_purpose: draft.anchor_purpose.trim().to_string(),
            roles,
            assignments,
        }
    }
}

fn non_blank<'a>(entries: impl Iterator<Item = &'a String>) -> Vec<String> {
    entries
        .filter(|entry| !entry.trim().is_empty())
        .cloned()
        .collect()
}

/// Extracts the created organization id from confirmation metadata.
///
/// Accepts a non-empty string or an integer under `created_id` or
/// `organization`; anything else yields `None`.
pub fn parse_created_id(metadata: Option<&Value>) -> Option<String> {
    let object = metadata?.as_object()?;
    CREATED_ID_KEYS.iter().find_map(|key| match object.get(*key)? {
        Value::String(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        Value::Number(value) if value.is_u64() || value.is_i64() => Some(value.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::{parse_created_id, CommitPayload};
    use crate::model::draft::{Draft, Identity, RepeatableList, Role};
    use serde_json::json;

    #[test]
    fn from_draft_filters_blank_entries_and_projects_assignments() {
        let mut role = Role::new("R1", "Pu");
        role.domains = RepeatableList::from_vec(vec![String::new(), "d1".to_string()]);
        role.accountabilities = RepeatableList::from_vec(vec!["  ".to_string()]);
        let mut draft = Draft {
            members: RepeatableList::from_vec(vec![Identity::new("A"), Identity::new("B")]),
            anchor_purpose: "P".to_string(),
            roles: vec![role],
            ..Draft::default()
        };
        draft.assignments.insert(0, Identity::new("A"));
        draft.assignments.insert(3, Identity::new("B"));

        let payload = CommitPayload::from_draft(&draft);
        assert_eq!(payload.roles[0].domains, vec!["d1".to_string()]);
        assert!(payload.roles[0].accountabilities.is_empty());
        assert_eq!(payload.assignments.len(), 1);

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            value["assignments"],
            json!([{ "roleIndex": 0, "assignedTo": "A" }])
        );
        assert_eq!(value["anchorPurpose"], json!("P"));
    }

    #[test]
    fn parse_created_id_accepts_strings_and_integers() {
        assert_eq!(
            parse_created_id(Some(&json!({ "created_id": "org-7" }))).as_deref(),
            Some("org-7")
        );
        assert_eq!(
            parse_created_id(Some(&json!({ "organization": 12 }))).as_deref(),
            Some("12")
        );
        assert_eq!(parse_created_id(Some(&json!({ "created_id": "" }))), None);
        assert_eq!(parse_created_id(Some(&json!(["org"]))), None);
        assert_eq!(parse_created_id(None), None);
    }
}
