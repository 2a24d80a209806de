//! Organization draft model.
//!
//! # Responsibility
//! - Hold the in-progress founding payload collected by the workflow.
//! - Provide index-addressed repeatable fields (members, domains,
//!   accountabilities, initiative partners).
//!
//! # Invariants
//! - A `RepeatableList` never drops below one entry through `remove`.
//! - Entries may be blank while editing; blanks are filtered at commit time.
//! - `assignments` keys are role indexes into `roles`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

static IDENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0x[a-fA-F0-9]{40}$").expect("valid identity regex"));

/// Account identity token (`0x` followed by 40 hex digits).
///
/// Construction never validates; the workflow checks well-formedness at the
/// step gate so partially typed values can live in the draft.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns whether the token matches the fixed-length identity pattern.
    pub fn is_well_formed(&self) -> bool {
        IDENTITY_RE.is_match(self.0.as_str())
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Errors from repeatable-list edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListEditError {
    /// Index does not address an entry.
    OutOfRange { index: usize, len: usize },
    /// The only remaining entry cannot be removed.
    LastEntry,
}

impl Display for ListEditError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfRange { index, len } => {
                write!(f, "entry index {index} is out of range for {len} entries")
            }
            Self::LastEntry => write!(f, "the last remaining entry cannot be removed"),
        }
    }
}

impl Error for ListEditError {}

/// Ordered, index-addressed collection of editable entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepeatableList<T> {
    entries: Vec<T>,
}

impl<T> RepeatableList<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn from_vec(entries: Vec<T>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        self.entries.as_slice()
    }

    /// Replaces one entry in place.
    pub fn set(&mut self, index: usize, value: T) -> Result<(), ListEditError> {
        let len = self.entries.len();
        let slot = self
            .entries
            .get_mut(index)
            .ok_or(ListEditError::OutOfRange { index, len })?;
        *slot = value;
        Ok(())
    }

    /// Removes one entry, refusing to empty a list that still has one entry.
    pub fn remove(&mut self, index: usize) -> Result<T, ListEditError> {
        let len = self.entries.len();
        if index >= len {
            return Err(ListEditError::OutOfRange { index, len });
        }
        if len <= 1 {
            return Err(ListEditError::LastEntry);
        }
        Ok(self.entries.remove(index))
    }

    pub fn into_vec(self) -> Vec<T> {
        self.entries
    }
}

impl<T: Default> RepeatableList<T> {
    /// Appends one blank entry and returns its index.
    pub fn append(&mut self) -> usize {
        self.entries.push(T::default());
        self.entries.len() - 1
    }

    /// Creates a list holding one blank entry.
    pub fn with_blank() -> Self {
        let mut list = Self::new();
        list.append();
        list
    }
}

impl<'a, T> IntoIterator for &'a RepeatableList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// One initial role of the anchor circle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub purpose: String,
    pub domains: RepeatableList<String>,
    pub accountabilities: RepeatableList<String>,
}

impl Role {
    /// Creates a role with one blank domain and one blank accountability row.
    pub fn blank() -> Self {
        Self {
            name: String::new(),
            purpose: String::new(),
            domains: RepeatableList::with_blank(),
            accountabilities: RepeatableList::with_blank(),
        }
    }

    pub fn new(name: impl Into<String>, purpose: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            purpose: purpose.into(),
            ..Self::blank()
        }
    }
}

/// Accumulated founding payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    /// Founding members, in entry order. Duplicates are kept.
    pub members: RepeatableList<Identity>,
    /// Constitution acknowledgment.
    pub consent: bool,
    pub anchor_purpose: String,
    pub roles: Vec<Role>,
    /// Role index -> assigned member.
    pub assignments: BTreeMap<usize, Identity>,
}

impl Draft {
    /// Removes one role and re-keys assignments of the roles after it.
    pub fn remove_role(&mut self, index: usize) -> Option<Role> {
        if index >= self.roles.len() {
            return None;
        }
        let removed = self.roles.remove(index);
        let shifted = std::mem::take(&mut self.assignments)
            .into_iter()
            .filter(|(role_index, _)| *role_index != index)
            .map(|(role_index, identity)| {
                if role_index > index {
                    (role_index - 1, identity)
                } else {
                    (role_index, identity)
                }
            })
            .collect();
        self.assignments = shifted;
        Some(removed)
    }
}

/// Pre-registration collection of prospective members.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Initiative {
    pub name: String,
    pub partners: RepeatableList<Identity>,
}

impl Initiative {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partners: RepeatableList::with_blank(),
        }
    }

    /// Returns non-blank partners as a member list seed.
    pub fn member_seed(&self) -> RepeatableList<Identity> {
        RepeatableList::from_vec(
            self.partners
                .iter()
                .filter(|partner| !partner.is_blank())
                .cloned()
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{Draft, Identity, Initiative, ListEditError, RepeatableList, Role};

    #[test]
    fn identity_pattern_requires_prefix_and_forty_hex_digits() {
        assert!(Identity::new(format!("0x{}", "a".repeat(40))).is_well_formed());
        assert!(Identity::new(format!("0x{}", "AbC123".repeat(6) + "dEf0")).is_well_formed());
        assert!(!Identity::new("a".repeat(42)).is_well_formed());
        assert!(!Identity::new(format!("0x{}", "a".repeat(39))).is_well_formed());
        assert!(!Identity::new(format!("0x{}", "g".repeat(40))).is_well_formed());
        assert!(!Identity::new(format!(" 0x{}", "a".repeat(40))).is_well_formed());
    }

    #[test]
    fn remove_refuses_last_entry() {
        let mut list: RepeatableList<String> = RepeatableList::with_blank();
        assert_eq!(list.remove(0), Err(ListEditError::LastEntry));

        let index = list.append();
        assert_eq!(index, 1);
        list.set(1, "keep".to_string()).unwrap();
        assert_eq!(list.remove(0).unwrap(), "");
        assert_eq!(list.as_slice(), ["keep".to_string()]);
    }

    #[test]
    fn remove_out_of_range_is_reported() {
        let mut list: RepeatableList<String> = RepeatableList::from_vec(vec!["a".into(), "b".into()]);
        assert_eq!(
            list.remove(5),
            Err(ListEditError::OutOfRange { index: 5, len: 2 })
        );
    }

    #[test]
    fn remove_role_shifts_assignments() {
        let mut draft = Draft {
            roles: vec![Role::new("a", "pa"), Role::new("b", "pb"), Role::new("c", "pc")],
            ..Draft::default()
        };
        draft.assignments.insert(0, Identity::new("x"));
        draft.assignments.insert(1, Identity::new("y"));
        draft.assignments.insert(2, Identity::new("z"));

        let removed = draft.remove_role(1).unwrap();
        assert_eq!(removed.name, "b");
        assert_eq!(draft.assignments.len(), 2);
        assert_eq!(draft.assignments.get(&0), Some(&Identity::new("x")));
        assert_eq!(draft.assignments.get(&1), Some(&Identity::new("z")));
        assert!(draft.remove_role(9).is_none());
    }

    #[test]
    fn initiative_seed_skips_blank_partners() {
        let mut initiative = Initiative::new("seed");
        initiative
            .partners
            .set(0, Identity::new("0x1111111111111111111111111111111111111111"))
            .unwrap();
        initiative.partners.append();
        let seed = initiative.member_seed();
        assert_eq!(seed.len(), 1);
    }
}
