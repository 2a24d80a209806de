//! Domain model for the circle hierarchy and organization drafts.
//!
//! # Responsibility
//! - Define the records exchanged with the remote ledger.
//! - Define the strictly typed draft accumulated by the founding workflow.
//!
//! # Invariants
//! - Circle `0` is the root: self-parented, always present, never edited.
//! - Node records are replaced wholesale on refresh, never patched.

pub mod draft;
pub mod node;
pub mod operation;
