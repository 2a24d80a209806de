//! Organization founding workflow.
//!
//! # Responsibility
//! - Step a draft through a fixed sequence of validated stages.
//! - Serialize the finished draft and commit it as one atomic write.
//!
//! # Invariants
//! - Validation failures stay local; they never reach the ledger.
//! - A draft is consumed by at most one successful commit.

pub mod engine;
pub mod payload;
pub mod step;
pub mod validation;
