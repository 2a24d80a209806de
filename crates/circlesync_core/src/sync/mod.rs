//! Hierarchy synchronization.
//!
//! # Responsibility
//! - Keep the local hierarchy view aligned with the remote ledger.
//! - Derive form candidate lists from the current view.
//!
//! # See also
//! - `store` for the read models rebuilt by each refresh.

pub mod candidates;
pub mod synchronizer;
