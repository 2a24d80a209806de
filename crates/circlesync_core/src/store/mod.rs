//! Local read models rebuilt from the remote ledger.
//!
//! # Responsibility
//! - Hold the flat circle map (`NodeStore`) used for every local read.
//! - Assemble nested display trees (`TreeBuilder`).

pub mod node_store;
pub mod tree_builder;
