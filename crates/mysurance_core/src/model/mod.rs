//! Policy domain model shared by the repository, reconciler and store.
//!
//! # Responsibility
//! - Define the canonical policy record and its stored field set.
//! - Model form input as an immutable draft with explicit transitions.
//!
//! # Invariants
//! - Every policy is identified by a repository-assigned `PolicyId`.
//! - Deletion is a soft-delete tombstone, never a physical removal.

pub mod draft;
pub mod policy;
