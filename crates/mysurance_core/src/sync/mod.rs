//! Live-collection reconciliation.
//!
//! # Responsibility
//! - Turn full repository snapshots into the ordered, tombstone-free list
//!   the rest of the application renders.
//!
//! # Invariants
//! - The materialized list is replaced wholesale, never patched.

pub mod reconciler;
