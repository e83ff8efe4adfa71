//! Repository layer: the external policy collection and its change feed.
//!
//! # Responsibility
//! - Define the contract the store and reconciler consume.
//! - Provide a SQLite-backed reference implementation.
//!
//! # Invariants
//! - Every successful write is followed by a full snapshot on the feed.
//! - Repository APIs return semantic errors (`NotFound`) in addition to
//!   storage transport errors.

pub mod feed;
pub mod policy_repo;
