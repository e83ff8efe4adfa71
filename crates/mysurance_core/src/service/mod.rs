//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into user intents (create, edit, delete).
//! - Keep callers decoupled from storage and feed details.

pub mod policy_store;
