//! Excess slider derivations.
//!
//! # Responsibility
//! - Compute discrete slider positions ("marks") from a policy value.
//! - Keep slider bounds derivation pure and panic-free.

pub mod marks;
