//! Core domain logic for Mysurance.
//! Policy records, their live reconciled view, and excess slider derivations.

pub mod category;
pub mod config;
pub mod db;
pub mod excess;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod sync;

pub use category::{
    category_label, load_categories, parse_category_members, CategoryError, CategoryLabel,
    CategorySource, StaticCategorySource,
};
pub use config::StoreConfig;
pub use excess::marks::{
    excess_marks, extend_marks, parse_leading_int, slider_max, step_size, ExcessMarks,
    ExcessSlider,
};
pub use logging::{default_log_level, init_logging, logging_status, LogSettings};
pub use model::draft::PolicyDraft;
pub use model::policy::{
    NewPolicy, Policy, PolicyId, PolicyPatch, PolicyValidationError, RawPolicyFields,
};
pub use repo::feed::{SnapshotFeed, SnapshotListener, SnapshotSubscription};
pub use repo::policy_repo::{
    PolicyRepository, RepoError, RepoResult, Snapshot, SnapshotRecord, SqlitePolicyRepository,
};
pub use service::policy_store::{PolicyStore, StoreError};
pub use sync::reconciler::{materialize, ListSubscription, MaterializedList, SnapshotReconciler};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
