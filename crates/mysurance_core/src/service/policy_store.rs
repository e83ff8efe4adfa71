//! Policy store: create/edit/delete intents over a live repository.
//!
//! # Responsibility
//! - Own the form draft and its in-flight `submitting` flag.
//! - Issue repository writes with bounded retries for transient failures.
//! - Feed repository snapshots through the reconciler to subscribers.
//!
//! # Invariants
//! - A failed validation never reaches the repository and never sets
//!   `submitting`.
//! - Only one `create` is in flight at a time.
//! - At most one mutation per policy id is in flight at a time.
//! - Deleting a missing or already-deleted policy succeeds.
//! - A failed `create` keeps the draft intact for retry.

use crate::category::{load_categories, CategoryLabel, CategorySource};
use crate::config::StoreConfig;
use crate::model::draft::PolicyDraft;
use crate::model::policy::{PolicyId, PolicyPatch, PolicyValidationError};
use crate::repo::feed::SnapshotSubscription;
use crate::repo::policy_repo::{PolicyRepository, RepoError, RepoResult};
use crate::sync::reconciler::{ListSubscription, MaterializedList, SnapshotReconciler};
use chrono::Utc;
use log::{error, info, warn};
use std::cell::RefCell;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::rc::Rc;

/// Errors surfaced by store intents.
#[derive(Debug)]
pub enum StoreError {
    /// Draft or patch failed validation; nothing was sent.
    Validation(PolicyValidationError),
    /// A creation request is already in flight.
    SubmissionInFlight,
    /// Another mutation on this id has not settled yet.
    IdBusy(PolicyId),
    /// Repository request failed after retries.
    Repository(RepoError),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::SubmissionInFlight => write!(f, "a policy submission is already in flight"),
            Self::IdBusy(id) => write!(f, "policy {id} has a pending mutation"),
            Self::Repository(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repository(err) => Some(err),
            Self::SubmissionInFlight | Self::IdBusy(_) => None,
        }
    }
}

impl From<PolicyValidationError> for StoreError {
    fn from(value: PolicyValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<RepoError> for StoreError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Validation(err) => Self::Validation(err),
            other => Self::Repository(other),
        }
    }
}

/// Application-facing policy store.
pub struct PolicyStore<R: PolicyRepository> {
    repo: R,
    config: StoreConfig,
    draft: RefCell<PolicyDraft>,
    pending_ids: RefCell<HashSet<PolicyId>>,
    categories: RefCell<Vec<CategoryLabel>>,
    reconciler: Rc<RefCell<SnapshotReconciler>>,
    _feed: SnapshotSubscription,
}

impl<R: PolicyRepository> PolicyStore<R> {
    /// Subscribes a reconciler to `repo` and returns the wired store.
    ///
    /// The repository delivers its current snapshot during subscription, so
    /// `policies()` is populated on return.
    pub fn connect(repo: R, config: StoreConfig) -> Result<Self, StoreError> {
        let reconciler = Rc::new(RefCell::new(SnapshotReconciler::new()));
        let sink = Rc::clone(&reconciler);
        let feed = repo.subscribe(Box::new(move |snapshot| {
            sink.borrow_mut().apply(snapshot);
        }))?;

        Ok(Self {
            repo,
            config,
            draft: RefCell::new(PolicyDraft::default()),
            pending_ids: RefCell::new(HashSet::new()),
            categories: RefCell::new(Vec::new()),
            reconciler,
            _feed: feed,
        })
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn draft(&self) -> PolicyDraft {
        self.draft.borrow().clone()
    }

    pub fn is_submitting(&self) -> bool {
        self.draft.borrow().submitting
    }

    /// Applies an input transition to the draft.
    ///
    /// Input is locked while a submission is in flight; the `submitting`
    /// flag itself is owned by the store and survives the transition.
    pub fn update_draft(
        &self,
        transition: impl FnOnce(PolicyDraft) -> PolicyDraft,
    ) -> Result<(), StoreError> {
        let current = self.draft.borrow().clone();
        if current.submitting {
            return Err(StoreError::SubmissionInFlight);
        }
        // The transition runs unborrowed so it may read the store.
        let next = transition(current);
        *self.draft.borrow_mut() = PolicyDraft {
            submitting: false,
            ..next
        };
        Ok(())
    }

    /// Submits the current draft as a new policy.
    pub fn create(&self) -> Result<PolicyId, StoreError> {
        let new_policy = {
            let draft = self.draft.borrow();
            if draft.submitting {
                warn!("event=policy_create module=service status=rejected reason=in_flight");
                return Err(StoreError::SubmissionInFlight);
            }
            draft.validate().map_err(|err| {
                info!(
                    "event=policy_create module=service status=rejected reason=validation error={}",
                    err
                );
                StoreError::Validation(err)
            })?
        };

        self.transition_draft(PolicyDraft::begin_submit);
        let fields = new_policy.into_fields(Utc::now());

        match self.with_retry("create", || self.repo.create(&fields)) {
            Ok(id) => {
                self.transition_draft(PolicyDraft::submitted);
                info!("event=policy_create module=service status=ok id={id}");
                Ok(id)
            }
            Err(err) => {
                self.transition_draft(PolicyDraft::submit_failed);
                error!(
                    "event=policy_create module=service status=error error={}",
                    err
                );
                Err(err.into())
            }
        }
    }

    /// Soft-deletes a policy. Missing or already-deleted ids succeed.
    pub fn delete(&self, id: PolicyId) -> Result<(), StoreError> {
        let _guard = self.lock_id(id)?;
        let tombstone = PolicyPatch::tombstone();

        match self.with_retry("delete", || self.repo.patch(id, &tombstone)) {
            Ok(()) => {
                info!("event=policy_delete module=service status=ok id={id}");
                Ok(())
            }
            Err(RepoError::NotFound(_)) => {
                info!("event=policy_delete module=service status=noop reason=not_found id={id}");
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=policy_delete module=service status=error id={} error={}",
                    id, err
                );
                Err(err.into())
            }
        }
    }

    /// Applies a field patch to an existing policy.
    pub fn update(&self, id: PolicyId, patch: &PolicyPatch) -> Result<(), StoreError> {
        patch.validate()?;
        let _guard = self.lock_id(id)?;

        self.with_retry("update", || self.repo.patch(id, patch))
            .map_err(|err| {
                error!(
                    "event=policy_update module=service status=error id={} error={}",
                    id, err
                );
                StoreError::from(err)
            })?;
        info!("event=policy_update module=service status=ok id={id}");
        Ok(())
    }

    /// Latest materialized list.
    pub fn policies(&self) -> MaterializedList {
        self.reconciler.borrow().current()
    }

    /// Opens a channel of materialized-list updates.
    pub fn subscribe(&self) -> ListSubscription {
        self.reconciler.borrow_mut().subscribe()
    }

    pub fn unsubscribe(&self, subscription_id: u64) -> bool {
        self.reconciler.borrow_mut().unsubscribe(subscription_id)
    }

    /// Reloads selectable categories; failures leave an empty list.
    pub fn refresh_categories(&self, source: &dyn CategorySource) -> usize {
        let labels = load_categories(source);
        let count = labels.len();
        *self.categories.borrow_mut() = labels;
        count
    }

    pub fn categories(&self) -> Vec<CategoryLabel> {
        self.categories.borrow().clone()
    }

    fn transition_draft(&self, transition: impl FnOnce(PolicyDraft) -> PolicyDraft) {
        let current = self.draft.borrow().clone();
        let next = transition(current);
        *self.draft.borrow_mut() = next;
    }

    fn lock_id(&self, id: PolicyId) -> Result<IdGuard<'_>, StoreError> {
        if !self.pending_ids.borrow_mut().insert(id) {
            warn!("event=policy_mutation module=service status=rejected reason=id_busy id={id}");
            return Err(StoreError::IdBusy(id));
        }
        Ok(IdGuard {
            pending_ids: &self.pending_ids,
            id,
        })
    }

    fn with_retry<T>(
        &self,
        operation: &'static str,
        mut request: impl FnMut() -> RepoResult<T>,
    ) -> RepoResult<T> {
        let attempts = self.config.attempts();
        let mut attempt = 1;
        loop {
            match request() {
                Err(err) if err.is_transient() && attempt < attempts => {
                    warn!(
                        "event=repo_retry module=service status=retry op={} attempt={} error={}",
                        operation, attempt, err
                    );
                    if !self.config.retry_backoff.is_zero() {
                        std::thread::sleep(self.config.retry_backoff);
                    }
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

/// Releases a per-id mutation slot on drop.
struct IdGuard<'a> {
    pending_ids: &'a RefCell<HashSet<PolicyId>>,
    id: PolicyId,
}

impl Drop for IdGuard<'_> {
    fn drop(&mut self) {
        self.pending_ids.borrow_mut().remove(&self.id);
    }
}
