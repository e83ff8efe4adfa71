//! Snapshot reconciler.
//!
//! # Responsibility
//! - Filter tombstones, merge ids and order records from each snapshot.
//! - Publish every new materialized list on typed per-subscriber channels.
//!
//! # Invariants
//! - The materialized list never contains a `deleted` policy.
//! - Entries are sorted ascending by `created_at`, ties by ascending `id`.
//! - `revision` increases by exactly one per applied snapshot.
//! - Subscribers are notified synchronously inside `apply`.

use crate::model::policy::{Policy, PolicyId};
use crate::repo::policy_repo::Snapshot;
use log::{debug, warn};
use std::collections::BTreeMap;
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::sync::Arc;

/// Ordered, tombstone-free view derived from one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedList {
    /// `0` before the first snapshot arrives.
    pub revision: u64,
    pub policies: Arc<[Policy]>,
}

impl Default for MaterializedList {
    fn default() -> Self {
        Self {
            revision: 0,
            policies: Arc::from(Vec::new()),
        }
    }
}

impl MaterializedList {
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Policy> {
        self.policies.iter()
    }

    pub fn get(&self, id: PolicyId) -> Option<&Policy> {
        self.policies.iter().find(|policy| policy.id == id)
    }
}

/// Receiving end of a reconciler subscription.
pub struct ListSubscription {
    id: u64,
    receiver: Receiver<MaterializedList>,
}

impl ListSubscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn receiver(&self) -> &Receiver<MaterializedList> {
        &self.receiver
    }

    /// Drains queued updates and returns the newest one, if any.
    pub fn latest(&self) -> Option<MaterializedList> {
        let mut latest = None;
        loop {
            match self.receiver.try_recv() {
                Ok(list) => latest = Some(list),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return latest,
            }
        }
    }

    /// Drains every queued update in delivery order.
    pub fn drain(&self) -> Vec<MaterializedList> {
        self.receiver.try_iter().collect()
    }
}

/// Reconciles repository snapshots into a materialized list.
#[derive(Debug, Default)]
pub struct SnapshotReconciler {
    current: MaterializedList,
    subscribers: BTreeMap<u64, Sender<MaterializedList>>,
    next_subscriber_id: u64,
}

impl SnapshotReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the materialized list with the view of `snapshot`.
    pub fn apply(&mut self, snapshot: &Snapshot) -> MaterializedList {
        let policies = materialize(snapshot);
        self.current = MaterializedList {
            revision: self.current.revision + 1,
            policies: policies.into(),
        };
        debug!(
            "event=snapshot_applied module=sync status=ok revision={} records={} visible={}",
            self.current.revision,
            snapshot.len(),
            self.current.len()
        );
        self.notify();
        self.current.clone()
    }

    pub fn current(&self) -> MaterializedList {
        self.current.clone()
    }

    /// Opens a channel that first receives the current list, then every update.
    pub fn subscribe(&mut self) -> ListSubscription {
        let (sender, receiver) = channel();
        let id = self.next_subscriber_id;
        self.next_subscriber_id += 1;
        if sender.send(self.current.clone()).is_ok() {
            self.subscribers.insert(id, sender);
        }
        ListSubscription { id, receiver }
    }

    /// Stops delivery to `id`; returns whether it was subscribed.
    pub fn unsubscribe(&mut self, id: u64) -> bool {
        self.subscribers.remove(&id).is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn notify(&mut self) {
        let current = self.current.clone();
        // Dropped receivers fail the send and are pruned here.
        self.subscribers
            .retain(|_, sender| sender.send(current.clone()).is_ok());
    }
}

/// Filters, merges and sorts one snapshot.
///
/// Records with an unparseable `createdAt` cannot be ordered and are skipped.
pub fn materialize(snapshot: &Snapshot) -> Vec<Policy> {
    let mut policies = snapshot
        .records()
        .iter()
        .filter(|record| !record.fields.deleted)
        .filter_map(|record| match Policy::from_fields(record.id, &record.fields) {
            Ok(policy) => Some(policy),
            Err(err) => {
                warn!(
                    "event=snapshot_record_skipped module=sync status=error id={} error={}",
                    record.id, err
                );
                None
            }
        })
        .collect::<Vec<_>>();

    policies.sort_by(|left, right| {
        left.created_at
            .cmp(&right.created_at)
            .then_with(|| left.id.cmp(&right.id))
    });
    policies
}
