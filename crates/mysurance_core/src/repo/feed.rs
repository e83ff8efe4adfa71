//! Snapshot change feed with explicit subscription handles.
//!
//! # Responsibility
//! - Fan full snapshots out to registered listeners in write order.
//! - Hand out handles that unsubscribe when dropped.
//!
//! # Invariants
//! - Listeners run synchronously on the publishing call.
//! - Listeners may subscribe, unsubscribe or trigger further writes while
//!   running; nested publishes are queued, not interleaved.
//! - A listener is registered before its initial snapshot is delivered, so
//!   writes made from that first callback reach it too.

use crate::repo::policy_repo::Snapshot;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::rc::{Rc, Weak};

/// Callback invoked with every published snapshot.
pub type SnapshotListener = Box<dyn FnMut(&Snapshot)>;

/// Queued snapshot; `target` limits delivery to one listener.
struct Delivery {
    target: Option<u64>,
    snapshot: Snapshot,
}

#[derive(Default)]
struct ListenerTable {
    next_id: u64,
    entries: BTreeMap<u64, SnapshotListener>,
    cancelled: HashSet<u64>,
    pending: VecDeque<Delivery>,
    emitting: bool,
}

impl ListenerTable {
    fn cancel(&mut self, id: u64) {
        if self.entries.remove(&id).is_none() && self.emitting {
            self.cancelled.insert(id);
        }
    }
}

/// Shared listener registry owned by a repository implementation.
#[derive(Clone, Default)]
pub struct SnapshotFeed {
    table: Rc<RefCell<ListenerTable>>,
}

impl SnapshotFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener. Does not deliver anything by itself.
    pub fn subscribe(&self, listener: SnapshotListener) -> SnapshotSubscription {
        let mut table = self.table.borrow_mut();
        let id = table.next_id;
        table.next_id += 1;
        table.entries.insert(id, listener);
        SnapshotSubscription {
            id,
            table: Rc::downgrade(&self.table),
        }
    }

    /// Delivers `snapshot` to every live listener.
    pub fn publish(&self, snapshot: Snapshot) {
        self.enqueue(Delivery {
            target: None,
            snapshot,
        });
    }

    /// Delivers `snapshot` to the listener behind `subscription` only.
    ///
    /// Queued behind any emission in progress, like `publish`.
    pub fn deliver_to(&self, subscription: &SnapshotSubscription, snapshot: Snapshot) {
        self.enqueue(Delivery {
            target: Some(subscription.id),
            snapshot,
        });
    }

    fn enqueue(&self, delivery: Delivery) {
        {
            let mut table = self.table.borrow_mut();
            table.pending.push_back(delivery);
            if table.emitting {
                return;
            }
            table.emitting = true;
        }

        loop {
            let (delivery, mut detached) = {
                let mut table = self.table.borrow_mut();
                let Some(delivery) = table.pending.pop_front() else {
                    table.emitting = false;
                    return;
                };
                (delivery, std::mem::take(&mut table.entries))
            };

            for (id, listener) in detached.iter_mut() {
                if delivery.target.is_some_and(|target| target != *id) {
                    continue;
                }
                if self.table.borrow().cancelled.contains(id) {
                    continue;
                }
                listener(&delivery.snapshot);
            }

            let mut table = self.table.borrow_mut();
            for id in std::mem::take(&mut table.cancelled) {
                detached.remove(&id);
            }
            detached.append(&mut table.entries);
            table.entries = detached;
        }
    }

    pub fn listener_count(&self) -> usize {
        self.table.borrow().entries.len()
    }
}

/// Live registration on a `SnapshotFeed`; dropping it unsubscribes.
#[must_use = "dropping the subscription unsubscribes immediately"]
pub struct SnapshotSubscription {
    id: u64,
    table: Weak<RefCell<ListenerTable>>,
}

impl SnapshotSubscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Explicit unsubscribe; equivalent to dropping the handle.
    pub fn unsubscribe(self) {}
}

impl Drop for SnapshotSubscription {
    fn drop(&mut self) {
        if let Some(table) = self.table.upgrade() {
            table.borrow_mut().cancel(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SnapshotFeed;
    use crate::model::policy::RawPolicyFields;
    use crate::repo::policy_repo::{Snapshot, SnapshotRecord};
    use std::cell::RefCell;
    use std::rc::Rc;
    use uuid::Uuid;

    fn record() -> SnapshotRecord {
        SnapshotRecord {
            id: Uuid::new_v4(),
            fields: RawPolicyFields {
                content: "Bike".to_string(),
                value: 40.0,
                kind: None,
                excess: None,
                deleted: false,
                created_at: "2024-01-01T00:00:00.000Z".to_string(),
            },
        }
    }

    #[test]
    fn publish_reaches_listeners_until_dropped() {
        let feed = SnapshotFeed::new();
        let seen = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&seen);
        let subscription = feed.subscribe(Box::new(move |_| *counter.borrow_mut() += 1));

        feed.publish(Snapshot::default());
        assert_eq!(*seen.borrow(), 1);

        drop(subscription);
        feed.publish(Snapshot::default());
        assert_eq!(*seen.borrow(), 1);
        assert_eq!(feed.listener_count(), 0);
    }

    #[test]
    fn listener_may_unsubscribe_itself_while_running() {
        let feed = SnapshotFeed::new();
        let slot = Rc::new(RefCell::new(None));
        let hits = Rc::new(RefCell::new(0));

        let inner_slot = Rc::clone(&slot);
        let inner_hits = Rc::clone(&hits);
        let subscription = feed.subscribe(Box::new(move |_| {
            *inner_hits.borrow_mut() += 1;
            inner_slot.borrow_mut().take();
        }));
        *slot.borrow_mut() = Some(subscription);

        feed.publish(Snapshot::default());
        feed.publish(Snapshot::default());
        assert_eq!(*hits.borrow(), 1);
        assert_eq!(feed.listener_count(), 0);
    }

    #[test]
    fn nested_publish_is_delivered_after_current_round() {
        let feed = SnapshotFeed::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        let nested_feed = feed.clone();
        let first_order = Rc::clone(&order);
        let _first = feed.subscribe(Box::new(move |snapshot| {
            first_order.borrow_mut().push(("first", snapshot.len()));
            if snapshot.is_empty() {
                nested_feed.publish(Snapshot::new(vec![record()]));
            }
        }));
        let second_order = Rc::clone(&order);
        let _second = feed.subscribe(Box::new(move |snapshot| {
            second_order.borrow_mut().push(("second", snapshot.len()));
        }));

        feed.publish(Snapshot::default());
        assert_eq!(
            *order.borrow(),
            vec![("first", 0), ("second", 0), ("first", 1), ("second", 1)]
        );
    }

    #[test]
    fn targeted_delivery_reaches_only_that_listener() {
        let feed = SnapshotFeed::new();
        let first_hits = Rc::new(RefCell::new(0));
        let second_hits = Rc::new(RefCell::new(0));

        let counter = Rc::clone(&first_hits);
        let _first = feed.subscribe(Box::new(move |_| *counter.borrow_mut() += 1));
        let counter = Rc::clone(&second_hits);
        let second = feed.subscribe(Box::new(move |_| *counter.borrow_mut() += 1));

        feed.deliver_to(&second, Snapshot::default());
        assert_eq!(*first_hits.borrow(), 0);
        assert_eq!(*second_hits.borrow(), 1);
    }
}
