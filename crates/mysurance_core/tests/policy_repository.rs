use mysurance_core::{
    PolicyPatch, PolicyRepository, PolicyValidationError, RawPolicyFields, RepoError, Snapshot,
    SnapshotSubscription, SqlitePolicyRepository,
};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use uuid::Uuid;

fn fields(content: &str, created_at: &str) -> RawPolicyFields {
    RawPolicyFields {
        content: content.to_string(),
        value: 500.0,
        kind: Some("car".to_string()),
        excess: Some(20.0),
        deleted: false,
        created_at: created_at.to_string(),
    }
}

fn recorder(repo: &SqlitePolicyRepository) -> (Rc<RefCell<Vec<Snapshot>>>, SnapshotSubscription) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let subscription = repo
        .subscribe(Box::new(move |snapshot| sink.borrow_mut().push(snapshot.clone())))
        .unwrap();
    (seen, subscription)
}

#[test]
fn create_assigns_id_and_stores_fields() {
    let repo = SqlitePolicyRepository::in_memory().unwrap();
    let id = repo
        .create(&fields("Car", "2024-03-01T10:00:00.000Z"))
        .unwrap();

    let record = repo.get(id).unwrap().unwrap();
    assert_eq!(record.id, id);
    assert_eq!(record.fields, fields("Car", "2024-03-01T10:00:00.000Z"));
}

#[test]
fn subscribe_delivers_current_snapshot_then_every_write() {
    let repo = SqlitePolicyRepository::in_memory().unwrap();
    repo.create(&fields("Car", "2024-03-01T10:00:00.000Z"))
        .unwrap();

    let (seen, _subscription) = recorder(&repo);
    assert_eq!(seen.borrow().len(), 1);
    assert_eq!(seen.borrow()[0].len(), 1);

    let id = repo
        .create(&fields("House", "2024-03-02T10:00:00.000Z"))
        .unwrap();
    repo.patch(id, &PolicyPatch::tombstone()).unwrap();

    let snapshots = seen.borrow();
    assert_eq!(snapshots.len(), 3);
    // Snapshots carry tombstones; filtering is the reconciler's job.
    assert_eq!(snapshots[2].len(), 2);
    assert!(snapshots[2]
        .records()
        .iter()
        .any(|record| record.id == id && record.fields.deleted));
}

#[test]
fn dropped_subscription_stops_delivery() {
    let repo = SqlitePolicyRepository::in_memory().unwrap();
    let (seen, subscription) = recorder(&repo);
    drop(subscription);

    repo.create(&fields("Car", "2024-03-01T10:00:00.000Z"))
        .unwrap();
    assert_eq!(seen.borrow().len(), 1);
}

#[test]
fn patch_updates_only_given_fields() {
    let repo = SqlitePolicyRepository::in_memory().unwrap();
    let id = repo
        .create(&fields("Car", "2024-03-01T10:00:00.000Z"))
        .unwrap();

    let patch = PolicyPatch {
        value: Some(650.0),
        kind: Some("vehicle".to_string()),
        ..PolicyPatch::default()
    };
    repo.patch(id, &patch).unwrap();

    let record = repo.get(id).unwrap().unwrap();
    assert_eq!(record.fields.value, 650.0);
    assert_eq!(record.fields.kind.as_deref(), Some("vehicle"));
    assert_eq!(record.fields.content, "Car");
    assert_eq!(record.fields.excess, Some(20.0));
    assert_eq!(record.fields.created_at, "2024-03-01T10:00:00.000Z");
}

#[test]
fn patch_on_missing_id_returns_not_found() {
    let repo = SqlitePolicyRepository::in_memory().unwrap();
    let missing = Uuid::new_v4();

    let err = repo.patch(missing, &PolicyPatch::tombstone()).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(id) if id == missing));
    assert!(!err.is_transient());

    let err = repo.patch(missing, &PolicyPatch::default()).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(_)));
}

#[test]
fn tombstoning_twice_keeps_record_deleted() {
    let repo = SqlitePolicyRepository::in_memory().unwrap();
    let id = repo
        .create(&fields("Car", "2024-03-01T10:00:00.000Z"))
        .unwrap();

    repo.patch(id, &PolicyPatch::tombstone()).unwrap();
    repo.patch(id, &PolicyPatch::tombstone()).unwrap();
    assert!(repo.get(id).unwrap().unwrap().fields.deleted);
}

#[test]
fn invalid_fields_are_rejected_before_write() {
    let repo = SqlitePolicyRepository::in_memory().unwrap();

    let mut bad = fields("Car", "2024-03-01T10:00:00.000Z");
    bad.value = -1.0;
    let err = repo.create(&bad).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Validation(PolicyValidationError::NonPositiveValue(_))
    ));

    let err = repo
        .create(&fields("  ", "2024-03-01T10:00:00.000Z"))
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::Validation(PolicyValidationError::EmptyName)
    ));
    assert!(repo.snapshot().unwrap().is_empty());
}

#[test]
fn unavailable_errors_are_transient() {
    assert!(RepoError::Unavailable("timeout".to_string()).is_transient());
    assert!(!RepoError::InvalidData("bad row".to_string()).is_transient());
}

#[test]
fn write_from_initial_callback_reaches_the_new_listener() {
    let repo = Rc::new(SqlitePolicyRepository::in_memory().unwrap());
    let seen = Rc::new(RefCell::new(Vec::new()));

    let sink = Rc::clone(&seen);
    let writer: Weak<SqlitePolicyRepository> = Rc::downgrade(&repo);
    let _subscription = repo
        .subscribe(Box::new(move |snapshot| {
            sink.borrow_mut().push(snapshot.len());
            if snapshot.is_empty() {
                if let Some(repo) = writer.upgrade() {
                    repo.create(&fields("Car", "2024-03-01T10:00:00.000Z"))
                        .unwrap();
                }
            }
        }))
        .unwrap();

    assert_eq!(*seen.borrow(), vec![0, 1]);
    let stored: i64 = repo
        .connection()
        .query_row("SELECT COUNT(*) FROM policies;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(stored, 1);
}
