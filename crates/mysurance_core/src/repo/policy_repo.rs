//! Policy repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Store raw policy records and assign their ids.
//! - Publish a full snapshot of the collection after every write.
//!
//! # Invariants
//! - Write paths validate fields/patches before SQL mutations.
//! - Snapshots carry every stored record, tombstones included, in no
//!   particular order.
//! - `patch` on an unknown id returns `RepoError::NotFound`.

use crate::db::{open_db_in_memory, DbError};
use crate::model::policy::{PolicyId, PolicyPatch, PolicyValidationError, RawPolicyFields};
use crate::repo::feed::{SnapshotFeed, SnapshotListener, SnapshotSubscription};
use log::{debug, warn};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::rc::Rc;
use uuid::Uuid;

const POLICY_SELECT_SQL: &str = "SELECT
    id,
    content,
    value,
    type,
    excess,
    deleted,
    created_at
FROM policies";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for policy persistence and change-feed operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(PolicyValidationError),
    Db(DbError),
    NotFound(PolicyId),
    InvalidData(String),
    /// Backend temporarily unreachable; safe to retry.
    Unavailable(String),
}

impl RepoError {
    /// Returns whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Db(err) => err.is_transient(),
            Self::Unavailable(_) => true,
            Self::Validation(_) | Self::NotFound(_) | Self::InvalidData(_) => false,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "policy not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid stored policy data: {message}"),
            Self::Unavailable(message) => write!(f, "policy repository unavailable: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound(_) | Self::InvalidData(_) | Self::Unavailable(_) => None,
        }
    }
}

impl From<PolicyValidationError> for RepoError {
    fn from(value: PolicyValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// One stored record with its id, as carried by a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRecord {
    pub id: PolicyId,
    pub fields: RawPolicyFields,
}

/// Complete point-in-time set of stored records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    records: Vec<SnapshotRecord>,
}

impl Snapshot {
    pub fn new(records: Vec<SnapshotRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[SnapshotRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// External policy collection consumed by the store and reconciler.
pub trait PolicyRepository {
    /// Registers `listener` and immediately delivers the current snapshot.
    fn subscribe(&self, listener: SnapshotListener) -> RepoResult<SnapshotSubscription>;
    /// Reads the full collection.
    fn snapshot(&self) -> RepoResult<Snapshot>;
    /// Stores a new record and returns its assigned id.
    fn create(&self, fields: &RawPolicyFields) -> RepoResult<PolicyId>;
    /// Applies a partial update to an existing record.
    fn patch(&self, id: PolicyId, patch: &PolicyPatch) -> RepoResult<()>;
}

impl<R: PolicyRepository + ?Sized> PolicyRepository for &R {
    fn subscribe(&self, listener: SnapshotListener) -> RepoResult<SnapshotSubscription> {
        (**self).subscribe(listener)
    }

    fn snapshot(&self) -> RepoResult<Snapshot> {
        (**self).snapshot()
    }

    fn create(&self, fields: &RawPolicyFields) -> RepoResult<PolicyId> {
        (**self).create(fields)
    }

    fn patch(&self, id: PolicyId, patch: &PolicyPatch) -> RepoResult<()> {
        (**self).patch(id, patch)
    }
}

impl<R: PolicyRepository + ?Sized> PolicyRepository for Rc<R> {
    fn subscribe(&self, listener: SnapshotListener) -> RepoResult<SnapshotSubscription> {
        (**self).subscribe(listener)
    }

    fn snapshot(&self) -> RepoResult<Snapshot> {
        (**self).snapshot()
    }

    fn create(&self, fields: &RawPolicyFields) -> RepoResult<PolicyId> {
        (**self).create(fields)
    }

    fn patch(&self, id: PolicyId, patch: &PolicyPatch) -> RepoResult<()> {
        (**self).patch(id, patch)
    }
}

/// SQLite-backed policy repository with an in-process change feed.
pub struct SqlitePolicyRepository {
    conn: Connection,
    feed: SnapshotFeed,
}

impl SqlitePolicyRepository {
    /// Wraps a migrated connection (see `db::open_db`).
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            feed: SnapshotFeed::new(),
        }
    }

    /// Opens a fresh in-memory database.
    pub fn in_memory() -> RepoResult<Self> {
        Ok(Self::new(open_db_in_memory()?))
    }

    /// Underlying connection, for inspection outside the change feed.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Reads one record by id, tombstones included.
    pub fn get(&self, id: PolicyId) -> RepoResult<Option<SnapshotRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{POLICY_SELECT_SQL} WHERE id = ?1;"))?;
        let record = stmt
            .query_row([id.to_string()], |row| Ok(parse_policy_row(row)))
            .optional()?;
        record.transpose()
    }

    fn exists(&self, id: PolicyId) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM policies WHERE id = ?1);",
            [id.to_string()],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn publish(&self) {
        match self.snapshot() {
            Ok(snapshot) => {
                debug!(
                    "event=snapshot_publish module=repo status=ok records={}",
                    snapshot.len()
                );
                self.feed.publish(snapshot);
            }
            Err(err) => warn!(
                "event=snapshot_publish module=repo status=error error={}",
                err
            ),
        }
    }
}

impl PolicyRepository for SqlitePolicyRepository {
    fn subscribe(&self, listener: SnapshotListener) -> RepoResult<SnapshotSubscription> {
        let snapshot = self.snapshot()?;
        let subscription = self.feed.subscribe(listener);
        self.feed.deliver_to(&subscription, snapshot);
        Ok(subscription)
    }

    fn snapshot(&self) -> RepoResult<Snapshot> {
        let mut stmt = self
            .conn
            .prepare(&format!("{POLICY_SELECT_SQL} ORDER BY created_at, id;"))?;
        let mut rows = stmt.query([])?;
        let mut records = Vec::new();

        while let Some(row) = rows.next()? {
            records.push(parse_policy_row(row)?);
        }

        Ok(Snapshot::new(records))
    }

    fn create(&self, fields: &RawPolicyFields) -> RepoResult<PolicyId> {
        fields.validate()?;

        let id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO policies (
                id,
                content,
                value,
                type,
                excess,
                deleted,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                id.to_string(),
                fields.content.as_str(),
                fields.value,
                fields.kind.as_deref(),
                fields.excess,
                bool_to_int(fields.deleted),
                fields.created_at.as_str(),
            ],
        )?;

        self.publish();
        Ok(id)
    }

    fn patch(&self, id: PolicyId, patch: &PolicyPatch) -> RepoResult<()> {
        patch.validate()?;

        if patch.is_empty() {
            return if self.exists(id)? {
                Ok(())
            } else {
                Err(RepoError::NotFound(id))
            };
        }

        let changed = self.conn.execute(
            "UPDATE policies
             SET
                content = COALESCE(?1, content),
                value = COALESCE(?2, value),
                type = COALESCE(?3, type),
                excess = COALESCE(?4, excess),
                deleted = COALESCE(?5, deleted)
             WHERE id = ?6;",
            params![
                patch.content.as_deref(),
                patch.value,
                patch.kind.as_deref(),
                patch.excess,
                patch.deleted.map(bool_to_int),
                id.to_string(),
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        self.publish();
        Ok(())
    }
}

fn parse_policy_row(row: &Row<'_>) -> RepoResult<SnapshotRecord> {
    let id_text: String = row.get("id")?;
    let id = Uuid::parse_str(&id_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid value `{id_text}` in policies.id"))
    })?;

    let deleted = match row.get::<_, i64>("deleted")? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid deleted value `{other}` in policies.deleted"
            )));
        }
    };

    Ok(SnapshotRecord {
        id,
        fields: RawPolicyFields {
            content: row.get("content")?,
            value: row.get("value")?,
            kind: row.get("type")?,
            excess: row.get("excess")?,
            deleted,
            created_at: row.get("created_at")?,
        },
    })
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
