//! Policy domain model.
//!
//! # Responsibility
//! - Define the materialized `Policy` entity and its raw stored shape.
//! - Validate fields before they reach the repository.
//!
//! # Invariants
//! - `id` is assigned by the repository and never reused.
//! - `value` is finite and strictly positive.
//! - `excess`, when present, is finite and non-negative.
//! - `created_at` is immutable once stored and is the sole sort key.
//! - `deleted` only ever moves from `false` to `true`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Repository-assigned policy identifier.
pub type PolicyId = Uuid;

/// Label shown for policies stored without a category.
pub const UNKNOWN_KIND_LABEL: &str = "Unknown";

/// Validation failures for policy drafts, stored fields and patches.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyValidationError {
    /// Draft name / stored content is blank.
    EmptyName,
    /// Draft category is blank.
    EmptyType,
    /// Value input is not a number.
    InvalidValue(String),
    /// Value is zero, negative or not finite.
    NonPositiveValue(f64),
    /// Excess is negative or not finite.
    NegativeExcess(f64),
    /// `createdAt` is not an RFC 3339 timestamp.
    InvalidCreatedAt(String),
    /// Patch attempted to clear a tombstone.
    TombstoneRevert,
}

impl Display for PolicyValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "policy name must not be empty"),
            Self::EmptyType => write!(f, "policy type must not be empty"),
            Self::InvalidValue(raw) => write!(f, "policy value `{raw}` is not a number"),
            Self::NonPositiveValue(value) => {
                write!(f, "policy value must be greater than zero, got {value}")
            }
            Self::NegativeExcess(excess) => {
                write!(f, "policy excess must not be negative, got {excess}")
            }
            Self::InvalidCreatedAt(raw) => {
                write!(f, "createdAt `{raw}` is not an RFC 3339 timestamp")
            }
            Self::TombstoneRevert => write!(f, "deleted policies cannot be restored"),
        }
    }
}

impl Error for PolicyValidationError {}

/// Materialized policy entity: stored fields merged with their id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub id: PolicyId,
    /// What is insured.
    pub content: String,
    /// Monthly value in currency units.
    pub value: f64,
    /// Serialized as `type` to match the stored field name.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub excess: Option<f64>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

impl Policy {
    /// Merges a stored field set with its id.
    ///
    /// Fails only when `createdAt` cannot be parsed; other field invariants
    /// are enforced on the write path.
    pub fn from_fields(
        id: PolicyId,
        fields: &RawPolicyFields,
    ) -> Result<Self, PolicyValidationError> {
        Ok(Self {
            id,
            content: fields.content.clone(),
            value: fields.value,
            kind: fields.kind.clone(),
            excess: fields.excess,
            deleted: fields.deleted,
            created_at: fields.created_at_time()?,
        })
    }

    /// Category label, or `Unknown` when none was stored.
    pub fn display_kind(&self) -> &str {
        self.kind
            .as_deref()
            .filter(|kind| !kind.trim().is_empty())
            .unwrap_or(UNKNOWN_KIND_LABEL)
    }

    /// Excess amount; absent reads as zero.
    pub fn excess_or_zero(&self) -> f64 {
        self.excess.unwrap_or(0.0)
    }

    /// Returns whether this policy is visible (not tombstoned).
    pub fn is_active(&self) -> bool {
        !self.deleted
    }
}

/// Field set as held by the repository, without the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPolicyFields {
    pub content: String,
    pub value: f64,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub excess: Option<f64>,
    pub deleted: bool,
    /// RFC 3339 text, e.g. `2024-03-01T10:00:00.000Z`.
    pub created_at: String,
}

impl RawPolicyFields {
    /// Parses `created_at` as a point in time.
    pub fn created_at_time(&self) -> Result<DateTime<Utc>, PolicyValidationError> {
        parse_created_at(&self.created_at)
    }

    /// Validates the invariants every stored record must satisfy.
    pub fn validate(&self) -> Result<(), PolicyValidationError> {
        validate_content(&self.content)?;
        validate_value(self.value)?;
        if let Some(excess) = self.excess {
            validate_excess(excess)?;
        }
        self.created_at_time()?;
        Ok(())
    }
}

/// Validated creation request produced by `PolicyDraft::validate`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPolicy {
    pub content: String,
    pub value: f64,
    pub kind: Option<String>,
    pub excess: Option<f64>,
}

impl NewPolicy {
    /// Builds the stored field set for a policy created at `created_at`.
    ///
    /// New records always start live (`deleted = false`).
    pub fn into_fields(self, created_at: DateTime<Utc>) -> RawPolicyFields {
        RawPolicyFields {
            content: self.content,
            value: self.value,
            kind: self.kind,
            excess: self.excess,
            deleted: false,
            created_at: format_created_at(created_at),
        }
    }
}

/// Partial update applied by `PolicyRepository::patch`.
///
/// `None` leaves the stored field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyPatch {
    pub content: Option<String>,
    pub value: Option<f64>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub excess: Option<f64>,
    pub deleted: Option<bool>,
}

impl PolicyPatch {
    /// Patch that soft-deletes a policy.
    pub fn tombstone() -> Self {
        Self {
            deleted: Some(true),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.value.is_none()
            && self.kind.is_none()
            && self.excess.is_none()
            && self.deleted.is_none()
    }

    /// Validates every field the patch sets.
    pub fn validate(&self) -> Result<(), PolicyValidationError> {
        if let Some(content) = &self.content {
            validate_content(content)?;
        }
        if let Some(value) = self.value {
            validate_value(value)?;
        }
        if let Some(excess) = self.excess {
            validate_excess(excess)?;
        }
        if self.deleted == Some(false) {
            return Err(PolicyValidationError::TombstoneRevert);
        }
        Ok(())
    }
}

/// Formats a creation time the way records store it (millisecond precision, `Z`).
pub fn format_created_at(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses stored `createdAt` text into UTC.
pub fn parse_created_at(raw: &str) -> Result<DateTime<Utc>, PolicyValidationError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|time| time.with_timezone(&Utc))
        .map_err(|_| PolicyValidationError::InvalidCreatedAt(raw.to_string()))
}

pub(crate) fn validate_content(content: &str) -> Result<(), PolicyValidationError> {
    if content.trim().is_empty() {
        return Err(PolicyValidationError::EmptyName);
    }
    Ok(())
}

pub(crate) fn validate_value(value: f64) -> Result<(), PolicyValidationError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(PolicyValidationError::NonPositiveValue(value));
    }
    Ok(())
}

pub(crate) fn validate_excess(excess: f64) -> Result<(), PolicyValidationError> {
    if !excess.is_finite() || excess < 0.0 {
        return Err(PolicyValidationError::NegativeExcess(excess));
    }
    Ok(())
}
