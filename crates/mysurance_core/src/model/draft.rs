//! Policy form draft.
//!
//! # Responsibility
//! - Hold in-progress form input as an immutable value.
//! - Expose pure transitions instead of ad-hoc field mutation.
//! - Turn input into a validated `NewPolicy`.
//!
//! # Invariants
//! - `submitted()` always yields the empty draft.
//! - `submit_failed()` keeps every field so the user can retry.

use crate::excess::marks::ExcessSlider;
use crate::model::policy::{
    validate_excess, validate_value, NewPolicy, PolicyValidationError,
};

/// In-progress policy input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyDraft {
    pub name: String,
    /// Raw value input; parsed on validation.
    pub value: String,
    pub kind: String,
    pub excess: f64,
    pub submitting: bool,
}

impl PolicyDraft {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_name(self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self
        }
    }

    #[must_use]
    pub fn with_value(self, value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..self
        }
    }

    #[must_use]
    pub fn with_kind(self, kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..self
        }
    }

    #[must_use]
    pub fn with_excess(self, excess: f64) -> Self {
        Self { excess, ..self }
    }

    /// Marks the draft as in flight.
    #[must_use]
    pub fn begin_submit(self) -> Self {
        Self {
            submitting: true,
            ..self
        }
    }

    /// Draft after a successful submission: cleared input.
    #[must_use]
    pub fn submitted(self) -> Self {
        Self::default()
    }

    /// Draft after a failed submission: input kept, flag cleared.
    #[must_use]
    pub fn submit_failed(self) -> Self {
        Self {
            submitting: false,
            ..self
        }
    }

    /// Validates input in form order: name, type, value, excess.
    pub fn validate(&self) -> Result<NewPolicy, PolicyValidationError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(PolicyValidationError::EmptyName);
        }
        let kind = self.kind.trim();
        if kind.is_empty() {
            return Err(PolicyValidationError::EmptyType);
        }
        let value_text = self.value.trim();
        let value = value_text
            .parse::<f64>()
            .map_err(|_| PolicyValidationError::InvalidValue(value_text.to_string()))?;
        validate_value(value)?;
        validate_excess(self.excess)?;

        Ok(NewPolicy {
            content: name.to_string(),
            value,
            kind: Some(kind.to_string()),
            excess: Some(self.excess),
        })
    }

    /// Excess slider bounds and marks for the current value input.
    pub fn excess_slider(&self) -> ExcessSlider {
        ExcessSlider::for_input(&self.value)
    }
}
