//! Excess slider marks.
//!
//! # Responsibility
//! - Derive the step size, bound and labeled positions of the excess slider.
//!
//! # Invariants
//! - Step size is `value / 100` rounded half away from zero.
//! - Marks are evenly spaced from `0` to `step * 10`, at most six entries.
//! - Absent, non-finite or fractional values leave the marks untouched.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

/// Slider position to display label.
pub type ExcessMarks = BTreeMap<i64, String>;

const STEP_DIVISOR: f64 = 100.0;
const SLIDER_STEPS: i64 = 10;
const MARK_MULTIPLIERS: [i64; 6] = [10, 8, 6, 4, 2, 0];

static LEADING_INT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([+-]?\d+)").expect("valid leading integer regex"));

/// Slider granularity for a policy value.
pub fn step_size(value: f64) -> i64 {
    let step = (value / STEP_DIVISOR).round();
    if step.is_finite() {
        step as i64
    } else {
        0
    }
}

/// Upper bound of the excess slider; absent values collapse it to `0`.
pub fn slider_max(value: Option<f64>) -> i64 {
    step_size(value.unwrap_or(0.0)).saturating_mul(SLIDER_STEPS)
}

/// Adds the marks derived from `value` to `marks`.
///
/// Returns `marks` unchanged when `value` is absent or not a whole number.
pub fn extend_marks(value: Option<f64>, mut marks: ExcessMarks) -> ExcessMarks {
    let Some(value) = value.filter(|value| value.is_finite() && value.fract() == 0.0) else {
        return marks;
    };

    let step = step_size(value);
    for multiplier in MARK_MULTIPLIERS {
        let position = step.saturating_mul(multiplier);
        marks.insert(position, mark_label(position));
    }
    marks
}

/// Parses the integer prefix of free-form input (`" 550.7 €"` -> `550`).
///
/// Prefixes beyond the `i64` range saturate instead of being dropped.
pub fn parse_leading_int(text: &str) -> Option<i64> {
    let digits = LEADING_INT_RE.captures(text)?.get(1)?.as_str();
    match digits.parse::<i64>() {
        Ok(value) => Some(value),
        Err(_) if digits.starts_with('-') => Some(i64::MIN),
        Err(_) => Some(i64::MAX),
    }
}

/// Marks for raw value input, as shown next to the policy form.
pub fn excess_marks(text: &str) -> ExcessMarks {
    extend_marks(
        parse_leading_int(text).map(|value| value as f64),
        ExcessMarks::new(),
    )
}

fn mark_label(position: i64) -> String {
    format!("{position} €")
}

/// View model for the excess slider of one draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcessSlider {
    pub max: i64,
    pub marks: ExcessMarks,
    /// The slider stays disabled until a value is entered.
    pub enabled: bool,
}

impl ExcessSlider {
    pub fn for_input(value_text: &str) -> Self {
        let numeric = value_text.trim().parse::<f64>().ok();
        Self {
            max: slider_max(numeric),
            marks: excess_marks(value_text),
            enabled: !value_text.trim().is_empty(),
        }
    }
}
