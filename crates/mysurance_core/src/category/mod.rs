//! Category reference list for the policy `type` field.
//!
//! # Responsibility
//! - Define the read-only category source collaborator.
//! - Parse the MediaWiki category-members response shape.
//!
//! # Invariants
//! - Category loading failures never propagate into reconciliation.

use log::{info, warn};
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Selectable label for the policy `type` field.
pub type CategoryLabel = String;

#[derive(Debug)]
pub enum CategoryError {
    /// Source could not be reached.
    Fetch(String),
    /// Response body did not match the expected shape.
    Parse(serde_json::Error),
}

impl Display for CategoryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fetch(message) => write!(f, "category fetch failed: {message}"),
            Self::Parse(err) => write!(f, "category response is malformed: {err}"),
        }
    }
}

impl Error for CategoryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Fetch(_) => None,
            Self::Parse(err) => Some(err),
        }
    }
}

impl From<serde_json::Error> for CategoryError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Read-only provider of selectable categories.
pub trait CategorySource {
    fn fetch_categories(&self) -> Result<Vec<CategoryLabel>, CategoryError>;
}

/// Fixed in-process category list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticCategorySource {
    labels: Vec<CategoryLabel>,
}

impl StaticCategorySource {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }
}

impl CategorySource for StaticCategorySource {
    fn fetch_categories(&self) -> Result<Vec<CategoryLabel>, CategoryError> {
        Ok(self.labels.clone())
    }
}

#[derive(Debug, Deserialize)]
struct CategoryMembersResponse {
    query: CategoryMembersQuery,
}

#[derive(Debug, Deserialize)]
struct CategoryMembersQuery {
    categorymembers: Vec<CategoryMember>,
}

#[derive(Debug, Deserialize)]
struct CategoryMember {
    #[serde(default)]
    title: Option<String>,
}

/// Parses a `list=categorymembers` response into display labels.
///
/// Members without a usable title are skipped.
pub fn parse_category_members(body: &str) -> Result<Vec<CategoryLabel>, CategoryError> {
    let response: CategoryMembersResponse = serde_json::from_str(body)?;
    Ok(response
        .query
        .categorymembers
        .into_iter()
        .filter_map(|member| member.title)
        .map(|title| category_label(&title))
        .filter(|label| !label.is_empty())
        .collect())
}

/// Strips namespace prefixes: `Category:Health insurance` -> `Health insurance`.
pub fn category_label(title: &str) -> CategoryLabel {
    title.rsplit(':').next().unwrap_or_default().trim().to_string()
}

/// Fetches categories, degrading to an empty list on failure.
pub fn load_categories(source: &dyn CategorySource) -> Vec<CategoryLabel> {
    match source.fetch_categories() {
        Ok(labels) => {
            info!(
                "event=category_load module=category status=ok count={}",
                labels.len()
            );
            labels
        }
        Err(err) => {
            warn!(
                "event=category_load module=category status=error error={}",
                err
            );
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        category_label, load_categories, parse_category_members, CategoryError, CategoryLabel,
        CategorySource, StaticCategorySource,
    };

    struct FailingSource;

    impl CategorySource for FailingSource {
        fn fetch_categories(&self) -> Result<Vec<CategoryLabel>, CategoryError> {
            Err(CategoryError::Fetch("offline".to_string()))
        }
    }

    #[test]
    fn parses_category_member_titles() {
        let body = r#"{
            "batchcomplete": "",
            "query": {
                "categorymembers": [
                    {"pageid": 1, "ns": 14, "title": "Category:Health insurance"},
                    {"pageid": 2, "ns": 14, "title": "Category:Vehicle insurance"},
                    {"pageid": 3, "ns": 14}
                ]
            }
        }"#;
        let labels = parse_category_members(body).unwrap();
        assert_eq!(labels, vec!["Health insurance", "Vehicle insurance"]);
    }

    #[test]
    fn malformed_body_is_parse_error() {
        let err = parse_category_members("{\"query\": {}}").unwrap_err();
        assert!(matches!(err, CategoryError::Parse(_)));
    }

    #[test]
    fn label_keeps_text_after_last_colon() {
        assert_eq!(category_label("Category:Life"), "Life");
        assert_eq!(category_label("Pet"), "Pet");
        assert_eq!(category_label("A:B:C"), "C");
    }

    #[test]
    fn load_degrades_to_empty_on_failure() {
        assert!(load_categories(&FailingSource).is_empty());
        let source = StaticCategorySource::new(["Car", "Home"]);
        assert_eq!(load_categories(&source), vec!["Car", "Home"]);
    }
}
